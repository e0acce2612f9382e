//! Stand-in architecture backend: a `BTreeMap`-backed page table and a
//! tick counter instead of a real timestamp source. Exists so the generic
//! scheduler/address-space/IPC code (components D–G) can be exercised by
//! `#[test_case]`s without a real MMU or interrupt controller; a real
//! architecture would replace this module entirely behind its own
//! feature, never by editing the generic code that calls into [`PageTable`].

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    arch::paging::{MapToError, PageTable, PteFlags, UnmapError},
    memory::{PhysAddr, VirtAddr},
};

static TICKS_MS: AtomicU64 = AtomicU64::new(0);
static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn monotonic_ms() -> u64 {
    TICKS_MS.fetch_add(1, Ordering::Relaxed)
}

pub fn current_cpu_id() -> usize {
    0
}

pub fn disable_interrupts() -> bool {
    INTERRUPTS_ENABLED.swap(false, Ordering::AcqRel)
}

pub fn restore_interrupts(were_enabled: bool) {
    INTERRUPTS_ENABLED.store(were_enabled, Ordering::Release);
}

pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}

/// A page table that is just a sorted map from virtual to physical page,
/// sufficient to exercise every operation the `PageTable` trait exposes.
pub struct MockPageTable {
    entries: BTreeMap<usize, (PhysAddr, PteFlags)>,
    root: PhysAddr,
}

impl PageTable for MockPageTable {
    fn new() -> Result<Self, MapToError> {
        Ok(Self {
            entries: BTreeMap::new(),
            root: PhysAddr::from(0),
        })
    }

    fn root(&self) -> PhysAddr {
        self.root
    }

    fn map(&mut self, vaddr: VirtAddr, frame: PhysAddr, flags: PteFlags) -> Result<(), MapToError> {
        let key = vaddr.into_raw();
        if self.entries.contains_key(&key) {
            return Err(MapToError::AlreadyMapped);
        }
        self.entries
            .insert(key, (frame, flags | PteFlags::PRESENT));
        Ok(())
    }

    fn unmap(&mut self, vaddr: VirtAddr) -> Result<PhysAddr, UnmapError> {
        self.entries
            .remove(&vaddr.into_raw())
            .map(|(frame, _)| frame)
            .ok_or(UnmapError)
    }

    fn find(&self, vaddr: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
        self.entries.get(&vaddr.into_raw()).copied()
    }

    fn set_flags(&mut self, vaddr: VirtAddr, flags: PteFlags) -> Result<(), UnmapError> {
        let entry = self.entries.get_mut(&vaddr.into_raw()).ok_or(UnmapError)?;
        entry.1 = flags | PteFlags::PRESENT;
        Ok(())
    }

    fn invalidate_local(&self, _vaddr: VirtAddr) {}
}

unsafe impl Send for MockPageTable {}
