//! The frame allocator (component A, spec.md §4.1): zones searched in
//! priority order, a buddy-style free list within each zone, and a
//! reservation counter that lets a caller promise itself frames without
//! removing them from the free list yet.

use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    memory::{paging::PAGE_SIZE, PhysAddr},
    utils::locks::Mutex,
    ErrorStatus, KResult,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Only satisfy this request out of the reserved pool built up by
        /// a prior `reserve()`; never touch unreserved free frames.
        const RESERVE    = 0b0000_0001;
        /// Never draw from the reserved pool, even if unreserved memory
        /// is exhausted.
        const NO_RESERVE = 0b0000_0010;
        /// The caller is in a context that must not sleep; fail instead
        /// of waiting for frames to be freed.
        const ATOMIC     = 0b0000_0100;
        /// Caller accepts a kernel panic instead of an error return; used
        /// only by boot-time allocations that have no recovery path.
        const FORCE      = 0b0000_1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ZonePriority {
    /// DMA-suitable, low physical addresses; searched first because it is
    /// usually the scarcest.
    Dma,
    Low,
    High,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Frame(PhysAddr);

impl Frame {
    pub fn containing_address(address: PhysAddr) -> Self {
        Self(address.align_down())
    }

    pub const fn start_address(&self) -> PhysAddr {
        self.0
    }

    pub fn offset(&self, pages: usize) -> Self {
        Self(self.0 + pages * PAGE_SIZE)
    }
}

const MAX_ORDER: usize = 20; // 2^20 pages == 4 GiB worth of frames per zone, plenty for a zone

/// A contiguous range of frames with one allocation policy. Invariant
/// (spec.md §3): zones never overlap and a frame belongs to exactly one
/// zone — enforced by construction in [`FrameAllocator::add_zone`], which
/// rejects overlapping ranges.
struct Zone {
    base: Frame,
    frame_count: usize,
    priority: ZonePriority,
    /// `free_lists[order]` holds the starting frame index (relative to
    /// `base`) of every free block of size `2^order` pages.
    free_lists: Vec<Vec<usize>>,
    /// Reference count per frame, indexed relative to `base`; 0 means free.
    refcounts: Vec<u32>,
}

impl Zone {
    fn new(base: Frame, frame_count: usize, priority: ZonePriority) -> Self {
        let mut zone = Self {
            base,
            frame_count,
            priority,
            free_lists: (0..=MAX_ORDER).map(|_| Vec::new()).collect(),
            refcounts: alloc::vec![0; frame_count],
        };
        zone.seed_free_lists();
        zone
    }

    fn seed_free_lists(&mut self) {
        let mut index = 0;
        let mut remaining = self.frame_count;
        while remaining > 0 {
            let order = largest_order_fitting(index, remaining);
            self.free_lists[order].push(index);
            let block_len = 1usize << order;
            index += block_len;
            remaining -= block_len;
        }
    }

    fn order_for(count: usize) -> usize {
        let mut order = 0;
        while (1usize << order) < count {
            order += 1;
        }
        order
    }

    fn alloc_block(&mut self, order: usize) -> Option<usize> {
        for cur in order..=MAX_ORDER {
            if let Some(index) = self.free_lists[cur].pop() {
                let mut index = index;
                let mut cur = cur;
                while cur > order {
                    cur -= 1;
                    let buddy = index + (1usize << cur);
                    self.free_lists[cur].push(buddy);
                }
                return Some(index);
            }
        }
        None
    }

    fn free_block(&mut self, mut index: usize, order: usize) {
        let mut order = order;
        while order < MAX_ORDER {
            let buddy = index ^ (1usize << order);
            let list = &mut self.free_lists[order];
            if let Some(pos) = list.iter().position(|&b| b == buddy) {
                list.swap_remove(pos);
                index = index.min(buddy);
                order += 1;
            } else {
                break;
            }
        }
        self.free_lists[order].push(index);
    }
}

fn largest_order_fitting(index: usize, remaining: usize) -> usize {
    let align_order = if index == 0 {
        MAX_ORDER
    } else {
        index.trailing_zeros() as usize
    };
    let size_order = Zone::order_for(remaining + 1).saturating_sub(1).min(MAX_ORDER);
    align_order.min(size_order).min(MAX_ORDER)
}

pub struct FrameAllocator {
    /// Zones in search priority order (spec.md §4.1: "zones are searched
    /// in priority order").
    zones: Mutex<Vec<Zone>>,
    reservable: AtomicUsize,
}

impl FrameAllocator {
    pub const fn new() -> Self {
        Self {
            zones: Mutex::new(Vec::new()),
            reservable: AtomicUsize::new(0),
        }
    }

    /// Registers a new zone. Rejects a range overlapping an existing zone
    /// to preserve the "frame belongs to exactly one zone" invariant.
    pub fn add_zone(&self, base: Frame, frame_count: usize, priority: ZonePriority) -> KResult<()> {
        let mut zones = self.zones.lock();
        let new_start = base.start_address().into_raw();
        let new_end = new_start + frame_count * PAGE_SIZE;
        for zone in zones.iter() {
            let start = zone.base.start_address().into_raw();
            let end = start + zone.frame_count * PAGE_SIZE;
            if new_start < end && start < new_end {
                return Err(ErrorStatus::InvalidArgument);
            }
        }
        zones.push(Zone::new(base, frame_count, priority));
        zones.sort_by_key(|z| z.priority);
        Ok(())
    }

    /// `reserve(count)`: reduces the pool of memory future `RESERVE`
    /// allocations may draw from without removing any frame from the free
    /// lists yet.
    pub fn reserve(&self, count: usize) -> KResult<()> {
        let free = self.free_frame_count();
        let reserved = self.reservable.load(Ordering::Relaxed);
        if reserved + count > free {
            return Err(ErrorStatus::OutOfMemory);
        }
        self.reservable.fetch_add(count, Ordering::AcqRel);
        Ok(())
    }

    pub fn unreserve(&self, count: usize) {
        self.reservable.fetch_sub(count, Ordering::AcqRel);
    }

    fn free_frame_count(&self) -> usize {
        self.zones
            .lock()
            .iter()
            .flat_map(|z| z.free_lists.iter().enumerate())
            .map(|(order, list)| list.len() << order)
            .sum()
    }

    /// `alloc(count, flags)`: never blocks (component A never sleeps in
    /// this implementation; `ATOMIC`/non-`ATOMIC` callers observe the
    /// same behavior since CORE has no background reclaimer to wait on).
    pub fn alloc(&self, count: usize, flags: AllocFlags) -> KResult<Frame> {
        if count == 0 {
            return Err(ErrorStatus::InvalidArgument);
        }
        let order = Zone::order_for(count);
        let mut zones = self.zones.lock();

        if flags.contains(AllocFlags::RESERVE) {
            let have = self.reservable.load(Ordering::Acquire);
            let need = 1usize << order;
            if have < need {
                return Err(ErrorStatus::OutOfMemory);
            }
        }

        for zone in zones.iter_mut() {
            if let Some(index) = zone.alloc_block(order) {
                for slot in &mut zone.refcounts[index..index + (1usize << order)] {
                    *slot = 1;
                }
                if flags.contains(AllocFlags::RESERVE) {
                    self.reservable
                        .fetch_sub(1usize << order, Ordering::AcqRel);
                }
                return Ok(zone.base.offset(index));
            }
        }

        if flags.contains(AllocFlags::FORCE) {
            panic!("frame allocator: out of memory and FORCE was set");
        }
        Err(ErrorStatus::OutOfMemory)
    }

    pub fn free(&self, frame: Frame, count: usize) {
        let order = Zone::order_for(count);
        let mut zones = self.zones.lock();
        let addr = frame.start_address().into_raw();
        for zone in zones.iter_mut() {
            let start = zone.base.start_address().into_raw();
            let end = start + zone.frame_count * PAGE_SIZE;
            if addr >= start && addr < end {
                let index = (addr - start) / PAGE_SIZE;
                for slot in &mut zone.refcounts[index..index + (1usize << order)] {
                    debug_assert!(*slot > 0, "double free of frame {:?}", frame);
                    *slot = 0;
                }
                zone.free_block(index, order);
                return;
            }
        }
        debug_assert!(false, "freed a frame {:?} that belongs to no zone", frame);
    }

    /// Current reference count of the frame containing `addr`; used by
    /// the address-space manager's share/CoW path and by tests validating
    /// the ownership invariant (spec.md §8).
    pub fn refcount(&self, frame: Frame) -> u32 {
        let zones = self.zones.lock();
        let addr = frame.start_address().into_raw();
        for zone in zones.iter() {
            let start = zone.base.start_address().into_raw();
            let end = start + zone.frame_count * PAGE_SIZE;
            if addr >= start && addr < end {
                return zone.refcounts[(addr - start) / PAGE_SIZE];
            }
        }
        0
    }

    pub fn inc_refcount(&self, frame: Frame) {
        let mut zones = self.zones.lock();
        let addr = frame.start_address().into_raw();
        for zone in zones.iter_mut() {
            let start = zone.base.start_address().into_raw();
            let end = start + zone.frame_count * PAGE_SIZE;
            if addr >= start && addr < end {
                zone.refcounts[(addr - start) / PAGE_SIZE] += 1;
                return;
            }
        }
    }

    /// Drops one reference to a single-page frame; once it reaches zero
    /// the frame actually returns to the zone free list (spec.md §8
    /// scenario 4: "Destroy area in B -> refcount 0, frame freed"). Only
    /// meaningful for order-0 blocks — the address-space manager is the
    /// only caller and it only ever shares individual pages.
    pub fn dec_refcount(&self, frame: Frame) -> u32 {
        let mut zones = self.zones.lock();
        let addr = frame.start_address().into_raw();
        for zone in zones.iter_mut() {
            let start = zone.base.start_address().into_raw();
            let end = start + zone.frame_count * PAGE_SIZE;
            if addr >= start && addr < end {
                let index = (addr - start) / PAGE_SIZE;
                debug_assert!(zone.refcounts[index] > 0, "dec_refcount of unreferenced frame {:?}", frame);
                zone.refcounts[index] = zone.refcounts[index].saturating_sub(1);
                let remaining = zone.refcounts[index];
                if remaining == 0 {
                    zone.free_block(index, 0);
                }
                return remaining;
            }
        }
        0
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref FRAME_ALLOCATOR: FrameAllocator = FrameAllocator::new();
}
