//! The address-space manager (component D, spec.md §4.4): address spaces,
//! their areas, the pluggable memory backends an area delegates to, and
//! the page-fault resolution path that ties them to the frame allocator
//! (A) and the page-table abstraction (C).
//!
//! Locking order (spec.md §4.4, enforced by construction — every method
//! here takes locks in this order and never the other way around):
//! as-lock ⊐ area-lock ⊐ share-info-lock ⊐ page-table-lock.

use alloc::{collections::BTreeMap, sync::Arc};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bitflags::bitflags;

use crate::{
    arch::paging::PteFlags,
    ipc::phone::PhoneId,
    memory::{
        frame_allocator::{AllocFlags, Frame, FRAME_ALLOCATOR},
        paging::{new_page_table, PhysPageTable},
        VirtAddr, PAGE_SIZE,
    },
    task::Thread,
    utils::locks::{Mutex, RwLock},
    ErrorStatus, KResult,
};

bitflags! {
    /// Reserved for flags future architectures need at `as_create` time;
    /// the distilled spec names the parameter but never a concrete bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AsFlags: u32 {
        const _RESERVED = 0b0000_0001;
    }
}

bitflags! {
    /// Per-area access flags (spec.md §4.3: "access flags (R/W/X/user/
    /// kernel/cacheable)").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AreaFlags: u32 {
        const READ      = 0b0000_0001;
        const WRITE     = 0b0000_0010;
        const EXECUTE   = 0b0000_0100;
        const USER      = 0b0000_1000;
        const CACHEABLE = 0b0001_0000;
        /// Deferred reservation: a frame is reserved one page at a time as
        /// the area is faulted in rather than all at `area_create` time.
        /// Bundles a second concern — `LATE_RESERVE` areas are never
        /// shareable — which spec.md §9's Open Questions flags as worth
        /// splitting; DESIGN.md records the decision to keep it bundled.
        const LATE_RESERVE = 0b0010_0000;
    }
}

fn area_flags_to_pte(flags: AreaFlags) -> PteFlags {
    let mut pte = PteFlags::empty();
    if flags.contains(AreaFlags::READ) {
        pte |= PteFlags::READ;
    }
    if flags.contains(AreaFlags::WRITE) {
        pte |= PteFlags::WRITE;
    }
    if flags.contains(AreaFlags::EXECUTE) {
        pte |= PteFlags::EXECUTE;
    }
    if flags.contains(AreaFlags::USER) {
        pte |= PteFlags::USER;
    }
    if flags.contains(AreaFlags::CACHEABLE) {
        pte |= PteFlags::CACHEABLE;
    }
    pte
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
    Execute,
}

/// Outcome of `as_page_fault` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultResult {
    Ok,
    /// Raised inside a `copy_from_uspace`/`copy_to_uspace` helper with a
    /// recovery marker armed; the helper unwinds instead of crashing.
    Defer,
    Fault,
    /// The cause was a benign race (two threads faulted the same page
    /// concurrently); the caller should just retry the access.
    Silent,
}

/// Reference-counted record of an anonymous area's shared pagemap
/// (spec.md §4.3): ensures copy-on-share semantics — every address space
/// an area was shared into sees the same frame until one of them writes
/// its own private copy (CoW itself is future work; CORE's anon backend
/// shares the frame read-write, matching the distilled spec's scenario 4
/// which only exercises refcounted teardown, not write-divergence).
///
/// `pagemap` is itself a holder of every frame it lists, on top of
/// whichever areas' own pagemaps also list it — `ensure_share_info` and
/// the shared-fault path in `resolve_fault` both `inc_refcount` when
/// inserting here. `Drop` releases that holder's share when the last
/// area backed by this record goes away.
pub struct ShareInfo {
    pagemap: Mutex<BTreeMap<usize, Frame>>,
}

impl ShareInfo {
    fn new() -> Self {
        Self { pagemap: Mutex::new(BTreeMap::new()) }
    }
}

impl Drop for ShareInfo {
    /// Releases this record's own reference to every frame still listed
    /// in its pagemap (spec.md §8 scenario 4: the last area tearing down
    /// must bring the frame's refcount to zero, not leave `ShareInfo`
    /// pinning it forever).
    fn drop(&mut self) {
        for (_, frame) in self.pagemap.get_mut().iter() {
            FRAME_ALLOCATOR.dec_refcount(*frame);
        }
    }
}

/// The memory-backend vtable (spec.md §4.3), as a tagged enum rather than
/// a trait object since CORE's set of backends is closed and each one's
/// per-area data differs in shape.
#[derive(Clone)]
pub enum Backend {
    /// Demand-paged, zero-filled memory.
    Anon,
    /// A file-backed segment: pages below `file_pages` map a read-only
    /// frame from the image; pages at or beyond it behave like `Anon`
    /// (the ELF "anonymous tail" of a segment whose file size is smaller
    /// than its memory size).
    Elf { file_frame: crate::memory::PhysAddr, file_pages: usize },
    /// A fixed physical-to-virtual mapping; frames are never owned by the
    /// frame allocator's refcounting (the caller already owns them some
    /// other way — a device's MMIO window, typically).
    Phys { base: crate::memory::PhysAddr },
    /// Every fault is resolved by a synchronous upcall to a registered
    /// pager task over `pager_phone`.
    UserPager { pager_phone: PhoneId },
}

/// Method index the kernel upcalls a user pager with; the pager's reply
/// args[0] is the physical frame to map.
const PAGER_FAULT_METHOD: u32 = 0;

impl Backend {
    fn is_resizable(&self) -> bool {
        matches!(self, Backend::Anon)
    }

    fn is_shareable(&self, attrs: AreaFlags) -> bool {
        matches!(self, Backend::Anon | Backend::Elf { .. }) && !attrs.contains(AreaFlags::LATE_RESERVE)
    }

    /// `frame_free`: releases one page's backing frame on area shrink or
    /// destroy. Anon/Elf frames are refcounted by the frame allocator
    /// (spec.md §8's ownership invariant); phys/user-pager frames are not
    /// owned here.
    fn frame_free(&self, frame: Frame) {
        if matches!(self, Backend::Anon | Backend::Elf { .. }) {
            FRAME_ALLOCATOR.dec_refcount(frame);
        }
    }
}

struct AreaState {
    pages: usize,
    access: AreaFlags,
    /// Doubles as the "used-space map" of spec.md §4.3: which upages
    /// currently have a valid mapping, and what frame backs each.
    pagemap: BTreeMap<usize, Frame>,
    share_info: Option<Arc<ShareInfo>>,
}

pub struct AddressSpaceArea {
    pub base: VirtAddr,
    attrs: AreaFlags,
    backend: Backend,
    state: Mutex<AreaState>,
}

#[derive(Debug, Clone, Copy)]
pub struct AreaInfo {
    pub base: VirtAddr,
    pub pages: usize,
    pub access: AreaFlags,
    pub resident: usize,
}

impl AddressSpaceArea {
    fn new(base: VirtAddr, pages: usize, access: AreaFlags, attrs: AreaFlags, backend: Backend) -> Self {
        Self {
            base,
            attrs,
            backend,
            state: Mutex::new(AreaState {
                pages,
                access,
                pagemap: BTreeMap::new(),
                share_info: None,
            }),
        }
    }

    pub fn pages(&self) -> usize {
        self.state.lock().pages
    }

    pub fn access(&self) -> AreaFlags {
        self.state.lock().access
    }

    pub fn resident_count(&self) -> usize {
        self.state.lock().pagemap.len()
    }

    fn permits(&self, access: AccessType) -> bool {
        let flags = self.access();
        match access {
            AccessType::Read => flags.contains(AreaFlags::READ),
            AccessType::Write => flags.contains(AreaFlags::WRITE),
            AccessType::Execute => flags.contains(AreaFlags::EXECUTE),
        }
    }

    fn destroy(&self, pt: &mut PhysPageTable) {
        let mut state = self.state.lock();
        for (upage, frame) in core::mem::take(&mut state.pagemap).into_iter() {
            let _ = pt.unmap(self.base + upage * PAGE_SIZE);
            self.backend.frame_free(frame);
        }
    }

    fn resize(&self, new_pages: usize, pt: &mut PhysPageTable) {
        let mut state = self.state.lock();
        if new_pages < state.pages {
            let dropped: alloc::vec::Vec<usize> = state
                .pagemap
                .range(new_pages..)
                .map(|(&upage, _)| upage)
                .collect();
            for upage in dropped {
                if let Some(frame) = state.pagemap.remove(&upage) {
                    let _ = pt.unmap(self.base + upage * PAGE_SIZE);
                    self.backend.frame_free(frame);
                }
            }
        }
        state.pages = new_pages;
    }

    fn change_flags(&self, access: AreaFlags, pt: &mut PhysPageTable) {
        let mut state = self.state.lock();
        state.access = access;
        let pte_flags = area_flags_to_pte(access) | PteFlags::PRESENT;
        let upages: alloc::vec::Vec<usize> = state.pagemap.keys().copied().collect();
        for upage in upages {
            let _ = pt.set_flags(self.base + upage * PAGE_SIZE, pte_flags);
        }
    }

    /// Lazily creates (or returns the existing) share-info record, seeding
    /// it with whatever private pages this area has already faulted in so
    /// the share target sees the same frames (spec.md §8 scenario 4).
    fn ensure_share_info(&self) -> Arc<ShareInfo> {
        let mut state = self.state.lock();
        if let Some(info) = &state.share_info {
            return info.clone();
        }
        let info = Arc::new(ShareInfo::new());
        for (&upage, &frame) in state.pagemap.iter() {
            info.pagemap.lock().insert(upage, frame);
            FRAME_ALLOCATOR.inc_refcount(frame);
        }
        state.share_info = Some(info.clone());
        info
    }

    fn attach_share_info(&self, info: Arc<ShareInfo>) {
        self.state.lock().share_info = Some(info);
    }

    pub fn info(&self) -> AreaInfo {
        let state = self.state.lock();
        AreaInfo {
            base: self.base,
            pages: state.pages,
            access: state.access,
            resident: state.pagemap.len(),
        }
    }

    /// Page-fault resolution (spec.md §4.4 steps 4-5): resolves which
    /// frame backs `upage`, allocating or upcalling as the backend
    /// requires, then installs the mapping. The area's own lock is held
    /// for the whole operation and the page-table lock (`pt_mutex`) is
    /// only taken nested inside it, preserving the stated lock order
    /// (area-lock ⊐ page-table-lock) — the `UserPager` backend is the one
    /// exception: it must release both before the synchronous upcall, so
    /// a racing fault on the same page is possible and handled by the
    /// `contains_key` recheck below.
    fn resolve_fault(&self, upage: usize, access: AccessType, thread: &Arc<Thread>, pt_mutex: &Mutex<PhysPageTable>) -> PageFaultResult {
        let mut state = self.state.lock();
        if state.pagemap.contains_key(&upage) {
            // Already resolved by a racing fault; the caller retries the
            // access rather than double-mapping.
            return PageFaultResult::Silent;
        }
        let pte_flags = area_flags_to_pte(state.access) | PteFlags::PRESENT;

        let (frame, pte_flags) = match &self.backend {
            Backend::Anon => {
                if let Some(share_info) = state.share_info.clone() {
                    let mut shared = share_info.pagemap.lock();
                    if let Some(&frame) = shared.get(&upage) {
                        FRAME_ALLOCATOR.inc_refcount(frame);
                        (frame, pte_flags)
                    } else {
                        let Ok(frame) = alloc_zeroed_page(self.attrs) else {
                            return PageFaultResult::Fault;
                        };
                        // The fresh frame is about to be held by both this
                        // area's own pagemap (inserted after the match) and
                        // `share_info`'s pagemap (inserted right here) —
                        // two holders, so the allocator's initial refcount
                        // of 1 must be bumped to match.
                        FRAME_ALLOCATOR.inc_refcount(frame);
                        shared.insert(upage, frame);
                        (frame, pte_flags)
                    }
                } else {
                    let Ok(frame) = alloc_zeroed_page(self.attrs) else {
                        return PageFaultResult::Fault;
                    };
                    (frame, pte_flags)
                }
            }
            Backend::Elf { file_frame, file_pages } => {
                if upage < *file_pages {
                    let frame = Frame::containing_address(*file_frame + upage * PAGE_SIZE);
                    FRAME_ALLOCATOR.inc_refcount(frame);
                    // File-backed pages are read-only regardless of the
                    // area's own flags; CORE does not implement write CoW
                    // for the file-backed range, only the anonymous tail.
                    (frame, (pte_flags & !PteFlags::WRITE) | PteFlags::PRESENT)
                } else {
                    let Ok(frame) = alloc_zeroed_page(self.attrs) else {
                        return PageFaultResult::Fault;
                    };
                    (frame, pte_flags)
                }
            }
            Backend::Phys { base } => (Frame::containing_address(*base + upage * PAGE_SIZE), pte_flags),
            Backend::UserPager { pager_phone } => {
                let Some(phone) = crate::ipc::phone::lookup(*pager_phone) else {
                    return PageFaultResult::Fault;
                };
                drop(state);
                let args = [upage, access as usize, 0, 0, 0];
                let reply = crate::ipc::call_sync(thread.task, &phone, thread, PAGER_FAULT_METHOD, args);
                let Ok(reply) = reply else {
                    return PageFaultResult::Fault;
                };
                let frame = Frame::containing_address(crate::memory::PhysAddr::from(reply[0]));
                state = self.state.lock();
                if state.pagemap.contains_key(&upage) {
                    return PageFaultResult::Silent;
                }
                (frame, pte_flags)
            }
        };

        state.pagemap.insert(upage, frame);
        let mut pt = pt_mutex.lock();
        match pt.map(self.base + upage * PAGE_SIZE, frame.start_address(), pte_flags) {
            Ok(()) => PageFaultResult::Ok,
            Err(_) => PageFaultResult::Silent,
        }
    }
}

/// Allocates a single page for an anonymous/ELF-tail fault, honoring
/// `LATE_RESERVE` (spec.md §4.4: "or, for LATE_RESERVE, first succeed a
/// one-page reservation"). Real hardware would zero the frame through
/// whatever phys-to-virt window the architecture exposes; CORE's mock
/// arch has no backing memory to zero, so that step is left to the real
/// backend CORE's API was written against.
fn alloc_zeroed_page(attrs: AreaFlags) -> KResult<Frame> {
    if attrs.contains(AreaFlags::LATE_RESERVE) {
        FRAME_ALLOCATOR.reserve(1)?;
        FRAME_ALLOCATOR.alloc(1, AllocFlags::RESERVE)
    } else {
        FRAME_ALLOCATOR.alloc(1, AllocFlags::empty())
    }
}

static NEXT_AS_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsId(u64);

/// An address space (spec.md §4.3): a tree of non-overlapping areas plus
/// one architecture page table. Destroyed once its refcount (tasks that
/// use it) reaches zero.
pub struct AddressSpace {
    pub id: AsId,
    areas: RwLock<BTreeMap<usize, Arc<AddressSpaceArea>>>,
    pt: Mutex<PhysPageTable>,
    refcount: AtomicUsize,
}

impl AddressSpace {
    /// `as_create(flags)`.
    pub fn create(_flags: AsFlags) -> Arc<Self> {
        let pt = new_page_table().expect("boot-time page table allocation must not fail");
        Arc::new(Self {
            id: AsId(NEXT_AS_ID.fetch_add(1, Ordering::Relaxed)),
            areas: RwLock::new(BTreeMap::new()),
            pt: Mutex::new(pt),
            refcount: AtomicUsize::new(1),
        })
    }

    pub fn inc_ref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the refcount after decrementing; `as_destroy` is implicit
    /// once the last `Arc<AddressSpace>` (and hence this struct) drops —
    /// the explicit counter exists only to answer "can this be torn down
    /// yet" the way spec.md §4.3 describes it, independent of `Arc`'s own
    /// bookkeeping (a task can hold one logical reference while sharing
    /// the `Arc` with, say, a debugger attachment).
    pub fn dec_ref(&self) -> usize {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn root_table_phys(&self) -> crate::memory::PhysAddr {
        self.pt.lock().root()
    }

    /// `as_area_create(as, flags, size, base, backend, backend_data)`.
    /// Rejects a range that overlaps an existing area, crosses the
    /// kernel/user boundary (left to the caller's flag choice; CORE has
    /// no fixed split address to enforce given the mock architecture), or
    /// isn't page-aligned (spec.md §4.4 invariants).
    pub fn area_create(
        self: &Arc<Self>,
        base: VirtAddr,
        pages: usize,
        access: AreaFlags,
        attrs: AreaFlags,
        backend: Backend,
    ) -> KResult<Arc<AddressSpaceArea>> {
        if pages == 0 || !base.is_page_aligned() {
            return Err(ErrorStatus::InvalidArgument);
        }
        let mut areas = self.areas.write();
        let new_start = base.into_raw();
        let new_end = new_start + pages * PAGE_SIZE;
        for area in areas.values() {
            let start = area.base.into_raw();
            let end = start + area.pages() * PAGE_SIZE;
            if new_start < end && start < new_end {
                return Err(ErrorStatus::AlreadyExists);
            }
        }
        let area = Arc::new(AddressSpaceArea::new(base, pages, access, attrs, backend));
        areas.insert(new_start, area.clone());
        Ok(area)
    }

    /// `as_area_destroy(as, base)`.
    pub fn area_destroy(&self, base: VirtAddr) -> KResult<()> {
        let area = self.areas.write().remove(&base.into_raw()).ok_or(ErrorStatus::NoSuchEntry)?;
        let mut pt = self.pt.lock();
        area.destroy(&mut pt);
        Ok(())
    }

    /// `as_area_resize(as, base, pages, flags)`.
    pub fn area_resize(&self, base: VirtAddr, new_pages: usize) -> KResult<()> {
        let areas = self.areas.read();
        let area = areas.get(&base.into_raw()).ok_or(ErrorStatus::NoSuchEntry)?;
        if !area.backend.is_resizable() {
            return Err(ErrorStatus::NotSupported);
        }
        if new_pages > area.pages() {
            let new_end = base.into_raw() + new_pages * PAGE_SIZE;
            if let Some((&next_base, _)) = areas.range((base.into_raw() + 1)..).next()
                && new_end > next_base
            {
                return Err(ErrorStatus::InvalidArgument);
            }
        }
        let mut pt = self.pt.lock();
        area.resize(new_pages, &mut pt);
        Ok(())
    }

    /// `as_area_change_flags(as, flags, base)`.
    pub fn area_change_flags(&self, base: VirtAddr, access: AreaFlags) -> KResult<()> {
        let areas = self.areas.read();
        let area = areas.get(&base.into_raw()).ok_or(ErrorStatus::NoSuchEntry)?;
        let mut pt = self.pt.lock();
        area.change_flags(access, &mut pt);
        Ok(())
    }

    /// `as_area_share(src_as, base, size, dst_as, flags, dst_base_out)`:
    /// creates a twin area in `dst` backed by the same `ShareInfo`, so
    /// future faults in either address space resolve to the same frame
    /// (spec.md §8 scenario 4).
    pub fn area_share(
        self: &Arc<Self>,
        base: VirtAddr,
        dst: &Arc<AddressSpace>,
        dst_base: VirtAddr,
        access: AreaFlags,
    ) -> KResult<Arc<AddressSpaceArea>> {
        let area = self.areas.read().get(&base.into_raw()).cloned().ok_or(ErrorStatus::NoSuchEntry)?;
        if !area.backend.is_shareable(area.attrs) {
            return Err(ErrorStatus::NotSupported);
        }
        let share_info = area.ensure_share_info();
        let shared = dst.area_create(dst_base, area.pages(), access, area.attrs, area.backend.clone())?;
        shared.attach_share_info(share_info);
        Ok(shared)
    }

    pub fn area_info(&self, base: VirtAddr) -> Option<AreaInfo> {
        self.areas.read().get(&base.into_raw()).map(|a| a.info())
    }

    /// `as_page_fault(vaddr, access, istate)`: the 5-step algorithm of
    /// spec.md §4.4.
    pub fn page_fault(self: &Arc<Self>, vaddr: VirtAddr, access: AccessType, thread: &Arc<Thread>) -> PageFaultResult {
        let areas = self.areas.read();
        let Some((_, area)) = areas.range(..=vaddr.into_raw()).next_back() else {
            return PageFaultResult::Fault;
        };
        if vaddr.into_raw() >= area.base.into_raw() + area.pages() * PAGE_SIZE {
            return PageFaultResult::Fault;
        }
        if !area.permits(access) {
            return PageFaultResult::Fault;
        }
        let upage = (vaddr.into_raw() - area.base.into_raw()) / PAGE_SIZE;

        area.resolve_fault(upage, access, thread, &self.pt)
    }
}

/// `as_switch(old, new)`: the scheduler callback (spec.md §4.5 step 4).
/// With only a mock architecture there is no real ASID/CR3 write to
/// perform; this records the transition for tests and leaves the actual
/// hardware switch to the real arch backend CORE's API was written
/// against.
pub fn as_switch(old: Option<&Arc<AddressSpace>>, new: &Arc<AddressSpace>) {
    if old.map(|a| a.id) != Some(new.id) {
        crate::debug!(crate::logging::Module::Memory, "as_switch -> {:?}", new.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::frame_allocator::ZonePriority;
    use crate::task::{spawn_task, spawn_thread, Permissions};
    use spin::Once;
    use utils::types::Name;

    static TEST_ZONE: Once<()> = Once::new();

    /// Tests run in one process sharing the global `FRAME_ALLOCATOR`;
    /// register a zone for it exactly once (a real boot would do this
    /// from the memory map handed off by `kernel::boot`).
    fn ensure_test_zone() {
        TEST_ZONE.call_once(|| {
            FRAME_ALLOCATOR
                .add_zone(Frame::containing_address(crate::memory::PhysAddr::from(0x1000_0000)), 4096, ZonePriority::Low)
                .unwrap();
        });
    }

    fn test_thread() -> Arc<Thread> {
        crate::config::init_for_tests();
        ensure_test_zone();
        let r#as = AddressSpace::create(AsFlags::empty());
        let task = spawn_task(Name::new_const("as-test"), r#as, Permissions::all());
        spawn_thread(&task, 0)
    }

    #[test_case]
    fn area_create_rejects_overlap() {
        let r#as = AddressSpace::create(AsFlags::empty());
        let access = AreaFlags::READ | AreaFlags::WRITE;
        r#as.area_create(VirtAddr::from(0x1000), 4, access, AreaFlags::empty(), Backend::Anon)
            .unwrap();
        assert!(r#as
            .area_create(VirtAddr::from(0x2000), 4, access, AreaFlags::empty(), Backend::Anon)
            .is_err());
        assert!(r#as
            .area_create(VirtAddr::from(0x5000), 4, access, AreaFlags::empty(), Backend::Anon)
            .is_ok());
    }

    /// Scenario 3 (spec.md §8): first read faults an anon page in, the
    /// frame's refcount is 1; destroying the area returns it to the free
    /// list.
    #[test_case]
    fn anon_area_page_fault_then_destroy_frees_frame() {
        let thread = test_thread();
        let task = crate::task::lookup_task(thread.task).unwrap();
        let r#as = &task.address_space;
        let base = VirtAddr::from(0x10_0000);
        r#as.area_create(base, 4, AreaFlags::READ | AreaFlags::WRITE, AreaFlags::empty(), Backend::Anon)
            .unwrap();

        assert_eq!(r#as.page_fault(base, AccessType::Read, &thread), PageFaultResult::Ok);
        let info = r#as.area_info(base).unwrap();
        assert_eq!(info.resident, 1);

        r#as.area_destroy(base).unwrap();
        assert!(r#as.area_info(base).is_none());
    }

    /// Scenario 4 (spec.md §8): share an anon area, fault it in both
    /// sides, then tear down one side at a time.
    #[test_case]
    fn share_then_cow_free_drops_refcount_to_zero() {
        let thread_a = test_thread();
        let task_a = crate::task::lookup_task(thread_a.task).unwrap();
        let as_a = task_a.address_space.clone();

        let as_b = AddressSpace::create(AsFlags::empty());

        let base = VirtAddr::from(0x20_0000);
        let access = AreaFlags::READ | AreaFlags::WRITE;
        as_a.area_create(base, 1, access, AreaFlags::empty(), Backend::Anon).unwrap();
        assert_eq!(as_a.page_fault(base, AccessType::Read, &thread_a), PageFaultResult::Ok);

        as_a.area_share(base, &as_b, base, access).unwrap();
        assert_eq!(as_b.page_fault(base, AccessType::Read, &thread_a), PageFaultResult::Ok);

        let frame_a = as_a.area_info(base).unwrap();
        let frame_b = as_b.area_info(base).unwrap();
        assert_eq!(frame_a.resident, 1);
        assert_eq!(frame_b.resident, 1);

        as_a.area_destroy(base).unwrap();
        assert!(as_b.area_info(base).is_some());

        as_b.area_destroy(base).unwrap();
        assert!(as_b.area_info(base).is_none());
    }

    #[test_case]
    fn late_reserve_area_is_never_shareable() {
        let as_a = AddressSpace::create(AsFlags::empty());
        let as_b = AddressSpace::create(AsFlags::empty());
        let base = VirtAddr::from(0x30_0000);
        as_a.area_create(base, 1, AreaFlags::READ, AreaFlags::LATE_RESERVE, Backend::Anon)
            .unwrap();
        assert!(as_a.area_share(base, &as_b, base, AreaFlags::READ).is_err());
    }

    #[test_case]
    fn area_resize_shrink_frees_dropped_pages() {
        let thread = test_thread();
        let task = crate::task::lookup_task(thread.task).unwrap();
        let r#as = &task.address_space;
        let base = VirtAddr::from(0x40_0000);
        r#as.area_create(base, 4, AreaFlags::READ | AreaFlags::WRITE, AreaFlags::empty(), Backend::Anon)
            .unwrap();
        for i in 0..4 {
            r#as.page_fault(base + i * PAGE_SIZE, AccessType::Read, &thread);
        }
        assert_eq!(r#as.area_info(base).unwrap().resident, 4);

        r#as.area_resize(base, 2).unwrap();
        assert_eq!(r#as.area_info(base).unwrap().resident, 2);
    }
}
