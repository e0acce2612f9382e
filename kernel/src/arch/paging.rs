//! The page-table abstraction (component C, spec.md §4.3): a generic
//! 4-level page-table interface plus TLB-shootdown primitives. Real
//! architectures implement [`PageTable`] behind their own PTE bit layout;
//! CORE's address-space manager (component D) is written only against
//! this trait, never against a concrete arch.

use bitflags::bitflags;

use crate::memory::{PhysAddr, VirtAddr};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const READ      = 0b0000_0001;
        const WRITE     = 0b0000_0010;
        const EXECUTE   = 0b0000_0100;
        const USER      = 0b0000_1000;
        const CACHEABLE = 0b0001_0000;
        /// Present/valid bit; set by `map`, cleared by `unmap`.
        const PRESENT   = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum MapToError {
    #[error("out of frames while allocating a page-table level")]
    FrameAllocationFailed,
    #[error("address already mapped")]
    AlreadyMapped,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("address not mapped")]
pub struct UnmapError;

/// A single architecture's page-table walker. One instance per address
/// space; `PageTable::new` is the `pt_create` operation of spec.md §4.3,
/// `Drop` is `pt_destroy`.
pub trait PageTable: Sized + Send {
    /// Creates a fresh, empty page table (kernel-half pre-populated by the
    /// implementation if the architecture shares a kernel mapping across
    /// address spaces).
    fn new() -> Result<Self, MapToError>;

    /// Physical address of the top-level table, handed to hardware on
    /// context switch (`CR3`/`TTBR0`/...).
    fn root(&self) -> PhysAddr;

    /// `mapping_insert`: installs a single page mapping, allocating
    /// intermediate levels on demand.
    fn map(&mut self, vaddr: VirtAddr, frame: PhysAddr, flags: PteFlags) -> Result<(), MapToError>;

    /// `mapping_remove`: tears down a single page mapping. Does not free
    /// now-empty intermediate levels (callers that care track that
    /// separately; most don't need to).
    fn unmap(&mut self, vaddr: VirtAddr) -> Result<PhysAddr, UnmapError>;

    /// `mapping_find`: `(found, pte)`.
    fn find(&self, vaddr: VirtAddr) -> Option<(PhysAddr, PteFlags)>;

    /// `set_flags`: changes protection bits of an existing mapping without
    /// touching the frame.
    fn set_flags(&mut self, vaddr: VirtAddr, flags: PteFlags) -> Result<(), UnmapError>;

    /// Invalidates this address space's translation for `vaddr` on the
    /// local CPU only; cross-CPU invalidation is [`shootdown`].
    fn invalidate_local(&self, vaddr: VirtAddr);
}

/// A token proving the caller holds the per-address-space page-table lock
/// (spec.md §4.4's locking order: as-lock ⊐ area-lock ⊐ share-info-lock ⊐
/// page-table-lock). Obtainable only through `AddressSpace::lock_pt`, so
/// the lock order is enforced by the type system rather than convention.
pub struct PtGuard<'a, T: PageTable> {
    table: &'a mut T,
}

impl<'a, T: PageTable> PtGuard<'a, T> {
    pub fn new(table: &'a mut T) -> Self {
        Self { table }
    }

    pub fn table(&mut self) -> &mut T {
        self.table
    }
}
