//! The concrete page-table type CORE links against. Swapping `PhysPageTable`
//! for a real architecture's implementation of [`crate::arch::PageTable`]
//! is the entire cost of porting the address-space manager (component D)
//! to real hardware — nothing above this line changes.

pub use crate::arch::paging::{MapToError, PteFlags, PtGuard, UnmapError};
use crate::arch::{mock::MockPageTable, PageTable};

pub const PAGE_SIZE: usize = 4096;

pub type PhysPageTable = MockPageTable;

pub fn new_page_table() -> Result<PhysPageTable, MapToError> {
    PhysPageTable::new()
}
