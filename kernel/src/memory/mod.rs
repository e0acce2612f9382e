//! Address types and the page size shared by every memory subsystem
//! (A–D). Physical-to-virtual translation of kernel-owned frames is a
//! bootloader/arch concern (out of scope); CORE only needs the two
//! newtypes and page-granular arithmetic over them.

pub mod as_;
pub mod frame_allocator;
pub mod paging;
pub mod slab;

use core::{
    fmt::{Debug, LowerHex},
    ops::{Add, AddAssign, Sub, SubAssign},
};

pub use paging::PAGE_SIZE;
pub use utils::align::{align_down, align_up, is_aligned};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl LowerHex for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl LowerHex for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

macro_rules! impl_addr_ty {
    ($ty: ty) => {
        impl $ty {
            #[inline(always)]
            pub const fn null() -> Self {
                Self(0)
            }

            #[inline(always)]
            pub const fn from(value: usize) -> Self {
                Self(value)
            }

            #[inline(always)]
            pub const fn into_raw(self) -> usize {
                self.0
            }

            #[inline(always)]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            #[inline(always)]
            pub const fn is_page_aligned(self) -> bool {
                is_aligned(self.0, PAGE_SIZE)
            }

            #[inline(always)]
            pub const fn align_down(self) -> Self {
                Self(align_down(self.0, PAGE_SIZE))
            }

            #[inline(always)]
            pub const fn align_up(self) -> Self {
                Self(align_up(self.0, PAGE_SIZE))
            }
        }

        impl Add<usize> for $ty {
            type Output = Self;
            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl AddAssign<usize> for $ty {
            fn add_assign(&mut self, rhs: usize) {
                self.0 += rhs;
            }
        }

        impl Sub<usize> for $ty {
            type Output = Self;
            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        impl SubAssign<usize> for $ty {
            fn sub_assign(&mut self, rhs: usize) {
                self.0 -= rhs;
            }
        }

        impl Sub<$ty> for $ty {
            type Output = usize;
            fn sub(self, rhs: $ty) -> usize {
                self.0 - rhs.0
            }
        }
    };
}

impl_addr_ty!(VirtAddr);
impl_addr_ty!(PhysAddr);

/// Number of whole pages needed to cover `bytes`.
#[inline(always)]
pub const fn pages_for(bytes: usize) -> usize {
    utils::align::div_round_up(bytes, PAGE_SIZE)
}
