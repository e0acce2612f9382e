//! Wire format of an IPC call (spec.md §6): a method id, up to 5 inline
//! argument words, and two in-band flag bits. Larger payloads go through
//! the side-channel methods `DATA_READ` / `DATA_WRITE` or an area share.

use bitflags::bitflags;

/// Reserved method ids for the data side-channel (spec.md §6).
pub const METHOD_DATA_READ: u32 = 0xffff_fffe;
pub const METHOD_DATA_WRITE: u32 = 0xffff_ffff;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallFlags: u8 {
        /// The call has already received its reply.
        const ANSWERED     = 0b0000_0001;
        /// The call is a one-way notification; no reply is expected.
        const NOTIFICATION = 0b0000_0010;
        /// The call was forwarded at least once before being answered.
        const FORWARDED    = 0b0000_0100;
        /// The call's phone was hung up before a real answer arrived;
        /// its `retval` is a synthetic `EHANGUP`.
        const HUNGUP       = 0b0000_1000;
    }
}

/// The inline payload every call carries across the syscall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CallData {
    pub method: u32,
    pub args: [usize; 5],
}

impl CallData {
    pub const fn new(method: u32, args: [usize; 5]) -> Self {
        Self { method, args }
    }
}
