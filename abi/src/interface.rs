//! 32-bit interface identifiers (spec.md §4.6, §6): a four-character
//! protocol tag packed with the exchange-management style and a callback
//! modifier bit, reproducing `interfaces.h`'s `FOURCC_COMPACT | policy`
//! encoding bit-for-bit (the compact fourcc drops the top bit of each
//! 8-bit character so the 4 characters plus 3 policy bits fit in `u32`).

use bitfield_struct::bitfield;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExchangeMgmt {
    /// Single request per exchange; no locking required.
    Atomic = 0b00,
    /// Requests on one connection are mutually excluded.
    Serialize = 0b01,
    /// The server supports cloning the connection for concurrency.
    Parallel = 0b10,
}

impl ExchangeMgmt {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Atomic,
            0b01 => Self::Serialize,
            _ => Self::Parallel,
        }
    }

    const fn into_bits(self) -> u8 {
        self as u8
    }
}

#[bitfield(u32, order = Msb)]
pub struct InterfaceId {
    #[bits(7)]
    c0: u8,
    #[bits(7)]
    c1: u8,
    #[bits(7)]
    c2: u8,
    #[bits(7)]
    c3: u8,
    #[bits(2)]
    exchange: ExchangeMgmt,
    callback: bool,
}

impl InterfaceId {
    /// Packs a four-character protocol tag with an exchange-management
    /// style and callback modifier into a single interface id.
    pub const fn new_tagged(tag: [u8; 4], exchange: ExchangeMgmt, callback: bool) -> Self {
        Self::new()
            .with_c0(tag[0] & 0x7f)
            .with_c1(tag[1] & 0x7f)
            .with_c2(tag[2] & 0x7f)
            .with_c3(tag[3] & 0x7f)
            .with_exchange(exchange)
            .with_callback(callback)
    }

    pub const fn tag(&self) -> [u8; 4] {
        [self.c0(), self.c1(), self.c2(), self.c3()]
    }
}

pub const INTERFACE_ANY: InterfaceId = InterfaceId::new();
