//! Re-exports the wire-level interface-identifier type (spec.md §4.6) so
//! `kernel::ipc` callers don't need to reach into `abi` directly; CORE
//! adds nothing to the encoding itself, only the policy enforcement that
//! reads it (`kernel::ipc::phone::Phone`'s exchange-management checks
//! would live here once a real architecture needs connection cloning —
//! tracked as an Open Question in DESIGN.md, since the distilled spec
//! does not say how `PARALLEL` connection cloning picks its new phone).

pub use abi::interface::{ExchangeMgmt, InterfaceId, INTERFACE_ANY};
