//! The user-space half of CORE (spec.md §4.7–4.8, components H and I):
//! a single-threaded cooperative fibril runtime and the async/session
//! layer built on top of it. Linked into user tasks the same way the
//! teacher's kernel links `safa-utils`/`safa-abi` — this crate never
//! depends on `kernel` itself, only on the wire-level `abi` crate, so it
//! can be tested with ordinary `#[test]`s against a mock transport
//! instead of the real kernel (there is no boot dependency, no real wait
//! queue, no real scheduler).
//!
//! `#![no_std]` outside of test builds, matching the `cfg_attr(not(test),
//! no_std)` idiom used throughout this example pack's userspace crates
//! (e.g. `oxidecomputer-hubris`'s `lib/*` crates) for libraries that want
//! ordinary `std`-backed `#[test]`s without carrying `std` into the real
//! build.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fibril;
pub mod session;
pub mod uthread;

pub use abi::errors::ErrorStatus;

pub type KResult<T> = Result<T, ErrorStatus>;
