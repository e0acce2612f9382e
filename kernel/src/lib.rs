//! The microkernel CORE: frame/slab allocators, the page-table
//! abstraction, the address-space manager, wait queues and futexes, the
//! scheduler, and the IPC transport (phones, answerboxes, calls).
//!
//! Device drivers, file systems, network protocol state, a GUI, and
//! architecture-specific MMU bit layouts are out of scope; `arch` exposes
//! only the abstract interfaces those collaborators would implement.

#![no_std]
#![cfg_attr(test, feature(custom_test_frameworks))]
#![cfg_attr(test, test_runner(crate::test::test_runner))]
#![cfg_attr(test, reexport_test_harness_main = "kernel_testmain")]

extern crate alloc;

#[macro_use]
pub mod logging;

pub mod arch;
pub mod arena;
pub mod boot;
pub mod config;
pub mod ipc;
pub mod memory;
pub mod scheduler;
pub mod sync;
pub mod syscalls;
pub mod task;
#[cfg(test)]
pub mod test;
pub mod utils;

pub use abi::errors::ErrorStatus;

/// Result alias used throughout CORE: every fallible kernel-internal
/// operation returns one of the errors in spec.md §6/§7, never panics
/// except for `Bug`-class invariant violations.
pub type KResult<T> = Result<T, ErrorStatus>;
