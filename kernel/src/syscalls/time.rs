//! The Time family (spec.md §6): monotonic clock, wall clock, and
//! sleep-until. CORE has no real-time-clock driver (out of scope, a
//! device driver concern); `get_wall` is defined against the same
//! monotonic source until a port supplies one, which is why it is kept as
//! its own syscall entry rather than folded into `get_monotonic` — a
//! future arch backend only has to change this one function.

use alloc::sync::Arc;

use crate::{sync::wait_queue::SleepResult, task::Thread};

pub fn get_monotonic() -> u64 {
    crate::arch::monotonic_ms()
}

pub fn get_wall() -> u64 {
    crate::arch::monotonic_ms()
}

pub fn sleep_until(thread: &Arc<Thread>, deadline_ms: u64) -> SleepResult {
    crate::sync::wait_queue::WaitQueue::new().sleep(thread, Some(deadline_ms))
}
