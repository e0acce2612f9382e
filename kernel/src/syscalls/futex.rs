//! The Futex family (spec.md §6, component E): sleep-if-equal and wake,
//! over the global hash-bucketed `FutexTable`.

use alloc::sync::Arc;

use crate::{sync::futex, sync::wait_queue::SleepResult, task::Thread};

pub fn sleep_if_equal(key: futex::FutexKey, matches_expected: bool, thread: &Arc<Thread>, deadline: Option<u64>) -> Option<SleepResult> {
    futex::table().wait(key, matches_expected, thread, deadline)
}

pub fn wake(key: futex::FutexKey, n: usize) -> usize {
    futex::table().wake(key, n)
}
