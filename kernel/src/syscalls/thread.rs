//! The Thread family (spec.md §6): create/exit/sleep/get-id/join, thin
//! wrappers over `kernel::task`'s `Thread` type and the scheduler.

use alloc::sync::Arc;

use crate::{
    scheduler,
    sync::wait_queue::SleepResult,
    task::{self, Task, Thread, ThreadId},
};

pub fn create(task: &Arc<Task>, priority: usize) -> Arc<Thread> {
    task::spawn_thread(task, priority)
}

pub fn exit(thread: &Arc<Thread>, code: i32) {
    thread.finish(code);
    if let Some(task) = task::lookup_task(thread.task) {
        task.remove_thread(thread.id);
    }
}

/// `thread_sleep(deadline)`: voluntary block on the thread's own join
/// queue is not right here — this is the generic "go to sleep for a
/// while" syscall, so it parks on a private one-shot queue that nothing
/// else ever wakes, and relies purely on `deadline` to return.
pub fn sleep(thread: &Arc<Thread>, deadline_ms: u64) -> SleepResult {
    let wq = crate::sync::wait_queue::WaitQueue::new();
    wq.sleep(thread, Some(deadline_ms))
}

pub fn get_id(thread: &Arc<Thread>) -> ThreadId {
    thread.id
}

pub fn join(target: &Arc<Thread>, waiter: &Arc<Thread>) -> SleepResult {
    target.join(waiter)
}

pub fn yield_now() {
    scheduler::yield_now();
}
