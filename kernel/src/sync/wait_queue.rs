//! FIFO wait queues (spec.md §4.5, §8): `sleep`/`wakeup` with a
//! missed-wakeup counter so a `wakeup` that lands before the matching
//! `sleep` is never lost ("essential and must be preserved verbatim" per
//! spec.md §9's design notes).
//!
//! `sleep` is synchronous: it performs the queuing bookkeeping and
//! returns the outcome directly rather than blocking the calling Rust
//! stack frame. On real hardware the actual suspension happens because
//! the caller follows `sleep` with a context switch into a different
//! thread's saved registers — that switch is architecture-specific
//! assembly (out of scope per spec.md §1) which the `arch` mock does not
//! implement, since nothing above `arch::mock` needs to actually resume a
//! second stack to exercise the FIFO-order and missed-wakeup invariants
//! spec.md §8 asks for.

use alloc::{collections::VecDeque, sync::Arc};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    task::{SleepState, Thread, ThreadState},
    utils::locks::Mutex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepResult {
    Ok,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupMode {
    First,
    All,
}

pub struct WaitQueue {
    parked: Mutex<VecDeque<Arc<Thread>>>,
    /// Incremented by a `wakeup` that finds the queue empty; the next
    /// `sleep` consumes one instead of parking (spec.md §5, §8).
    missed_wakeups: AtomicUsize,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            parked: Mutex::new(VecDeque::new()),
            missed_wakeups: AtomicUsize::new(0),
        }
    }

    fn try_consume_missed(&self) -> bool {
        loop {
            let missed = self.missed_wakeups.load(Ordering::Acquire);
            if missed == 0 {
                return false;
            }
            if self
                .missed_wakeups
                .compare_exchange(missed, missed - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// `sleep(wq, deadline?)`. `deadline` is compared against
    /// [`crate::arch::monotonic_ms`] by the caller driving the scheduler's
    /// timer wheel; CORE's generic wait queue only needs to know whether
    /// the wake it observed was a real signal, a timeout, or a
    /// cancellation, so callers pass the already-resolved `deadline` and
    /// this function checks it once per registration.
    pub fn sleep(&self, thread: &Arc<Thread>, deadline: Option<u64>) -> SleepResult {
        if self.try_consume_missed() {
            return SleepResult::Ok;
        }
        if thread.is_interrupted() {
            return SleepResult::Interrupted;
        }

        thread.set_sleep_state(SleepState::Asleep);
        crate::scheduler::block_current(thread);
        self.parked.lock().push_back(thread.clone());

        let wq_ptr: *const WaitQueue = self;
        let hook_thread = thread.clone();
        // SAFETY: the hook only ever runs while `self` (the wait queue) is
        // still in scope, because `remove` below always clears it before
        // `self` can be dropped; no hook outlives its wait queue in
        // practice since every CORE wait queue is either `'static` or
        // embedded in a reference-counted owner (Answerbox, AddressSpace).
        thread.set_interrupt_hook(Some(Arc::new(move || {
            let wq = unsafe { &*wq_ptr };
            wq.remove(&hook_thread);
            hook_thread.set_sleep_state(SleepState::Woke);
        })));

        if let Some(deadline) = deadline
            && crate::arch::monotonic_ms() >= deadline
        {
            self.remove(thread);
            thread.set_interrupt_hook(None);
            return SleepResult::TimedOut;
        }

        let woke = thread.sleep_state();
        thread.set_interrupt_hook(None);
        match woke {
            _ if thread.is_interrupted() => SleepResult::Interrupted,
            _ => SleepResult::Ok,
        }
    }

    /// `wakeup(wq, mode)`. Returns the number of threads actually
    /// transitioned out of the parked list (0 and an incremented missed
    /// counter if the queue was empty).
    pub fn wakeup(&self, mode: WakeupMode) -> usize {
        let mut parked = self.parked.lock();
        if parked.is_empty() {
            self.missed_wakeups.fetch_add(1, Ordering::AcqRel);
            return 0;
        }

        let mut woken = 0;
        match mode {
            WakeupMode::First => {
                if let Some(t) = parked.pop_front() {
                    t.set_sleep_state(SleepState::Woke);
                    t.set_state(ThreadState::Ready);
                    t.set_interrupt_hook(None);
                    crate::scheduler::enqueue(&t);
                    woken = 1;
                }
            }
            WakeupMode::All => {
                while let Some(t) = parked.pop_front() {
                    t.set_sleep_state(SleepState::Woke);
                    t.set_state(ThreadState::Ready);
                    t.set_interrupt_hook(None);
                    crate::scheduler::enqueue(&t);
                    woken += 1;
                }
            }
        }
        woken
    }

    /// Removes `thread` from the parked list without waking it under any
    /// particular `SleepState`, used by cancellation. Returns whether it
    /// was actually found (it may have already been woken).
    fn remove(&self, thread: &Arc<Thread>) -> bool {
        let mut parked = self.parked.lock();
        if let Some(pos) = parked.iter().position(|t| t.id == thread.id) {
            parked.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::{AddressSpace, AsFlags};
    use crate::task::{spawn_task, spawn_thread, Permissions};
    use utils::types::Name;

    fn two_threads() -> (Arc<Thread>, Arc<Thread>) {
        crate::config::init_for_tests();
        let r#as = AddressSpace::create(AsFlags::empty());
        let task = spawn_task(Name::new_const("wq-test"), r#as, Permissions::all());
        (spawn_thread(&task, 0), spawn_thread(&task, 0))
    }

    #[test_case]
    fn missed_wakeup_is_not_lost() {
        let (t1, _) = two_threads();
        let wq = WaitQueue::new();
        assert_eq!(wq.wakeup(WakeupMode::First), 0);
        // a wakeup that landed first must be consumed instead of parking.
        assert_eq!(wq.sleep(&t1, None), SleepResult::Ok);
        assert!(wq.is_empty());
    }

    #[test_case]
    fn wakeup_all_drains_queue_fifo() {
        let (t1, t2) = two_threads();
        let wq = WaitQueue::new();
        t1.set_sleep_state(SleepState::Asleep);
        wq.parked.lock().push_back(t1.clone());
        t2.set_sleep_state(SleepState::Asleep);
        wq.parked.lock().push_back(t2.clone());

        assert_eq!(wq.wakeup(WakeupMode::All), 2);
        assert_eq!(t1.sleep_state(), SleepState::Woke);
        assert_eq!(t2.sleep_state(), SleepState::Woke);
        assert!(wq.is_empty());
    }

    #[test_case]
    fn interrupt_removes_from_queue_and_marks_interrupted() {
        let (t1, _) = two_threads();
        let wq = WaitQueue::new();
        wq.sleep(&t1, None);
        assert_eq!(wq.len(), 1);
        t1.interrupt();
        assert!(wq.is_empty());
        assert!(t1.is_interrupted());
    }
}
