//! The reader-writer lock over wait queues (spec.md §4.5): neither
//! readers nor writers starve. A writer that times out still lets the
//! leading readers already queued ahead of later writers make progress;
//! on release, every contiguous reader at the head of the waiter list is
//! admitted together. Grounded on `original_source/src/synch/rwlock.c`'s
//! `let_others_in` (`ALLOW_ALL` vs `ALLOW_READERS_ONLY`) — the
//! `admit_readers_only` parameter below is that same distinction.

use alloc::{collections::VecDeque, sync::Arc};

use crate::{
    sync::wait_queue::SleepResult,
    task::{SleepState, Thread, ThreadState},
    utils::locks::Mutex,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum WaiterKind {
    Reader,
    Writer,
}

struct Waiter {
    kind: WaiterKind,
    thread: Arc<Thread>,
}

struct State {
    readers_in: usize,
    writer_active: bool,
    waiters: VecDeque<Waiter>,
}

pub struct RwLock {
    state: Mutex<State>,
}

impl RwLock {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State {
                readers_in: 0,
                writer_active: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Admits every contiguous reader at the head of the waiter list, or
    /// (when `admit_readers_only` is false) a single leading writer.
    /// Mirrors `let_others_in(rwl, readers_only)` in the original source.
    fn let_others_in(state: &mut State, admit_readers_only: bool) {
        loop {
            match state.waiters.front().map(|w| w.kind) {
                Some(WaiterKind::Reader) if !state.writer_active => {
                    let waiter = state.waiters.pop_front().unwrap();
                    state.readers_in += 1;
                    waiter.thread.set_sleep_state(SleepState::Woke);
                    waiter.thread.set_state(ThreadState::Ready);
                    crate::scheduler::enqueue(&waiter.thread);
                }
                Some(WaiterKind::Writer) if !admit_readers_only && state.readers_in == 0 => {
                    let waiter = state.waiters.pop_front().unwrap();
                    state.writer_active = true;
                    waiter.thread.set_sleep_state(SleepState::Woke);
                    waiter.thread.set_state(ThreadState::Ready);
                    crate::scheduler::enqueue(&waiter.thread);
                    break;
                }
                _ => break,
            }
        }
    }

    pub fn read_lock(&self, thread: &Arc<Thread>) -> SleepResult {
        let mut state = self.state.lock();
        if !state.writer_active && state.waiters.iter().all(|w| w.kind == WaiterKind::Reader) {
            state.readers_in += 1;
            return SleepResult::Ok;
        }
        state.waiters.push_back(Waiter {
            kind: WaiterKind::Reader,
            thread: thread.clone(),
        });
        thread.set_sleep_state(SleepState::Asleep);
        thread.set_state(ThreadState::Sleeping);
        SleepResult::Ok
    }

    pub fn read_unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers_in > 0, "read_unlock without a matching read_lock");
        state.readers_in -= 1;
        if state.readers_in == 0 {
            Self::let_others_in(&mut state, false);
        }
    }

    pub fn write_lock(&self, thread: &Arc<Thread>) -> SleepResult {
        let mut state = self.state.lock();
        if !state.writer_active && state.readers_in == 0 && state.waiters.is_empty() {
            state.writer_active = true;
            return SleepResult::Ok;
        }
        state.waiters.push_back(Waiter {
            kind: WaiterKind::Writer,
            thread: thread.clone(),
        });
        thread.set_sleep_state(SleepState::Asleep);
        thread.set_state(ThreadState::Sleeping);
        SleepResult::Ok
    }

    /// A writer that gave up waiting (deadline elapsed): spec.md §4.5
    /// says the leading readers in the queue must not lose progress, so
    /// this removes `thread` from the waiters and admits any readers now
    /// at the head.
    pub fn write_timeout(&self, thread: &Arc<Thread>) {
        let mut state = self.state.lock();
        state.waiters.retain(|w| w.thread.id != thread.id);
        Self::let_others_in(&mut state, true);
    }

    pub fn write_unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer_active, "write_unlock without a matching write_lock");
        state.writer_active = false;
        Self::let_others_in(&mut state, false);
    }
}

impl Default for RwLock {
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

    fn thread() -> Arc<Thread> {
        crate::config::init_for_tests();
        let r#as = AddressSpace::create(AsFlags::empty());
        let task = spawn_task(Name::new_const("rwlock-test"), r#as, Permissions::all());
        spawn_thread(&task, 0)
    }

    #[test_case]
    fn timed_out_writer_admits_leading_readers() {
        let reader_holder = thread();
        let waiting_writer = thread();
        let reader = thread();

        let lock = RwLock::new();
        assert_eq!(lock.read_lock(&reader_holder), SleepResult::Ok);
        assert_eq!(lock.write_lock(&waiting_writer), SleepResult::Ok); // parks behind the active reader
        assert_eq!(lock.read_lock(&reader), SleepResult::Ok); // parks behind the waiting writer, to avoid writer starvation

        lock.write_timeout(&waiting_writer);
        // the writer gave up; since only readers are active (no writer
        // holds exclusively), the reader behind it can join them now.
        let state = lock.state.lock();
        assert_eq!(state.readers_in, 2);
        assert!(state.waiters.is_empty());
    }

    #[test_case]
    fn timed_out_writer_behind_active_writer_does_not_admit_readers() {
        let writer_holder = thread();
        let waiting_writer = thread();
        let reader = thread();

        let lock = RwLock::new();
        assert_eq!(lock.write_lock(&writer_holder), SleepResult::Ok);
        assert_eq!(lock.write_lock(&waiting_writer), SleepResult::Ok);
        assert_eq!(lock.read_lock(&reader), SleepResult::Ok);

        lock.write_timeout(&waiting_writer);
        // `writer_holder` still holds the lock exclusively, so the
        // reader must not be let in yet.
        let state = lock.state.lock();
        assert_eq!(state.readers_in, 0);
        assert_eq!(state.waiters.len(), 1);
    }

    #[test_case]
    fn release_admits_all_contiguous_readers() {
        let writer = thread();
        let r1 = thread();
        let r2 = thread();

        let lock = RwLock::new();
        assert_eq!(lock.write_lock(&writer), SleepResult::Ok);
        lock.read_lock(&r1);
        lock.read_lock(&r2);

        lock.write_unlock();
        assert_eq!(lock.state.lock().readers_in, 2);
    }
}
