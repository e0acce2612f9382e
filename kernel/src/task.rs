//! The `Task`/`Thread` data model (spec.md §3): independent of any single
//! component, referenced by the address-space manager (D), the scheduler
//! (E/F), and the IPC transport (G) alike. Lives outside any one letter's
//! module because all three read and write it.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use bitflags::bitflags;
use utils::{id::Id, types::Name};

use crate::{
    ipc::{answerbox::Answerbox, phone::PhoneId},
    memory::as_::AddressSpace,
    sync::wait_queue::WaitQueue,
    utils::locks::Mutex,
};

pub enum TaskKind {}
pub enum ThreadKind {}

pub type TaskId = Id<TaskKind>;
pub type ThreadId = Id<ThreadKind>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const SPAWN = 0b0001;
        const IO    = 0b0010;
        const IPC   = 0b0100;
    }
}

/// Lifecycle states of a [`Thread`] (spec.md §3): `Dormant` immediately
/// after construction, `Ready` once enqueued, `Running` while on a CPU,
/// `Sleeping` while blocked, `Exiting` once it has returned from its entry
/// point and is waiting to be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Dormant,
    Ready,
    Running,
    Sleeping,
    Exiting,
}

/// The atomic sleep-state flag from spec.md §3. Kept separate from
/// [`ThreadState`] (which only the owning run-queue lock touches) because
/// a waker on a different CPU updates it concurrently with a missed wakeup
/// potentially racing a sleeper's own transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepState {
    Initial = 0,
    Asleep = 1,
    Woke = 2,
}

impl SleepState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initial,
            1 => Self::Asleep,
            _ => Self::Woke,
        }
    }
}

/// A closure a thread registers with whatever wait queue it is about to
/// park on, so that `Thread::interrupt` can remove it from that queue
/// without the thread needing a generically-typed back-pointer (spec.md
/// §3: "a thread may appear on at most one wait queue").
type InterruptHook = Arc<dyn Fn() + Send + Sync>;

pub struct Thread {
    pub id: ThreadId,
    pub task: TaskId,
    state: Mutex<ThreadState>,
    sleep_state: AtomicU8,
    /// Index into the per-CPU run queue levels (spec.md §4.5); rises when
    /// a thread finishes its quantum without blocking, falls when it
    /// blocked early.
    priority: AtomicUsize,
    affinity: Mutex<Option<usize>>,
    /// Pinned against load-balancer migration while `> 0` (spec.md §4.5).
    nomigrate: AtomicUsize,
    interrupted: AtomicBool,
    interrupt_hook: Mutex<Option<InterruptHook>>,
    join_waiters: WaitQueue,
    exit_code: Mutex<Option<i32>>,
    ticks_run: AtomicU32,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, task: TaskId, priority: usize) -> Self {
        Self {
            id,
            task,
            state: Mutex::new(ThreadState::Dormant),
            sleep_state: AtomicU8::new(SleepState::Initial as u8),
            priority: AtomicUsize::new(priority),
            affinity: Mutex::new(None),
            nomigrate: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
            interrupt_hook: Mutex::new(None),
            join_waiters: WaitQueue::new(),
            exit_code: Mutex::new(None),
            ticks_run: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    pub fn sleep_state(&self) -> SleepState {
        SleepState::from_u8(self.sleep_state.load(Ordering::Acquire))
    }

    pub fn set_sleep_state(&self, state: SleepState) {
        self.sleep_state.store(state as u8, Ordering::Release);
    }

    /// Atomically consumes a pending `Woke` left by a racing waker,
    /// leaving `Initial` behind; returns whether one was found. This is
    /// the compare-and-swap half of spec.md §5's missed-wakeup handling:
    /// a waker that lands before the sleeper parks still leaves a mark
    /// the sleeper observes instead of losing the signal.
    pub fn try_consume_wake(&self) -> bool {
        self.sleep_state
            .compare_exchange(
                SleepState::Woke as u8,
                SleepState::Initial as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    pub fn priority(&self) -> usize {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, level: usize) {
        self.priority.store(level, Ordering::Relaxed);
    }

    pub fn raise_priority(&self) {
        let cur = self.priority();
        if cur > 0 {
            self.priority.store(cur - 1, Ordering::Relaxed);
        }
    }

    pub fn lower_priority(&self, max_level: usize) {
        let cur = self.priority();
        if cur + 1 < max_level {
            self.priority.store(cur + 1, Ordering::Relaxed);
        }
    }

    pub fn affinity(&self) -> Option<usize> {
        *self.affinity.lock()
    }

    pub fn set_affinity(&self, cpu: Option<usize>) {
        *self.affinity.lock() = cpu;
    }

    pub fn pin(&self) {
        self.nomigrate.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unpin(&self) {
        self.nomigrate.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn is_pinned(&self) -> bool {
        self.nomigrate.load(Ordering::Acquire) > 0
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Delivers cancellation (spec.md §4.5): sets `interrupted` and, if the
    /// thread is currently parked, removes it from its wait queue and
    /// wakes it with `INTERRUPTED`.
    pub fn interrupt(self: &Arc<Self>) {
        self.interrupted.store(true, Ordering::Release);
        if let Some(hook) = self.interrupt_hook.lock().take() {
            hook();
        }
    }

    pub(crate) fn set_interrupt_hook(&self, hook: Option<InterruptHook>) {
        *self.interrupt_hook.lock() = hook;
    }

    pub fn account_tick(&self) {
        self.ticks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_run(&self) -> u32 {
        self.ticks_run.load(Ordering::Relaxed)
    }

    /// Transitions to `Exiting`, records the exit code, and wakes every
    /// joiner. Equivalent of HelenOS's thread reaping handoff, minus the
    /// actual stack/kernel-stack reclamation (a collector fibril's job,
    /// out of CORE's synchronous path).
    pub fn finish(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
        self.set_state(ThreadState::Exiting);
        self.join_waiters.wakeup(crate::sync::wait_queue::WakeupMode::All);
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Blocks the calling thread (`waiter`) until `self` finishes, the
    /// HelenOS-level "thread" join condition variable of spec.md §4.7,
    /// implemented directly over a wait queue rather than a fibril-level
    /// workaround since the kernel already has real wait queues.
    pub fn join(&self, waiter: &Arc<Thread>) -> crate::sync::wait_queue::SleepResult {
        if self.exit_code().is_some() {
            return crate::sync::wait_queue::SleepResult::Ok;
        }
        self.join_waiters.sleep(waiter, None)
    }
}

pub struct Task {
    pub id: TaskId,
    pub name: Name,
    pub address_space: Arc<AddressSpace>,
    pub permissions: Permissions,
    pub answerbox: Arc<Answerbox>,
    threads: Mutex<Vec<ThreadId>>,
    phones: Mutex<Vec<PhoneId>>,
    refcount: AtomicUsize,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: Name,
        address_space: Arc<AddressSpace>,
        permissions: Permissions,
    ) -> Self {
        Self {
            id,
            name,
            address_space,
            permissions,
            answerbox: Arc::new(Answerbox::new(id)),
            threads: Mutex::new(Vec::new()),
            phones: Mutex::new(Vec::new()),
            refcount: AtomicUsize::new(1),
        }
    }

    pub fn add_thread(&self, thread: ThreadId) {
        self.threads.lock().push(thread);
    }

    pub fn remove_thread(&self, thread: ThreadId) {
        self.threads.lock().retain(|&t| t != thread);
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn add_phone(&self, phone: PhoneId) {
        self.phones.lock().push(phone);
    }

    pub fn remove_phone(&self, phone: PhoneId) {
        self.phones.lock().retain(|&p| p != phone);
    }

    pub fn phones(&self) -> Vec<PhoneId> {
        self.phones.lock().clone()
    }

    /// Invariant (spec.md §3): a task is not destroyed while any of its
    /// threads or remote phones still reference it.
    pub fn can_destroy(&self) -> bool {
        self.refcount.load(Ordering::Acquire) == 0
    }

    pub fn inc_ref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_ref(&self) -> usize {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

lazy_static::lazy_static! {
    pub static ref TASKS: crate::arena::Arena<Arc<Task>, TaskKind> = crate::arena::Arena::new();
    pub static ref THREADS: crate::arena::Arena<Arc<Thread>, ThreadKind> = crate::arena::Arena::new();
}

/// `task_create` (spec.md §6's Task family): allocates an address space
/// and registers a fresh task in the global arena.
pub fn spawn_task(name: Name, address_space: Arc<AddressSpace>, permissions: Permissions) -> Arc<Task> {
    let mut result = None;
    TASKS.insert_with(|id| {
        let task = Arc::new(Task::new(id, name, address_space, permissions));
        result = Some(task.clone());
        task
    });
    result.expect("insert_with always calls its closure")
}

/// `thread_create`: registers a fresh `Dormant` thread owned by `task`.
pub fn spawn_thread(task: &Arc<Task>, priority: usize) -> Arc<Thread> {
    let mut result = None;
    THREADS.insert_with(|id| {
        let thread = Arc::new(Thread::new(id, task.id, priority));
        result = Some(thread.clone());
        thread
    });
    let thread = result.expect("insert_with always calls its closure");
    task.add_thread(thread.id);
    thread
}

pub fn lookup_task(id: TaskId) -> Option<Arc<Task>> {
    TASKS.get(id, |t| t.clone())
}

pub fn lookup_thread(id: ThreadId) -> Option<Arc<Thread>> {
    THREADS.get(id, |t| t.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::AsFlags;

    fn test_task() -> Arc<Task> {
        let r#as = AddressSpace::create(AsFlags::empty());
        spawn_task(Name::new_const("test"), r#as, Permissions::all())
    }

    #[test_case]
    fn thread_join_wakes_after_finish() {
        crate::config::init_for_tests();
        let task = test_task();
        let worker = spawn_thread(&task, 0);
        let joiner = spawn_thread(&task, 0);

        worker.finish(7);
        assert_eq!(
            worker.join(&joiner),
            crate::sync::wait_queue::SleepResult::Ok
        );
        assert_eq!(worker.exit_code(), Some(7));
    }

    #[test_case]
    fn priority_rises_and_falls_within_bounds() {
        crate::config::init_for_tests();
        let task = test_task();
        let thread = spawn_thread(&task, 3);
        thread.raise_priority();
        assert_eq!(thread.priority(), 2);
        thread.lower_priority(8);
        assert_eq!(thread.priority(), 3);
    }
}
