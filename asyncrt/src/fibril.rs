//! The fibril runtime (spec.md §4.7, component H): single-threaded
//! cooperative scheduling within one kernel thread.
//!
//! spec.md §9's Design Notes call for re-architecting "coroutine-style
//! user-space fibrils" as explicit tasks on a user-space scheduler rather
//! than hand-rolled stack switching: a fibril here *is* a boxed
//! [`Future`], and "switching" means the executor polling the next ready
//! future instead of swapping registers and a stack pointer. The
//! `FibrilId`/`FibrilState`/switch-kind vocabulary from the distilled
//! spec is kept so the scenarios it describes (ready list, manager list,
//! all-fibrils list, `PREEMPT`/`FROM_MANAGER`/`TO_MANAGER`/`FROM_DEAD`)
//! still have a concrete referent; only the mechanism changed. Grounded
//! on the `Arc<Id> : Wake` pattern used for per-thread wakers in
//! `ProjectSerenity/firefly`'s `kernel::multitasking::thread` module.

use alloc::{boxed::Box, collections::VecDeque, sync::Arc, task::Wake, vec::Vec};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use spin::{Mutex, Once};

/// Identifies one fibril; a plain index into the executor's slab rather
/// than a generation-counted [`utils::id::Id`] — fibrils never outlive a
/// single process's executor and are never looked up across a
/// serialization boundary the way kernel phones/calls are, so the extra
/// generation check the kernel's `Arena` pays for has no payoff here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FibrilId(usize);

/// Lifecycle of one fibril (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FibrilState {
    Running,
    Ready,
    Manager,
    Dead,
}

/// Why a switch happened; kept for parity with the distilled vocabulary
/// even though this executor's `run_until_idle` only ever preempts —
/// a true multi-kernel-thread port would branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    Preempt,
    FromManager,
    ToManager,
    FromDead,
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Slot {
    future: Option<BoxFuture>,
    state: FibrilState,
}

struct Inner {
    slots: slab::Slab<Slot>,
    ready: VecDeque<FibrilId>,
    managers: VecDeque<FibrilId>,
    all: Vec<FibrilId>,
    current: Option<FibrilId>,
    /// The future of whatever fibril died on the *previous* switch.
    /// Dropped at the start of the *next* switch rather than from inside
    /// its own poll, which is the "stacks of dead fibrils are destroyed
    /// on the next context switch" rule from spec.md §4.7 — tested by
    /// [`tests::dead_fibrils_future_outlives_its_own_death`].
    dead_future: Option<BoxFuture>,
}

/// The fibril scheduler. A real multi-kernel-thread port would have one
/// per kernel thread (spec.md §9's Open Question about fibril migration
/// across kernel threads); [`executor()`] hands out one process-wide
/// instance for production use, but nothing about `Executor` itself is a
/// singleton — tests build isolated ones with [`Executor::new`] so
/// concurrently-run test cases never share fibril state.
pub struct Executor {
    inner: Mutex<Inner>,
}

static EXECUTOR: Once<Arc<Executor>> = Once::new();

/// Returns the process-wide executor, initializing it on first use —
/// the same `Once`-backed singleton idiom `kernel::sync::futex::table()`
/// and `kernel::scheduler`'s per-CPU list use on the kernel side.
pub fn executor() -> Arc<Executor> {
    EXECUTOR.call_once(Executor::new).clone()
}

impl Executor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                slots: slab::Slab::new(),
                ready: VecDeque::new(),
                managers: VecDeque::new(),
                all: Vec::new(),
                current: None,
                dead_future: None,
            }),
        })
    }

    /// Creates a new fibril in the `Ready` state and enqueues it.
    pub fn spawn(self: &Arc<Self>, future: impl Future<Output = ()> + Send + 'static) -> FibrilId {
        let mut inner = self.inner.lock();
        let key = inner.slots.insert(Slot { future: Some(Box::pin(future)), state: FibrilState::Ready });
        let id = FibrilId(key);
        inner.all.push(id);
        inner.ready.push_back(id);
        id
    }

    pub fn state_of(&self, id: FibrilId) -> Option<FibrilState> {
        self.inner.lock().slots.get(id.0).map(|slot| slot.state)
    }

    pub fn fibril_count(&self) -> usize {
        self.inner.lock().all.len()
    }

    pub fn ready_count(&self) -> usize {
        self.inner.lock().ready.len()
    }

    pub fn current(&self) -> Option<FibrilId> {
        self.inner.lock().current
    }

    /// `fibril_switch(FIBRIL_TO_MANAGER)`: the calling fibril declares it
    /// has nothing to do and becomes available to service I/O
    /// completions.
    pub fn become_manager(&self, id: FibrilId) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(id.0) {
            slot.state = FibrilState::Manager;
        }
        inner.managers.push_back(id);
    }

    /// Marks `id` ready and queues it for the next pass, the effect every
    /// [`Wake`] call has. A dead fibril is never re-queued; an
    /// already-ready one is not queued twice (the wake is still
    /// observed — nothing is lost, matching spec.md §5's no-missed-
    /// wakeup rule one level up from the kernel wait queue).
    fn mark_ready(&self, id: FibrilId) {
        let mut inner = self.inner.lock();
        let was_ready = match inner.slots.get_mut(id.0) {
            Some(slot) if slot.state == FibrilState::Dead => return,
            Some(slot) => {
                let was_ready = slot.state == FibrilState::Ready;
                slot.state = FibrilState::Ready;
                was_ready
            }
            None => return,
        };
        if !was_ready {
            inner.ready.push_back(id);
        }
    }

    /// Drives ready fibrils until none remain ready. Stands in for the
    /// per-kernel-thread drive loop a real port would run forever;
    /// tests call it directly since there is no OS thread here to spin.
    pub fn run_until_idle(self: &Arc<Self>) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                inner.dead_future.take();
                inner.ready.pop_front()
            };
            let Some(id) = next else { break };
            self.poll_one(id);
        }
    }

    fn poll_one(self: &Arc<Self>, id: FibrilId) {
        let taken = {
            let mut inner = self.inner.lock();
            inner.current = Some(id);
            match inner.slots.get_mut(id.0) {
                Some(slot) => {
                    slot.state = FibrilState::Running;
                    slot.future.take()
                }
                None => None,
            }
        };

        let Some(mut fut) = taken else {
            self.inner.lock().current = None;
            return;
        };

        let waker = Waker::from(Arc::new(FibrilWaker { executor: self.clone(), id }));
        let mut cx = Context::from_waker(&waker);
        let poll = fut.as_mut().poll(&mut cx);

        let mut inner = self.inner.lock();
        inner.current = None;
        match poll {
            Poll::Ready(()) => {
                if let Some(slot) = inner.slots.get_mut(id.0) {
                    slot.state = FibrilState::Dead;
                }
                inner.dead_future = Some(fut);
            }
            Poll::Pending => {
                if let Some(slot) = inner.slots.get_mut(id.0) {
                    slot.future = Some(fut);
                    if slot.state == FibrilState::Running {
                        slot.state = FibrilState::Ready;
                    }
                }
            }
        }
    }
}

struct FibrilWaker {
    executor: Arc<Executor>,
    id: FibrilId,
}

impl Wake for FibrilWaker {
    fn wake(self: Arc<Self>) {
        self.executor.mark_ready(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.executor.mark_ready(self.id);
    }
}

struct ChannelShared<T> {
    slot: Mutex<Option<T>>,
    send_waker: Mutex<Option<Waker>>,
    recv_waker: Mutex<Option<Waker>>,
}

/// A capacity-1 rendezvous channel: `send` completes only once a `recv`
/// has taken the value (and vice versa), so two fibrils trading messages
/// through it interleave in lockstep rather than buffering ahead of each
/// other — the primitive behind spec.md §8 scenario 5 ("fibril
/// ping-pong").
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(ChannelShared { slot: Mutex::new(None), send_waker: Mutex::new(None), recv_waker: Mutex::new(None) });
    (Sender(shared.clone()), Receiver(shared))
}

pub struct Sender<T>(Arc<ChannelShared<T>>);
pub struct Receiver<T>(Arc<ChannelShared<T>>);

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Sender<T> {
    pub fn send(&self, value: T) -> ChannelSend<'_, T> {
        ChannelSend { shared: &self.0, value: Some(value) }
    }
}

impl<T> Receiver<T> {
    pub fn recv(&self) -> ChannelRecv<'_, T> {
        ChannelRecv { shared: &self.0 }
    }
}

pub struct ChannelSend<'a, T> {
    shared: &'a ChannelShared<T>,
    value: Option<T>,
}

impl<'a, T> Unpin for ChannelSend<'a, T> {}

impl<'a, T> Future for ChannelSend<'a, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut slot = self.shared.slot.lock();
        if slot.is_some() {
            *self.shared.send_waker.lock() = Some(cx.waker().clone());
            return Poll::Pending;
        }
        *slot = self.value.take();
        drop(slot);
        if let Some(waker) = self.shared.recv_waker.lock().take() {
            waker.wake();
        }
        Poll::Ready(())
    }
}

pub struct ChannelRecv<'a, T> {
    shared: &'a ChannelShared<T>,
}

impl<'a, T> Unpin for ChannelRecv<'a, T> {}

impl<'a, T> Future for ChannelRecv<'a, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.shared.slot.lock();
        match slot.take() {
            Some(value) => {
                drop(slot);
                if let Some(waker) = self.shared.send_waker.lock().take() {
                    waker.wake();
                }
                Poll::Ready(value)
            }
            None => {
                *self.shared.recv_waker.lock() = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn fibril_ping_pong_exchanges_match_on_both_sides() {
        const ROUNDS: usize = 1000;

        let exec = Executor::new();
        let (ping_tx, pong_rx) = channel::<usize>();
        let (pong_tx, ping_rx) = channel::<usize>();

        let sent = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));

        let sent2 = sent.clone();
        exec.spawn(async move {
            for i in 0..ROUNDS {
                ping_tx.send(i).await;
                let echoed = ping_rx.recv().await;
                assert_eq!(echoed, i);
                sent2.fetch_add(1, Ordering::SeqCst);
            }
        });

        let received2 = received.clone();
        exec.spawn(async move {
            for _ in 0..ROUNDS {
                let value = pong_rx.recv().await;
                received2.fetch_add(1, Ordering::SeqCst);
                pong_tx.send(value).await;
            }
        });

        exec.run_until_idle();

        assert_eq!(sent.load(Ordering::SeqCst), ROUNDS);
        assert_eq!(received.load(Ordering::SeqCst), ROUNDS);
        assert_eq!(exec.ready_count(), 0);
        assert_eq!(exec.fibril_count(), 2);
    }

    struct DropSignal(Arc<AtomicBool>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn dead_fibrils_future_outlives_its_own_death() {
        let exec = Executor::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let dropped2 = dropped.clone();

        let id = exec.spawn(async move {
            let _guard = DropSignal(dropped2);
        });

        exec.run_until_idle();
        assert_eq!(exec.state_of(id), Some(FibrilState::Dead));
        assert!(!dropped.load(Ordering::SeqCst), "dead fibril's future dropped during its own death switch");

        exec.spawn(async {});
        exec.run_until_idle();
        assert!(dropped.load(Ordering::SeqCst), "dead fibril's future never reclaimed on a later switch");
    }

    #[test]
    fn process_wide_executor_is_a_stable_singleton() {
        assert!(Arc::ptr_eq(&executor(), &executor()));
    }
}
