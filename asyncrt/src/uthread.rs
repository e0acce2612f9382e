//! `UThread`: a HelenOS-style user-space "thread" layered over a fibril
//! (spec.md §4.7's last paragraph). The original wraps a fibril with a
//! join condition variable because fibrils themselves are not joinable;
//! spec.md §9's Design Notes call that workaround out explicitly for
//! replacement ("folded into a proper task handle that wraps a
//! future") — so here `join()` is itself a [`Future`], backed by a
//! shared result slot and a single waker rather than a condvar.

use alloc::sync::Arc;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use spin::Mutex;

use crate::fibril::{executor, Executor, FibrilId};

struct Shared<T> {
    result: Mutex<Option<T>>,
    waiter: Mutex<Option<Waker>>,
}

/// A joinable fibril. Cloning is not provided — like a kernel thread,
/// there is exactly one owner of the join handle (spec.md's thread model
/// never describes detach-and-forget for uthreads either).
pub struct UThread<T> {
    id: FibrilId,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> UThread<T> {
    /// Spawns `future` on the process-wide executor.
    pub fn spawn(future: impl Future<Output = T> + Send + 'static) -> Self {
        Self::spawn_on(&executor(), future)
    }

    /// Spawns `future` on a caller-supplied executor; tests use this to
    /// avoid sharing fibril state with unrelated, concurrently-run tests
    /// through the process-wide singleton.
    pub fn spawn_on(exec: &Arc<Executor>, future: impl Future<Output = T> + Send + 'static) -> Self {
        let shared = Arc::new(Shared { result: Mutex::new(None), waiter: Mutex::new(None) });
        let shared2 = shared.clone();

        let id = exec.spawn(async move {
            let value = future.await;
            *shared2.result.lock() = Some(value);
            if let Some(waker) = shared2.waiter.lock().take() {
                waker.wake();
            }
        });

        Self { id, shared }
    }

    pub fn fibril_id(&self) -> FibrilId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.shared.result.lock().is_some()
    }

    /// A future that resolves to the uthread's return value once its
    /// body completes. Can only be driven to completion once — like
    /// `std::thread::JoinHandle::join`, the value is taken, not cloned.
    /// Owns a clone of the shared result slot rather than borrowing it,
    /// so a `Join` can be spawned onto another fibril without tying its
    /// lifetime to the `UThread` handle.
    pub fn join(&self) -> Join<T> {
        Join { shared: self.shared.clone() }
    }
}

pub struct Join<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Unpin for Join<T> {}

impl<T> Future for Join<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut result = self.shared.result.lock();
        match result.take() {
            Some(value) => Poll::Ready(value),
            None => {
                *self.shared.waiter.lock() = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fibril::FibrilState;

    #[test]
    fn join_observes_the_uthreads_return_value() {
        let exec = Executor::new();
        let uthread = UThread::spawn_on(&exec, async { 7 + 8 });

        let result = Arc::new(Mutex::new(None));
        let result2 = result.clone();
        let join = uthread.join();
        exec.spawn(async move {
            *result2.lock() = Some(join.await);
        });

        exec.run_until_idle();
        assert_eq!(*result.lock(), Some(15));
        assert!(uthread.is_finished());
        assert_eq!(exec.state_of(uthread.fibril_id()), Some(FibrilState::Dead));
    }
}
