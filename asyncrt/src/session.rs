//! The async/session layer (spec.md §4.8, component I): client-side
//! connection pooling over the kernel's phone abstraction, plus
//! cancellation of a fibril suspended mid-call. This module never talks
//! to the kernel directly — it is written against [`SessionTransport`],
//! a small trait a real port implements with the actual `phone_connect`/
//! `hangup` syscalls, so it stays ordinary `#[test]`-tested code with a
//! mock transport instead of needing a booted kernel.

use alloc::{sync::Arc, vec::Vec};
use core::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    task::{Context, Poll},
};

use spin::Mutex;

use crate::{ErrorStatus, KResult};

/// Opaque handle to one IPC phone, as seen from user space; asyncrt
/// never interprets the value, only moves it between a session's cache,
/// the global inactive list, and [`SessionTransport`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhoneHandle(pub u32);

/// The two operations `transaction_begin`/`transaction_end` need from
/// the kernel: open a fresh data phone to whatever a session phone
/// connects to, and close one outright. A real implementation is a thin
/// wrapper over the `IPC` syscall family (`kernel::syscalls::ipc`); the
/// test suite below uses a counting mock instead.
pub trait SessionTransport: Send + Sync + 'static {
    fn connect_me_to(&self, session_phone: PhoneHandle) -> KResult<PhoneHandle>;
    fn hangup(&self, phone: PhoneHandle) -> KResult<()>;
}

/// Type-erased hook the global inactive-connection list uses to evict a
/// cached phone belonging to some other session, without that list
/// needing to be generic over every `SessionTransport` impl in the
/// process. `SessionInner<T>` is the only implementor.
trait InactiveOwner: Send + Sync {
    fn evict(&self, phone: PhoneHandle);
}

struct SessionInner<T: SessionTransport> {
    session_phone: PhoneHandle,
    transport: T,
    cache: Mutex<Vec<PhoneHandle>>,
}

impl<T: SessionTransport> InactiveOwner for SessionInner<T> {
    fn evict(&self, phone: PhoneHandle) {
        self.cache.lock().retain(|&p| p != phone);
        let _ = self.transport.hangup(phone);
    }
}

/// A client-side session (spec.md §4.8): one session phone plus a cache
/// of idle data phones. Each data phone carries exactly one transaction
/// at a time.
pub struct Session<T: SessionTransport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: SessionTransport> Session<T> {
    pub fn new(session_phone: PhoneHandle, transport: T) -> Self {
        Self { inner: Arc::new(SessionInner { session_phone, transport, cache: Mutex::new(Vec::new()) }) }
    }

    pub fn cached_phone_count(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// `transaction_begin(session)` (spec.md §4.8):
    ///
    /// 1. A cached data phone is detached and returned if one exists.
    /// 2. Otherwise `connect_me_to(session_phone)` is tried.
    /// 3. On phone-limit exhaustion, the least recently used data phone
    ///    of some *other* session is evicted from the global inactive
    ///    list, and the connect is retried once.
    /// 4. If it still fails, `ELIMIT`.
    pub fn transaction_begin(&self) -> KResult<PhoneHandle> {
        if let Some(phone) = self.inner.cache.lock().pop() {
            remove_from_inactive(phone);
            return Ok(phone);
        }

        match self.inner.transport.connect_me_to(self.inner.session_phone) {
            Ok(phone) => return Ok(phone),
            Err(ErrorStatus::LimitReached) => {}
            Err(other) => return Err(other),
        }

        if !evict_one_from_inactive() {
            return Err(ErrorStatus::LimitReached);
        }

        self.inner.transport.connect_me_to(self.inner.session_phone).map_err(|_| ErrorStatus::LimitReached)
    }

    /// `transaction_end(session, data_phone)`: reattaches `phone` to the
    /// session's cache and registers it on the global inactive list for
    /// possible LRU eviction by another session's `transaction_begin`.
    pub fn transaction_end(&self, phone: PhoneHandle) {
        self.inner.cache.lock().push(phone);
        let owner: Arc<dyn InactiveOwner> = self.inner.clone();
        push_inactive(Arc::downgrade(&owner), phone);
    }
}

struct InactiveEntry {
    owner: alloc::sync::Weak<dyn InactiveOwner>,
    phone: PhoneHandle,
    last_used: u64,
}

static INACTIVE: Mutex<Vec<InactiveEntry>> = Mutex::new(Vec::new());
static CLOCK: AtomicU64 = AtomicU64::new(0);

fn tick() -> u64 {
    CLOCK.fetch_add(1, Ordering::Relaxed)
}

fn push_inactive(owner: alloc::sync::Weak<dyn InactiveOwner>, phone: PhoneHandle) {
    INACTIVE.lock().push(InactiveEntry { owner, phone, last_used: tick() });
}

fn remove_from_inactive(phone: PhoneHandle) {
    INACTIVE.lock().retain(|entry| entry.phone != phone);
}

/// Evicts the single oldest entry in the global inactive list (spec.md
/// §4.8 step 3), returning whether anything was there to evict. Entries
/// whose owning session has already been dropped are skipped over and
/// discarded — there is nothing left to hang up a phone on behalf of.
fn evict_one_from_inactive() -> bool {
    loop {
        let victim = {
            let mut list = INACTIVE.lock();
            let oldest = list.iter().enumerate().min_by_key(|(_, entry)| entry.last_used).map(|(i, _)| i);
            oldest.map(|i| list.remove(i))
        };
        match victim {
            None => return false,
            Some(entry) => {
                if let Some(owner) = entry.owner.upgrade() {
                    owner.evict(entry.phone);
                    return true;
                }
                // Stale entry (owning session already gone); keep looking.
            }
        }
    }
}

/// A cooperative cancellation flag, shared between whatever holds the
/// right to cancel a pending transaction and the [`Cancellable`] future
/// wrapping it.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps an in-flight async call so that interrupting the fibril at any
/// suspension point produces a synthetic `Interrupted` reply instead of
/// the call silently vanishing (spec.md §4.8's Cancellation paragraph).
/// `F` itself is never polled again once cancelled.
pub struct Cancellable<F> {
    inner: F,
    token: CancelToken,
}

impl<F> Cancellable<F> {
    pub fn new(inner: F, token: CancelToken) -> Self {
        Self { inner, token }
    }
}

impl<F: Unpin> Unpin for Cancellable<F> {}

impl<F, T> Future for Cancellable<F>
where
    F: Future<Output = KResult<T>> + Unpin,
{
    type Output = KResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.token.is_cancelled() {
            return Poll::Ready(Err(ErrorStatus::Interrupted));
        }
        Pin::new(&mut self.inner).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{
        sync::atomic::AtomicUsize,
        task::{RawWaker, RawWakerVTable, Waker},
    };

    #[derive(Clone)]
    struct MockTransport {
        limit: usize,
        outstanding: Arc<AtomicUsize>,
        next_id: Arc<AtomicU64>,
    }

    impl MockTransport {
        fn with_limit(limit: usize) -> Self {
            Self { limit, outstanding: Arc::new(AtomicUsize::new(0)), next_id: Arc::new(AtomicU64::new(1)) }
        }
    }

    impl SessionTransport for MockTransport {
        fn connect_me_to(&self, _session_phone: PhoneHandle) -> KResult<PhoneHandle> {
            let before = self.outstanding.fetch_add(1, Ordering::SeqCst);
            if before >= self.limit {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                return Err(ErrorStatus::LimitReached);
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(PhoneHandle(id as u32))
        }

        fn hangup(&self, _phone: PhoneHandle) -> KResult<()> {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn transaction_round_trip_leaves_the_returned_phone_cached() {
        let session = Session::new(PhoneHandle(1), MockTransport::with_limit(10));
        assert_eq!(session.cached_phone_count(), 0);

        let phone = session.transaction_begin().unwrap();
        assert_eq!(session.cached_phone_count(), 0);

        session.transaction_end(phone);
        assert_eq!(session.cached_phone_count(), 1);

        let reused = session.transaction_begin().unwrap();
        assert_eq!(reused, phone);
        assert_eq!(session.cached_phone_count(), 0);
    }

    #[test]
    fn phone_pressure_evicts_lru_phone_of_another_session() {
        let transport = MockTransport::with_limit(1);
        let s1 = Session::new(PhoneHandle(100), transport.clone());
        let s2 = Session::new(PhoneHandle(200), transport.clone());

        let phone1 = s1.transaction_begin().unwrap();
        s1.transaction_end(phone1);
        assert_eq!(s1.cached_phone_count(), 1);

        // The transport is at capacity with s1's idle phone; s2 must
        // force an eviction to get its own.
        let phone2 = s2.transaction_begin().unwrap();
        assert_eq!(s1.cached_phone_count(), 0, "s1's cached phone should have been evicted under pressure");
        assert_ne!(phone2, phone1);

        s2.transaction_end(phone2);
        assert_eq!(transport.outstanding.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_transport_with_no_inactive_phones_to_evict_returns_limit_reached() {
        let session = Session::new(PhoneHandle(1), MockTransport::with_limit(0));
        assert_eq!(session.transaction_begin(), Err(ErrorStatus::LimitReached));
    }

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        fn no_op(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn cancelled_call_resolves_to_interrupted_without_polling_inner() {
        let token = CancelToken::new();
        token.cancel();

        let mut fut = Cancellable::new(core::future::pending::<KResult<()>>(), token);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Err(ErrorStatus::Interrupted)));
    }
}
