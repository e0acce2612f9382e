//! The answerbox (spec.md §3, §4.6): a task's IPC inbox. Keeps three
//! queues — incoming calls, calls already dispatched to a receiver and
//! awaiting an answer, and a separate notification queue drained FIFO but
//! distinguished from ordinary calls — plus the per-answerbox wake
//! condition a `wait_for_call` syscall parks on.

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::{
    ipc::call::Call,
    sync::wait_queue::{SleepResult, WaitQueue, WakeupMode},
    task::TaskId,
    utils::locks::Mutex,
};

pub struct Answerbox {
    pub owner_task: TaskId,
    incoming: Mutex<VecDeque<Arc<Call>>>,
    dispatched: Mutex<Vec<Arc<Call>>>,
    notifications: Mutex<VecDeque<Arc<Call>>>,
    wake: WaitQueue,
    hungup: AtomicBool,
}

impl Answerbox {
    pub fn new(owner_task: TaskId) -> Self {
        Self {
            owner_task,
            incoming: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
            notifications: Mutex::new(VecDeque::new()),
            wake: WaitQueue::new(),
            hungup: AtomicBool::new(false),
        }
    }

    /// Enqueues an inbound call. Invariant (spec.md §8): calls received
    /// from one answerbox preserve the send order of each individual
    /// sender — guaranteed here because `incoming` is a plain FIFO and
    /// every sender's calls are pushed in the order it issued them.
    pub fn enqueue_call(&self, call: Arc<Call>) {
        self.incoming.lock().push_back(call);
        self.wake.wakeup(WakeupMode::First);
    }

    pub fn enqueue_notification(&self, call: Arc<Call>) {
        self.notifications.lock().push_back(call);
        self.wake.wakeup(WakeupMode::First);
    }

    /// `wait_for_call`: dequeues the oldest pending call (notifications
    /// take priority since they need no reply and spec.md §4.6 says they
    /// are "distinguished from ordinary calls"), and records it as
    /// dispatched so a source-phone hangup can later synthesize a reply.
    pub fn receive(&self) -> Option<Arc<Call>> {
        if let Some(notification) = self.notifications.lock().pop_front() {
            return Some(notification);
        }
        let call = self.incoming.lock().pop_front()?;
        if !call.is_notification() {
            self.dispatched.lock().push(call.clone());
        }
        Some(call)
    }

    /// `poll_notifications`: non-blocking drain of just the notification
    /// queue.
    pub fn poll_notification(&self) -> Option<Arc<Call>> {
        self.notifications.lock().pop_front()
    }

    pub fn pending_call_count(&self) -> usize {
        self.incoming.lock().len()
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.lock().len()
    }

    /// Blocks the calling thread until a call or notification is
    /// available, the suspension point behind `wait_for_call`.
    pub fn wait_for_call(&self, waiter: &alloc::sync::Arc<crate::task::Thread>) -> SleepResult {
        if self.pending_call_count() > 0 || !self.notifications.lock().is_empty() {
            return SleepResult::Ok;
        }
        self.wake.sleep(waiter, None)
    }

    /// Removes `call` from the dispatched list without answering it, the
    /// first half of a `forward` (spec.md §4.6): the handler gives up
    /// ownership of the call before it is re-enqueued on a new
    /// destination.
    pub fn take_dispatched(&self, call_id: crate::ipc::call::CallId) -> Option<Arc<Call>> {
        let mut dispatched = self.dispatched.lock();
        let pos = dispatched.iter().position(|c| c.id == call_id)?;
        Some(dispatched.remove(pos))
    }

    /// `answer(call, retval, args)`: removes `call` from the dispatched
    /// list and records its reply.
    pub fn answer(&self, call_id: crate::ipc::call::CallId, retval: crate::ErrorStatus, args: [usize; 5]) -> bool {
        let mut dispatched = self.dispatched.lock();
        let Some(pos) = dispatched.iter().position(|c| c.id == call_id) else {
            return false;
        };
        let call = dispatched.remove(pos);
        call.set_reply(retval, args);
        true
    }

    /// Hangup of the whole answerbox (spec.md §4.6): every call still
    /// dispatched or incoming synthesizes `EHANGUP`, and future `receive`
    /// calls observe the hungup flag.
    pub fn hangup_all(&self) {
        self.hungup.store(true, Ordering::Release);
        for call in self.dispatched.lock().drain(..) {
            call.hangup_reply();
        }
        for call in self.incoming.lock().drain(..) {
            call.hangup_reply();
        }
        self.wake.wakeup(WakeupMode::All);
    }

    /// Hangup of one source phone (spec.md §4.6: "any calls still in
    /// flight over that phone are answered with EHANGUP"), distinct from
    /// `hangup_all` which tears down the whole answerbox. Pulls every
    /// call whose `sender_phone` is `phone_id` out of both the dispatched
    /// and still-incoming queues — dispatched calls are already being
    /// handled by a receiver and must not be answered twice, so they are
    /// removed before the synthetic reply is set, exactly like `answer`
    /// does for a real one.
    pub fn hangup_phone(&self, phone_id: crate::ipc::phone::PhoneId) {
        let mut matched = Vec::new();
        self.dispatched.lock().retain(|call| {
            if call.sender_phone == phone_id {
                matched.push(call.clone());
                false
            } else {
                true
            }
        });
        self.incoming.lock().retain(|call| {
            if call.sender_phone == phone_id {
                matched.push(call.clone());
                false
            } else {
                true
            }
        });
        for call in matched {
            call.hangup_reply();
        }
    }

    pub fn is_hungup(&self) -> bool {
        self.hungup.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::call::{CallData, CallFlags};
    use utils::id::Id;

    fn dummy_call(id: u32) -> Arc<Call> {
        Arc::new(Call::new(
            Id::new(id, 0),
            Id::new(0, 0),
            Id::new(0, 0),
            CallData::new(42, [7, 8, 0, 0, 0]),
            CallFlags::empty(),
        ))
    }

    #[test_case]
    fn receive_preserves_send_order() {
        let abox = Answerbox::new(Id::new(0, 0));
        abox.enqueue_call(dummy_call(1));
        abox.enqueue_call(dummy_call(2));

        let first = abox.receive().unwrap();
        let second = abox.receive().unwrap();
        assert_eq!(first.data().args[0], 7);
        assert_eq!(second.data().args[0], 7);
        assert_eq!(first.id, Id::new(1, 0));
        assert_eq!(second.id, Id::new(2, 0));
    }

    #[test_case]
    fn hangup_synthesizes_ehangup_for_outstanding_calls() {
        let abox = Answerbox::new(Id::new(0, 0));
        let call = dummy_call(1);
        abox.enqueue_call(call.clone());
        abox.receive();
        assert_eq!(abox.dispatched_count(), 1);

        abox.hangup_all();
        assert_eq!(abox.dispatched_count(), 0);
        assert_eq!(call.reply().unwrap().0, crate::ErrorStatus::Hangup);
    }
}
