//! The IPC call object (spec.md §3, §4.6): sender identity is immutable,
//! method + arguments are mutable (a forward rewrites the method), and a
//! call carries its own reply wait queue so a synchronous sender parks on
//! exactly the call it issued rather than the whole answerbox.

use alloc::{sync::Arc, vec::Vec};

use abi::call::{CallData, CallFlags};

use crate::{
    ipc::phone::PhoneId,
    sync::wait_queue::{SleepResult, WaitQueue, WakeupMode},
    task::TaskId,
    utils::locks::Mutex,
    ErrorStatus,
};
use utils::id::Id;

pub enum CallKind {}
pub type CallId = Id<CallKind>;

pub struct Call {
    pub id: CallId,
    /// Immutable sender identity (spec.md §3).
    pub sender_task: TaskId,
    pub sender_phone: PhoneId,
    data: Mutex<CallData>,
    flags: Mutex<CallFlags>,
    /// The chain of phones a call was forwarded through, original sender
    /// preserved at `sender_task`/`sender_phone` throughout.
    forward_chain: Mutex<Vec<PhoneId>>,
    reply: Mutex<Option<(ErrorStatus, CallData)>>,
    reply_wq: WaitQueue,
}

impl Call {
    pub(crate) fn new(id: CallId, sender_task: TaskId, sender_phone: PhoneId, data: CallData, flags: CallFlags) -> Self {
        Self {
            id,
            sender_task,
            sender_phone,
            data: Mutex::new(data),
            flags: Mutex::new(flags),
            forward_chain: Mutex::new(Vec::new()),
            reply: Mutex::new(None),
            reply_wq: WaitQueue::new(),
        }
    }

    pub fn data(&self) -> CallData {
        *self.data.lock()
    }

    pub fn flags(&self) -> CallFlags {
        *self.flags.lock()
    }

    pub fn is_notification(&self) -> bool {
        self.flags().contains(CallFlags::NOTIFICATION)
    }

    pub fn is_answered(&self) -> bool {
        self.flags().contains(CallFlags::ANSWERED)
    }

    /// Rewrites the method on forward, preserving the original sender
    /// identity and recording the hop (spec.md §4.6).
    pub(crate) fn forward_to(&self, new_method: u32, via: PhoneId) {
        let mut data = self.data.lock();
        data.method = new_method;
        let mut flags = self.flags.lock();
        *flags |= CallFlags::FORWARDED;
        self.forward_chain.lock().push(via);
    }

    /// `answer(call, retval, args)`: records the reply and wakes whoever
    /// is parked on it (a synchronous sender, or an async poller).
    pub(crate) fn set_reply(&self, retval: ErrorStatus, args: [usize; 5]) {
        let method = self.data.lock().method;
        *self.reply.lock() = Some((retval, CallData::new(method, args)));
        *self.flags.lock() |= CallFlags::ANSWERED;
        self.reply_wq.wakeup(WakeupMode::All);
    }

    /// Synthesizes an `EHANGUP` reply (spec.md §4.6's hangup rule: "an
    /// unanswered call at hangup time returns a synthetic error reply").
    pub(crate) fn hangup_reply(&self) {
        if self.is_answered() {
            return;
        }
        *self.flags.lock() |= CallFlags::HUNGUP;
        self.set_reply(ErrorStatus::Hangup, [0; 5]);
    }

    pub fn reply(&self) -> Option<(ErrorStatus, CallData)> {
        *self.reply.lock()
    }

    /// Parks the calling thread on this call's reply, the blocking half
    /// of a synchronous `call-sync` syscall.
    pub fn wait_for_reply(&self, waiter: &Arc<crate::task::Thread>) -> SleepResult {
        if self.reply().is_some() {
            return SleepResult::Ok;
        }
        self.reply_wq.sleep(waiter, None)
    }
}
