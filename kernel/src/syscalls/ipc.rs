//! The IPC family (spec.md §6, component G): phone connect/hangup,
//! call-sync/call-async, answer, forward, accept, wait-for-call, poll
//! notifications. Each function here just resolves its `Arc` handles and
//! calls straight into `kernel::ipc`; the actual state machines live
//! there.

use alloc::sync::Arc;

use abi::call::CallData;

use crate::{
    ipc::{self, answerbox::Answerbox, call::CallId, phone::Phone},
    sync::wait_queue::SleepResult,
    task::{Task, Thread},
    ErrorStatus, KResult,
};

pub fn phone_connect(task: &Arc<Task>, target: Arc<Answerbox>) -> KResult<Arc<Phone>> {
    ipc::phone_connect(task, target)
}

pub fn phone_hangup(task: &Arc<Task>, phone: &Arc<Phone>) {
    ipc::phone_hangup(task, phone)
}

pub fn call_sync(task: &Arc<Task>, phone: &Arc<Phone>, caller_thread: &Arc<Thread>, method: u32, args: [usize; 5]) -> KResult<[usize; 5]> {
    ipc::call_sync(task.id, phone, caller_thread, method, args)
}

pub fn call_async(task: &Arc<Task>, phone: &Arc<Phone>, method: u32, args: [usize; 5]) -> KResult<CallId> {
    ipc::call_async(task.id, phone, method, args)
}

pub fn poll_reply(call_id: CallId) -> Option<(ErrorStatus, CallData)> {
    ipc::poll_reply(call_id)
}

pub fn answer(task: &Arc<Task>, call_id: CallId, retval: ErrorStatus, args: [usize; 5]) -> KResult<()> {
    ipc::answer(task, call_id, retval, args)
}

pub fn forward(source: &Arc<Answerbox>, call_id: CallId, new_phone: &Arc<Phone>, new_method: u32) -> KResult<()> {
    ipc::forward(source, call_id, new_phone, new_method)
}

pub fn accept(answerbox: &Arc<Answerbox>) -> Option<Arc<crate::ipc::call::Call>> {
    answerbox.receive()
}

pub fn wait_for_call(answerbox: &Arc<Answerbox>, waiter: &Arc<Thread>) -> SleepResult {
    answerbox.wait_for_call(waiter)
}

pub fn poll_notifications(answerbox: &Arc<Answerbox>) -> Option<Arc<crate::ipc::call::Call>> {
    answerbox.poll_notification()
}
