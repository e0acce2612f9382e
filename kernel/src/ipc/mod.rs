//! The IPC kernel core (component G, spec.md §4.6): phones, answerboxes,
//! call routing, and forwarding. The free functions here are the
//! operations a syscall handler (`kernel::syscalls`) calls into; the
//! types in `phone`/`answerbox`/`call` hold the state they operate on.

pub mod answerbox;
pub mod call;
pub mod interface;
pub mod phone;

use alloc::sync::Arc;

use abi::call::{CallData, CallFlags};

use crate::{
    ipc::{
        answerbox::Answerbox,
        call::{Call, CallId},
        phone::{Phone, PhoneId},
    },
    task::{Task, TaskId, Thread},
    ErrorStatus, KResult,
};

lazy_static::lazy_static! {
    static ref CALLS: crate::arena::Arena<Arc<Call>, call::CallKind> = crate::arena::Arena::new();
}

/// `phone_connect(target)`: allocates a fresh phone owned by `task` and
/// connects it to `target`'s answerbox.
pub fn phone_connect(task: &Arc<Task>, target: Arc<Answerbox>) -> KResult<Arc<Phone>> {
    let mut result = None;
    phone::PHONES.insert_with(|id| {
        let phone = Arc::new(Phone::new(id, task.id));
        result = Some(phone.clone());
        phone
    });
    let phone = result.expect("insert_with always calls its closure");
    phone.connect(target)?;
    task.add_phone(phone.id);
    Ok(phone)
}

/// `hangup(phone)`: spec.md §4.6 — any calls still in flight over the
/// phone are answered with `EHANGUP`, and further sends are rejected.
/// CORE resolves this by synthesizing replies only for the calls *this
/// phone* has in flight, not the whole target answerbox (a phone is one
/// of potentially many connections into that answerbox).
pub fn phone_hangup(task: &Arc<Task>, phone: &Arc<Phone>) {
    if let Some(target) = phone.hangup() {
        target.hangup_phone(phone.id);
        task.remove_phone(phone.id);
    }
}

/// `call-sync`: enqueues a call and blocks `caller` until it is answered
/// or the phone hangs up mid-flight.
pub fn call_sync(
    caller_task: TaskId,
    phone: &Arc<Phone>,
    caller_thread: &Arc<Thread>,
    method: u32,
    args: [usize; 5],
) -> KResult<[usize; 5]> {
    let call = new_call(caller_task, phone, method, args, CallFlags::empty())?;
    call.wait_for_reply(caller_thread);
    let (retval, reply) = call.reply().ok_or(ErrorStatus::Generic)?;
    if retval.is_ok() {
        Ok(reply.args)
    } else {
        Err(retval)
    }
}

/// `call-async`: enqueues a call and returns a handle immediately; the
/// caller later polls `poll_reply`.
pub fn call_async(caller_task: TaskId, phone: &Arc<Phone>, method: u32, args: [usize; 5]) -> KResult<CallId> {
    let call = new_call(caller_task, phone, method, args, CallFlags::empty())?;
    Ok(call.id)
}

pub fn poll_reply(call_id: CallId) -> Option<(ErrorStatus, CallData)> {
    CALLS.get(call_id, |c| c.clone())?.reply()
}

/// One-way notification (spec.md §4.6): no reply is ever produced.
pub fn notify(phone: &Arc<Phone>, method: u32, args: [usize; 5]) -> KResult<()> {
    new_call(phone.owner_task, phone, method, args, CallFlags::NOTIFICATION).map(|_| ())
}

fn new_call(
    caller_task: TaskId,
    phone: &Arc<Phone>,
    method: u32,
    args: [usize; 5],
    flags: CallFlags,
) -> KResult<Arc<Call>> {
    phone.begin_call()?;
    let Some(answerbox) = phone.target() else {
        phone.end_call();
        return Err(ErrorStatus::Hangup);
    };

    let mut result = None;
    CALLS.insert_with(|id| {
        let call = Arc::new(Call::new(id, caller_task, phone.id, CallData::new(method, args), flags));
        result = Some(call.clone());
        call
    });
    let call = result.expect("insert_with always calls its closure");

    if flags.contains(CallFlags::NOTIFICATION) {
        answerbox.enqueue_notification(call.clone());
    } else {
        answerbox.enqueue_call(call.clone());
    }
    phone.end_call();
    Ok(call)
}

/// `answer(call, retval, args)`.
pub fn answer(task: &Arc<Task>, call_id: CallId, retval: ErrorStatus, args: [usize; 5]) -> KResult<()> {
    if task.answerbox.answer(call_id, retval, args) {
        Ok(())
    } else {
        Err(ErrorStatus::NoSuchEntry)
    }
}

/// `forward(call, new_phone)`: spec.md §4.6 — the method is rewritten,
/// the original sender preserved, and the call re-enqueued on the new
/// destination. If the new phone is concurrently hung up, CORE chooses
/// (per spec.md §9's Open Question) to bounce the call back to the
/// forwarder with `EHANGUP` rather than silently drop it, so the
/// forwarder (not the original caller) observes and can log the failure.
pub fn forward(source_answerbox: &Arc<Answerbox>, call_id: CallId, new_phone: &Arc<Phone>, new_method: u32) -> KResult<()> {
    let Some(call) = source_answerbox.take_dispatched(call_id) else {
        return Err(ErrorStatus::NoSuchEntry);
    };

    let Some(target) = new_phone.target() else {
        // Destination concurrently hung up: bounce the call back to the
        // forwarder with EHANGUP instead of silently dropping it (the
        // Open Question spec.md §9 leaves unresolved; DESIGN.md records
        // this choice).
        call.hangup_reply();
        return Err(ErrorStatus::Hangup);
    };

    call.forward_to(new_method, new_phone.id);
    target.enqueue_call(call);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::{AddressSpace, AsFlags};
    use crate::task::{spawn_task, spawn_thread, Permissions};
    use utils::types::Name;

    fn new_task(name: &'static str) -> Arc<Task> {
        let r#as = AddressSpace::create(AsFlags::empty());
        spawn_task(Name::new_const(name), r#as, Permissions::all())
    }

    /// Scenario 1 (spec.md §8 "Ping"): A sends method=42 args=(7,8); B
    /// receives, answers with retval=15 args=(15,); A's call returns
    /// EOK/15. Exactly one call sits in B's answerbox mid-flight, zero at
    /// the end.
    #[test_case]
    fn ping_round_trip() {
        crate::config::init_for_tests();
        let a = new_task("ping-a");
        let b = new_task("ping-b");
        let a_thread = spawn_thread(&a, 0);

        let phone = phone_connect(&a, b.answerbox.clone()).unwrap();
        assert_eq!(b.answerbox.pending_call_count(), 0);

        let call = new_call(a.id, &phone, 42, [7, 8, 0, 0, 0], CallFlags::empty()).unwrap();
        assert_eq!(b.answerbox.pending_call_count(), 1);

        let received = b.answerbox.receive().unwrap();
        assert_eq!(received.id, call.id);
        assert_eq!(received.data().args[0], 7);
        assert_eq!(b.answerbox.pending_call_count(), 0);

        answer(&b, received.id, ErrorStatus::Ok, [15, 0, 0, 0, 0]).unwrap();
        call.wait_for_reply(&a_thread);
        let (retval, reply) = call.reply().unwrap();
        assert_eq!(retval, ErrorStatus::Ok);
        assert_eq!(reply.args[0], 15);
        assert_eq!(b.answerbox.dispatched_count(), 0);
    }

    /// Scenario 2: A sends async on `p`, hangs up `p` before B answers;
    /// B's `answer` is a no-op, A observes EHANGUP. `phone_hangup` alone
    /// must synthesize the reply — the answerbox itself is never hung up
    /// here, so this exercises the phone-hangup path in isolation from
    /// `hangup_all`.
    #[test_case]
    fn hangup_with_in_flight_call_synthesizes_ehangup() {
        crate::config::init_for_tests();
        let a = new_task("hangup-a");
        let b = new_task("hangup-b");

        let phone = phone_connect(&a, b.answerbox.clone()).unwrap();
        let call_id = call_async(a.id, &phone, 1, [0; 5]).unwrap();
        b.answerbox.receive();
        assert_eq!(b.answerbox.dispatched_count(), 1);

        phone_hangup(&a, &phone);

        assert_eq!(b.answerbox.dispatched_count(), 0);
        assert!(!b.answerbox.is_hungup());
        assert!(answer(&b, call_id, ErrorStatus::Ok, [0; 5]).is_err());
        let (retval, _) = poll_reply(call_id).unwrap();
        assert_eq!(retval, ErrorStatus::Hangup);
    }

    /// A call still sitting unreceived in the incoming queue at hangup
    /// time must also resolve to EHANGUP — not just dispatched calls.
    #[test_case]
    fn hangup_resolves_undispatched_call_too() {
        crate::config::init_for_tests();
        let a = new_task("hangup-undispatched-a");
        let b = new_task("hangup-undispatched-b");

        let phone = phone_connect(&a, b.answerbox.clone()).unwrap();
        let call_id = call_async(a.id, &phone, 1, [0; 5]).unwrap();
        assert_eq!(b.answerbox.pending_call_count(), 1);

        phone_hangup(&a, &phone);

        assert_eq!(b.answerbox.pending_call_count(), 0);
        let (retval, _) = poll_reply(call_id).unwrap();
        assert_eq!(retval, ErrorStatus::Hangup);
    }
}
