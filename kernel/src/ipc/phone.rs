//! Phones (spec.md §3, §4.6): one-directional IPC connection capabilities.
//! A phone transitions `FREE -> CONNECTING -> CONNECTED -> HUNGUP` (or
//! `SLAMMED` when the peer answerbox itself was torn down); the
//! active-calls counter is what lets hangup know whether outstanding
//! replies still need to drain.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use utils::id::Id;

use crate::{ipc::answerbox::Answerbox, task::TaskId, utils::locks::Mutex, ErrorStatus, KResult};

pub enum PhoneKind {}
pub type PhoneId = Id<PhoneKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneState {
    Free,
    Connecting,
    Connected,
    Hungup,
    /// The peer answerbox was destroyed out from under this phone.
    Slammed,
}

pub struct Phone {
    pub id: PhoneId,
    pub owner_task: TaskId,
    state: Mutex<PhoneState>,
    target: Mutex<Option<Arc<Answerbox>>>,
    active_calls: AtomicUsize,
}

impl Phone {
    pub(crate) fn new(id: PhoneId, owner_task: TaskId) -> Self {
        Self {
            id,
            owner_task,
            state: Mutex::new(PhoneState::Free),
            target: Mutex::new(None),
            active_calls: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> PhoneState {
        *self.state.lock()
    }

    pub fn target(&self) -> Option<Arc<Answerbox>> {
        self.target.lock().clone()
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    /// Connects this phone to `answerbox`; invariant (spec.md §3): only a
    /// `CONNECTED` phone may enqueue calls.
    pub(crate) fn connect(&self, answerbox: Arc<Answerbox>) -> KResult<()> {
        let mut state = self.state.lock();
        if *state != PhoneState::Free {
            return Err(ErrorStatus::InvalidArgument);
        }
        *state = PhoneState::Connecting;
        *self.target.lock() = Some(answerbox);
        *state = PhoneState::Connected;
        Ok(())
    }

    pub(crate) fn begin_call(&self) -> KResult<()> {
        if self.state() != PhoneState::Connected {
            return Err(ErrorStatus::Hangup);
        }
        self.active_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn end_call(&self) {
        self.active_calls.fetch_sub(1, Ordering::AcqRel);
    }

    /// `hangup(phone)`: transitions to `HUNGUP`; further sends are
    /// rejected but outstanding replies still drain (spec.md §3). Returns
    /// the answerbox so the caller can synthesize `EHANGUP` on every call
    /// still in flight from this phone, dispatched or not.
    pub(crate) fn hangup(&self) -> Option<Arc<Answerbox>> {
        let mut state = self.state.lock();
        if *state == PhoneState::Hungup || *state == PhoneState::Slammed {
            return None;
        }
        *state = PhoneState::Hungup;
        self.target.lock().clone()
    }

    pub(crate) fn slam(&self) {
        *self.state.lock() = PhoneState::Slammed;
        *self.target.lock() = None;
    }
}

lazy_static::lazy_static! {
    pub static ref PHONES: crate::arena::Arena<Arc<Phone>, PhoneKind> = crate::arena::Arena::new();
}

pub fn lookup(id: PhoneId) -> Option<Arc<Phone>> {
    PHONES.get(id, |p| p.clone())
}
