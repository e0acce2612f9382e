//! The Capability family (spec.md §6): create/destroy a handle, and
//! publish-endpoint — a task advertises that its answerbox serves a given
//! interface so another task's `phone_connect` has something to look up
//! by `InterfaceId` rather than an out-of-band name service (out of
//! scope). Backed by the same generation-counted arena pattern as phones
//! and calls (spec.md §9's "pointer-rich kernel object graphs" note).

use alloc::sync::Arc;

use abi::interface::InterfaceId;

use crate::{ipc::answerbox::Answerbox, utils::locks::RwLock, ErrorStatus, KResult};

pub enum CapabilityKind {}
pub type CapabilityId = utils::id::Id<CapabilityKind>;

struct Capability {
    answerbox: Arc<Answerbox>,
    interface: InterfaceId,
}

lazy_static::lazy_static! {
    static ref CAPABILITIES: crate::arena::Arena<Capability, CapabilityKind> = crate::arena::Arena::new();
    static ref ENDPOINTS: RwLock<alloc::collections::BTreeMap<u32, Arc<Answerbox>>> = RwLock::new(alloc::collections::BTreeMap::new());
}

pub fn create(answerbox: Arc<Answerbox>, interface: InterfaceId) -> CapabilityId {
    CAPABILITIES.insert(Capability { answerbox, interface })
}

pub fn destroy(id: CapabilityId) -> bool {
    CAPABILITIES.remove(id).is_some()
}

/// Advertises `answerbox` as the handler for `interface`; a later
/// `phone_connect` by interface id resolves through [`lookup_endpoint`]
/// instead of requiring the caller to already hold the target's
/// answerbox.
pub fn publish_endpoint(interface: InterfaceId, answerbox: Arc<Answerbox>) {
    ENDPOINTS.write().insert(interface.into_bits(), answerbox);
}

pub fn lookup_endpoint(interface: InterfaceId) -> KResult<Arc<Answerbox>> {
    ENDPOINTS
        .read()
        .get(&interface.into_bits())
        .cloned()
        .ok_or(ErrorStatus::NoSuchEntry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
    use abi::interface::ExchangeMgmt;
    use utils::id::Id;

    #[test_case]
    fn publish_then_lookup_round_trips() {
        let abox = Arc::new(Answerbox::new(Id::new(0, 0)));
        let iface = InterfaceId::new_tagged(*b"vfs0", ExchangeMgmt::Serialize, false);
        publish_endpoint(iface, abox.clone());
        assert!(Arc::ptr_eq(&lookup_endpoint(iface).unwrap(), &abox));
        let _ = TaskId::new(0, 0);
    }

    #[test_case]
    fn create_then_destroy_round_trips() {
        let abox = Arc::new(Answerbox::new(Id::new(0, 0)));
        let iface = InterfaceId::new_tagged(*b"abcd", ExchangeMgmt::Atomic, false);
        let id = create(abox, iface);
        assert!(destroy(id));
        assert!(!destroy(id));
    }
}
