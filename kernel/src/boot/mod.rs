//! Boot-time task-map handoff (spec.md §6): the concrete shape behind
//! "the bootloader hands the kernel a list of unpacked ELF images and
//! their load addresses." CORE does not implement a bootloader — that is
//! a non-goal (spec.md §1) — but defines the interface precisely enough
//! that `original_source/boot/generic/src/payload.c`'s tar+gzip record
//! format and `generic/src/main/main.c`'s kinit handoff are representable
//! and testable without one.

pub mod payload;

use alloc::sync::Arc;

use abi::taskmap::{TaskMap, TaskMapEntry};
use utils::types::Name;

use crate::{
    memory::{
        as_::{AddressSpace, AreaFlags, AsFlags, Backend},
        PhysAddr, VirtAddr,
    },
    task::{self, Permissions, Task},
};

/// What an architecture/bootloader layer supplies the kernel at startup;
/// CORE is written against this trait rather than against a concrete
/// bootloader the way `kernel::arch` is written against `PageTable`
/// (spec.md §9's design notes: "CORE is written entirely against
/// traits"). `kernel::arch::mock` has no bootloader counterpart because
/// tests build a `TaskMap` by hand instead of parsing a real payload.
pub trait BootInfo {
    fn task_map(&self) -> &TaskMap;
}

/// Where in a payload's record order the kernel-first/ramdisk-last
/// convention (`kinit.c`) places each entry; not stored in the task map
/// itself (spec.md §6's record is just `{phys_addr, size, name}`), only
/// used while classifying records during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMapRole {
    Kernel,
    Task,
    Ramdisk,
}

/// Spawns one task per non-kernel entry of `map`, mapping each task's
/// unpacked image into its own fresh address space as a single
/// physically-backed area (spec.md's `Backend::Phys`: the loader has
/// already placed the bytes, CORE does not re-copy them). Mirrors
/// `kinit.c`'s loop building `program_t programs[CONFIG_INIT_TASKS]` from
/// the task map and creating one task per program.
///
/// The kernel's own record (`roles[0] == Kernel`, conventionally index 0)
/// is skipped: the kernel does not spawn itself as a task. A trailing
/// `Ramdisk` record, if `roles` marks one, is likewise skipped here —
/// CORE has no file system to hand it to (non-goal); a real port would
/// register it with whatever server owns that responsibility.
pub fn spawn_initial_tasks(map: &TaskMap, roles: &[TaskMapRole], permissions: Permissions) -> alloc::vec::Vec<Arc<Task>> {
    let mut spawned = alloc::vec::Vec::new();
    for (entry, role) in map.entries().iter().zip(roles.iter()) {
        if *role != TaskMapRole::Task {
            continue;
        }
        if let Some(task) = spawn_one(entry, permissions) {
            spawned.push(task);
        }
    }
    spawned
}

fn spawn_one(entry: &TaskMapEntry, permissions: Permissions) -> Option<Arc<Task>> {
    let name: Name = entry.name_str().try_into().unwrap_or_else(|_| Name::new_const("task"));
    crate::info!("boot: spawning {} ({} bytes at {:#x})", name.as_str(), entry.size, entry.phys_addr);

    let address_space = AddressSpace::create(AsFlags::empty());
    let pages = crate::memory::pages_for(entry.size as usize).max(1);
    address_space
        .area_create(
            VirtAddr::from(0x40_0000),
            pages,
            AreaFlags::READ | AreaFlags::WRITE | AreaFlags::EXECUTE | AreaFlags::USER,
            AreaFlags::empty(),
            Backend::Phys { base: PhysAddr::from(entry.phys_addr as usize) },
        )
        .ok()?;

    Some(task::spawn_task(name, address_space, permissions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::taskmap::{TaskMap, TaskMapEntry, BUFLEN};

    fn entry(name: &str, phys_addr: u64, size: u64) -> TaskMapEntry {
        let mut buf = [0u8; BUFLEN];
        let bytes = name.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        TaskMapEntry { phys_addr, size, name: buf }
    }

    #[test_case]
    fn spawns_one_task_per_non_kernel_non_ramdisk_entry() {
        crate::config::init_for_tests();
        let mut map = TaskMap::empty();
        assert!(map.push(entry("kernel", 0x1000, 0x2000)));
        assert!(map.push(entry("init", 0x4000, 0x1000)));
        assert!(map.push(entry("ramdisk.img", 0x6000, 0x8000)));

        let roles = [TaskMapRole::Kernel, TaskMapRole::Task, TaskMapRole::Ramdisk];
        let spawned = spawn_initial_tasks(&map, &roles, Permissions::all());

        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].name.as_str(), "init");
    }
}
