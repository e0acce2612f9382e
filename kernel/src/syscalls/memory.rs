//! The Memory family (spec.md §6, component D): area create/resize/
//! destroy/change-flags/share, operating on the calling task's own
//! address space plus, for `area_share`, a second resolved task.

use alloc::sync::Arc;

use crate::{
    memory::{
        as_::{AddressSpaceArea, AreaFlags, Backend},
        VirtAddr,
    },
    task::Task,
    KResult,
};

pub fn area_create(task: &Arc<Task>, base: VirtAddr, pages: usize, access: AreaFlags, attrs: AreaFlags) -> KResult<Arc<AddressSpaceArea>> {
    task.address_space.area_create(base, pages, access, attrs, Backend::Anon)
}

pub fn area_destroy(task: &Arc<Task>, base: VirtAddr) -> KResult<()> {
    task.address_space.area_destroy(base)
}

pub fn area_resize(task: &Arc<Task>, base: VirtAddr, new_pages: usize) -> KResult<()> {
    task.address_space.area_resize(base, new_pages)
}

pub fn area_change_flags(task: &Arc<Task>, base: VirtAddr, access: AreaFlags) -> KResult<()> {
    task.address_space.area_change_flags(base, access)
}

pub fn area_share(src: &Arc<Task>, base: VirtAddr, dst: &Arc<Task>, dst_base: VirtAddr, access: AreaFlags) -> KResult<Arc<AddressSpaceArea>> {
    src.address_space.area_share(base, &dst.address_space, dst_base, access)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::{AddressSpace, AsFlags};
    use crate::task::{spawn_task, Permissions};
    use utils::types::Name;

    fn test_task(name: &'static str) -> Arc<Task> {
        crate::config::init_for_tests();
        let r#as = AddressSpace::create(AsFlags::empty());
        spawn_task(Name::new_const(name), r#as, Permissions::all())
    }

    #[test_case]
    fn area_create_then_destroy_round_trips() {
        let task = test_task("mem-syscall");
        let base = VirtAddr::from(0x4000);
        area_create(&task, base, 4, AreaFlags::READ | AreaFlags::WRITE, AreaFlags::empty()).unwrap();
        assert!(task.address_space.area_info(base).is_some());
        area_destroy(&task, base).unwrap();
        assert!(task.address_space.area_info(base).is_none());
    }

    #[test_case]
    fn area_share_creates_twin_in_destination() {
        let src = test_task("mem-share-src");
        let dst = test_task("mem-share-dst");
        let base = VirtAddr::from(0x8000);
        area_create(&src, base, 2, AreaFlags::READ | AreaFlags::WRITE, AreaFlags::empty()).unwrap();

        let dst_base = VirtAddr::from(0x9000);
        area_share(&src, base, &dst, dst_base, AreaFlags::READ).unwrap();
        assert!(dst.address_space.area_info(dst_base).is_some());
    }
}
