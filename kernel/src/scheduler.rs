//! The scheduler (component F, spec.md §4.5): per-CPU multi-level
//! feedback run queues, `as_switch` on address-space change, and a
//! `kcpulb`-style periodic load balancer.
//!
//! Priority 0 is highest (picked first); a thread that exhausts its
//! quantum without blocking is lowered a level, one that blocks early is
//! raised back up, exactly as spec.md §4.5 describes.

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};

use spin::Once;

use crate::{
    memory::as_::{self, AddressSpace},
    task::{lookup_task, Thread, ThreadState},
    utils::locks::Mutex,
};

struct PerCpu {
    /// `levels[p]` is the ready queue for priority `p`; the whole set
    /// shares one spinlock (spec.md §4.5: "each per-CPU queue has its own
    /// spinlock"; here the per-CPU queue is the `Vec` of levels, not each
    /// level individually, which is sufficient since only this CPU's
    /// scheduling point and the global load balancer ever touch it).
    levels: Mutex<Vec<VecDeque<Arc<Thread>>>>,
    current: Mutex<Option<Arc<Thread>>>,
    ready_count: core::sync::atomic::AtomicUsize,
    /// The address space last switched to on this CPU, compared against
    /// the picked thread's own address space every [`schedule`] call
    /// (spec.md §4.5 step 4: "call `as_switch` if its address space
    /// differs from the one active on this CPU").
    active_as: Mutex<Option<Arc<AddressSpace>>>,
}

impl PerCpu {
    fn new(levels: usize) -> Self {
        Self {
            levels: Mutex::new((0..levels).map(|_| VecDeque::new()).collect()),
            current: Mutex::new(None),
            ready_count: core::sync::atomic::AtomicUsize::new(0),
            active_as: Mutex::new(None),
        }
    }
}

static CPUS: Once<Vec<PerCpu>> = Once::new();

fn cpus() -> &'static Vec<PerCpu> {
    CPUS.call_once(|| {
        let cfg = crate::config::get();
        (0..cfg.cpu_count.max(1))
            .map(|_| PerCpu::new(cfg.run_queue_levels.max(1)))
            .collect()
    })
}

fn this_cpu() -> &'static PerCpu {
    &cpus()[crate::arch::current_cpu_id() % cpus().len()]
}

fn cpu(id: usize) -> &'static PerCpu {
    &cpus()[id % cpus().len()]
}

pub struct Scheduler;

impl Scheduler {
    /// Boots the scheduler on every configured CPU. Entirely data-plane:
    /// it prepares the run queues so [`enqueue`]/[`schedule`] work; the
    /// actual "jump into the first thread's context" step is architecture
    /// assembly out of CORE's scope (spec.md §1), left to the real `arch`
    /// backend a port would supply in place of `arch::mock`.
    pub fn init() {
        let _ = cpus();
        crate::logln!("scheduler: {} cpu(s), {} priority levels", crate::config::get().cpu_count, crate::config::get().run_queue_levels);
    }
}

/// Enqueues `thread` (now `Ready`) onto the run queue matching its
/// current priority on its affine CPU, or the least-loaded CPU if it has
/// none (spec.md §4.5 step 2, and the entry point a `WaitQueue::wakeup`
/// uses).
pub fn enqueue(thread: &Arc<Thread>) {
    thread.set_state(ThreadState::Ready);
    let target = thread.affinity().unwrap_or_else(least_loaded_cpu);
    let pc = cpu(target);
    let level = thread.priority().min(pc.levels.lock().len() - 1);
    pc.levels.lock()[level].push_back(thread.clone());
    pc.ready_count.fetch_add(1, core::sync::atomic::Ordering::AcqRel);
}

fn least_loaded_cpu() -> usize {
    cpus()
        .iter()
        .enumerate()
        .min_by_key(|(_, pc)| pc.ready_count.load(core::sync::atomic::Ordering::Relaxed))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Marks the currently-running `thread` as blocked and clears it from
/// `current` so [`schedule`] doesn't try to re-enqueue it (it is not
/// re-picked while `Sleeping`). Called by `WaitQueue::sleep` before it
/// parks the thread. `ready_count` is untouched: a running thread was
/// already removed from it when [`schedule`] originally picked it, so
/// there is nothing left to subtract here.
pub fn block_current(thread: &Arc<Thread>) {
    thread.set_state(ThreadState::Sleeping);
    let pc = this_cpu();
    let mut current = pc.current.lock();
    if current.as_ref().map(|t| t.id) == Some(thread.id) {
        *current = None;
    }
}

/// `yield_now`: voluntary preemption point, used by the lock-acquire spin
/// loop (`utils::locks`) once it has spun long enough that it should let
/// something else run. In the mock model there is nothing else to
/// actually context-switch to, so this degrades to re-running the
/// scheduling decision (spec.md §4.5 steps 1-3) over whatever is ready.
pub fn yield_now() {
    schedule(crate::arch::current_cpu_id());
}

/// One scheduling decision (spec.md §4.5): if the previously running
/// thread is still `Ready`, re-enqueue it at its current level; pick the
/// highest-priority non-empty queue; mark the winner `Running`; call
/// `as_switch` if its address space differs from the one active on this
/// CPU. Returns the thread chosen, if any.
pub fn schedule(cpu_id: usize) -> Option<Arc<Thread>> {
    let pc = cpu(cpu_id);
    let prev = pc.current.lock().take();
    if let Some(prev) = &prev
        && prev.state() == ThreadState::Ready
    {
        let level = prev.priority().min(pc.levels.lock().len() - 1);
        pc.levels.lock()[level].push_back(prev.clone());
    }

    let mut levels = pc.levels.lock();
    let picked = levels.iter_mut().find_map(|q| q.pop_front());
    drop(levels);

    if let Some(thread) = &picked {
        pc.ready_count.fetch_sub(1, core::sync::atomic::Ordering::AcqRel);
        thread.set_state(ThreadState::Running);
        thread.account_tick();
        if let Some(task) = lookup_task(thread.task) {
            let mut active = pc.active_as.lock();
            as_::as_switch(active.as_ref(), &task.address_space);
            *active = Some(task.address_space.clone());
        }
        *pc.current.lock() = Some(thread.clone());
    }
    picked
}

pub fn current_thread() -> Option<Arc<Thread>> {
    this_cpu().current.lock().clone()
}

pub fn ready_count(cpu_id: usize) -> usize {
    cpu(cpu_id).ready_count.load(core::sync::atomic::Ordering::Relaxed)
}

/// The `kcpulb` per-CPU load balancer fibril (spec.md §4.5): if a
/// neighbor has at least `threshold` more ready threads, migrate excess
/// unpinned threads whose affinity allows it. Runs periodically (driven
/// by whatever timer the arch layer exposes, out of CORE's synchronous
/// test surface); exposed as a plain function so tests can call it
/// directly after manufacturing an imbalance.
pub fn load_balance(cpu_id: usize) -> usize {
    let threshold = crate::config::get().load_balance_threshold;
    let mine = ready_count(cpu_id);
    let mut migrated = 0;

    for (other_id, other) in cpus().iter().enumerate() {
        if other_id == cpu_id {
            continue;
        }
        let their_count = other.ready_count.load(core::sync::atomic::Ordering::Relaxed);
        if their_count < mine + threshold {
            continue;
        }

        // Lock in address order to avoid deadlocking with a peer CPU
        // balancing the other way (spec.md §4.5).
        let (first, second) = if (other as *const PerCpu as usize) < (cpu(cpu_id) as *const PerCpu as usize) {
            (other, cpu(cpu_id))
        } else {
            (cpu(cpu_id), other)
        };
        let mut first_levels = first.levels.lock();
        let mut second_levels = second.levels.lock();

        let (src_levels, dst_levels) = if core::ptr::eq(first, other) {
            (&mut first_levels, &mut second_levels)
        } else {
            (&mut second_levels, &mut first_levels)
        };

        for level in src_levels.iter_mut() {
            let movable: Vec<usize> = level
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_pinned() && t.affinity().is_none())
                .map(|(i, _)| i)
                .collect();
            for &idx in movable.iter().take(1) {
                if let Some(thread) = level.remove(idx) {
                    let dst_level = thread.priority().min(dst_levels.len() - 1);
                    dst_levels[dst_level].push_back(thread);
                    migrated += 1;
                }
            }
            if migrated > 0 {
                break;
            }
        }

        if migrated > 0 {
            other.ready_count.fetch_sub(migrated, core::sync::atomic::Ordering::AcqRel);
            cpu(cpu_id).ready_count.fetch_add(migrated, core::sync::atomic::Ordering::AcqRel);
            break;
        }
    }
    migrated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::{AddressSpace, AsFlags};
    use crate::task::{spawn_task, spawn_thread, Permissions};
    use utils::types::Name;

    fn test_task() -> Arc<crate::task::Task> {
        crate::config::init_for_tests();
        let r#as = AddressSpace::create(AsFlags::empty());
        spawn_task(Name::new_const("sched-test"), r#as, Permissions::all())
    }

    #[test_case]
    fn schedule_picks_highest_priority_first() {
        let task = test_task();
        let low = spawn_thread(&task, 5);
        let high = spawn_thread(&task, 0);
        enqueue(&low);
        enqueue(&high);

        let picked = schedule(0).expect("a thread is ready");
        assert_eq!(picked.id, high.id);
    }

    #[test_case]
    fn pinned_thread_is_never_migrated() {
        let task = test_task();
        let thread = spawn_thread(&task, 0);
        thread.pin();
        enqueue(&thread);
        let migrated = load_balance(1);
        assert_eq!(migrated, 0);
    }
}
