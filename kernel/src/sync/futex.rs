//! Futexes (spec.md §4.5): a kernel wait queue addressed by a user-virtual
//! address key, gated by the caller re-checking a user-space word before
//! parking — the fast path (`*uaddr != expected`) never touches the
//! kernel at all in a real port; CORE models the re-check itself since it
//! has no real user-address-space memory to peek at here.

use alloc::sync::Arc;
use hashbrown::HashMap;

use crate::{
    sync::wait_queue::{SleepResult, WaitQueue, WakeupMode},
    task::Thread,
    utils::locks::Mutex,
};

/// A user-virtual-address key. CORE treats it opaquely; resolving it to a
/// physical frame so two tasks sharing memory can futex on the same
/// address is an address-space-manager concern the syscall layer performs
/// before reaching here (out of this module's scope).
pub type FutexKey = usize;

struct Bucket {
    queues: Mutex<HashMap<FutexKey, Arc<WaitQueue>>>,
}

impl Bucket {
    const fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn queue_for(&self, key: FutexKey) -> Arc<WaitQueue> {
        self.queues
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(WaitQueue::new()))
            .clone()
    }
}

pub struct FutexTable {
    buckets: alloc::vec::Vec<Bucket>,
}

impl FutexTable {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: (0..bucket_count.max(1)).map(|_| Bucket::new()).collect(),
        }
    }

    fn bucket(&self, key: FutexKey) -> &Bucket {
        &self.buckets[key % self.buckets.len()]
    }

    /// `futex_wait(uaddr, expected, deadline)`: the caller has already
    /// re-read `*uaddr`, so `matches_expected` is that comparison's
    /// result. A mismatch returns immediately without ever touching the
    /// wait queue (spec.md §4.5's "not equal -> return immediately").
    pub fn wait(
        &self,
        key: FutexKey,
        matches_expected: bool,
        thread: &Arc<Thread>,
        deadline: Option<u64>,
    ) -> Option<SleepResult> {
        if !matches_expected {
            return None;
        }
        let wq = self.bucket(key).queue_for(key);
        Some(wq.sleep(thread, deadline))
    }

    /// `futex_wake(uaddr, n)`: wakes up to `n` waiters, returning how many
    /// actually were.
    pub fn wake(&self, key: FutexKey, n: usize) -> usize {
        let wq = self.bucket(key).queue_for(key);
        let mut woken = 0;
        for _ in 0..n {
            if wq.wakeup(WakeupMode::First) == 0 {
                break;
            }
            woken += 1;
        }
        woken
    }
}

lazy_static::lazy_static! {
    pub static ref FUTEX_TABLE: spin::Once<FutexTable> = spin::Once::new();
}

pub fn init() {
    FUTEX_TABLE.call_once(|| FutexTable::new(crate::config::get().futex_hash_buckets));
}

pub fn table() -> &'static FutexTable {
    FUTEX_TABLE
        .get()
        .expect("futex::init must run before the futex table is used")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::as_::{AddressSpace, AsFlags};
    use crate::task::{spawn_task, spawn_thread, Permissions};
    use utils::types::Name;

    #[test_case]
    fn mismatched_value_never_blocks() {
        crate::config::init_for_tests();
        let r#as = AddressSpace::create(AsFlags::empty());
        let task = spawn_task(Name::new_const("futex-test"), r#as, Permissions::all());
        let thread = spawn_thread(&task, 0);

        let table = FutexTable::new(4);
        assert_eq!(table.wait(0x1000, false, &thread, None), None);
    }

    #[test_case]
    fn wake_counts_only_actual_waiters() {
        crate::config::init_for_tests();
        let table = FutexTable::new(4);
        assert_eq!(table.wake(0x2000, 3), 0);
    }
}
