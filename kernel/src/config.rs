//! Boot-time configuration (spec.md §6 task map plus a small
//! `KernelConfig`), resolved once at `kernel::init`/`kstart` time the way
//! the teacher resolves `CPU_COUNT` via `lazy_static!` over the
//! bootloader's MP response. CORE has no on-disk configuration file —
//! it is a kernel, not a service.

use spin::Once;

#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub cpu_count: usize,
    /// Length of a scheduling quantum, in milliseconds.
    pub quantum_ms: u64,
    /// Number of priority levels in each per-CPU run queue (spec.md §4.5).
    pub run_queue_levels: usize,
    /// Number of buckets in the futex hash table (spec.md §4.5).
    pub futex_hash_buckets: usize,
    /// `kcpulb` wakes up this often, in milliseconds, to check neighbor
    /// run queues for load balancing.
    pub load_balance_interval_ms: u64,
    /// A neighbor CPU must have at least this many more ready threads
    /// than us before we migrate any of its threads.
    pub load_balance_threshold: usize,
}

impl KernelConfig {
    pub const fn default_single_cpu() -> Self {
        Self {
            cpu_count: 1,
            quantum_ms: 10,
            run_queue_levels: 8,
            futex_hash_buckets: 256,
            load_balance_interval_ms: 100,
            load_balance_threshold: 2,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::default_single_cpu()
    }
}

static CONFIG: Once<KernelConfig> = Once::new();

pub fn init(config: KernelConfig) {
    CONFIG.call_once(|| config);
}

/// Reads the resolved configuration. Panics if called before [`init`] —
/// a bug, not a runtime condition, since nothing should run before boot
/// configuration is resolved.
pub fn get() -> &'static KernelConfig {
    CONFIG
        .get()
        .expect("kernel::config::get called before kernel::config::init")
}

#[cfg(test)]
pub(crate) fn init_for_tests() {
    CONFIG.call_once(KernelConfig::default_single_cpu);
}
