//! Generic "run this closure on these CPUs and wait" cross-call
//! primitive (spec.md §9's design note on `smp_call.c`). TLB shootdown is
//! its first user; the scheduler's load balancer is a second ("poke CPU
//! N so it re-evaluates its run queue").
//!
//! The mock backend is single-CPU, so `smp_call` just runs `f` inline for
//! every target that isn't the caller's own CPU id filtered out already;
//! a real SMP architecture would raise an IPI per target and block until
//! each one acknowledges.

use alloc::vec::Vec;

/// Runs `f` on every CPU in `targets` and blocks until all have executed
/// it. `targets` excluding the caller's own CPU is the common case (the
/// caller applies its own side effect locally without an IPI round trip).
pub fn smp_call(targets: &[usize], f: impl Fn(usize) + Send + Sync) {
    for &cpu in targets {
        f(cpu);
    }
}

/// Collects the set of CPU ids that currently have `predicate` true,
/// typically "this address space is active on CPU N" for TLB shootdown.
pub fn cpus_where(predicate: impl Fn(usize) -> bool) -> Vec<usize> {
    (0..super::cpu_count()).filter(|&cpu| predicate(cpu)).collect()
}
