//! Wait queues and futexes (component E, spec.md §4.5): the blocking
//! primitives every other component sleeps on — the scheduler's own
//! `kcpulb`, the IPC layer's synchronous call, and the address-space
//! manager's user-pager upcall all eventually bottom out in
//! [`wait_queue::WaitQueue`].

pub mod futex;
pub mod rwlock;
pub mod wait_queue;
