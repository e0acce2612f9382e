//! The custom `#[test_case]` harness (spec.md §9's test-tooling note),
//! kept in the teacher's shape: tests are ordered so architecture-layer
//! assumptions fail first, `memory` second, everything else after, and
//! this module's own tests dead last. Unlike the teacher, CORE has no
//! userspace binary or VFS to spawn a test script against, so there is no
//! equivalent of `userspace_test_script` here.

use core::any::type_name;

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        $crate::logln_ext!("test", 92, $($arg)*)
    };
}

pub trait Testable {
    fn run(&self);

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    fn priority(&self) -> TestPriority {
        priority_for(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestPriority {
    /// `crate::arch` tests run first to fail fast on a broken mock backend.
    Highest,
    /// `crate::memory` tests: everything else depends on frames/areas working.
    High,
    Medium,
    /// This module's own tests, run dead last.
    Lowest,
}

fn priority_for(name: &str) -> TestPriority {
    if name.contains("::test::") {
        TestPriority::Lowest
    } else if name.contains("::arch::") {
        TestPriority::Highest
    } else if name.contains("::memory::") {
        TestPriority::High
    } else {
        TestPriority::Medium
    }
}

impl<T: Fn()> Testable for T {}

pub fn test_runner(tests: &[&dyn Testable]) {
    let mut ordered: alloc::vec::Vec<&&dyn Testable> = tests.iter().collect();
    ordered.sort_by_key(|t| t.priority() as u8);

    test_log!("running {} test(s)", ordered.len());
    for test in ordered {
        test_log!("running \x1B[90m{}\x1B[0m...", test.name());
        test.run();
    }
    test_log!("all tests passed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn ordering_places_arch_before_memory_before_the_rest() {
        assert!(TestPriority::Highest < TestPriority::High);
        assert!(TestPriority::High < TestPriority::Medium);
        assert!(TestPriority::Medium < TestPriority::Lowest);
    }
}
