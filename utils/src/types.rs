//! Bounded name/string types, carried over from the teacher's
//! `HeaplessString<N>` wrapper so task, phone, and session names stay
//! allocation-free and fixed-size across the syscall boundary.

use core::{borrow::Borrow, ops::Deref};

use crate::consts;

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeaplessString<const N: usize>(heapless::String<N>);

impl<const N: usize> Borrow<str> for HeaplessString<N> {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<const N: usize> Deref for HeaplessString<N> {
    type Target = heapless::String<N>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> HeaplessString<N> {
    /// Creates a new [`HeaplessString<N>`] from a static str, panics if
    /// the string is longer than `N`.
    pub fn new_const(str: &'static str) -> Self {
        let inner =
            heapless::String::try_from(str).expect("HeaplessString::new_const: str too long");
        Self(inner)
    }
}

impl<const N: usize> From<heapless::String<N>> for HeaplessString<N> {
    fn from(value: heapless::String<N>) -> Self {
        Self(value)
    }
}

impl<'a, const N: usize> TryFrom<&'a str> for HeaplessString<N> {
    type Error = ();
    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Ok(heapless::String::try_from(value).map_err(|_| ())?.into())
    }
}

/// Display name for a task, phone, or session; bounded so it can sit
/// inline in a kernel object without an allocation.
pub type Name = HeaplessString<{ consts::MAX_NAME_LENGTH }>;
