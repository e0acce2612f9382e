//! Generation-counted arena (spec.md §9's answer to "pointer-rich kernel
//! object graphs with cycles"): every kernel object kind that can be
//! referenced from more than one owner is stored here and looked up by a
//! stable [`utils::id::Id`] instead of a pointer. Slot reuse is delegated
//! to the `slab` crate; the generation counter layered on top is what lets
//! [`Arena::get`]/[`Arena::remove`] reject a stale id from a freed-and-reused
//! slot instead of silently aliasing a new object.

use alloc::vec::Vec;
use core::marker::PhantomData;

use slab::Slab;
use utils::id::Id;

use crate::utils::locks::RwLock;

pub struct Arena<T, Kind> {
    slots: RwLock<Slab<T>>,
    generations: RwLock<Vec<u32>>,
    _kind: PhantomData<fn() -> Kind>,
}

impl<T, Kind> Arena<T, Kind> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slab::new()),
            generations: RwLock::new(Vec::new()),
            _kind: PhantomData,
        }
    }

    pub fn insert(&self, value: T) -> Id<Kind> {
        let mut slots = self.slots.write();
        let index = slots.insert(value);
        let mut generations = self.generations.write();
        if generations.len() <= index {
            generations.resize(index + 1, 0);
        }
        Id::new(index as u32, generations[index])
    }

    /// Inserts a value that needs to know its own [`Id`] up front (e.g. a
    /// `Task` whose embedded `Answerbox` is constructed with the task's
    /// id). Reserves the slot first via `slab`'s vacant-entry API, then
    /// builds the value from the id before occupying it.
    pub fn insert_with(&self, f: impl FnOnce(Id<Kind>) -> T) -> Id<Kind> {
        let mut slots = self.slots.write();
        let entry = slots.vacant_entry();
        let index = entry.key();
        let mut generations = self.generations.write();
        if generations.len() <= index {
            generations.resize(index + 1, 0);
        }
        let id = Id::new(index as u32, generations[index]);
        drop(generations);
        entry.insert(f(id));
        id
    }

    /// Removes and returns the object `id` refers to, or `None` if `id`'s
    /// generation no longer matches (the slot was freed and reused, or was
    /// never occupied).
    pub fn remove(&self, id: Id<Kind>) -> Option<T> {
        let index = id.index() as usize;
        let mut generations = self.generations.write();
        if generations.get(index).copied() != Some(id.generation()) {
            return None;
        }
        let mut slots = self.slots.write();
        if !slots.contains(index) {
            return None;
        }
        let value = slots.remove(index);
        generations[index] = generations[index].wrapping_add(1);
        Some(value)
    }

    pub fn get<R>(&self, id: Id<Kind>, f: impl FnOnce(&T) -> R) -> Option<R> {
        if self.generations.read().get(id.index() as usize).copied() != Some(id.generation()) {
            return None;
        }
        self.slots.read().get(id.index() as usize).map(f)
    }

    pub fn get_mut<R>(&self, id: Id<Kind>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if self.generations.read().get(id.index() as usize).copied() != Some(id.generation()) {
            return None;
        }
        self.slots.write().get_mut(id.index() as usize).map(f)
    }

    pub fn contains(&self, id: Id<Kind>) -> bool {
        self.generations.read().get(id.index() as usize).copied() == Some(id.generation())
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, Kind> Default for Arena<T, Kind> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Widget {}

    #[test_case]
    fn stale_id_rejected_after_removal() {
        let arena: Arena<u32, Widget> = Arena::new();
        let id = arena.insert(7);
        assert_eq!(arena.get(id, |v| *v), Some(7));
        assert_eq!(arena.remove(id), Some(7));
        assert_eq!(arena.get(id, |v| *v), None);

        let reused = arena.insert(9);
        assert_eq!(reused.index(), id.index());
        assert_ne!(reused.generation(), id.generation());
        assert_eq!(arena.get(id, |v| *v), None);
        assert_eq!(arena.get(reused, |v| *v), Some(9));
    }
}
