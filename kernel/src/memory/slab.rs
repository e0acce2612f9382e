//! The slab/heap layer (component B, spec.md §4.2): object caches with
//! constructor/destructor hooks over the frame allocator, a per-CPU
//! magazine in front of a shared depot, and a general-purpose
//! `malloc`/`free` built from a handful of size-class caches — installed
//! as the crate's `#[global_allocator]`.

use alloc::{boxed::Box, vec::Vec};
use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::NonNull,
};

use crate::{
    arch::InterruptGuard,
    memory::{
        frame_allocator::{AllocFlags, FRAME_ALLOCATOR},
        paging::PAGE_SIZE,
    },
    utils::locks::Mutex,
};

/// A magazine holds a handful of ready-to-use objects for one CPU;
/// operations on it require preemption disabled, not a lock (spec.md
/// §4.2's invariant) — callers hold an [`InterruptGuard`] while touching
/// their own CPU's magazine.
const MAGAZINE_CAPACITY: usize = 16;

struct Magazine {
    objects: Vec<NonNull<u8>>,
}

impl Magazine {
    const fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }
}

unsafe impl Send for Magazine {}

/// An object-sized cache over the frame allocator. `ctor`/`dtor` run once
/// per object at slab creation/teardown, never on every alloc/free — the
/// magazine and depot exist precisely so steady-state alloc/free do not
/// pay construction cost.
pub struct ObjectCache {
    object_size: usize,
    ctor: Option<fn(*mut u8)>,
    dtor: Option<fn(*mut u8)>,
    magazines: Box<[Mutex<Magazine>]>,
    /// The shared depot a magazine overflows into, or refills from,
    /// under `depot`'s lock.
    depot: Mutex<Vec<NonNull<u8>>>,
    /// Raw frames backing every object ever carved out, freed at cache
    /// teardown.
    slabs: Mutex<Vec<(crate::memory::frame_allocator::Frame, usize)>>,
}

unsafe impl Sync for ObjectCache {}
unsafe impl Send for ObjectCache {}

impl ObjectCache {
    pub fn new(object_size: usize, ctor: Option<fn(*mut u8)>, dtor: Option<fn(*mut u8)>) -> Self {
        let cpu_count = crate::config::get().cpu_count.max(1);
        Self {
            object_size: object_size.max(size_of::<usize>()),
            ctor,
            dtor,
            magazines: (0..cpu_count).map(|_| Mutex::new(Magazine::new())).collect(),
            depot: Mutex::new(Vec::new()),
            slabs: Mutex::new(Vec::new()),
        }
    }

    fn objects_per_slab(&self) -> usize {
        (PAGE_SIZE / self.object_size).max(1)
    }

    /// Carves a fresh slab out of one frame, running `ctor` on every
    /// object it contains exactly once.
    fn grow(&self) -> Result<(), crate::ErrorStatus> {
        let frame = FRAME_ALLOCATOR.alloc(1, AllocFlags::empty())?;
        let base = frame.start_address().into_raw() as *mut u8;
        let count = self.objects_per_slab();

        let mut depot = self.depot.lock();
        for i in 0..count {
            let ptr = unsafe { base.add(i * self.object_size) };
            if let Some(ctor) = self.ctor {
                ctor(ptr);
            }
            depot.push(NonNull::new(ptr).unwrap());
        }
        drop(depot);

        self.slabs.lock().push((frame, count));
        Ok(())
    }

    pub fn alloc(&self) -> Result<NonNull<u8>, crate::ErrorStatus> {
        let _guard = InterruptGuard::new();
        let cpu = crate::arch::current_cpu_id() % self.magazines.len();
        {
            let mut mag = self.magazines[cpu].lock();
            if let Some(ptr) = mag.objects.pop() {
                return Ok(ptr);
            }
        }

        // Magazine empty: refill a handful from the depot, growing the
        // cache if the depot is also dry.
        {
            let mut depot = self.depot.lock();
            if depot.is_empty() {
                drop(depot);
                self.grow()?;
                depot = self.depot.lock();
            }
            let mut mag = self.magazines[cpu].lock();
            for _ in 0..MAGAZINE_CAPACITY {
                match depot.pop() {
                    Some(obj) => mag.objects.push(obj),
                    None => break,
                }
            }
            mag.objects
                .pop()
                .ok_or(crate::ErrorStatus::OutOfMemory)
        }
    }

    /// # Safety
    /// `ptr` must have come from a prior successful `alloc` on this same
    /// cache and not have been freed since.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let _guard = InterruptGuard::new();
        let cpu = crate::arch::current_cpu_id() % self.magazines.len();
        let mut mag = self.magazines[cpu].lock();
        if mag.objects.len() >= MAGAZINE_CAPACITY {
            // Overflow: move half the magazine to the shared depot.
            let mut depot = self.depot.lock();
            let keep = MAGAZINE_CAPACITY / 2;
            depot.extend(mag.objects.drain(keep..));
        }
        mag.objects.push(ptr);
    }
}

impl Drop for ObjectCache {
    fn drop(&mut self) {
        if let Some(dtor) = self.dtor {
            for mag in self.magazines.iter() {
                for obj in mag.lock().objects.iter() {
                    dtor(obj.as_ptr());
                }
            }
            for obj in self.depot.lock().iter() {
                dtor(obj.as_ptr());
            }
        }
        for (frame, _count) in self.slabs.lock().drain(..) {
            FRAME_ALLOCATOR.free(frame, 1);
        }
    }
}

/// Size classes backing the general-purpose allocator; a request larger
/// than the biggest class falls back to whole frames directly.
const SIZE_CLASSES: &[usize] = &[16, 32, 64, 128, 256, 512, 1024, 2048];

pub struct SlabAllocator {
    classes: spin::Once<Vec<ObjectCache>>,
}

impl SlabAllocator {
    pub const fn new() -> Self {
        Self {
            classes: spin::Once::new(),
        }
    }

    fn classes(&self) -> &Vec<ObjectCache> {
        self.classes
            .call_once(|| SIZE_CLASSES.iter().map(|&s| ObjectCache::new(s, None, None)).collect())
    }

    fn class_for(&self, size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&s| s >= size)
    }
}

unsafe impl GlobalAlloc for SlabAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(layout.align());
        match self.class_for(size) {
            Some(class) => self.classes()[class]
                .alloc()
                .map(|p| p.as_ptr())
                .unwrap_or(core::ptr::null_mut()),
            None => {
                let pages = crate::memory::pages_for(size);
                match FRAME_ALLOCATOR.alloc(pages, AllocFlags::empty()) {
                    Ok(frame) => frame.start_address().into_raw() as *mut u8,
                    Err(_) => core::ptr::null_mut(),
                }
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(nn) = NonNull::new(ptr) else { return };
        let size = layout.size().max(layout.align());
        match self.class_for(size) {
            Some(class) => unsafe { self.classes()[class].free(nn) },
            None => {
                let pages = crate::memory::pages_for(size);
                let frame = crate::memory::frame_allocator::Frame::containing_address(
                    crate::memory::PhysAddr::from(ptr as usize),
                );
                FRAME_ALLOCATOR.free(frame, pages);
            }
        }
    }
}

#[global_allocator]
static ALLOCATOR: SlabAllocator = SlabAllocator::new();
