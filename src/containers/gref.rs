//! `GlobalRef<T>` (spec.md §4.8). Grounded directly on `ityr::iro_ref`:
//! a `Deref`-like read via a 1-element checkout, `Assign` via a 1-element
//! write checkout, and the compound-assignment operators `iro_ref.hpp`
//! implements (`+=`, `-=`, increment, decrement) via a 1-element
//! read-write checkout.

use std::ops::{Add, Sub};

use crate::cache::Engine;
use crate::checkout::{with_checkout, AccessMode};
use crate::containers::{as_bytes, from_bytes};
use crate::error::Result;
use crate::heap::GlobalHeap;
use crate::ptr::GlobalPtr;
use crate::transport::Transport;

/// A reference to exactly one element of the global heap.
#[derive(Debug, Clone, Copy)]
pub struct GlobalRef<T> {
    ptr: GlobalPtr<T>,
}

impl<T: Copy> GlobalRef<T> {
    pub fn new(ptr: GlobalPtr<T>) -> Self {
        GlobalRef { ptr }
    }

    pub fn ptr(&self) -> GlobalPtr<T> {
        self.ptr
    }

    pub fn get<U: Transport>(&self, engine: &Engine<U>, heap: &GlobalHeap<U>, epoch: u64) -> Result<T> {
        with_checkout(engine, heap, self.ptr, 1, AccessMode::Read, epoch, |view| from_bytes::<T>(&view.as_slice()))
    }

    pub fn set<U: Transport>(&self, engine: &Engine<U>, heap: &GlobalHeap<U>, value: T, epoch: u64) -> Result<()> {
        with_checkout(engine, heap, self.ptr, 1, AccessMode::Write, epoch, |view| {
            view.write_bytes(&as_bytes(&value));
        })
    }

    fn update<U: Transport>(
        &self,
        engine: &Engine<U>,
        heap: &GlobalHeap<U>,
        epoch: u64,
        f: impl FnOnce(T) -> T,
    ) -> Result<()>
    where
        T: 'static,
    {
        with_checkout(engine, heap, self.ptr, 1, AccessMode::ReadWrite, epoch, |view| {
            let current = from_bytes::<T>(&view.as_slice());
            view.write_bytes(&as_bytes(&f(current)));
        })
    }
}

impl<T: Copy + Add<Output = T> + 'static> GlobalRef<T> {
    pub fn add_assign<U: Transport>(&self, engine: &Engine<U>, heap: &GlobalHeap<U>, rhs: T, epoch: u64) -> Result<()> {
        self.update(engine, heap, epoch, |cur| cur + rhs)
    }
}

impl<T: Copy + Sub<Output = T> + 'static> GlobalRef<T> {
    pub fn sub_assign<U: Transport>(&self, engine: &Engine<U>, heap: &GlobalHeap<U>, rhs: T, epoch: u64) -> Result<()> {
        self.update(engine, heap, epoch, |cur| cur - rhs)
    }
}
