//! `GlobalVec<T>` (spec.md §4.8): a growable global-heap-backed vector.
//! Grounded on `ityr::container`'s vector, whose growth factor we fix at
//! 2.0 (">= 2x" is satisfied at equality).

use std::sync::Arc;

use crate::cache::Engine;
use crate::checkout::{with_checkout, AccessMode};
use crate::containers::{as_bytes, from_bytes, GlobalSpan};
use crate::error::Result;
use crate::heap::GlobalHeap;
use crate::ptr::GlobalPtr;
use crate::transport::Transport;

const GROWTH_FACTOR: u64 = 2;

pub struct GlobalVec<T, U: Transport> {
    heap: Arc<GlobalHeap<U>>,
    block_size: u64,
    ptr: GlobalPtr<T>,
    len: u64,
    capacity: u64,
}

impl<T: Copy, U: Transport> GlobalVec<T, U> {
    /// Allocate a fresh, empty vector with room for `initial_capacity`
    /// elements before the first grow.
    pub fn new(heap: Arc<GlobalHeap<U>>, initial_capacity: u64) -> Result<Self> {
        let capacity = initial_capacity.max(1);
        let block_size = (capacity * std::mem::size_of::<T>() as u64).max(1);
        let ptr = heap.alloc_local(capacity, block_size)?;
        Ok(GlobalVec { heap, block_size, ptr, len: 0, capacity })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn as_span(&self) -> GlobalSpan<T> {
        GlobalSpan::new(self.ptr, self.len)
    }

    pub fn get(&self, engine: &Engine<U>, index: u64, epoch: u64) -> Result<T> {
        assert!(index < self.len, "GlobalVec::get: index out of bounds");
        with_checkout(engine, &self.heap, self.ptr.offset(index as i64), 1, AccessMode::Read, epoch, |view| {
            from_bytes::<T>(&view.as_slice())
        })
    }

    pub fn set(&self, engine: &Engine<U>, index: u64, value: T, epoch: u64) -> Result<()> {
        assert!(index < self.len, "GlobalVec::set: index out of bounds");
        with_checkout(engine, &self.heap, self.ptr.offset(index as i64), 1, AccessMode::Write, epoch, |view| {
            view.write_bytes(&as_bytes(&value));
        })
    }

    /// Append `value`, growing the backing allocation by [`GROWTH_FACTOR`]
    /// if it is already at capacity.
    pub fn push(&mut self, engine: &Engine<U>, value: T, epoch: u64) -> Result<()> {
        if self.len == self.capacity {
            self.grow(engine, epoch)?;
        }
        with_checkout(engine, &self.heap, self.ptr.offset(self.len as i64), 1, AccessMode::Write, epoch, |view| {
            view.write_bytes(&as_bytes(&value));
        })?;
        self.len += 1;
        Ok(())
    }

    fn grow(&mut self, engine: &Engine<U>, epoch: u64) -> Result<()> {
        let new_capacity = (self.capacity * GROWTH_FACTOR).max(1);
        let new_block_size = (new_capacity * std::mem::size_of::<T>() as u64).max(1);
        let new_ptr: GlobalPtr<T> = self.heap.alloc_local(new_capacity, new_block_size)?;

        for i in 0..self.len {
            let value = with_checkout(engine, &self.heap, self.ptr.offset(i as i64), 1, AccessMode::Read, epoch, |view| {
                from_bytes::<T>(&view.as_slice())
            })?;
            with_checkout(engine, &self.heap, new_ptr.offset(i as i64), 1, AccessMode::Write, epoch, |view| {
                view.write_bytes(&as_bytes(&value));
            })?;
        }

        self.heap.free(self.ptr);
        self.ptr = new_ptr;
        self.capacity = new_capacity;
        self.block_size = new_block_size;
        Ok(())
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::LocalTransport;

    fn setup() -> (Engine<LocalTransport>, Arc<GlobalHeap<LocalTransport>>) {
        let t = Arc::new(LocalTransport::cluster(1, 1 << 20, 1).into_iter().next().unwrap());
        let heap = Arc::new(GlobalHeap::new(t.clone()));
        let engine = Engine::new(t, 32, 64, false);
        (engine, heap)
    }

    #[test]
    fn push_grows_and_preserves_order() {
        let (engine, heap) = setup();
        let mut v: GlobalVec<u64, LocalTransport> = GlobalVec::new(heap, 2).unwrap();
        for i in 0..10u64 {
            v.push(&engine, i * i, 0).unwrap();
        }
        assert_eq!(v.len(), 10);
        assert!(v.capacity() >= 10);
        for i in 0..10u64 {
            assert_eq!(v.get(&engine, i, 0).unwrap(), i * i);
        }
    }

    #[test]
    fn set_overwrites_in_place() {
        let (engine, heap) = setup();
        let mut v: GlobalVec<u64, LocalTransport> = GlobalVec::new(heap, 4).unwrap();
        v.push(&engine, 1, 0).unwrap();
        v.push(&engine, 2, 0).unwrap();
        v.set(&engine, 0, 100, 0).unwrap();
        assert_eq!(v.get(&engine, 0, 0).unwrap(), 100);
        assert_eq!(v.get(&engine, 1, 0).unwrap(), 2);
    }
}
