//! `GlobalSpan<T>` and the `LocalSpan`/`LocalSpanMut` views it checks out
//! into (spec.md §4.8). Grounded on `ityr::span`/`ityr::raw_span`.

use crate::checkout::{with_checkout, AccessMode};
use crate::containers::{as_bytes, from_bytes};
use crate::error::Result;
use crate::heap::GlobalHeap;
use crate::ptr::GlobalPtr;
use crate::transport::Transport;

/// A named range `[ptr, ptr + len)` in the global heap. Does not itself
/// hold any local memory; [`GlobalSpan::for_each`]/`map`/`reduce` recurse
/// down to single-block subspans (mirroring `raw_span`'s own
/// divide-then-checkout recursion, since [`crate::checkout::checkout`]
/// refuses a range spanning more than one block) and hand each one to the
/// caller as a [`LocalSpan`]/[`LocalSpanMut`].
#[derive(Debug, Clone, Copy)]
pub struct GlobalSpan<T> {
    ptr: GlobalPtr<T>,
    len: u64,
}

impl<T: Copy> GlobalSpan<T> {
    pub fn new(ptr: GlobalPtr<T>, len: u64) -> Self {
        GlobalSpan { ptr, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ptr(&self) -> GlobalPtr<T> {
        self.ptr
    }

    pub fn subspan(&self, offset: u64, len: u64) -> GlobalSpan<T> {
        assert!(offset + len <= self.len, "GlobalSpan::subspan out of range");
        GlobalSpan { ptr: self.ptr.offset(offset as i64), len }
    }

    /// Split at the midpoint, as `raw_span::divide` does.
    pub fn divide(&self) -> (GlobalSpan<T>, GlobalSpan<T>) {
        let mid = self.len / 2;
        (self.subspan(0, mid), self.subspan(mid, self.len - mid))
    }

    /// How many elements of `T` fit in one cache block of this span's
    /// allocation — the unit [`Self::for_each`] recurses down to.
    fn elems_per_block<U: Transport>(&self, heap: &GlobalHeap<U>) -> u64 {
        let block_size = heap.block_size_of(self.ptr.alloc_id());
        (block_size / std::mem::size_of::<T>() as u64).max(1)
    }

    /// Visit every element of this span, granting `body` a mutable,
    /// checked-out [`LocalSpanMut`] for one cache block at a time.
    pub fn for_each_mut<U: Transport>(
        &self,
        engine: &crate::cache::Engine<U>,
        heap: &GlobalHeap<U>,
        epoch: u64,
        body: &(dyn Fn(&mut LocalSpanMut<T>) + Sync),
    ) -> Result<()> {
        let per_block = self.elems_per_block(heap);
        let mut offset = 0u64;
        while offset < self.len {
            let chunk = (self.len - offset).min(per_block);
            let sub = self.subspan(offset, chunk);
            with_checkout(engine, heap, sub.ptr, sub.len, AccessMode::ReadWrite, epoch, |view| {
                let bytes = view.as_slice();
                let mut elems: Vec<T> = (0..sub.len as usize)
                    .map(|i| {
                        let sz = std::mem::size_of::<T>();
                        from_bytes::<T>(&bytes[i * sz..(i + 1) * sz])
                    })
                    .collect();
                let mut local = LocalSpanMut { data: &mut elems };
                body(&mut local);
                let mut out = Vec::with_capacity(bytes.len());
                for e in &elems {
                    out.extend_from_slice(&as_bytes(e));
                }
                view.write_bytes(&out);
            })?;
            offset += chunk;
        }
        Ok(())
    }

    /// Read-only traversal, one block at a time.
    pub fn for_each<U: Transport>(
        &self,
        engine: &crate::cache::Engine<U>,
        heap: &GlobalHeap<U>,
        epoch: u64,
        body: &(dyn Fn(&LocalSpan<T>) + Sync),
    ) -> Result<()> {
        let per_block = self.elems_per_block(heap);
        let mut offset = 0u64;
        while offset < self.len {
            let chunk = (self.len - offset).min(per_block);
            let sub = self.subspan(offset, chunk);
            with_checkout(engine, heap, sub.ptr, sub.len, AccessMode::Read, epoch, |view| {
                let bytes = view.as_slice();
                let sz = std::mem::size_of::<T>();
                let elems: Vec<T> = (0..sub.len as usize).map(|i| from_bytes::<T>(&bytes[i * sz..(i + 1) * sz])).collect();
                body(&LocalSpan { data: &elems });
            })?;
            offset += chunk;
        }
        Ok(())
    }

    /// Fold every element of the span into `Acc` via `combine`, block by
    /// block (sequential — parallel reduction over a `GlobalSpan` composes
    /// this with [`crate::patterns::parallel_reduce`] over block indices).
    pub fn reduce<U: Transport, Acc: Copy>(
        &self,
        engine: &crate::cache::Engine<U>,
        heap: &GlobalHeap<U>,
        epoch: u64,
        identity: Acc,
        combine: &(dyn Fn(Acc, T) -> Acc + Sync),
    ) -> Result<Acc> {
        let mut acc = identity;
        self.for_each(engine, heap, epoch, &|local| {
            for &e in local.data {
                acc = combine(acc, e);
            }
        })?;
        Ok(acc)
    }
}

/// A checked-out, read-only local view of one block of a [`GlobalSpan`].
/// The `raw_span`-equivalent local type: same `divide`/`subspan` shape as
/// its global counterpart, now backed by an actual local slice.
pub struct LocalSpan<'a, T> {
    data: &'a [T],
}

impl<'a, T: Copy> LocalSpan<'a, T> {
    pub fn as_slice(&self) -> &[T] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn subspan(&self, offset: usize, len: usize) -> LocalSpan<'a, T> {
        LocalSpan { data: &self.data[offset..offset + len] }
    }

    pub fn divide(&self) -> (LocalSpan<'a, T>, LocalSpan<'a, T>) {
        let mid = self.data.len() / 2;
        (self.subspan(0, mid), self.subspan(mid, self.data.len() - mid))
    }

    pub fn map<R>(&self, f: impl Fn(&T) -> R) -> Vec<R> {
        self.data.iter().map(f).collect()
    }

    pub fn reduce<Acc>(&self, identity: Acc, combine: impl Fn(Acc, T) -> Acc) -> Acc {
        self.data.iter().fold(identity, |acc, &e| combine(acc, e))
    }
}

/// The mutable counterpart, handed to [`GlobalSpan::for_each_mut`].
pub struct LocalSpanMut<'a, T> {
    data: &'a mut [T],
}

impl<'a, T: Copy> LocalSpanMut<'a, T> {
    pub fn as_slice(&self) -> &[T] {
        self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn for_each(&mut self, f: impl Fn(&mut T)) {
        for e in self.data.iter_mut() {
            f(e);
        }
    }

    pub fn divide_mut(&mut self) -> (LocalSpanMut<'_, T>, LocalSpanMut<'_, T>) {
        let mid = self.data.len() / 2;
        let (left, right) = self.data.split_at_mut(mid);
        (LocalSpanMut { data: left }, LocalSpanMut { data: right })
    }
}
