//! Checkout/checkin (C5, spec.md §4.4).
//!
//! [`checkout`] resolves a [`GlobalPtr`] range to a locally-addressable
//! [`LocalView`] guard; dropping the guard (or letting [`with_checkout`]
//! drop it for you) checks the range back in. Grounded on
//! `ityr::span::with_checkout`/`ityr::container`'s checkout helpers.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{BlockKey, CacheSlot, Engine};
use crate::error::Result;
use crate::heap::GlobalHeap;
use crate::ptr::GlobalPtr;
use crate::transport::Transport;

/// The access mode a checkout is opened with (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    fn wants_fetch(self) -> bool {
        !matches!(self, AccessMode::Write)
    }

    fn marks_dirty(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// A locally-addressable view into one block of a [`GlobalPtr`]'s
/// allocation, open for `mode`. Spans at most one cache block; callers
/// needing a larger range must checkout block-by-block (this mirrors
/// `ityr::span`'s `divide`-then-checkout recursion, not a single
/// multi-block guard).
pub struct LocalView<'a, T, U: Transport> {
    engine: &'a Engine<U>,
    slot: Arc<CacheSlot>,
    byte_offset: u64,
    len_bytes: u64,
    mode: AccessMode,
    epoch: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, U: Transport> LocalView<'a, T, U> {
    pub fn as_slice(&self) -> Vec<u8> {
        let data = self.slot.data.read();
        data[self.byte_offset as usize..(self.byte_offset + self.len_bytes) as usize].to_vec()
    }

    /// Overwrite this view's bytes. Panics if opened `Read`-only — mirrors
    /// the original's debug-only canary for "write through a read
    /// checkout", upgraded to a hard panic since it is always a usage
    /// error (spec.md §7: usage errors are fatal by construction).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        assert!(self.mode != AccessMode::Read, "LocalView::write_bytes on a Read checkout");
        assert_eq!(bytes.len() as u64, self.len_bytes);
        let mut data = self.slot.data.write();
        data[self.byte_offset as usize..(self.byte_offset + self.len_bytes) as usize]
            .copy_from_slice(bytes);
    }

    fn checkin(&mut self) {
        let _ = self.engine.checkin(&self.slot, self.byte_offset, self.len_bytes, self.mode.marks_dirty(), self.epoch);
    }
}

impl<T, U: Transport> Drop for LocalView<'_, T, U> {
    fn drop(&mut self) {
        self.checkin();
    }
}

/// Check out `nelems` elements of `T` starting at `ptr` for `mode` access.
///
/// # Panics
/// Panics if the range crosses a block boundary — callers working over a
/// `GlobalSpan` larger than one block must [`crate::containers::GlobalSpan::divide`]
/// first, exactly as `ityr::raw_span::checkout` requires its caller to
/// divide before recursing.
pub fn checkout<'a, T, U: Transport>(
    engine: &'a Engine<U>,
    heap: &GlobalHeap<U>,
    ptr: GlobalPtr<T>,
    nelems: u64,
    mode: AccessMode,
    epoch: u64,
) -> Result<LocalView<'a, T, U>> {
    let elem_size = std::mem::size_of::<T>() as u64;
    let byte_offset = ptr.byte_offset();
    let len_bytes = nelems * elem_size;
    let block_size = heap.block_size_of(ptr.alloc_id());
    let block_index = byte_offset / block_size;
    assert_eq!(
        block_index,
        (byte_offset + len_bytes.saturating_sub(1)) / block_size,
        "checkout: range crosses a block boundary"
    );

    let home = heap.owner_of(ptr, ptr.element_offset());
    let home_base = heap.local_block_base(ptr, block_index * block_size);
    let key = BlockKey { alloc_id: ptr.alloc_id(), block_index };
    let slot = engine.checkout_block(key, home, home_base, block_size, mode.marks_dirty(), mode.wants_fetch())?;

    let offset_in_block = byte_offset - block_index * block_size;
    Ok(LocalView {
        engine,
        slot,
        byte_offset: offset_in_block,
        len_bytes,
        mode,
        epoch,
        _marker: PhantomData,
    })
}

/// Run `f` with a single checked-out view, guaranteeing checkin before
/// returning — the common case of `ityr`'s `with_checkout` free function.
pub fn with_checkout<T, U: Transport, R>(
    engine: &Engine<U>,
    heap: &GlobalHeap<U>,
    ptr: GlobalPtr<T>,
    nelems: u64,
    mode: AccessMode,
    epoch: u64,
    f: impl FnOnce(&mut LocalView<'_, T, U>) -> R,
) -> Result<R> {
    let mut view = checkout(engine, heap, ptr, nelems, mode, epoch)?;
    Ok(f(&mut view))
}

/// Two-argument overload: check out `ptr_a`/`ptr_b` together, run `f`, and
/// check both in — the shape `parallel_transform`'s binary form needs to
/// read one buffer while writing another in a single scope.
pub fn with_checkout2<T, V, U: Transport, R>(
    engine: &Engine<U>,
    heap: &GlobalHeap<U>,
    ptr_a: GlobalPtr<T>,
    nelems_a: u64,
    mode_a: AccessMode,
    ptr_b: GlobalPtr<V>,
    nelems_b: u64,
    mode_b: AccessMode,
    epoch: u64,
    f: impl FnOnce(&mut LocalView<'_, T, U>, &mut LocalView<'_, V, U>) -> R,
) -> Result<R> {
    let mut a = checkout(engine, heap, ptr_a, nelems_a, mode_a, epoch)?;
    let mut b = checkout(engine, heap, ptr_b, nelems_b, mode_b, epoch)?;
    Ok(f(&mut a, &mut b))
}

/// Three-argument overload, same rationale as [`with_checkout2`].
#[allow(clippy::too_many_arguments)]
pub fn with_checkout3<T, V, W, U: Transport, R>(
    engine: &Engine<U>,
    heap: &GlobalHeap<U>,
    ptr_a: GlobalPtr<T>,
    nelems_a: u64,
    mode_a: AccessMode,
    ptr_b: GlobalPtr<V>,
    nelems_b: u64,
    mode_b: AccessMode,
    ptr_c: GlobalPtr<W>,
    nelems_c: u64,
    mode_c: AccessMode,
    epoch: u64,
    f: impl FnOnce(&mut LocalView<'_, T, U>, &mut LocalView<'_, V, U>, &mut LocalView<'_, W, U>) -> R,
) -> Result<R> {
    let mut a = checkout(engine, heap, ptr_a, nelems_a, mode_a, epoch)?;
    let mut b = checkout(engine, heap, ptr_b, nelems_b, mode_b, epoch)?;
    let mut c = checkout(engine, heap, ptr_c, nelems_c, mode_c, epoch)?;
    Ok(f(&mut a, &mut b, &mut c))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::mapper::Cyclic;
    use crate::transport::LocalTransport;

    fn setup() -> (Engine<LocalTransport>, GlobalHeap<LocalTransport>) {
        let t = Arc::new(LocalTransport::cluster(1, 8192, 1).into_iter().next().unwrap());
        let heap = GlobalHeap::new(t.clone());
        let engine = Engine::new(t, 8, 64, false);
        (engine, heap)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (engine, heap) = setup();
        let ptr: GlobalPtr<u64> = heap.alloc_local(4, 256).unwrap();

        with_checkout(&engine, &heap, ptr, 1, AccessMode::Write, 0, |view| {
            view.write_bytes(&42u64.to_ne_bytes());
        })
        .unwrap();

        let value = with_checkout(&engine, &heap, ptr, 1, AccessMode::Read, 0, |view| {
            u64::from_ne_bytes(view.as_slice().try_into().unwrap())
        })
        .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    #[should_panic(expected = "write_bytes on a Read checkout")]
    fn write_on_read_checkout_panics() {
        let (engine, heap) = setup();
        let ptr: GlobalPtr<u64> = heap.alloc_local(4, 256).unwrap();
        with_checkout(&engine, &heap, ptr, 1, AccessMode::Read, 0, |view| {
            view.write_bytes(&0u64.to_ne_bytes());
        })
        .unwrap();
    }

    #[test]
    fn two_argument_checkout_reads_and_writes_together() {
        let (engine, heap) = setup();
        let src: GlobalPtr<u64> = heap.alloc_local(4, 256).unwrap();
        let dst: GlobalPtr<u64> = heap.alloc_local(4, 256).unwrap();
        with_checkout(&engine, &heap, src, 1, AccessMode::Write, 0, |view| {
            view.write_bytes(&7u64.to_ne_bytes());
        })
        .unwrap();

        with_checkout2(&engine, &heap, src, 1, AccessMode::Read, dst, 1, AccessMode::Write, 0, |s, d| {
            let bytes = s.as_slice();
            d.write_bytes(&bytes);
        })
        .unwrap();

        let value = with_checkout(&engine, &heap, dst, 1, AccessMode::Read, 0, |view| {
            u64::from_ne_bytes(view.as_slice().try_into().unwrap())
        })
        .unwrap();
        assert_eq!(value, 7);
    }
}
