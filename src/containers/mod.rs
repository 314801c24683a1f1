//! Global containers and iterators (C9, spec.md §4.8).
//!
//! These sit one layer above [`crate::checkout`]: where `checkout`/
//! `with_checkout` hand back a raw byte view of one cache block,
//! [`GlobalSpan`]/[`GlobalVec`]/[`GlobalRef`] know their element type and
//! marshal to/from it, and [`LocalSpan`]/[`LocalSpanMut`] give the
//! `divide`/`subspan`/`for_each`/`map`/`reduce` API a checked-out range
//! exposes once it is local.

mod gref;
mod iter;
mod span;
mod vec;

pub use gref::GlobalRef;
pub use iter::CountingIterator;
pub use span::{GlobalSpan, LocalSpan, LocalSpanMut};
pub use vec::GlobalVec;

/// Reinterpret `T` as its raw bytes for wire marshaling. `T: Copy` rules
/// out types whose bit pattern isn't meaningful to copy (references,
/// anything with a `Drop` impl), which is the same bound `ityr::iro_ref`
/// and `container.hpp`'s vector implicitly require of their element type.
pub(crate) fn as_bytes<T: Copy>(value: &T) -> Vec<u8> {
    let size = std::mem::size_of::<T>();
    let ptr = value as *const T as *const u8;
    unsafe { std::slice::from_raw_parts(ptr, size).to_vec() }
}

pub(crate) fn from_bytes<T: Copy>(bytes: &[u8]) -> T {
    assert_eq!(bytes.len(), std::mem::size_of::<T>());
    unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) }
}
