//! Defines a [`MemSizeEstimator`] trait and an accompanying [`MemMode`] which are used to
//! estimate sizes of run-time objects in memory, including deep heap allocations.

use smallvec::{Array, SmallVec};
use std::{mem::size_of, sync::Arc};

/// The memory mode of the tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemMode {
    Bytes,
    Units,
}

/// The contract for estimating deep memory size owned by this object. Implementors
/// are expected to support only a single function, bytes or units. Objects with a size known
/// at compile time, or containers of such objects, implement the `_units` estimation and return
/// the number of logical items. Objects with varying runtime sizes implement the `_bytes`
/// estimation.
///
/// Calling the unimplemented function panics so tests catch any mismatch between the object
/// and the code tracking its size.
pub trait MemSizeEstimator {
    /// Estimates the size of this object depending on the passed mem mode
    fn estimate_size(&self, mem_mode: MemMode) -> usize {
        match mem_mode {
            MemMode::Bytes => self.estimate_mem_bytes(),
            MemMode::Units => self.estimate_mem_units(),
        }
    }

    /// Estimates the (deep) size of this object in bytes, including heap owned inner data
    fn estimate_mem_bytes(&self) -> usize {
        unimplemented!()
    }

    /// Estimates the number of units this object holds in memory
    fn estimate_mem_units(&self) -> usize {
        unimplemented!()
    }
}

macro_rules! unit_sized {
    ($($ty:ty),*) => {
        $(
            impl MemSizeEstimator for $ty {
                fn estimate_mem_units(&self) -> usize {
                    1
                }
            }
        )*
    };
}

unit_sized!(u64, u32, u16, u8, i64, i32, i16, i8, bool);

impl MemSizeEstimator for Vec<u8> {
    fn estimate_mem_bytes(&self) -> usize {
        self.capacity() + size_of::<Self>()
    }
}

/// Inline small vectors own no heap memory, spilled ones own their capacity.
impl<A: Array<Item = u8>> MemSizeEstimator for SmallVec<A> {
    fn estimate_mem_bytes(&self) -> usize {
        let heap = if self.spilled() { self.capacity() } else { 0 };
        heap + size_of::<Self>()
    }
}

impl<T: MemSizeEstimator> MemSizeEstimator for Arc<T> {
    fn estimate_mem_bytes(&self) -> usize {
        self.as_ref().estimate_mem_bytes() + size_of::<Self>()
    }

    fn estimate_mem_units(&self) -> usize {
        self.as_ref().estimate_mem_units()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_vec_heap_accounting() {
        let inline: SmallVec<[u8; 8]> = SmallVec::from_slice(&[1, 2, 3]);
        assert_eq!(inline.estimate_mem_bytes(), size_of::<SmallVec<[u8; 8]>>());

        let spilled: SmallVec<[u8; 8]> = SmallVec::from_vec(vec![7; 64]);
        assert!(spilled.spilled());
        assert_eq!(spilled.estimate_mem_bytes(), spilled.capacity() + size_of::<SmallVec<[u8; 8]>>());
    }

    #[test]
    fn test_units_and_modes() {
        assert_eq!(5u64.estimate_size(MemMode::Units), 1);
        let bytes = Vec::<u8>::with_capacity(100);
        assert_eq!(bytes.estimate_size(MemMode::Bytes), 100 + size_of::<Vec<u8>>());
        assert_eq!(Arc::new(9u32).estimate_mem_units(), 1);
    }
}
