//! Bump allocator for the global octree arena
//!
//! Hands out strictly increasing, non-overlapping byte ranges from one
//! fixed-capacity buffer. Nothing is freed individually: the whole arena is
//! released by `reset`, which starts a new generation.

use crate::core::error::Error;
use crate::core::types::Result;

/// Alignment of arena offsets in bytes (one octree node word)
pub const NODE_ALIGNMENT: u64 = std::mem::size_of::<u32>() as u64;

/// A byte range handed out by the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaAllocation {
    offset: u64,
    size: u64,
}

impl ArenaAllocation {
    /// Byte offset from the start of the arena
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// One past the last byte of this allocation
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Offset expressed in node words, as used for GPU indexing.
    /// Fails when the word index does not fit the 32-bit chunk metadata.
    pub fn word_offset(&self) -> Result<u32> {
        let words = self.offset / NODE_ALIGNMENT;
        u32::try_from(words).map_err(|_| {
            Error::AddressRange(format!(
                "byte offset {} is word {}, beyond the u32 word index",
                self.offset, words
            ))
        })
    }

    /// Returns true if the two ranges share any byte
    pub fn overlaps(&self, other: &ArenaAllocation) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Usage statistics of an arena
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub capacity: u64,
    pub used_bytes: u64,
    pub allocation_count: u32,
    pub largest_allocation: u64,
    pub generation: u32,
}

impl ArenaStats {
    /// Fraction of the arena in use (0.0 to 1.0)
    pub fn utilization(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used_bytes as f32 / self.capacity as f32
    }
}

/// Bump allocator over a fixed-capacity arena
#[derive(Debug)]
pub struct ArenaAllocator {
    capacity: u64,
    alignment: u64,
    cursor: u64,
    allocation_count: u32,
    largest_allocation: u64,
    generation: u32,
}

impl ArenaAllocator {
    /// Create an allocator for an arena of `capacity` bytes, aligned to node words
    pub fn new(capacity: u64) -> Self {
        Self::with_alignment(capacity, NODE_ALIGNMENT)
    }

    /// Create an allocator with a custom offset alignment (power of two)
    pub fn with_alignment(capacity: u64, alignment: u64) -> Self {
        assert!(alignment.is_power_of_two(), "Alignment must be power of 2");
        Self {
            capacity,
            alignment,
            cursor: 0,
            allocation_count: 0,
            largest_allocation: 0,
            generation: 0,
        }
    }

    /// Reserve `size` bytes. The offset is aligned, the size is kept exact.
    ///
    /// Fails with `Error::Capacity` when the request does not fit; the
    /// allocator state is left untouched in that case.
    pub fn allocate(&mut self, size: u64) -> Result<ArenaAllocation> {
        let offset = self.aligned_cursor();
        let available = self.available();

        if size > available {
            return Err(Error::Capacity {
                requested: size,
                available,
                capacity: self.capacity,
            });
        }

        self.cursor = offset + size;
        self.allocation_count += 1;
        self.largest_allocation = self.largest_allocation.max(size);

        Ok(ArenaAllocation { offset, size })
    }

    /// Release the whole arena and start a new generation
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.allocation_count = 0;
        self.largest_allocation = 0;
        self.generation += 1;
    }

    /// Bytes handed out so far
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Bytes still available for the next allocation
    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.aligned_cursor())
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count
    }

    /// Number of resets since creation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity,
            used_bytes: self.cursor,
            allocation_count: self.allocation_count,
            largest_allocation: self.largest_allocation,
            generation: self.generation,
        }
    }

    /// Log usage statistics
    pub fn log_stats(&self) {
        let stats = self.stats();
        log::info!(
            "Arena: {} allocations, {:.2}MB / {:.2}MB used ({:.1}%), largest {:.2}MB, generation {}",
            stats.allocation_count,
            crate::core::logging::mib(stats.used_bytes),
            crate::core::logging::mib(stats.capacity),
            stats.utilization() * 100.0,
            crate::core::logging::mib(stats.largest_allocation),
            stats.generation
        );
    }

    fn aligned_cursor(&self) -> u64 {
        (self.cursor + self.alignment - 1) & !(self.alignment - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exhaustion() {
        let mut arena = ArenaAllocator::new(100);

        let a = arena.allocate(40).unwrap();
        let b = arena.allocate(40).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 40);

        let err = arena.allocate(30).unwrap_err();
        match err {
            Error::Capacity { requested, available, capacity } => {
                assert_eq!(requested, 30);
                assert_eq!(available, 20);
                assert_eq!(capacity, 100);
                assert_eq!(requested - available, 10);
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(arena.used(), 80);
        assert_eq!(arena.allocation_count(), 2);
    }

    #[test]
    fn test_failed_request_keeps_prior_ranges() {
        let mut arena = ArenaAllocator::new(64);
        let a = arena.allocate(32).unwrap();
        assert!(arena.allocate(64).is_err());

        // the failed request must not shift the cursor
        let b = arena.allocate(32).unwrap();
        assert_eq!(b.offset(), a.end());
        assert!(!a.overlaps(&b));
        assert_eq!(arena.available(), 0);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let sizes = [4u64, 128, 36, 8, 1024, 12];
        let capacity: u64 = sizes.iter().sum();
        let mut arena = ArenaAllocator::new(capacity);

        let allocations: Vec<_> = sizes.iter().map(|&s| arena.allocate(s).unwrap()).collect();

        for (i, a) in allocations.iter().enumerate() {
            for b in &allocations[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
        let mut expected_offset = 0;
        for a in &allocations {
            assert_eq!(a.offset(), expected_offset);
            expected_offset = a.end();
        }
        let total: u64 = allocations.iter().map(|a| a.size()).sum();
        assert_eq!(total, capacity);
        assert_eq!(arena.used(), capacity);
    }

    #[test]
    fn test_unaligned_size_aligns_next_offset() {
        let mut arena = ArenaAllocator::new(64);
        let a = arena.allocate(6).unwrap();
        let b = arena.allocate(4).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 8);
        assert_eq!(b.word_offset().unwrap(), 2);
    }

    #[test]
    fn test_reset_starts_new_generation() {
        let mut arena = ArenaAllocator::new(16);
        arena.allocate(16).unwrap();
        assert!(arena.allocate(4).is_err());

        arena.reset();
        assert_eq!(arena.generation(), 1);
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.allocation_count(), 0);
        assert_eq!(arena.allocate(16).unwrap().offset(), 0);
    }

    #[test]
    fn test_word_offset_beyond_u32() {
        let mut arena = ArenaAllocator::new(1 << 36);
        let low = arena.allocate((1 << 34) - 4).unwrap();
        assert_eq!(low.word_offset().unwrap(), 0);

        // last word index that still fits
        let edge = arena.allocate(4).unwrap();
        assert_eq!(edge.word_offset().unwrap(), u32::MAX);

        let high = arena.allocate(32).unwrap();
        assert_eq!(high.offset(), 1 << 34);
        assert!(matches!(high.word_offset(), Err(Error::AddressRange(_))));
    }

    #[test]
    fn test_stats() {
        let mut arena = ArenaAllocator::new(200);
        arena.allocate(20).unwrap();
        arena.allocate(80).unwrap();

        let stats = arena.stats();
        assert_eq!(stats.used_bytes, 100);
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.largest_allocation, 80);
        assert!((stats.utilization() - 0.5).abs() < 1e-6);
    }
}
