use std::collections::HashSet;

use bitvec::vec::BitVec;
use log::{debug, info};

use crate::error::{FsError, FsResult};
use crate::storage::BlockStorage;

pub type BlockNumber = usize;

/// A fixed-capacity pool of blocks with an allocation bitmap.
pub struct BlockStore<S: BlockStorage> {
    storage: S,
    /// Tracks the allocation status of blocks.
    /// A value of `true` represents "allocated".
    bitmap: BitVec,
}

impl<S: BlockStorage> BlockStore<S> {
    /// Wraps `storage`, with every block initially free.
    pub fn new(storage: S) -> Self {
        let mut bitmap = BitVec::new();
        bitmap.resize(storage.num_blocks(), false);

        Self { storage, bitmap }
    }

    pub fn block_size(&self) -> usize {
        self.storage.block_size()
    }

    pub fn total_count(&self) -> usize {
        self.bitmap.len()
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.count_zeros()
    }

    pub fn is_allocated(&self, block_number: BlockNumber) -> bool {
        self.bitmap
            .get(block_number)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    /// Number of blocks needed to hold `size` bytes.
    pub fn blocks_for(&self, size: usize) -> usize {
        size.div_ceil(self.block_size())
    }

    /// Allocates `n` zero-filled blocks, first-fit. Either all `n` are allocated or none are.
    pub fn allocate(&mut self, n: usize) -> FsResult<Vec<BlockNumber>> {
        let free = self.free_count();
        if free < n {
            return Err(FsError::OutOfSpace { needed: n, free });
        }

        let assigned: Vec<BlockNumber> = self.bitmap.iter_zeros().take(n).collect();
        for &block_number in &assigned {
            self.storage.zero_block(block_number)?;
            self.bitmap.set(block_number, true);
        }

        if n > 0 {
            debug!("allocated blocks {assigned:?}");
        }

        Ok(assigned)
    }

    /// Frees every block in `block_numbers`. Nothing is freed unless all of them are valid,
    /// allocated, and distinct.
    pub fn release(&mut self, block_numbers: &[BlockNumber]) -> FsResult<()> {
        let mut seen = HashSet::with_capacity(block_numbers.len());

        for &block_number in block_numbers {
            if !self.is_allocated(block_number) || !seen.insert(block_number) {
                return Err(FsError::InvalidBlock(block_number));
            }
        }

        for &block_number in block_numbers {
            self.bitmap.set(block_number, false);
        }

        if !block_numbers.is_empty() {
            info!(
                "released {} blocks ({} free)",
                block_numbers.len(),
                self.free_count()
            );
        }

        Ok(())
    }

    pub fn read(&self, block_number: BlockNumber) -> FsResult<&[u8]> {
        if !self.is_allocated(block_number) {
            return Err(FsError::InvalidBlock(block_number));
        }

        self.storage.read_block(block_number)
    }

    pub fn write(
        &mut self,
        block_number: BlockNumber,
        offset: usize,
        data: &[u8],
    ) -> FsResult<()> {
        if !self.is_allocated(block_number) {
            return Err(FsError::InvalidBlock(block_number));
        }

        self.storage.write_block(block_number, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStorage;

    use super::*;

    fn store(num_blocks: usize) -> BlockStore<MemoryStorage> {
        BlockStore::new(MemoryStorage::new(4, num_blocks))
    }

    mod allocate {
        use super::*;

        #[test]
        fn test_first_fit() {
            let mut store = store(4);

            assert_eq!(store.allocate(2).unwrap(), vec![0, 1]);
            store.release(&[0]).unwrap();
            assert_eq!(store.allocate(2).unwrap(), vec![0, 2]);
            assert_eq!(store.free_count(), 1);
        }

        #[test]
        fn test_zero_blocks() {
            let mut store = store(2);

            assert!(store.allocate(0).unwrap().is_empty());
            assert_eq!(store.free_count(), 2);
        }

        #[test]
        fn test_all_or_nothing() {
            let mut store = store(3);
            store.allocate(2).unwrap();

            assert_eq!(
                store.allocate(2),
                Err(FsError::OutOfSpace { needed: 2, free: 1 })
            );
            assert_eq!(store.free_count(), 1);
        }

        #[test]
        fn test_allocated_blocks_are_zeroed() {
            let mut store = store(1);
            let blocks = store.allocate(1).unwrap();
            store.write(blocks[0], 0, b"abcd").unwrap();
            store.release(&blocks).unwrap();

            let blocks = store.allocate(1).unwrap();
            assert_eq!(store.read(blocks[0]).unwrap(), &[0; 4]);
        }
    }

    mod release {
        use super::*;

        #[test]
        fn test_release_free_block() {
            let mut store = store(2);
            assert_eq!(store.release(&[1]), Err(FsError::InvalidBlock(1)));
        }

        #[test]
        fn test_release_out_of_range() {
            let mut store = store(2);
            store.allocate(2).unwrap();

            assert_eq!(store.release(&[0, 7]), Err(FsError::InvalidBlock(7)));
            assert_eq!(store.free_count(), 0);
        }

        #[test]
        fn test_release_duplicate() {
            let mut store = store(2);
            store.allocate(2).unwrap();

            assert_eq!(store.release(&[1, 1]), Err(FsError::InvalidBlock(1)));
            assert!(store.is_allocated(1));
        }

        #[test]
        fn test_counts() {
            let mut store = store(5);
            let blocks = store.allocate(3).unwrap();
            assert_eq!(store.free_count(), 2);

            store.release(&blocks).unwrap();
            assert_eq!(store.free_count(), 5);
            assert_eq!(store.total_count(), 5);
        }
    }

    #[test]
    fn test_access_to_free_block() {
        let mut store = store(2);

        assert_eq!(store.read(0), Err(FsError::InvalidBlock(0)));
        assert_eq!(store.write(0, 0, b"a"), Err(FsError::InvalidBlock(0)));
    }

    #[test]
    fn test_blocks_for() {
        let store = store(2);

        assert_eq!(store.blocks_for(0), 0);
        assert_eq!(store.blocks_for(1), 1);
        assert_eq!(store.blocks_for(4), 1);
        assert_eq!(store.blocks_for(5), 2);
    }
}
