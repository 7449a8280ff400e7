use std::ops::Range;

use crate::{
    block_store::BlockNumber,
    error::{FsError, FsResult},
};

use super::block_storage::BlockStorage;

/// Storage that keeps every block in a single contiguous in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    block_size: usize,
    num_blocks: usize,
    data: Vec<u8>,
}

impl MemoryStorage {
    /// Constructs a new zero-filled [`MemoryStorage`] instance.
    #[must_use]
    pub fn new(block_size: usize, num_blocks: usize) -> Self {
        Self {
            block_size,
            num_blocks,
            data: vec![0; block_size * num_blocks],
        }
    }

    fn block_range(&self, block_number: BlockNumber) -> FsResult<Range<usize>> {
        if block_number >= self.num_blocks {
            return Err(FsError::InvalidBlock(block_number));
        }

        let start = block_number * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockStorage for MemoryStorage {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_number: BlockNumber) -> FsResult<&[u8]> {
        let range = self.block_range(block_number)?;
        Ok(&self.data[range])
    }

    fn write_block(
        &mut self,
        block_number: BlockNumber,
        offset: usize,
        data: &[u8],
    ) -> FsResult<()> {
        let range = self.block_range(block_number)?;

        if offset + data.len() > self.block_size {
            return Err(FsError::InvalidBlock(block_number));
        }

        let start = range.start + offset;
        self.data[start..start + data.len()].copy_from_slice(data);

        Ok(())
    }
}
