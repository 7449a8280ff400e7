use crate::block_store::BlockNumber;
use crate::error::FsResult;

/// Raw byte storage for a fixed number of fixed-size blocks.
///
/// Storage knows nothing about allocation; that is tracked by [`crate::block_store::BlockStore`].
pub trait BlockStorage {
    /// The capacity of every block in bytes.
    fn block_size(&self) -> usize;

    /// The total number of blocks.
    fn num_blocks(&self) -> usize;

    fn read_block(&self, block_number: BlockNumber) -> FsResult<&[u8]>;

    /// Writes `data` into the block starting at `offset`. The rest of the block is untouched.
    fn write_block(&mut self, block_number: BlockNumber, offset: usize, data: &[u8])
        -> FsResult<()>;

    /// Overwrites the whole block with zeroes.
    fn zero_block(&mut self, block_number: BlockNumber) -> FsResult<()> {
        let zeroes = vec![0; self.block_size()];
        self.write_block(block_number, 0, &zeroes)
    }
}
