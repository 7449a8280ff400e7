use anyhow::{ensure, Result};

use crate::permissions::Permissions;

/// Parameters fixed when a filesystem is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsConfig {
    /// Capacity of a single block in bytes.
    pub block_size: usize,
    /// Total number of blocks in the block store.
    pub num_blocks: usize,
    pub root_permissions: Permissions,
    /// Owner of the root directory. This is also the identity of the session user.
    pub root_owner: String,
    /// Permissions given to newly created files.
    pub file_permissions: Permissions,
    /// Permissions given to newly created directories.
    pub directory_permissions: Permissions,
}

impl FsConfig {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;
    pub const DEFAULT_NUM_BLOCKS: usize = 1000;
    pub const DEFAULT_OWNER: &'static str = "user";

    pub fn validate(&self) -> Result<()> {
        ensure!(self.block_size > 0, "invalid block size: {}", self.block_size);
        ensure!(
            self.num_blocks > 0,
            "invalid number of blocks: {}",
            self.num_blocks
        );
        ensure!(!self.root_owner.is_empty(), "root owner must not be empty");
        ensure!(
            self.block_size.checked_mul(self.num_blocks).is_some(),
            "block store of {} x {} bytes is too large",
            self.num_blocks,
            self.block_size
        );

        Ok(())
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        let dir_mode = Permissions::OWNER_READ
            | Permissions::OWNER_WRITE
            | Permissions::OWNER_EXECUTE
            | Permissions::GROUP_READ
            | Permissions::GROUP_EXECUTE
            | Permissions::OTHER_READ
            | Permissions::OTHER_EXECUTE;
        let file_mode = Permissions::OWNER_READ
            | Permissions::OWNER_WRITE
            | Permissions::GROUP_READ
            | Permissions::OTHER_READ;

        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            num_blocks: Self::DEFAULT_NUM_BLOCKS,
            root_permissions: dir_mode,
            root_owner: Self::DEFAULT_OWNER.to_string(),
            file_permissions: file_mode,
            directory_permissions: dir_mode,
        }
    }
}
