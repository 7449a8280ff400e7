use std::collections::BTreeMap;
use std::time::SystemTime;

use log::info;

use crate::{
    block_store::{BlockNumber, BlockStore},
    directory::DirectoryTree,
    error::{FsError, FsResult},
    permissions::Permissions,
    storage::BlockStorage,
};

pub type InodeNumber = u32;

/// The inode of the root directory. Inode numbers are handed out upwards from here.
pub const ROOT_INODE: InodeNumber = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InodeType {
    File,
    Directory,
}

/// Type-specific inode content.
///
/// Directory content lives in the [`DirectoryTree`], keyed by the directory's inode number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InodeKind {
    File {
        /// The blocks holding the file content, in file order.
        blocks: Vec<BlockNumber>,
    },
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inode {
    pub inum: InodeNumber,
    pub kind: InodeKind,
    /// File size in bytes. Always zero for directories.
    pub size: usize,
    pub permissions: Permissions,
    pub owner: String,
    pub created: SystemTime,
    pub modified: SystemTime,
}

impl Inode {
    pub fn type_(&self) -> InodeType {
        match self.kind {
            InodeKind::File { .. } => InodeType::File,
            InodeKind::Directory => InodeType::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.type_() == InodeType::Directory
    }

    pub fn blocks(&self) -> &[BlockNumber] {
        match &self.kind {
            InodeKind::File { blocks } => blocks,
            InodeKind::Directory => &[],
        }
    }
}

/// Maps inode numbers to inodes.
#[derive(Debug)]
pub struct InodeTable {
    inodes: BTreeMap<InodeNumber, Inode>,
    next_inum: InodeNumber,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            inodes: BTreeMap::new(),
            next_inum: ROOT_INODE,
        }
    }

    /// Installs a fresh empty inode and returns its number.
    pub fn create(
        &mut self,
        type_: InodeType,
        permissions: Permissions,
        owner: &str,
    ) -> InodeNumber {
        let inum = self.next_inum;
        self.next_inum += 1;

        let kind = match type_ {
            InodeType::File => InodeKind::File { blocks: vec![] },
            InodeType::Directory => InodeKind::Directory,
        };

        let now = SystemTime::now();
        self.inodes.insert(
            inum,
            Inode {
                inum,
                kind,
                size: 0,
                permissions,
                owner: owner.to_string(),
                created: now,
                modified: now,
            },
        );

        inum
    }

    pub fn get(&self, inum: InodeNumber) -> FsResult<&Inode> {
        self.inodes.get(&inum).ok_or(FsError::NoSuchInode(inum))
    }

    pub fn contains(&self, inum: InodeNumber) -> bool {
        self.inodes.contains_key(&inum)
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.values()
    }

    pub fn set_permissions(
        &mut self,
        inum: InodeNumber,
        permissions: Permissions,
    ) -> FsResult<()> {
        self.update(inum, |inode| inode.permissions = permissions)
    }

    pub fn set_owner(&mut self, inum: InodeNumber, owner: &str) -> FsResult<()> {
        self.update(inum, |inode| inode.owner = owner.to_string())
    }

    /// Sets the modified time to now.
    pub fn touch(&mut self, inum: InodeNumber) -> FsResult<()> {
        self.update(inum, |inode| inode.modified = SystemTime::now())
    }

    /// Grows or shrinks a file to `new_size` bytes, allocating or releasing blocks as needed.
    ///
    /// Blocks gained by growing are zero-filled. If allocation fails the inode is unchanged.
    pub fn resize<S: BlockStorage>(
        &mut self,
        inum: InodeNumber,
        new_size: usize,
        store: &mut BlockStore<S>,
    ) -> FsResult<()> {
        let inode = self.inodes.get_mut(&inum).ok_or(FsError::NoSuchInode(inum))?;
        let InodeKind::File { blocks } = &mut inode.kind else {
            return Err(FsError::IsADirectory(format!("inode {inum}")));
        };

        let needed = store.blocks_for(new_size);
        let owned = blocks.len();

        if needed > owned {
            let additional = store.allocate(needed - owned)?;
            blocks.extend(additional);
        } else if needed < owned {
            store.release(&blocks[needed..])?;
            blocks.truncate(needed);
        }

        if needed != owned {
            info!("[inode #{inum}] resized from {owned} to {needed} blocks");
        }

        inode.size = new_size;
        inode.modified = SystemTime::now();

        Ok(())
    }

    /// Removes an inode, returning its blocks to `store`.
    ///
    /// A directory must have no entries left; its (empty) entry set is dropped from `tree`.
    pub fn destroy<S: BlockStorage>(
        &mut self,
        inum: InodeNumber,
        store: &mut BlockStore<S>,
        tree: &mut DirectoryTree,
    ) -> FsResult<Inode> {
        let inode = self.get(inum)?;

        match &inode.kind {
            InodeKind::Directory => tree.remove_directory(inum)?,
            InodeKind::File { blocks } => store.release(blocks)?,
        }

        info!("[inode #{inum}] destroyed");

        self.inodes.remove(&inum).ok_or(FsError::NoSuchInode(inum))
    }

    /// The number of blocks owned by all live inodes combined.
    pub fn total_blocks_owned(&self) -> usize {
        self.inodes.values().map(|inode| inode.blocks().len()).sum()
    }

    fn update<F>(&mut self, inum: InodeNumber, update_inode: F) -> FsResult<()>
    where
        F: FnOnce(&mut Inode),
    {
        let inode = self.inodes.get_mut(&inum).ok_or(FsError::NoSuchInode(inum))?;
        update_inode(inode);

        Ok(())
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStorage;

    use super::*;

    const BLOCK_SIZE: usize = 4;

    fn store(num_blocks: usize) -> BlockStore<MemoryStorage> {
        BlockStore::new(MemoryStorage::new(BLOCK_SIZE, num_blocks))
    }

    fn perms() -> Permissions {
        Permissions::from_octal("644").unwrap()
    }

    mod create {
        use super::*;

        #[test]
        fn test_fresh_inode() {
            let mut table = InodeTable::new();
            let inum = table.create(InodeType::File, perms(), "alice");

            let inode = table.get(inum).unwrap();
            assert_eq!(inode.inum, ROOT_INODE);
            assert_eq!(inode.type_(), InodeType::File);
            assert_eq!(inode.size, 0);
            assert!(inode.blocks().is_empty());
            assert_eq!(inode.owner, "alice");
            assert_eq!(inode.created, inode.modified);
        }

        #[test]
        fn test_numbers_are_not_reused() {
            let mut table = InodeTable::new();
            let mut store = store(1);
            let mut tree = DirectoryTree::new(ROOT_INODE);

            let first = table.create(InodeType::File, perms(), "u");
            table.destroy(first, &mut store, &mut tree).unwrap();
            let second = table.create(InodeType::File, perms(), "u");

            assert_ne!(first, second);
        }
    }

    mod get {
        use super::*;

        #[test]
        fn test_missing_inode() {
            let mut table = InodeTable::new();
            assert_eq!(table.get(42), Err(FsError::NoSuchInode(42)));
            assert_eq!(table.touch(42), Err(FsError::NoSuchInode(42)));
            assert_eq!(table.set_owner(42, "x"), Err(FsError::NoSuchInode(42)));
        }

        #[test]
        fn test_set_metadata() {
            let mut table = InodeTable::new();
            let inum = table.create(InodeType::File, perms(), "u");

            table.set_owner(inum, "bob").unwrap();
            table
                .set_permissions(inum, Permissions::from_octal("600").unwrap())
                .unwrap();

            let inode = table.get(inum).unwrap();
            assert_eq!(inode.owner, "bob");
            assert_eq!(inode.permissions.mode(), 0o600);
        }
    }

    mod resize {
        use super::*;

        #[test]
        fn test_grow_and_shrink() {
            let mut table = InodeTable::new();
            let mut store = store(8);
            let inum = table.create(InodeType::File, perms(), "u");

            table.resize(inum, 9, &mut store).unwrap();
            assert_eq!(table.get(inum).unwrap().blocks().len(), 3);
            assert_eq!(table.get(inum).unwrap().size, 9);
            assert_eq!(store.free_count(), 5);

            table.resize(inum, 4, &mut store).unwrap();
            assert_eq!(table.get(inum).unwrap().blocks(), &[0]);
            assert_eq!(store.free_count(), 7);

            table.resize(inum, 0, &mut store).unwrap();
            assert!(table.get(inum).unwrap().blocks().is_empty());
            assert_eq!(store.free_count(), 8);
        }

        #[test]
        fn test_failed_growth_leaves_inode_unchanged() {
            let mut table = InodeTable::new();
            let mut store = store(2);
            let inum = table.create(InodeType::File, perms(), "u");
            table.resize(inum, 3, &mut store).unwrap();
            let before = table.get(inum).unwrap().clone();

            assert_eq!(
                table.resize(inum, 3 * BLOCK_SIZE, &mut store),
                Err(FsError::OutOfSpace { needed: 2, free: 1 })
            );
            assert_eq!(table.get(inum).unwrap(), &before);
            assert_eq!(store.free_count(), 1);
        }

        #[test]
        fn test_directory() {
            let mut table = InodeTable::new();
            let mut store = store(2);
            let inum = table.create(InodeType::Directory, perms(), "u");

            assert!(matches!(
                table.resize(inum, 1, &mut store),
                Err(FsError::IsADirectory(_))
            ));
        }
    }

    mod destroy {
        use super::*;

        #[test]
        fn test_releases_blocks() {
            let mut table = InodeTable::new();
            let mut store = store(4);
            let mut tree = DirectoryTree::new(ROOT_INODE);
            let inum = table.create(InodeType::File, perms(), "u");
            table.resize(inum, 10, &mut store).unwrap();

            table.destroy(inum, &mut store, &mut tree).unwrap();

            assert!(!table.contains(inum));
            assert_eq!(store.free_count(), 4);
            assert_eq!(table.total_blocks_owned(), 0);
        }

        #[test]
        fn test_non_empty_directory() {
            let mut table = InodeTable::new();
            let mut store = store(1);
            let root = table.create(InodeType::Directory, perms(), "u");
            let mut tree = DirectoryTree::new(root);
            let child = table.create(InodeType::File, perms(), "u");
            tree.add_entry(root, "f", child, InodeType::File).unwrap();

            assert!(matches!(
                table.destroy(root, &mut store, &mut tree),
                Err(FsError::NotEmpty(_))
            ));
            assert!(table.contains(root));
        }

        #[test]
        fn test_missing_inode() {
            let mut table = InodeTable::new();
            let mut store = store(1);
            let mut tree = DirectoryTree::new(ROOT_INODE);

            assert_eq!(
                table.destroy(7, &mut store, &mut tree),
                Err(FsError::NoSuchInode(7))
            );
        }
    }
}
