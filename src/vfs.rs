use std::collections::HashSet;
use std::time::SystemTime;

use anyhow::{bail, ensure, Context};
use log::{info, warn};

use crate::{
    block_store::{BlockNumber, BlockStore},
    config::FsConfig,
    directory::{validate_name, DirectoryTree},
    error::{FsError, FsResult},
    inode::{Inode, InodeKind, InodeNumber, InodeTable, InodeType, ROOT_INODE},
    path::{self, SEPARATOR},
    permissions::{Access, Permissions},
    storage::{BlockStorage, MemoryStorage},
};

/// One line of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub inum: InodeNumber,
    pub type_: InodeType,
    pub size: usize,
    pub permissions: Permissions,
    pub owner: String,
    pub modified: SystemTime,
}

/// Block usage summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Usage {
    pub block_size: usize,
    pub free_blocks: usize,
    pub total_blocks: usize,
}

/// An in-memory filesystem: block store, inode table, directory tree and the current directory.
///
/// Every operation either succeeds completely or fails without changing anything.
pub struct Vfs<S: BlockStorage = MemoryStorage> {
    config: FsConfig,
    store: BlockStore<S>,
    inodes: InodeTable,
    tree: DirectoryTree,
    cwd: InodeNumber,
}

impl Vfs<MemoryStorage> {
    pub fn new(config: FsConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let storage = MemoryStorage::new(config.block_size, config.num_blocks);
        Ok(Self::init(storage, config))
    }
}

impl<S: BlockStorage> Vfs<S> {
    /// Builds a filesystem with only the root directory on top of `storage`, which must match the
    /// geometry in `config`.
    pub fn with_storage(storage: S, config: FsConfig) -> anyhow::Result<Self> {
        config.validate()?;
        ensure!(
            storage.block_size() == config.block_size,
            "storage block size {} does not match configured block size {}",
            storage.block_size(),
            config.block_size
        );
        ensure!(
            storage.num_blocks() == config.num_blocks,
            "storage has {} blocks but {} are configured",
            storage.num_blocks(),
            config.num_blocks
        );

        Ok(Self::init(storage, config))
    }

    /// Creates the root directory on a validated configuration.
    fn init(storage: S, config: FsConfig) -> Self {
        let mut inodes = InodeTable::new();
        let root = inodes.create(
            InodeType::Directory,
            config.root_permissions,
            &config.root_owner,
        );

        info!("{} total blocks", config.num_blocks);
        info!("{} bytes per block", config.block_size);

        Self {
            store: BlockStore::new(storage),
            tree: DirectoryTree::new(root),
            inodes,
            cwd: root,
            config,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// The session user, whose permission triad applies to inodes they own.
    pub fn user(&self) -> &str {
        &self.config.root_owner
    }

    pub fn cwd(&self) -> InodeNumber {
        self.cwd
    }

    pub fn resolve(&self, path: &str) -> FsResult<InodeNumber> {
        path::resolve(&self.tree, path, self.cwd)
    }

    pub fn usage(&self) -> Usage {
        Usage {
            block_size: self.store.block_size(),
            free_blocks: self.store.free_count(),
            total_blocks: self.store.total_count(),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> FsResult<InodeNumber> {
        match self.resolve(path) {
            Ok(_) => return Err(FsError::NameExists(path.to_string())),
            Err(FsError::NoSuchPath(_)) => {}
            Err(err) => return Err(err),
        }

        let (parent, name) = self.resolve_parent(path)?;
        let inum = self.create_entry(
            parent,
            name,
            InodeType::Directory,
            self.config.directory_permissions,
        )?;

        info!("mkdir {path:?} -> inode #{inum}");
        Ok(inum)
    }

    /// Creates an empty file, or bumps the modified time of an existing entry.
    pub fn touch(&mut self, path: &str) -> FsResult<InodeNumber> {
        match self.resolve(path) {
            Ok(inum) => {
                self.inodes.touch(inum)?;
                return Ok(inum);
            }
            Err(FsError::NoSuchPath(_)) => {}
            Err(err) => return Err(err),
        }

        let (parent, name) = self.resolve_parent(path)?;
        let inum = self.create_entry(
            parent,
            name,
            InodeType::File,
            self.config.file_permissions,
        )?;

        info!("touch {path:?} -> inode #{inum}");
        Ok(inum)
    }

    pub fn cd(&mut self, path: &str) -> FsResult<()> {
        let inum = self.resolve(path)?;
        if !self.tree.is_directory(inum) {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.check_access(inum, Access::Execute, path)?;

        self.cwd = inum;
        Ok(())
    }

    pub fn pwd(&self) -> String {
        self.absolute_path(self.cwd)
    }

    /// The absolute path of a live inode.
    pub fn path_of(&self, inum: InodeNumber) -> FsResult<String> {
        self.inodes.get(inum)?;
        if inum != self.tree.root() && self.tree.parent(inum).is_none() {
            return Err(FsError::NoSuchInode(inum));
        }

        Ok(self.absolute_path(inum))
    }

    /// Lists a directory, defaulting to the current one.
    pub fn ls(&self, path: Option<&str>) -> FsResult<Vec<ListEntry>> {
        let path = path.unwrap_or(".");
        let dir = self.resolve(path)?;

        if !self.tree.is_directory(dir) {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        self.tree
            .list_entries(dir)?
            .iter()
            .map(|entry| -> FsResult<ListEntry> {
                let inode = self.inodes.get(entry.inum)?;
                Ok(ListEntry {
                    name: entry.name.clone(),
                    inum: entry.inum,
                    type_: inode.type_(),
                    size: inode.size,
                    permissions: inode.permissions,
                    owner: inode.owner.clone(),
                    modified: inode.modified,
                })
            })
            .collect()
    }

    pub fn stat(&self, path: &str) -> FsResult<Inode> {
        let inum = self.resolve(path)?;
        Ok(self.inodes.get(inum)?.clone())
    }

    /// Replaces the content of a file with `data`.
    pub fn write(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let inum = self.resolve_file(path)?;
        self.check_access(inum, Access::Write, path)?;

        self.write_file(inum, 0, data, data.len())?;

        info!("write {path:?} ({} bytes)", data.len());
        Ok(())
    }

    /// Adds `data` to the end of a file.
    pub fn append(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let inum = self.resolve_file(path)?;
        self.check_access(inum, Access::Write, path)?;

        let size = self.inodes.get(inum)?.size;
        self.write_file(inum, size, data, size + data.len())?;

        info!("append {path:?} ({} bytes)", data.len());
        Ok(())
    }

    pub fn cat(&self, path: &str) -> FsResult<Vec<u8>> {
        let inum = self.resolve_file(path)?;
        self.check_access(inum, Access::Read, path)?;

        let size = self.inodes.get(inum)?.size;
        self.read_file(inum, 0, size)
    }

    /// Copies `src` to `dst`, recursively for directories. If `dst` is an existing directory the
    /// copy is placed inside it under the source's name.
    pub fn cp(&mut self, src: &str, dst: &str) -> FsResult<InodeNumber> {
        let src_inum = self.resolve(src)?;
        let (dst_parent, dst_name) = self.destination(src_inum, src, dst)?;

        if self.tree.is_descendant_of(dst_parent, src_inum) {
            return Err(FsError::InvalidMove {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }

        let needed = self.blocks_to_copy(src_inum)?;
        let free = self.store.free_count();
        if needed > free {
            return Err(FsError::OutOfSpace { needed, free });
        }

        let inum = self.copy_subtree(src_inum, dst_parent, &dst_name)?;
        self.inodes.touch(dst_parent)?;

        info!("cp {src:?} {dst:?} -> inode #{inum} ({needed} blocks)");
        Ok(inum)
    }

    /// Moves `src` to `dst`, keeping its inode. If `dst` is an existing directory the entry is
    /// moved inside it under its current name.
    pub fn mv(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let src_inum = self.resolve(src)?;
        let Some(src_parent) = self.tree.parent(src_inum) else {
            return Err(FsError::Busy(src.to_string()));
        };
        let src_name = self.entry_name(src_inum)?;

        let (dst_parent, dst_name) = self.destination(src_inum, src, dst)?;

        if self.tree.is_descendant_of(dst_parent, src_inum) {
            return Err(FsError::InvalidMove {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }

        if src_parent == dst_parent {
            self.tree.rename_entry(src_parent, &src_name, &dst_name)?;
        } else {
            let entry = self.tree.remove_entry(src_parent, &src_name)?;
            self.tree
                .add_entry(dst_parent, &dst_name, entry.inum, entry.type_)?;
            self.inodes.touch(src_parent)?;
        }
        self.inodes.touch(dst_parent)?;

        info!("mv {src:?} {dst:?} (inode #{src_inum})");
        Ok(())
    }

    /// Removes a file or directory. A non-empty directory is only removed if `recursive` is set.
    pub fn rm(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        let inum = self.resolve(path)?;

        if self.tree.is_descendant_of(self.cwd, inum) {
            return Err(FsError::Busy(path.to_string()));
        }

        if self.tree.is_directory(inum)
            && !recursive
            && !self.tree.list_entries(inum)?.is_empty()
        {
            return Err(FsError::NotEmpty(path.to_string()));
        }

        let parent = self
            .tree
            .parent(inum)
            .ok_or_else(|| FsError::Busy(path.to_string()))?;
        let name = self.entry_name(inum)?;

        self.tree.remove_entry(parent, &name)?;
        let removed = self.destroy_subtree(inum)?;
        self.inodes.touch(parent)?;

        info!("rm {path:?} ({removed} inodes)");
        Ok(())
    }

    /// Sets permissions from a three-digit octal mode string such as `"755"`.
    pub fn chmod(&mut self, path: &str, mode: &str) -> FsResult<()> {
        let inum = self.resolve(path)?;
        let permissions = Permissions::from_octal(mode)?;

        self.inodes.set_permissions(inum, permissions)?;

        info!("chmod {path:?} {permissions:#}");
        Ok(())
    }

    pub fn chown(&mut self, path: &str, owner: &str) -> FsResult<()> {
        let inum = self.resolve(path)?;
        if owner.is_empty() || owner.chars().any(char::is_whitespace) {
            return Err(FsError::InvalidName(owner.to_string()));
        }

        self.inodes.set_owner(inum, owner)?;

        info!("chown {path:?} {owner}");
        Ok(())
    }

    /// Checks the filesystem for consistency. Performs a depth-first traversal of the directory
    /// tree from the root and then checks block accounting.
    pub fn check(&self) -> anyhow::Result<()> {
        let root = self.inodes.get(ROOT_INODE).context("no root inode")?;
        ensure!(root.is_directory(), "root inode is not a directory");
        ensure!(
            self.tree.parent(ROOT_INODE).is_none(),
            "root directory has a parent"
        );

        let mut queue = vec![ROOT_INODE];
        let mut reached = HashSet::<InodeNumber>::new();
        let mut owned_blocks = HashSet::<BlockNumber>::new();

        while let Some(inum) = queue.pop() {
            let inode = self
                .inodes
                .get(inum)
                .with_context(|| format!("directory tree includes missing inode #{inum}"))?;

            if !reached.insert(inum) {
                bail!("inode #{inum} is reachable more than once");
            }

            match &inode.kind {
                InodeKind::File { blocks } => {
                    ensure!(
                        blocks.len() == self.store.blocks_for(inode.size),
                        "inode #{inum} owns {} blocks for {} bytes",
                        blocks.len(),
                        inode.size
                    );

                    for &block_number in blocks {
                        ensure!(
                            self.store.is_allocated(block_number),
                            "inode #{inum} owns free block {block_number}"
                        );
                        ensure!(
                            owned_blocks.insert(block_number),
                            "block {block_number} is owned more than once"
                        );
                    }
                }
                InodeKind::Directory => {
                    if inode.size != 0 {
                        warn!("directory inode #{inum} has non-zero size");
                    }

                    let mut names = HashSet::new();
                    for entry in self.tree.list_entries(inum)? {
                        validate_name(&entry.name)?;
                        ensure!(
                            names.insert(entry.name.as_str()),
                            "directory #{inum} contains duplicate entry: {}",
                            entry.name
                        );
                        ensure!(
                            self.tree.parent(entry.inum) == Some(inum),
                            "entry {} in directory #{inum} has the wrong parent",
                            entry.name
                        );

                        let child = self.inodes.get(entry.inum)?;
                        ensure!(
                            child.type_() == entry.type_,
                            "entry {} in directory #{inum} has the wrong type",
                            entry.name
                        );
                        ensure!(
                            child.is_directory() == self.tree.is_directory(entry.inum),
                            "inode #{} disagrees with the directory tree about its type",
                            entry.inum
                        );

                        queue.push(entry.inum);
                    }
                }
            }
        }

        ensure!(
            reached.len() == self.inodes.len(),
            "{} inodes are not reachable from the root",
            self.inodes.len() - reached.len()
        );

        let directories = self.tree.directories().count();
        ensure!(
            directories == self.inodes.iter().filter(|i| i.is_directory()).count(),
            "directory tree has entry sets for {directories} directories"
        );

        ensure!(
            owned_blocks.len() == self.inodes.total_blocks_owned(),
            "inodes own unreachable blocks"
        );
        ensure!(
            self.store.free_count() + owned_blocks.len() == self.store.total_count(),
            "{} free + {} owned blocks != {} total blocks",
            self.store.free_count(),
            owned_blocks.len(),
            self.store.total_count()
        );

        ensure!(
            self.tree.is_directory(self.cwd) && reached.contains(&self.cwd),
            "current directory #{} is not a live directory",
            self.cwd
        );

        Ok(())
    }

    fn absolute_path(&self, inum: InodeNumber) -> String {
        let mut names = vec![];
        let mut current = inum;

        while let Some(name) = self.tree.name_of(current) {
            names.push(name);
            match self.tree.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }

        let path: String = names
            .iter()
            .rev()
            .flat_map(|name| [SEPARATOR.to_string(), name.to_string()])
            .collect();

        if path.is_empty() {
            SEPARATOR.to_string()
        } else {
            path
        }
    }

    fn entry_name(&self, inum: InodeNumber) -> FsResult<String> {
        self.tree
            .name_of(inum)
            .map(str::to_string)
            .ok_or(FsError::NoSuchInode(inum))
    }

    /// Resolves the directory that would hold the final component of `path`.
    fn resolve_parent<'p>(&self, path: &'p str) -> FsResult<(InodeNumber, &'p str)> {
        let (parent_path, name) =
            path::split_last(path).ok_or_else(|| FsError::InvalidName(path.to_string()))?;

        let parent = self.resolve(&parent_path)?;
        if !self.tree.is_directory(parent) {
            return Err(FsError::NotADirectory(parent_path));
        }

        Ok((parent, name))
    }

    fn resolve_file(&self, path: &str) -> FsResult<InodeNumber> {
        let inum = self.resolve(path)?;
        if self.tree.is_directory(inum) {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        Ok(inum)
    }

    /// Works out where `cp`/`mv` should bind `src`: inside `dst` if that is a directory, else at
    /// `dst` itself, which must not exist yet.
    fn destination(
        &self,
        src_inum: InodeNumber,
        src: &str,
        dst: &str,
    ) -> FsResult<(InodeNumber, String)> {
        match self.resolve(dst) {
            Ok(dir) if self.tree.is_directory(dir) => {
                let name = self.tree.name_of(src_inum).ok_or_else(|| FsError::InvalidMove {
                    src: src.to_string(),
                    dst: dst.to_string(),
                })?;

                if self.tree.lookup(dir, name)?.is_some() {
                    return Err(FsError::NameExists(path::join(dst, name)));
                }

                Ok((dir, name.to_string()))
            }
            Ok(_) => Err(FsError::NameExists(dst.to_string())),
            Err(FsError::NoSuchPath(_)) => {
                let (parent, name) = self.resolve_parent(dst)?;
                validate_name(name)?;

                Ok((parent, name.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn create_entry(
        &mut self,
        parent: InodeNumber,
        name: &str,
        type_: InodeType,
        permissions: Permissions,
    ) -> FsResult<InodeNumber> {
        validate_name(name)?;
        if self.tree.lookup(parent, name)?.is_some() {
            return Err(FsError::NameExists(name.to_string()));
        }

        let inum = self.inodes.create(type_, permissions, &self.config.root_owner);
        if type_ == InodeType::Directory {
            self.tree.add_directory(inum);
        }
        self.tree.add_entry(parent, name, inum, type_)?;
        self.inodes.touch(parent)?;

        Ok(inum)
    }

    fn check_access(&self, inum: InodeNumber, access: Access, path: &str) -> FsResult<()> {
        let inode = self.inodes.get(inum)?;
        let is_owner = inode.owner == self.config.root_owner;

        if !inode.permissions.allows(access, is_owner) {
            return Err(FsError::PermissionDenied(path.to_string()));
        }

        Ok(())
    }

    /// Reads up to `size` bytes starting at `offset`, stopping at the end of the file.
    fn read_file(&self, inum: InodeNumber, offset: usize, size: usize) -> FsResult<Vec<u8>> {
        let inode = self.inodes.get(inum)?;
        let block_size = self.store.block_size();
        let end = (offset + size).min(inode.size);

        let mut data = Vec::with_capacity(end.saturating_sub(offset));
        let mut position = offset;
        while position < end {
            let start_offset = position % block_size;
            let block_start = position - start_offset;
            let end_position = (block_start + block_size).min(end);

            let block_number = inode.blocks()[position / block_size];
            let block = self.store.read(block_number)?;
            data.extend_from_slice(&block[start_offset..end_position - block_start]);

            position = end_position;
        }

        Ok(data)
    }

    /// Resizes a file to `new_size` and writes `data` at `offset`.
    ///
    /// Resizing happens first, so running out of space leaves the file untouched.
    fn write_file(
        &mut self,
        inum: InodeNumber,
        offset: usize,
        data: &[u8],
        new_size: usize,
    ) -> FsResult<()> {
        debug_assert!(offset + data.len() <= new_size);

        self.inodes.resize(inum, new_size, &mut self.store)?;

        let blocks = self.inodes.get(inum)?.blocks().to_vec();
        let block_size = self.store.block_size();
        let end = offset + data.len();

        let mut position = offset;
        while position < end {
            let start_offset = position % block_size;
            let block_start = position - start_offset;
            let end_position = (block_start + block_size).min(end);

            self.store.write(
                blocks[position / block_size],
                start_offset,
                &data[position - offset..end_position - offset],
            )?;

            position = end_position;
        }

        info!("[inode #{inum}] wrote {} bytes at offset {offset}", data.len());
        Ok(())
    }

    /// Counts the blocks a copy of the subtree at `inum` needs, checking that every file in it
    /// is readable.
    fn blocks_to_copy(&self, inum: InodeNumber) -> FsResult<usize> {
        let mut needed = 0;
        let mut queue = vec![inum];

        while let Some(inum) = queue.pop() {
            let inode = self.inodes.get(inum)?;

            match inode.kind {
                InodeKind::File { .. } => {
                    self.check_access(inum, Access::Read, &self.absolute_path(inum))?;
                    needed += self.store.blocks_for(inode.size);
                }
                InodeKind::Directory => {
                    let entries = self.tree.list_entries(inum)?;
                    queue.extend(entries.iter().rev().map(|entry| entry.inum));
                }
            }
        }

        Ok(needed)
    }

    /// Duplicates the subtree at `src` and binds the copy as `name` in `parent`. Returns the
    /// inode of the copy.
    fn copy_subtree(
        &mut self,
        src: InodeNumber,
        parent: InodeNumber,
        name: &str,
    ) -> FsResult<InodeNumber> {
        let mut top = None;
        let mut queue = vec![(src, parent, name.to_string())];

        while let Some((src, parent, name)) = queue.pop() {
            let source = self.inodes.get(src)?.clone();
            let inum = self.inodes.create(
                source.type_(),
                source.permissions,
                &self.config.root_owner,
            );

            match source.kind {
                InodeKind::File { .. } => {
                    let data = self.read_file(src, 0, source.size)?;
                    self.write_file(inum, 0, &data, data.len())?;
                }
                InodeKind::Directory => {
                    self.tree.add_directory(inum);
                    let entries = self.tree.list_entries(src)?;
                    queue.extend(
                        entries
                            .iter()
                            .rev()
                            .map(|entry| (entry.inum, inum, entry.name.clone())),
                    );
                }
            }

            self.tree.add_entry(parent, &name, inum, source.type_())?;
            if top.is_none() {
                top = Some(inum);
            }
        }

        top.ok_or(FsError::NoSuchInode(src))
    }

    /// Destroys `inum` and everything beneath it. The entry pointing at `inum` must already be
    /// gone. Returns the number of inodes destroyed.
    fn destroy_subtree(&mut self, inum: InodeNumber) -> FsResult<usize> {
        let mut destroyed = 0;
        let mut queue = vec![inum];

        while let Some(inum) = queue.pop() {
            if self.tree.is_directory(inum) {
                for entry in self.tree.list_entries(inum)?.to_vec() {
                    self.tree.remove_entry(inum, &entry.name)?;
                    queue.push(entry.inum);
                }
            }

            self.inodes.destroy(inum, &mut self.store, &mut self.tree)?;
            destroyed += 1;
        }

        Ok(destroyed)
    }
}
