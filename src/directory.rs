use std::collections::HashMap;

use crate::{
    error::{FsError, FsResult},
    inode::{InodeNumber, InodeType},
    path::SEPARATOR,
};

/// A name-to-inode binding inside a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub inum: InodeNumber,
    pub type_: InodeType,
}

/// The directory hierarchy.
///
/// Every directory owns an entry set kept in insertion order. `.` and `..` are never stored;
/// `..` is answered from the parent index, which records the parent of every inode that is
/// bound to an entry.
#[derive(Debug)]
pub struct DirectoryTree {
    root: InodeNumber,
    entries: HashMap<InodeNumber, Vec<DirectoryEntry>>,
    parents: HashMap<InodeNumber, InodeNumber>,
}

impl DirectoryTree {
    pub fn new(root: InodeNumber) -> Self {
        Self {
            root,
            entries: HashMap::from([(root, vec![])]),
            parents: HashMap::new(),
        }
    }

    pub fn root(&self) -> InodeNumber {
        self.root
    }

    /// Registers an empty entry set for a newly created directory inode.
    pub fn add_directory(&mut self, inum: InodeNumber) {
        self.entries.entry(inum).or_default();
    }

    /// Drops the entry set of a directory, which must be empty.
    pub fn remove_directory(&mut self, inum: InodeNumber) -> FsResult<()> {
        match self.entries.get(&inum) {
            None => Err(FsError::NotADirectory(format!("inode {inum}"))),
            Some(entries) if !entries.is_empty() => {
                Err(FsError::NotEmpty(format!("inode {inum}")))
            }
            Some(_) => {
                self.entries.remove(&inum);
                Ok(())
            }
        }
    }

    pub fn is_directory(&self, inum: InodeNumber) -> bool {
        self.entries.contains_key(&inum)
    }

    pub fn add_entry(
        &mut self,
        parent: InodeNumber,
        name: &str,
        child: InodeNumber,
        type_: InodeType,
    ) -> FsResult<()> {
        validate_name(name)?;

        let entries = self.entries_mut(parent)?;
        if entries.iter().any(|entry| entry.name == name) {
            return Err(FsError::NameExists(name.to_string()));
        }

        entries.push(DirectoryEntry {
            name: name.to_string(),
            inum: child,
            type_,
        });
        self.parents.insert(child, parent);

        Ok(())
    }

    pub fn remove_entry(&mut self, parent: InodeNumber, name: &str) -> FsResult<DirectoryEntry> {
        let entries = self.entries_mut(parent)?;
        let index = entries
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| FsError::NoSuchPath(name.to_string()))?;

        let entry = entries.remove(index);
        self.parents.remove(&entry.inum);

        Ok(entry)
    }

    /// Renames an entry in place, keeping its position in the listing.
    pub fn rename_entry(
        &mut self,
        parent: InodeNumber,
        old_name: &str,
        new_name: &str,
    ) -> FsResult<()> {
        validate_name(new_name)?;

        let entries = self.entries_mut(parent)?;
        let index = entries
            .iter()
            .position(|entry| entry.name == old_name)
            .ok_or_else(|| FsError::NoSuchPath(old_name.to_string()))?;

        if old_name == new_name {
            return Ok(());
        }

        if entries.iter().any(|entry| entry.name == new_name) {
            return Err(FsError::NameExists(new_name.to_string()));
        }

        entries[index].name = new_name.to_string();

        Ok(())
    }

    /// The direct children of `dir`, in insertion order.
    pub fn list_entries(&self, dir: InodeNumber) -> FsResult<&[DirectoryEntry]> {
        self.entries
            .get(&dir)
            .map(Vec::as_slice)
            .ok_or_else(|| FsError::NotADirectory(format!("inode {dir}")))
    }

    pub fn lookup(&self, dir: InodeNumber, name: &str) -> FsResult<Option<&DirectoryEntry>> {
        Ok(self
            .list_entries(dir)?
            .iter()
            .find(|entry| entry.name == name))
    }

    /// The directory holding the entry for `inum`. The root has no parent.
    pub fn parent(&self, inum: InodeNumber) -> Option<InodeNumber> {
        self.parents.get(&inum).copied()
    }

    /// The name under which `inum` is bound in its parent.
    pub fn name_of(&self, inum: InodeNumber) -> Option<&str> {
        let parent = self.parent(inum)?;

        self.entries
            .get(&parent)?
            .iter()
            .find(|entry| entry.inum == inum)
            .map(|entry| entry.name.as_str())
    }

    /// Whether `inum` is `ancestor` itself or lies somewhere beneath it.
    pub fn is_descendant_of(&self, inum: InodeNumber, ancestor: InodeNumber) -> bool {
        let mut current = Some(inum);

        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }

        false
    }

    /// Every directory with an entry set, including the root.
    pub fn directories(&self) -> impl Iterator<Item = InodeNumber> + '_ {
        self.entries.keys().copied()
    }

    fn entries_mut(&mut self, dir: InodeNumber) -> FsResult<&mut Vec<DirectoryEntry>> {
        self.entries
            .get_mut(&dir)
            .ok_or_else(|| FsError::NotADirectory(format!("inode {dir}")))
    }
}

/// Checks that `name` can be stored as a directory entry.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
        return Err(FsError::InvalidName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: InodeNumber = 1;

    fn tree_with_dir() -> DirectoryTree {
        let mut tree = DirectoryTree::new(ROOT);
        tree.add_directory(2);
        tree.add_entry(ROOT, "dir", 2, InodeType::Directory).unwrap();
        tree
    }

    mod add_entry {
        use super::*;

        #[test]
        fn test_name_exists() {
            let mut tree = tree_with_dir();
            tree.add_entry(ROOT, "f", 3, InodeType::File).unwrap();
            let before = tree.list_entries(ROOT).unwrap().to_vec();

            assert_eq!(
                tree.add_entry(ROOT, "f", 4, InodeType::File),
                Err(FsError::NameExists("f".into()))
            );
            assert_eq!(tree.list_entries(ROOT).unwrap(), before.as_slice());
            assert_eq!(tree.parent(4), None);
        }

        #[test]
        fn test_invalid_names() {
            let mut tree = tree_with_dir();

            for name in ["", ".", "..", "a/b", "/"] {
                assert_eq!(
                    tree.add_entry(ROOT, name, 3, InodeType::File),
                    Err(FsError::InvalidName(name.into()))
                );
            }
        }

        #[test]
        fn test_non_directory_parent() {
            let mut tree = tree_with_dir();
            tree.add_entry(ROOT, "f", 3, InodeType::File).unwrap();

            assert!(matches!(
                tree.add_entry(3, "g", 4, InodeType::File),
                Err(FsError::NotADirectory(_))
            ));
        }

        #[test]
        fn test_records_parent() {
            let mut tree = tree_with_dir();
            tree.add_entry(2, "f", 3, InodeType::File).unwrap();

            assert_eq!(tree.parent(3), Some(2));
            assert_eq!(tree.parent(2), Some(ROOT));
            assert_eq!(tree.parent(ROOT), None);
            assert_eq!(tree.name_of(3), Some("f"));
        }
    }

    mod remove_entry {
        use super::*;

        #[test]
        fn test_missing_entry() {
            let mut tree = tree_with_dir();
            assert!(matches!(
                tree.remove_entry(ROOT, "nope"),
                Err(FsError::NoSuchPath(_))
            ));
        }

        #[test]
        fn test_removes_entry_and_parent_link() {
            let mut tree = tree_with_dir();
            let entry = tree.remove_entry(ROOT, "dir").unwrap();

            assert_eq!(entry.inum, 2);
            assert!(tree.list_entries(ROOT).unwrap().is_empty());
            assert_eq!(tree.parent(2), None);
        }
    }

    mod rename_entry {
        use super::*;

        #[test]
        fn test_keeps_position() {
            let mut tree = tree_with_dir();
            tree.add_entry(ROOT, "a", 3, InodeType::File).unwrap();
            tree.add_entry(ROOT, "b", 4, InodeType::File).unwrap();

            tree.rename_entry(ROOT, "a", "z").unwrap();

            let names: Vec<_> = tree
                .list_entries(ROOT)
                .unwrap()
                .iter()
                .map(|entry| entry.name.as_str())
                .collect();
            assert_eq!(names, ["dir", "z", "b"]);
        }

        #[test]
        fn test_taken_name() {
            let mut tree = tree_with_dir();
            tree.add_entry(ROOT, "a", 3, InodeType::File).unwrap();

            assert_eq!(
                tree.rename_entry(ROOT, "a", "dir"),
                Err(FsError::NameExists("dir".into()))
            );
            assert_eq!(tree.name_of(3), Some("a"));
        }

        #[test]
        fn test_same_name() {
            let mut tree = tree_with_dir();
            assert!(tree.rename_entry(ROOT, "dir", "dir").is_ok());
        }
    }

    mod list_entries {
        use super::*;

        #[test]
        fn test_insertion_order() {
            let mut tree = DirectoryTree::new(ROOT);
            for (i, name) in ["c", "a", "b"].into_iter().enumerate() {
                tree.add_entry(ROOT, name, 10 + i as InodeNumber, InodeType::File)
                    .unwrap();
            }

            let entries = tree.list_entries(ROOT).unwrap();
            assert_eq!(entries[0].name, "c");
            assert_eq!(entries[1].name, "a");
            assert_eq!(entries[2].name, "b");
        }

        #[test]
        fn test_not_a_directory() {
            let tree = tree_with_dir();
            assert!(matches!(
                tree.list_entries(99),
                Err(FsError::NotADirectory(_))
            ));
        }
    }

    #[test]
    fn test_remove_directory() {
        let mut tree = tree_with_dir();
        tree.add_entry(2, "f", 3, InodeType::File).unwrap();

        assert!(matches!(tree.remove_directory(2), Err(FsError::NotEmpty(_))));

        tree.remove_entry(2, "f").unwrap();
        tree.remove_directory(2).unwrap();
        assert!(!tree.is_directory(2));
    }

    #[test]
    fn test_is_descendant_of() {
        let mut tree = tree_with_dir();
        tree.add_directory(3);
        tree.add_entry(2, "sub", 3, InodeType::Directory).unwrap();

        assert!(tree.is_descendant_of(3, ROOT));
        assert!(tree.is_descendant_of(3, 2));
        assert!(tree.is_descendant_of(2, 2));
        assert!(!tree.is_descendant_of(2, 3));
    }
}
