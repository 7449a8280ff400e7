//! Path resolution against the directory tree.

use log::debug;

use crate::{
    directory::DirectoryTree,
    error::{FsError, FsResult},
    inode::InodeNumber,
};

pub const SEPARATOR: char = '/';

/// The non-empty components of `path`. Repeated separators collapse.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|component| !component.is_empty())
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Resolves `path` to an inode, starting at the root for absolute paths and at `cwd` otherwise.
///
/// Every component but the last must name a directory. `.` stays put and `..` moves to the
/// parent; the root is its own parent.
pub fn resolve(tree: &DirectoryTree, path: &str, cwd: InodeNumber) -> FsResult<InodeNumber> {
    let mut current = if is_absolute(path) { tree.root() } else { cwd };
    let mut walked = if is_absolute(path) {
        String::from(SEPARATOR)
    } else {
        String::new()
    };

    for component in components(path) {
        if !tree.is_directory(current) {
            return Err(FsError::NotADirectory(walked));
        }

        if !walked.is_empty() && !walked.ends_with(SEPARATOR) {
            walked.push(SEPARATOR);
        }
        walked.push_str(component);

        current = match component {
            "." => current,
            ".." => tree.parent(current).unwrap_or(tree.root()),
            name => tree
                .lookup(current, name)?
                .ok_or_else(|| FsError::NoSuchPath(walked.clone()))?
                .inum,
        };
    }

    debug!("resolved {path:?} to inode #{current}");

    Ok(current)
}

/// Splits `path` into the path of its parent directory and its final component.
///
/// Returns `None` when there is no final component (`""`, `"/"`, `"//"`).
pub fn split_last(path: &str) -> Option<(String, &str)> {
    let mut components: Vec<&str> = components(path).collect();
    let name = components.pop()?;

    let separator = SEPARATOR.to_string();
    let joined = components.join(separator.as_str());
    let parent = if is_absolute(path) {
        format!("{SEPARATOR}{joined}")
    } else if joined.is_empty() {
        String::from(".")
    } else {
        joined
    };

    Some((parent, name))
}

/// Joins a directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with(SEPARATOR) {
        format!("{dir}{name}")
    } else {
        format!("{dir}{SEPARATOR}{name}")
    }
}
