//! A line-oriented command interpreter on top of [`Vfs`].

use std::io::Write;
use std::ops::ControlFlow;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, Subcommand};

use crate::{
    inode::InodeType,
    storage::{BlockStorage, MemoryStorage},
    vfs::Vfs,
};

#[derive(Parser, Debug)]
#[command(
    name = "memfs",
    no_binary_name = true,
    disable_version_flag = true,
    help_template = "{all-args}"
)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a directory
    Mkdir { path: String },
    /// Create an empty file or update its modification time
    Touch { path: String },
    /// List directory contents
    Ls { path: Option<String> },
    /// Change the current directory (defaults to /)
    Cd { path: Option<String> },
    /// Print the current directory
    Pwd,
    /// Print file contents
    Cat { path: String },
    /// Replace file contents with TEXT
    Write {
        path: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Append TEXT to a file
    Append {
        path: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Copy a file or directory
    Cp { src: String, dst: String },
    /// Move or rename a file or directory
    Mv { src: String, dst: String },
    /// Remove a file or directory
    Rm {
        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
        path: String,
    },
    /// Change permissions (three octal digits, e.g. 755)
    Chmod { mode: String, path: String },
    /// Change the owner
    Chown { owner: String, path: String },
    /// Show inode metadata
    Stat { path: String },
    /// Show block usage
    Df,
    /// Check the filesystem for consistency
    Fsck,
    /// Quit
    Exit,
}

pub struct Shell<S: BlockStorage = MemoryStorage> {
    vfs: Vfs<S>,
}

impl<S: BlockStorage> Shell<S> {
    pub fn new(vfs: Vfs<S>) -> Self {
        Self { vfs }
    }

    pub fn vfs(&self) -> &Vfs<S> {
        &self.vfs
    }

    pub fn prompt(&self) -> String {
        format!("memfs:{}> ", self.vfs.pwd())
    }

    /// Runs one command line, writing its output to `out`.
    ///
    /// Returns [`ControlFlow::Break`] when the session should end.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<ControlFlow<()>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(ControlFlow::Continue(()));
        }

        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed.command,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => {
                write!(out, "{err}")?;
                return Ok(ControlFlow::Continue(()));
            }
            Err(err) => return Err(err.into()),
        };

        match command {
            Command::Mkdir { path } => {
                self.vfs.mkdir(&path).context("mkdir")?;
            }
            Command::Touch { path } => {
                self.vfs.touch(&path).context("touch")?;
            }
            Command::Ls { path } => {
                for entry in self.vfs.ls(path.as_deref()).context("ls")? {
                    let (kind, suffix) = match entry.type_ {
                        InodeType::Directory => ('d', "/"),
                        InodeType::File => ('-', ""),
                    };
                    writeln!(
                        out,
                        "{kind}{} {:<8} {:>8} {}{suffix}",
                        entry.permissions, entry.owner, entry.size, entry.name
                    )?;
                }
            }
            Command::Cd { path } => {
                self.vfs.cd(path.as_deref().unwrap_or("/")).context("cd")?;
            }
            Command::Pwd => writeln!(out, "{}", self.vfs.pwd())?,
            Command::Cat { path } => {
                let data = self.vfs.cat(&path).context("cat")?;
                let text = String::from_utf8_lossy(&data);
                if text.is_empty() || text.ends_with('\n') {
                    write!(out, "{text}")?;
                } else {
                    writeln!(out, "{text}")?;
                }
            }
            Command::Write { path, text } => {
                self.vfs
                    .write(&path, text.join(" ").as_bytes())
                    .context("write")?;
            }
            Command::Append { path, text } => {
                self.vfs
                    .append(&path, text.join(" ").as_bytes())
                    .context("append")?;
            }
            Command::Cp { src, dst } => {
                self.vfs.cp(&src, &dst).context("cp")?;
            }
            Command::Mv { src, dst } => self.vfs.mv(&src, &dst).context("mv")?,
            Command::Rm { recursive, path } => self.vfs.rm(&path, recursive).context("rm")?,
            Command::Chmod { mode, path } => self.vfs.chmod(&path, &mode).context("chmod")?,
            Command::Chown { owner, path } => self.vfs.chown(&path, &owner).context("chown")?,
            Command::Stat { path } => {
                let inode = self.vfs.stat(&path).context("stat")?;
                let type_ = match inode.type_() {
                    InodeType::Directory => "directory",
                    InodeType::File => "file",
                };

                writeln!(out, "  Path: {}", self.vfs.path_of(inode.inum)?)?;
                writeln!(out, " Inode: {}  Type: {type_}", inode.inum)?;
                writeln!(
                    out,
                    "  Size: {}  Blocks: {:?}",
                    inode.size,
                    inode.blocks()
                )?;
                writeln!(
                    out,
                    "Access: ({:#}/{})  Owner: {}",
                    inode.permissions, inode.permissions, inode.owner
                )?;
                writeln!(out, "Create: {}", epoch_seconds(inode.created))?;
                writeln!(out, "Modify: {}", epoch_seconds(inode.modified))?;
            }
            Command::Df => {
                let usage = self.vfs.usage();
                writeln!(
                    out,
                    "{} blocks of {} bytes: {} used, {} free",
                    usage.total_blocks,
                    usage.block_size,
                    usage.total_blocks - usage.free_blocks,
                    usage.free_blocks
                )?;
            }
            Command::Fsck => {
                self.vfs.check().context("fsck")?;
                writeln!(out, "filesystem is consistent")?;
            }
            Command::Exit => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(()))
    }
}

/// Seconds since the Unix epoch, or zero for earlier times.
fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
