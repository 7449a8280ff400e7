use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use memfs::permissions::Permissions;
use memfs::shell::Shell;
use memfs::{FsConfig, FsError, Vfs};

#[derive(Parser)]
#[command(about = "An in-memory Unix-like filesystem shell")]
struct Args {
    /// File of commands to run instead of reading stdin
    script: Option<PathBuf>,
    /// Block size in bytes
    #[arg(long, default_value_t = FsConfig::DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    /// Total number of blocks
    #[arg(long = "blocks", default_value_t = FsConfig::DEFAULT_NUM_BLOCKS)]
    num_blocks: usize,
    /// Owner of the root directory and identity of the session user
    #[arg(long, default_value = FsConfig::DEFAULT_OWNER)]
    owner: String,
    /// Permissions of the root directory
    #[arg(long, default_value = "755", value_parser = Permissions::from_octal)]
    root_mode: Permissions,
    /// Permissions of new files
    #[arg(long, default_value = "644", value_parser = Permissions::from_octal)]
    file_mode: Permissions,
    /// Permissions of new directories
    #[arg(long, default_value = "755", value_parser = Permissions::from_octal)]
    dir_mode: Permissions,
    /// Stop at the first failing command and exit with its errno
    #[arg(long)]
    exit_on_error: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = FsConfig {
        block_size: args.block_size,
        num_blocks: args.num_blocks,
        root_permissions: args.root_mode,
        root_owner: args.owner,
        file_permissions: args.file_mode,
        directory_permissions: args.dir_mode,
    };
    let vfs = Vfs::new(config).context("unable to initialize filesystem")?;
    let mut shell = Shell::new(vfs);

    let interactive = args.script.is_none() && io::stdin().is_terminal();
    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("unable to open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let mut stdout = io::stdout().lock();
    if interactive {
        writeln!(stdout, "Type 'help' for commands or 'exit' to quit.")?;
    }

    let mut lines = input.lines();
    loop {
        if interactive {
            write!(stdout, "{}", shell.prompt())?;
            stdout.flush()?;
        }

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("reading command")?;

        match shell.execute(&line, &mut stdout) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(err) => {
                stdout.flush()?;
                eprintln!("error: {err:#}");

                if args.exit_on_error {
                    let code = err.downcast_ref::<FsError>().map_or(1, FsError::errno);
                    process::exit(code);
                }
            }
        }
    }

    Ok(())
}
