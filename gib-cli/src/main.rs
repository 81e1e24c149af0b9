//! gib: lightweight versioned backups
//!
//! Takes deduplicated point-in-time snapshots of files and directories into a
//! content-addressed store and extracts them again.
//!
//! # Usage
//!
//! ```bash
//! # Create a store in ./.gib
//! gib init
//!
//! # Snapshot one or more paths into the backup "home"
//! gib snapshot home ~/Documents ~/notes.txt
//!
//! # List snapshots (all backups, or one)
//! gib list
//! gib list home
//!
//! # Restore a snapshot into a new directory
//! gib extract home 20120209_153000 /tmp/restore
//!
//! # Forget a snapshot
//! gib delete home 20120209_153000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use gib_core::{DEFAULT_STORE_DIR, Repository};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gib")]
#[command(author = "Gib Contributors")]
#[command(version)]
#[command(about = "Lightweight versioned backups into a content-addressed store")]
struct Cli {
    /// Store directory
    #[arg(long, global = true, env = "GIB_STORE", default_value = DEFAULT_STORE_DIR)]
    store: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a store (safe to re-run)
    Init,

    /// Take a snapshot of the given path(s) and save it.
    ///
    /// Directories are backed up recursively into a directory at the root
    /// level of the snapshot; files are placed at the root level directly.
    /// The snapshot is written to refs/gib/<backup>/snapshots/YYYYMMDD_HHMMSS
    /// unless nothing changed since the latest snapshot.
    Snapshot {
        /// Backup name
        backup: String,
        /// Files or directories to back up
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List available snapshots for one backup, or for all backups
    List {
        /// Backup name
        backup: Option<String>,
    },

    /// Extract a snapshot into <dest>, which must not already exist
    Extract {
        /// Backup name
        backup: String,
        /// Snapshot name (YYYYMMDD_HHMMSS)
        snapshot: String,
        /// Destination directory
        dest: PathBuf,
    },

    /// Delete a snapshot (stored objects are kept)
    Delete {
        /// Backup name
        backup: String,
        /// Snapshot name (YYYYMMDD_HHMMSS)
        snapshot: String,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let store = cli.store;
    // Every command but init needs an existing store
    let open = || Repository::open(&store);

    match cli.command {
        Commands::Init => cmd_init(&store),
        Commands::Snapshot { backup, paths } => cmd_snapshot(&open()?, &backup, &paths),
        Commands::List { backup } => cmd_list(&open()?, backup.as_deref()),
        Commands::Extract {
            backup,
            snapshot,
            dest,
        } => cmd_extract(&open()?, &backup, &snapshot, dest),
        Commands::Delete { backup, snapshot } => cmd_delete(&open()?, &backup, &snapshot),
    }
}

fn cmd_init(store: &Path) -> Result<()> {
    let existed = Repository::is_initialized(store);
    let repo = Repository::init(store)?;
    if existed {
        println!("Reinitialized existing gib store in {}", store.display());
    } else {
        println!(
            "Initialized empty gib store in {} (UUID: {})",
            store.display(),
            repo.uuid()
        );
    }
    Ok(())
}

fn cmd_snapshot(repo: &Repository, backup: &str, paths: &[PathBuf]) -> Result<()> {
    let outcome = repo.snapshot(backup, paths)?;
    println!("{}", outcome);
    Ok(())
}

fn cmd_list(repo: &Repository, backup: Option<&str>) -> Result<()> {
    for name in repo.list(backup)? {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_extract(repo: &Repository, backup: &str, snapshot: &str, dest: PathBuf) -> Result<()> {
    let extraction = repo.extract(backup, snapshot, &dest)?;
    println!(
        "Extracted backup of '{}' snapshot '{}' to '{}'",
        backup,
        snapshot,
        dest.display()
    );
    println!(
        "Tree {}: {} files, {} empty directories restored",
        extraction.tree,
        extraction.files - extraction.markers_removed,
        extraction.markers_removed
    );
    Ok(())
}

fn cmd_delete(repo: &Repository, backup: &str, snapshot: &str) -> Result<()> {
    let outcome = repo.delete(backup, snapshot)?;
    println!("{}", outcome);
    Ok(())
}
