//! Backup automation entry point.
//!
//! # Responsibility
//! - Run snapshot, retention and restore against the configured store.
//! - Report results on stdout and exit non-zero on failure.

use clap::{ArgGroup, Parser, Subcommand};
use log::error;
use officina_core::{init_from_config, BackupManager, CoreConfig, SqliteRecordStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "officina-cli", version, about = "Workshop store backups")]
#[command(group(ArgGroup::new("source").required(true).args(["config", "data_dir"])))]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the default layout under this data directory instead of a config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Take a snapshot and prune old ones.
    Snapshot,
    /// Remove the oldest snapshots.
    Prune {
        /// Snapshots to keep; defaults to the configured limit.
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Replace the store content with a snapshot.
    Restore {
        /// Snapshot directory.
        location: PathBuf,
    },
    /// List snapshots, most recent first.
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli)?;
    if let Err(err) = init_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let store = SqliteRecordStore::open(&config.db_path).map_err(|err| err.to_string())?;
    let manager = BackupManager::from_config(Arc::new(store), &config);

    match cli.command {
        Command::Snapshot => {
            let outcome = manager.snapshot().map_err(|err| err.to_string())?;
            println!(
                "snapshot {} ({} records)",
                outcome.snapshot.path.display(),
                outcome.records
            );
            for removed in &outcome.pruned {
                println!("pruned {}", removed.name);
            }
            if let Some(warning) = &outcome.prune_warning {
                println!("warning: retention did not complete: {warning}");
            }
        }
        Command::Prune { keep } => {
            let keep = keep.unwrap_or(manager.max_snapshots());
            let removed = manager.prune(keep).map_err(|err| err.to_string())?;
            if removed.is_empty() {
                println!("nothing to prune (limit {keep})");
            }
            for snapshot in removed {
                println!("pruned {}", snapshot.name);
            }
        }
        Command::Restore { location } => {
            let report = manager.restore(&location).map_err(|err| {
                error!("event=cli_restore module=cli status=error error={err}");
                err.to_string()
            })?;
            println!(
                "restored {} records in {} collections from {}",
                report.records,
                report.collections,
                location.display()
            );
        }
        Command::List => {
            let snapshots = manager.list().map_err(|err| err.to_string())?;
            if snapshots.is_empty() {
                println!("no snapshots in {}", manager.backup_dir().display());
            }
            for snapshot in snapshots {
                println!("{}\t{}", snapshot.name, snapshot.taken_at);
            }
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<CoreConfig, String> {
    let config = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => CoreConfig::load(path).map_err(|err| err.to_string())?,
        (None, Some(data_dir)) => {
            let data_dir = std::path::absolute(data_dir).map_err(|err| err.to_string())?;
            CoreConfig::defaults_in(data_dir)
        }
        (None, None) => return Err("either --config or --data-dir is required".to_string()),
    };
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn prune_accepts_keep_override() {
        let cli = Cli::try_parse_from([
            "officina-cli",
            "--data-dir",
            "/srv/o",
            "prune",
            "--keep",
            "3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Prune { keep: Some(3) }));
    }

    #[test]
    fn config_source_is_required() {
        assert!(Cli::try_parse_from(["officina-cli", "list"]).is_err());
    }
}
