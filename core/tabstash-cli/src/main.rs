//! tabstash: operational CLI over the file-backed snapshot store.
//!
//! Works directly against the storage root (`~/.tabstash` by default), so
//! snapshots can be inspected, backed up, and pruned without a running
//! host binding.

mod logging;

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use tabstash_core::storage::{FileStore, KeyValueStore};
use tabstash_core::{QuotaLevel, SnapshotStore, TrackerConfig};

#[derive(Parser)]
#[command(name = "tabstash")]
#[command(about = "Browser window snapshot store")]
#[command(version)]
struct Cli {
    /// Storage root directory (default: ~/.tabstash)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored snapshots
    List,

    /// Print one snapshot as JSON
    Show {
        /// Logical window ID
        id: String,
    },

    /// Export all snapshots as JSON (to stdout, or a file)
    Export {
        /// Output file path
        path: Option<PathBuf>,
    },

    /// Import snapshots from an exported JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Delete a snapshot (undoable for a short period)
    Delete {
        /// Logical window ID
        id: String,
    },

    /// Undo a recent deletion
    Undo {
        /// Logical window ID
        id: String,
    },

    /// Set or clear a snapshot's display name
    Rename {
        /// Logical window ID
        id: String,
        /// New name; omit to clear
        name: Option<String>,
    },

    /// Star a snapshot, exempting it from cleanup
    Star {
        /// Logical window ID
        id: String,
        /// Remove the star instead
        #[arg(long)]
        off: bool,
    },

    /// Remove expired snapshots and undo records
    Cleanup,

    /// Show storage usage and quota level
    Stats,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "tabstash command failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let root = cli
        .root
        .or_else(FileStore::default_root)
        .ok_or("Could not determine storage root")?;
    let kv = Rc::new(
        FileStore::open(root, TrackerConfig::default().fallback_quota_bytes)
            .map_err(|e| e.to_string())?,
    );
    let config = TrackerConfig::load(kv.as_ref());
    let store = SnapshotStore::new(Rc::clone(&kv) as Rc<dyn KeyValueStore>, &config);

    match cli.command {
        Commands::List => {
            let map = store.get_all();
            if map.is_empty() {
                println!("No snapshots stored.");
                return Ok(());
            }
            for (id, snapshot) in &map {
                let star = if snapshot.starred { "*" } else { " " };
                let name = snapshot.custom_name.as_deref().unwrap_or("-");
                println!(
                    "{star} {id}  {tabs:3} tabs  {when}  {name}",
                    tabs = snapshot.tabs.len(),
                    when = snapshot.timestamp.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Commands::Show { id } => {
            let snapshot = store
                .get(&id)
                .ok_or_else(|| format!("No snapshot stored for {id}"))?;
            let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
            println!("{json}");
        }
        Commands::Export { path } => {
            let json = store.export_json().map_err(|e| e.to_string())?;
            match path {
                Some(path) => {
                    fs_err::write(&path, &json).map_err(|e| e.to_string())?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { path } => {
            let json = fs_err::read_to_string(&path).map_err(|e| e.to_string())?;
            let imported = store.import_json(&json).map_err(|e| e.to_string())?;
            println!("Imported {imported} snapshot(s)");
        }
        Commands::Delete { id } => {
            if store.delete(&id).map_err(|e| e.to_string())? {
                println!("Deleted {id} (undoable for {}s)", config.undo_ttl_secs);
            } else {
                return Err(format!("No snapshot stored for {id}"));
            }
        }
        Commands::Undo { id } => {
            if store.undo_delete(&id).map_err(|e| e.to_string())? {
                println!("Restored {id}");
            } else {
                return Err(format!("Nothing to undo for {id}"));
            }
        }
        Commands::Rename { id, name } => {
            if store
                .rename(&id, name.as_deref())
                .map_err(|e| e.to_string())?
            {
                println!("Renamed {id}");
            } else {
                return Err(format!("No snapshot stored for {id}"));
            }
        }
        Commands::Star { id, off } => {
            if store.toggle_star(&id, !off).map_err(|e| e.to_string())? {
                println!("{} {id}", if off { "Unstarred" } else { "Starred" });
            } else {
                return Err(format!("No snapshot stored for {id}"));
            }
        }
        Commands::Cleanup => {
            let stats = store.cleanup().map_err(|e| e.to_string())?;
            println!(
                "Removed {} snapshot(s), purged {} undo record(s)",
                stats.snapshots_removed, stats.undo_records_purged
            );
        }
        Commands::Stats => {
            let stats = store.stats();
            let level = match store.check_limits() {
                QuotaLevel::Normal => "ok",
                QuotaLevel::Notice => "notice (>60%)",
                QuotaLevel::Warning => "warning (>75%)",
                QuotaLevel::Critical => "critical (>90%)",
            };
            println!("Snapshots:   {}", stats.item_counts.snapshots);
            println!("In undo:     {}", stats.item_counts.deleted);
            println!("Used bytes:  {}", stats.used_bytes);
            println!("Quota bytes: {}", stats.total_bytes);
            println!("Level:       {level}");
        }
    }
    Ok(())
}
