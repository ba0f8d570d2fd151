use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use glowcache::cache::enforce_budget;
use glowcache::{CacheCategory, CacheStorage, SqliteStorage, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "glowcache")]
#[command(about = "Offline-first response cache with per-category stores and budgets")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/glowcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show entry counts and sizes for every cache store
  Status,
  /// Delete cached entries
  Clear {
    /// Name of a single store to clear
    #[arg(long)]
    cache: Option<String>,

    /// Clear every store owned by this cache
    #[arg(long)]
    all: bool,
  },
  /// Delete stale-version stores and re-enforce every byte budget
  Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let config = WorkerConfig::load(args.config.as_deref())?;
  let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open()?);

  match args.command {
    Command::Status => status(&config, &storage)?,
    Command::Clear { cache, all } => clear(&config, &storage, cache, all)?,
    Command::Cleanup => cleanup(&config, &storage)?,
  }

  Ok(())
}

fn status(config: &WorkerConfig, storage: &Arc<dyn CacheStorage>) -> Result<()> {
  let names = storage.list_stores()?;
  let mut owned: Vec<&String> = names.iter().filter(|n| n.starts_with(&config.prefix)).collect();
  owned.sort();

  if owned.is_empty() {
    println!("no cache stores");
    return Ok(());
  }

  for name in owned {
    let entries = storage.entry_count(name)?;
    let bytes = storage.total_bytes(name)?;
    let current = if config.is_current_store(name) { "" } else { "  (stale version)" };
    println!(
      "{name}: {entries} entries, {:.2} MB{current}",
      bytes as f64 / (1024.0 * 1024.0)
    );
  }
  Ok(())
}

fn clear(
  config: &WorkerConfig,
  storage: &Arc<dyn CacheStorage>,
  cache: Option<String>,
  all: bool,
) -> Result<()> {
  match (cache, all) {
    (Some(name), _) => {
      storage.delete_store(&name)?;
      println!("cleared {name}");
    }
    (None, true) => {
      let names = storage.list_stores()?;
      for name in names.iter().filter(|n| n.starts_with(&config.prefix)) {
        storage.delete_store(name)?;
        println!("cleared {name}");
      }
    }
    (None, false) => {
      println!("nothing to do: pass --cache <name> or --all");
    }
  }
  Ok(())
}

fn cleanup(config: &WorkerConfig, storage: &Arc<dyn CacheStorage>) -> Result<()> {
  let deleted = glowcache::lifecycle::cleanup_stale_stores(config, storage);
  for name in &deleted {
    println!("deleted stale store {name}");
  }

  for category in CacheCategory::ALL {
    if let Some(budget) = config.budget_bytes(category) {
      let store = config.store_name(category);
      let reclaimed = enforce_budget(storage.as_ref(), &store, budget)?;
      if reclaimed > 0 {
        println!("{store}: evicted {:.2} MB", reclaimed as f64 / (1024.0 * 1024.0));
      }
    }
  }
  Ok(())
}
