mod cache;
mod config;
mod engine;
mod error;
mod gateway;
mod itinerary;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cache::{MemoryStore, SnapshotStore, SqliteStore};
use engine::CollectionService;
use gateway::{BulkUpdateRequest, NotionProxyClient};
use itinerary::types::{DateRange, RecordFields, TimePeriod};
use itinerary::view::ItineraryView;

#[derive(Parser, Debug)]
#[command(name = "tripsync")]
#[command(about = "Offline-friendly client for a Notion-backed travel itinerary")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tripsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Collection id (default: default_collection from config)
  #[arg(short = 'C', long)]
  collection: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the itinerary, grouped by day
  Show {
    /// Start of an optional date-range filter (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<chrono::NaiveDate>,
    /// End of the date-range filter (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<chrono::NaiveDate>,
  },
  /// Add a new itinerary record
  Add {
    #[arg(long)]
    title: String,
    #[arg(long)]
    date: Option<chrono::NaiveDate>,
    /// Time period tag (summary, dawn, breakfast, morning, ...)
    #[arg(long = "period")]
    periods: Vec<String>,
    #[arg(long)]
    price: Option<f64>,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Update fields of an existing record
  Set {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    date: Option<chrono::NaiveDate>,
    #[arg(long = "period")]
    periods: Vec<String>,
    #[arg(long)]
    sort_order: Option<f64>,
    #[arg(long)]
    price: Option<f64>,
  },
  /// Archive a record
  Rm { id: String },
  /// Renumber sort_order for a day's records, in the order given
  Reorder { ids: Vec<String> },
  /// Drop the cached snapshot and fetch from scratch
  Refresh,
  /// Drop every cached snapshot
  ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_logging()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let collection_id = args
    .collection
    .or_else(|| config.default_collection.clone())
    .ok_or_else(|| eyre!("No collection given. Pass --collection or set default_collection."))?;

  let gateway = NotionProxyClient::new(&config)?;
  let store: Box<dyn SnapshotStore> = if config.cache.persistent {
    match &config.cache.path {
      Some(path) => Box::new(SqliteStore::open_at(path)?),
      None => Box::new(SqliteStore::open()?),
    }
  } else {
    Box::new(MemoryStore::new())
  };
  let service = CollectionService::new(gateway, store);

  match args.command {
    Command::Show { from, to } => {
      let range = from
        .zip(to)
        .map(|(start, end)| DateRange { start, end });
      let handle = service.collection(&collection_id, range);
      let snapshot = handle.load().await?;
      println!("{} ({} items)\n", snapshot.collection_name, snapshot.items.len());
      if let Some(view) = handle.grouped() {
        print_view(&view);
      }
    }
    Command::Add {
      title,
      date,
      periods,
      price,
      currency,
      notes,
    } => {
      let handle = service.collection(&collection_id, None);
      handle.load().await?;
      let record = handle
        .create(RecordFields {
          title: Some(title),
          date,
          time_periods: parse_periods(&periods)?,
          price,
          currency,
          important_info: notes,
          ..Default::default()
        })
        .await?;
      println!("Created {} ({})", record.title, record.id);
    }
    Command::Set {
      id,
      title,
      date,
      periods,
      sort_order,
      price,
    } => {
      let handle = service.collection(&collection_id, None);
      handle.load().await?;
      let record = handle
        .update(
          &id,
          RecordFields {
            title,
            date,
            time_periods: parse_periods(&periods)?,
            sort_order,
            price,
            ..Default::default()
          },
        )
        .await?;
      println!("Updated {} ({})", record.title, record.id);
    }
    Command::Rm { id } => {
      let handle = service.collection(&collection_id, None);
      handle.load().await?;
      handle.delete(&id).await?;
      println!("Archived {}", id);
    }
    Command::Reorder { ids } => {
      let handle = service.collection(&collection_id, None);
      handle.load().await?;
      let updates: Vec<BulkUpdateRequest> = ids
        .into_iter()
        .enumerate()
        .map(|(position, id)| BulkUpdateRequest {
          id,
          fields: RecordFields {
            sort_order: Some(position as f64),
            ..Default::default()
          },
        })
        .collect();
      let outcome = handle.bulk_update(updates).await?;
      println!(
        "Reordered: {} succeeded, {} failed (of {})",
        outcome.successful, outcome.failed, outcome.total
      );
      for error in &outcome.errors {
        eprintln!("  {}: {}", error.id, error.reason);
      }
    }
    Command::Refresh => {
      let handle = service.collection(&collection_id, None);
      let snapshot = handle.refresh().await?;
      println!(
        "Refreshed {} ({} items, modified {})",
        snapshot.collection_name,
        snapshot.items.len(),
        snapshot.remote_modified_time
      );
    }
    Command::ClearCache => {
      service.clear_cache()?;
      println!("Cache cleared");
    }
  }

  Ok(())
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("tripsync");

  let appender = tracing_appender::rolling::daily(log_dir, "tripsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn parse_periods(raw: &[String]) -> Result<Option<Vec<TimePeriod>>> {
  if raw.is_empty() {
    return Ok(None);
  }
  let periods = raw
    .iter()
    .map(|s| s.parse())
    .collect::<std::result::Result<Vec<TimePeriod>, _>>()
    .map_err(|e| eyre!("{}", e))?;
  Ok(Some(periods))
}

fn print_view(view: &ItineraryView) {
  for day in &view.days {
    match day.date {
      Some(date) => println!("{}", date.format("%Y-%m-%d (%a)")),
      None => println!("Undated"),
    }
    for record in &day.records {
      let period = record
        .time_periods
        .first()
        .map(|p| format!("[{}] ", p.label()))
        .unwrap_or_default();
      let price = match (record.price, record.currency.as_deref()) {
        (Some(price), Some(currency)) => format!(" — {} {}", price, currency),
        (Some(price), None) => format!(" — {}", price),
        _ => String::new(),
      };
      println!("  {}{}{}  ({})", period, record.title, price, record.id);
    }
    println!();
  }
}
