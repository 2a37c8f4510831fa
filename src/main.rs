//! wirefeed: run one search and print the results.
//!
//! Usage: `wirefeed [--config PATH] [--pages N] [--agenda[=day|week|month]] <query...>`
//!
//! Reads ~/.wirefeed/config.json unless `--config` is given. `RUST_LOG`
//! controls log output.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use wirefeed::agenda::Grouping;
use wirefeed::config::{default_config_path, load_config_or_default};
use wirefeed::persist::JsonFileStore;
use wirefeed::transport::HttpTransport;
use wirefeed::{FeedSession, FetchOutcome};

#[derive(Parser, Debug)]
#[command(name = "wirefeed")]
#[command(about = "Search the news wire or agenda and print the results")]
struct Cli {
    /// Config file (default: ~/.wirefeed/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of result pages to load
    #[arg(long, default_value_t = 1)]
    pages: usize,

    /// Print agenda buckets instead of a flat list (`--agenda` alone means day)
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "day"
    )]
    agenda: Option<AgendaView>,

    /// Search query
    query: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AgendaView {
    Day,
    Week,
    Month,
}

impl From<AgendaView> for Grouping {
    fn from(view: AgendaView) -> Self {
        match view {
            AgendaView::Day => Grouping::Day,
            AgendaView::Week => Grouping::Week,
            AgendaView::Month => Grouping::Month,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Cli::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config_or_default(&config_path)?;

    let transport = Arc::new(HttpTransport::new(
        &config.base_url,
        &config.section,
        config.retry,
    )?);
    let local = Arc::new(JsonFileStore::open(config.state_path()?));
    let mut session = FeedSession::new(config, transport, local)?;

    if !args.query.is_empty() {
        session.set_query(Some(args.query.join(" ")));
    }

    match session.fetch_items().await {
        FetchOutcome::Committed(_) => {}
        FetchOutcome::Failed(notice) => {
            anyhow::bail!("{} ({})", notice.message, notice.recovery_suggestion)
        }
        other => log::debug!("Search not committed: {:?}", other),
    }
    for _ in 1..args.pages {
        match session.fetch_more().await {
            FetchOutcome::Appended(_) => {}
            FetchOutcome::Failed(notice) => {
                eprintln!("Stopped paging: {}", notice.message);
                break;
            }
            _ => break,
        }
    }

    match args.agenda {
        Some(view) => {
            session.set_grouping(view.into());
            let tz = session.config().timezone()?;
            let store = session.store();
            for (day, entries) in session.grouped_items().iter() {
                println!("{}", day.format("%A %Y-%m-%d"));
                for entry in entries {
                    if let Some(item) = store.get(&entry.item_id) {
                        let start = entry.occurrence.start.with_timezone(&tz);
                        println!("  {}  {}", start.format("%H:%M"), item.title());
                    }
                }
            }
        }
        None => {
            let store = session.store();
            for (index, id) in store.ids().iter().enumerate() {
                if let Some(item) = store.get(id) {
                    println!("{:>4}. {}", index + 1, item.title());
                }
            }
        }
    }

    let store = session.store();
    println!("{} of {} results", store.len(), store.total());
    Ok(())
}
