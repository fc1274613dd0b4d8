use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use feedwatch_core::{Feed, FeedError, Item, Poller, WatchConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Watch an RSS feed and print entries as they appear.
#[derive(Debug, Parser)]
#[command(name = "feedwatch", version)]
struct Args {
    /// Feed URL (http:// or https://) or path to a local file.
    source: String,

    /// Refresh interval in minutes. Defaults to the channel's ttl.
    #[arg(long)]
    interval_minutes: Option<u64>,

    /// Read settings from this file instead of the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the parsed feed as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "feedwatch failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(path: Option<&Path>) -> Result<WatchConfig, FeedError> {
    match path {
        Some(path) => WatchConfig::load_from(path)
            .map_err(|err| FeedError::Configuration(format!("{}: {err}", path.display()))),
        None => Ok(WatchConfig::load()),
    }
}

async fn run(args: Args) -> Result<(), FeedError> {
    let config = load_config(args.config.as_deref())?;
    let mut poll = config.poll_config();
    if let Some(minutes) = args.interval_minutes {
        poll.interval = Duration::from_secs(minutes.saturating_mul(60));
    }
    let client = config
        .http_client()
        .map_err(|err| FeedError::Configuration(format!("http client: {err}")))?;

    let feed = Arc::new(Feed::open(&args.source, client).await?);
    if args.json {
        let json = feed
            .to_json()
            .await
            .map_err(|err| FeedError::Configuration(format!("json output: {err}")))?;
        println!("{json}");
    } else {
        println!("{}", feed.snapshot().await);
    }

    feed.notifiers()
        .register(|items: Arc<[Item]>| async move {
            for item in items.iter() {
                print_item(item);
            }
        })
        .await;

    let mut handle = Poller::new(feed, poll).spawn().await;
    info!(
        interval_secs = handle.interval().as_secs(),
        "watching for new items, press Ctrl-C to stop"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = handle.stopped() => {}
    }
    handle.stop().await
}

fn print_item(item: &Item) {
    let title = item.title.as_deref().unwrap_or("(untitled)");
    match &item.link {
        Some(link) => println!("{title} <{link}>"),
        None => println!("{title}"),
    }
}
