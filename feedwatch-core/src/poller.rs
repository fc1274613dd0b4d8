use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::FeedError;
use crate::feed::Feed;
use crate::models::Item;

/// Used when neither the caller nor the channel specifies an interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Upper bound for any resolved interval. Longer values are capped.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Explicit tick interval. Zero defers to the channel's ttl.
    pub interval: Duration,
    pub default_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            default_interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Picks the tick interval: explicit value, then the channel ttl in
/// minutes, then `default`. The result never exceeds [`MAX_INTERVAL`].
pub fn resolve_interval(explicit: Duration, ttl_minutes: u32, default: Duration) -> Duration {
    let interval = pick_interval(explicit, ttl_minutes, default);
    if interval > MAX_INTERVAL {
        warn!(
            requested_secs = interval.as_secs(),
            max_secs = MAX_INTERVAL.as_secs(),
            "poll interval capped"
        );
        return MAX_INTERVAL;
    }
    interval
}

fn pick_interval(explicit: Duration, ttl_minutes: u32, default: Duration) -> Duration {
    if !explicit.is_zero() {
        explicit
    } else if ttl_minutes > 0 {
        Duration::from_secs(u64::from(ttl_minutes) * 60)
    } else if !default.is_zero() {
        default
    } else {
        DEFAULT_INTERVAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Serving,
    Stopped,
}

/// A polling loop for one feed that has not been started yet.
pub struct Poller {
    feed: Arc<Feed>,
    config: PollConfig,
    state_tx: watch::Sender<PollerState>,
}

impl Poller {
    pub fn new(feed: Arc<Feed>, config: PollConfig) -> Self {
        let (state_tx, _) = watch::channel(PollerState::Idle);
        Self {
            feed,
            config,
            state_tx,
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state_tx.borrow()
    }

    /// Starts the loop on the current runtime. The first update happens one
    /// interval from now.
    pub async fn spawn(self) -> PollerHandle {
        let ttl = self.feed.snapshot().await.channel.ttl;
        let interval = resolve_interval(self.config.interval, ttl, self.config.default_interval);
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let state = self.state_tx.subscribe();

        self.state_tx.send_replace(PollerState::Serving);
        info!(interval_secs = interval.as_secs_f64(), "poller started");
        let join = tokio::spawn(run(self.feed, interval, cancel_rx, self.state_tx));

        PollerHandle {
            cancel_tx,
            join,
            state,
            interval,
        }
    }
}

/// Owner side of a running poller.
///
/// Dropping the handle stops the loop at its next interval boundary.
pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<Result<(), FeedError>>,
    state: watch::Receiver<PollerState>,
    interval: Duration,
}

impl PollerHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Signals the loop to stop. Never blocks, and is a no-op once the loop
    /// has ended.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }

    /// Stops the loop and returns the error that ended it, if any.
    pub async fn stop(self) -> Result<(), FeedError> {
        self.cancel();
        self.wait().await
    }

    /// Resolves once the loop has ended, without consuming the handle.
    pub async fn stopped(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == PollerState::Stopped)
            .await;
    }

    /// Waits for the loop to end on its own.
    pub async fn wait(self) -> Result<(), FeedError> {
        self.join.await?
    }
}

async fn run(
    feed: Arc<Feed>,
    interval: Duration,
    mut cancel_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<PollerState>,
) -> Result<(), FeedError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut subscribers = JoinSet::new();

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel_rx.recv() => {
                info!("poller shutdown requested");
                break Ok(());
            }
            _ = ticker.tick() => {
                reap(&mut subscribers);
                match feed.update().await {
                    Ok(items) if !items.is_empty() => {
                        info!(count = items.len(), "new items");
                        feed.notifiers().dispatch(Arc::from(items), &mut subscribers).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(error = %err, "update failed, poller stopping");
                        break Err(err);
                    }
                }
            }
        }
    };

    // Subscribers still running are left to finish on their own.
    subscribers.detach_all();
    state_tx.send_replace(PollerState::Stopped);
    result
}

fn reap(subscribers: &mut JoinSet<()>) {
    while let Some(result) = subscribers.try_join_next() {
        if let Err(err) = result {
            warn!(error = %err, "notifier task failed");
        }
    }
}

/// Several pollers that can be stopped together.
#[derive(Default)]
pub struct PollerGroup {
    handles: Vec<PollerHandle>,
}

impl PollerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: PollerHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn cancel_all(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }

    /// Stops every poller and returns their results in insertion order.
    pub async fn stop_all(self) -> Vec<Result<(), FeedError>> {
        self.cancel_all();
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.wait().await);
        }
        results
    }
}

/// Opens `source`, hands its current items to `notifier` once, then keeps
/// polling it in the background.
pub async fn serve<F, Fut>(
    source: &str,
    client: Client,
    config: PollConfig,
    notifier: F,
) -> Result<PollerHandle, FeedError>
where
    F: Fn(Arc<[Item]>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let feed = Arc::new(Feed::open(source, client).await?);
    feed.notifiers().register(notifier).await;

    let initial = feed.snapshot().await.items().to_vec();
    if !initial.is_empty() {
        let mut tasks = JoinSet::new();
        feed.notifiers().dispatch(Arc::from(initial), &mut tasks).await;
        tasks.detach_all();
    }

    Ok(Poller::new(feed, config).spawn().await)
}
