use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::FeedError;
use crate::models::{Channel, Item};
use crate::notifier::NotifierRegistry;
use crate::parser;
use crate::source::Source;

/// One parsed document. Never mutated after construction; updates build a
/// new snapshot and swap it in whole.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub version: String,
    pub channel: Channel,
    /// The document bytes this snapshot was parsed from.
    pub origin: Bytes,
    pub last_update_at: DateTime<Utc>,
}

impl FeedSnapshot {
    pub fn items(&self) -> &[Item] {
        &self.channel.items
    }
}

/// A syndication feed together with its refresh state and subscribers.
#[derive(Debug)]
pub struct Feed {
    source: Option<Source>,
    client: Client,
    current: RwLock<Arc<FeedSnapshot>>,
    notifiers: NotifierRegistry,
    update_lock: Mutex<()>,
}

/// Latest publish date known before an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Baseline {
    /// No items yet; nothing can be reported as new.
    Empty,
    /// `None` when no item is dated, which sorts before every instant.
    Latest(Option<DateTime<Utc>>),
}

impl Baseline {
    fn of(items: &[Item]) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Latest(items.iter().filter_map(|item| item.pub_date).max())
        }
    }

    fn newer(&self, items: &[Item]) -> Vec<Item> {
        let Self::Latest(latest) = *self else {
            return Vec::new();
        };
        items
            .iter()
            .filter(|item| match (item.pub_date, latest) {
                (Some(date), Some(latest)) => date > latest,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect()
    }
}

impl Feed {
    /// Acquires and parses `source`, recording it for later updates.
    pub async fn open(source: &str, client: Client) -> Result<Self, FeedError> {
        let source = Source::parse(source)?;
        let snapshot = match acquire(&source, &client).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(%source, error = %err, "failed to open feed");
                return Err(err);
            }
        };
        info!(%source, items = snapshot.channel.items.len(), "opened feed");
        Ok(Self::with_snapshot(Some(source), client, snapshot))
    }

    /// Builds a feed from an in-memory document. Such a feed has no source
    /// and cannot be updated.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, FeedError> {
        let snapshot = parser::parse(bytes)?;
        Ok(Self::with_snapshot(None, Client::new(), snapshot))
    }

    fn with_snapshot(source: Option<Source>, client: Client, snapshot: FeedSnapshot) -> Self {
        Self {
            source,
            client,
            current: RwLock::new(Arc::new(snapshot)),
            notifiers: NotifierRegistry::new(),
            update_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn notifiers(&self) -> &NotifierRegistry {
        &self.notifiers
    }

    /// The current snapshot. Later updates do not affect the returned value.
    pub async fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.current.read().await.clone()
    }

    pub async fn last_update_at(&self) -> DateTime<Utc> {
        self.current.read().await.last_update_at
    }

    /// Re-fetches the document and replaces the current snapshot, returning
    /// the items published after the newest item known beforehand.
    ///
    /// On error the current snapshot is left untouched.
    pub async fn update(&self) -> Result<Vec<Item>, FeedError> {
        let _guard = self.update_lock.lock().await;
        let baseline = Baseline::of(self.snapshot().await.items());

        let Some(source) = &self.source else {
            let err = FeedError::Configuration("feed has no source to update from".into());
            error!(error = %err, "update failed");
            return Err(err);
        };

        let fresh = match acquire(source, &self.client).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                error!(%source, error = %err, "update failed");
                return Err(err);
            }
        };

        *self.current.write().await = fresh.clone();

        let new_items = baseline.newer(fresh.items());
        debug!(%source, total = fresh.items().len(), new = new_items.len(), "feed updated");
        Ok(new_items)
    }

    /// Serializes source, version and channel as pretty-printed JSON.
    pub async fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            source: String,
            version: &'a str,
            channel: &'a Channel,
        }

        let snapshot = self.snapshot().await;
        let view = View {
            source: self.source.as_ref().map(ToString::to_string).unwrap_or_default(),
            version: &snapshot.version,
            channel: &snapshot.channel,
        };
        serde_json::to_string_pretty(&view)
    }
}

async fn acquire(source: &Source, client: &Client) -> Result<FeedSnapshot, FeedError> {
    let bytes = source.fetch(client).await?;
    Ok(parser::parse(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dated(title: &str, date: Option<DateTime<Utc>>) -> Item {
        Item {
            title: Some(title.into()),
            pub_date: date,
            ..Default::default()
        }
    }

    fn at(hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2018, 5, 11, hour, 0, 0).unwrap())
    }

    #[test]
    fn empty_baseline_reports_nothing() {
        let baseline = Baseline::of(&[]);
        assert_eq!(baseline, Baseline::Empty);
        assert!(baseline.newer(&[dated("a", at(9))]).is_empty());
    }

    #[test]
    fn only_strictly_newer_items_are_reported() {
        let baseline = Baseline::of(&[dated("old", at(7)), dated("latest", at(8))]);
        let fresh = [
            dated("same", at(8)),
            dated("newer", at(9)),
            dated("undated", None),
            dated("older", at(6)),
        ];
        let titles: Vec<_> = baseline
            .newer(&fresh)
            .into_iter()
            .filter_map(|item| item.title)
            .collect();
        assert_eq!(titles, ["newer"]);
    }

    #[test]
    fn undated_baseline_precedes_every_dated_item() {
        let baseline = Baseline::of(&[dated("undated", None)]);
        assert_eq!(baseline, Baseline::Latest(None));
        assert_eq!(baseline.newer(&[dated("x", at(1)), dated("y", None)]).len(), 1);
    }

    #[tokio::test]
    async fn update_without_source_is_a_configuration_error() {
        let feed = Feed::from_bytes(
            r#"<rss version="2.0"><channel><title>t</title><item><title>a</title></item></channel></rss>"#,
        )
        .unwrap();
        let before = feed.snapshot().await;

        assert!(matches!(
            feed.update().await,
            Err(FeedError::Configuration(_))
        ));
        assert!(Arc::ptr_eq(&before, &feed.snapshot().await));
    }
}
