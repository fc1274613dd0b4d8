pub mod config;
pub mod date;
mod display;
pub mod error;
pub mod feed;
pub mod models;
pub mod notifier;
pub mod parser;
pub mod poller;
pub mod source;

pub use config::{ConfigError, WatchConfig};
pub use date::parse_date;
pub use error::{AcquisitionError, DateFormatError, FeedError, ParseError};
pub use feed::{Feed, FeedSnapshot};
pub use models::{Category, Channel, Cloud, Enclosure, Guid, Image, Item, ItemSource, TextInput};
pub use notifier::NotifierRegistry;
pub use parser::parse;
pub use poller::{
    resolve_interval, serve, PollConfig, Poller, PollerGroup, PollerHandle, PollerState,
    DEFAULT_INTERVAL, MAX_INTERVAL,
};
pub use source::Source;
