use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{AcquisitionError, FeedError};

/// Where a feed document comes from. Decided once when the feed is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Network(Url),
}

impl Source {
    /// Classifies a source identifier: `http://` and `https://` locators are
    /// fetched over the network, everything else is read as a local path.
    pub fn parse(identifier: &str) -> Result<Self, FeedError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(FeedError::Configuration("empty feed source".into()));
        }

        if has_prefix(identifier, "http://") || has_prefix(identifier, "https://") {
            let url = Url::parse(identifier).map_err(|err| {
                FeedError::Configuration(format!("invalid feed url {identifier:?}: {err}"))
            })?;
            Ok(Self::Network(url))
        } else {
            Ok(Self::File(PathBuf::from(identifier)))
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Reads the whole document into memory.
    pub async fn fetch(&self, client: &Client) -> Result<Bytes, AcquisitionError> {
        match self {
            Self::Network(url) => fetch_url(client, url).await,
            Self::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| AcquisitionError::Io {
                        path: path.clone(),
                        source,
                    })?;
                debug!(path = %path.display(), len = bytes.len(), "read feed file");
                Ok(Bytes::from(bytes))
            }
        }
    }
}

async fn fetch_url(client: &Client, url: &Url) -> Result<Bytes, AcquisitionError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AcquisitionError::Status {
            url: url.to_string(),
            status,
        });
    }
    let bytes = response.bytes().await?;
    debug!(%url, len = bytes.len(), "fetched feed");
    Ok(bytes)
}

fn has_prefix(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Network(url) => write!(f, "{url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_are_network_sources() {
        assert!(Source::parse("http://example.com/rss").unwrap().is_network());
        assert!(Source::parse("HTTPS://example.com/rss").unwrap().is_network());
    }

    #[test]
    fn everything_else_is_a_path() {
        assert_eq!(
            Source::parse("feeds/sample.xml").unwrap(),
            Source::File(PathBuf::from("feeds/sample.xml"))
        );
        // Shorter than any locator prefix.
        assert_eq!(Source::parse("a").unwrap(), Source::File(PathBuf::from("a")));
        assert!(!Source::parse("httpdocs/rss.xml").unwrap().is_network());
    }

    #[test]
    fn empty_source_is_a_configuration_error() {
        assert!(matches!(
            Source::parse("  "),
            Err(FeedError::Configuration(_))
        ));
    }

    #[test]
    fn malformed_locator_is_a_configuration_error() {
        assert!(matches!(
            Source::parse("http://"),
            Err(FeedError::Configuration(_))
        ));
    }
}
