//! Decoding of RSS 0.91/0.92/2.0 documents into [`FeedSnapshot`] values.
//!
//! The markup is first deserialized into string-typed `Raw*` records that
//! mirror the element layout, then converted into the typed model in a
//! second pass where dates, numbers and trimming are handled. Before that,
//! a streaming pass drops namespaced extension elements (`atom:link`,
//! `itunes:title`, ...) and flattens markup nested inside text elements.

use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc, Weekday};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{DeError, Reader, Writer};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::date::parse_date;
use crate::error::ParseError;
use crate::feed::FeedSnapshot;
use crate::models::{
    Category, Channel, Cloud, Enclosure, Guid, Image, Item, ItemSource, TextInput,
};

const CUTSET: &[char] = &[' ', '\t', '\n', '\r'];

/// Elements whose children are elements rather than text.
const CONTAINERS: &[&[u8]] = &[
    b"rss",
    b"channel",
    b"item",
    b"image",
    b"textInput",
    b"textinput",
    b"skipHours",
    b"skipDays",
];

/// Parses a raw document. The returned snapshot keeps `bytes` as its origin
/// and is stamped with the current time.
pub fn parse(bytes: impl Into<Bytes>) -> Result<FeedSnapshot, ParseError> {
    let origin: Bytes = bytes.into();
    let text = std::str::from_utf8(&origin)?;
    let core = core_markup(text.trim_start_matches('\u{feff}'))?;
    let raw: RawRss = quick_xml::de::from_str(std::str::from_utf8(&core)?)?;

    let version = raw.version.trim().to_owned();
    let channel = raw.channel.into_channel()?;
    debug!(%version, items = channel.items.len(), "parsed feed document");

    Ok(FeedSnapshot {
        version,
        channel,
        origin,
        last_update_at: Utc::now(),
    })
}

/// Text gathered for the text element currently open.
#[derive(Default)]
struct OpenText {
    text: String,
    nested: usize,
}

/// Rewrites the document keeping only unprefixed elements. Text elements
/// come out as a single text node holding all of their character data, so
/// `<description>Hello <b>world</b></description>` reads as "Hello world".
fn core_markup(text: &str) -> Result<Vec<u8>, DeError> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::with_capacity(text.len()));
    let mut open: Option<OpenText> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if is_extension(&e) => {
                reader.read_to_end(e.name())?;
            }
            Event::Empty(e) if is_extension(&e) => {}
            Event::Start(e) => match open.as_mut() {
                Some(leaf) => leaf.nested += 1,
                None => {
                    if !CONTAINERS.contains(&e.name().as_ref()) {
                        open = Some(OpenText::default());
                    }
                    emit(&mut writer, Event::Start(e))?;
                }
            },
            Event::End(e) => match open.take() {
                Some(mut leaf) if leaf.nested > 0 => {
                    leaf.nested -= 1;
                    open = Some(leaf);
                }
                Some(leaf) => {
                    if !leaf.text.is_empty() {
                        emit(&mut writer, Event::Text(BytesText::new(&leaf.text)))?;
                    }
                    emit(&mut writer, Event::End(e))?;
                }
                None => emit(&mut writer, Event::End(e))?,
            },
            Event::Empty(e) => {
                if open.is_none() {
                    emit(&mut writer, Event::Empty(e))?;
                }
            }
            Event::Text(e) => {
                if let Some(leaf) = open.as_mut() {
                    leaf.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(leaf) = open.as_mut() {
                    leaf.text.push_str(&e.decode()?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(writer.into_inner())
}

fn is_extension(element: &BytesStart<'_>) -> bool {
    element.name().prefix().is_some()
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), DeError> {
    writer
        .write_event(event)
        .map_err(|err| DeError::from(quick_xml::Error::from(err)))
}

#[derive(Debug, Deserialize)]
struct RawRss {
    #[serde(rename = "@version", default)]
    version: String,
    channel: RawChannel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChannel {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    language: Option<String>,
    copyright: Option<String>,
    managing_editor: Option<String>,
    web_master: Option<String>,
    pub_date: Option<String>,
    last_build_date: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<RawCategory>,
    generator: Option<String>,
    docs: Option<String>,
    cloud: Option<RawCloud>,
    ttl: Option<String>,
    image: Option<RawImage>,
    rating: Option<String>,
    #[serde(alias = "textinput")]
    text_input: Option<RawTextInput>,
    skip_hours: Option<RawSkipHours>,
    skip_days: Option<RawSkipDays>,
    #[serde(rename = "item", default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<RawCategory>,
    comments: Option<String>,
    enclosure: Option<RawEnclosure>,
    guid: Option<RawGuid>,
    pub_date: Option<String>,
    source: Option<RawItemSource>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCategory {
    #[serde(rename = "@domain")]
    domain: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawCloud {
    #[serde(rename = "@domain", default)]
    domain: String,
    #[serde(rename = "@port", default)]
    port: String,
    #[serde(rename = "@path", default)]
    path: String,
    #[serde(rename = "@registerProcedure", default)]
    register_procedure: String,
    #[serde(rename = "@protocol", default)]
    protocol: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawImage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    width: Option<String>,
    height: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTextInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSkipHours {
    #[serde(rename = "hour", default)]
    hours: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSkipDays {
    #[serde(rename = "day", default)]
    days: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@length")]
    length: Option<String>,
    #[serde(rename = "@type")]
    mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGuid {
    #[serde(rename = "@isPermaLink")]
    is_perma_link: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawItemSource {
    #[serde(rename = "@url", default)]
    url: String,
    #[serde(rename = "$text", default)]
    value: String,
}

impl RawChannel {
    fn into_channel(self) -> Result<Channel, ParseError> {
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let item = raw.into_item()?;
                if item.is_untitled() {
                    warn!(index, "item has neither title nor description");
                }
                Ok(item)
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let skip_hours = self
            .skip_hours
            .map(|s| s.hours)
            .unwrap_or_default()
            .iter()
            .map(|hour| number("hour", hour))
            .collect::<Result<Vec<u8>, _>>()?;

        let skip_days = self
            .skip_days
            .map(|s| s.days)
            .unwrap_or_default()
            .iter()
            .map(|day| weekday(day))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Channel {
            title: trim(&self.title),
            link: self.link,
            description: trim(&self.description),
            language: present(self.language),
            copyright: present(self.copyright).map(|c| trim(&c)),
            managing_editor: present(self.managing_editor),
            web_master: present(self.web_master),
            pub_date: date("pubDate", self.pub_date)?,
            last_build_date: date("lastBuildDate", self.last_build_date)?,
            categories: self.categories.into_iter().map(RawCategory::into_category).collect(),
            generator: present(self.generator),
            docs: present(self.docs),
            cloud: self.cloud.map(RawCloud::into_cloud).transpose()?,
            ttl: optional_number("ttl", self.ttl)?.unwrap_or(0),
            image: self.image.map(RawImage::into_image).transpose()?,
            rating: present(self.rating),
            text_input: self.text_input.map(|t| TextInput {
                title: t.title,
                description: t.description,
                name: t.name,
                link: t.link,
            }),
            skip_hours,
            skip_days,
            items,
        })
    }
}

impl RawItem {
    fn into_item(self) -> Result<Item, ParseError> {
        Ok(Item {
            title: present(self.title).map(|t| trim(&t)),
            link: present(self.link),
            description: present(self.description).map(|d| trim(&d)),
            author: present(self.author),
            categories: self.categories.into_iter().map(RawCategory::into_category).collect(),
            comments: present(self.comments),
            enclosure: self.enclosure.map(RawEnclosure::into_enclosure).transpose()?.flatten(),
            guid: self.guid.map(|g| Guid {
                value: g.value.trim().to_owned(),
                is_perma_link: g
                    .is_perma_link
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            }),
            pub_date: date("pubDate", self.pub_date)?,
            source: self.source.map(|s| ItemSource {
                value: s.value,
                url: s.url,
            }),
        })
    }
}

impl RawCategory {
    fn into_category(self) -> Category {
        Category {
            value: self.value,
            domain: present(self.domain),
        }
    }
}

impl RawCloud {
    fn into_cloud(self) -> Result<Cloud, ParseError> {
        Ok(Cloud {
            port: optional_number("cloud", Some(self.port))?.unwrap_or(0),
            domain: self.domain,
            path: self.path,
            register_procedure: self.register_procedure,
            protocol: self.protocol,
        })
    }
}

impl RawImage {
    fn into_image(self) -> Result<Image, ParseError> {
        Ok(Image {
            width: optional_number("width", self.width)?,
            height: optional_number("height", self.height)?,
            url: self.url,
            title: self.title,
            link: self.link,
            description: present(self.description),
        })
    }
}

impl RawEnclosure {
    /// An enclosure missing its url or type is dropped rather than rejected.
    fn into_enclosure(self) -> Result<Option<Enclosure>, ParseError> {
        let length = optional_number("enclosure", self.length)?.unwrap_or(0);
        match (present(self.url), present(self.mime_type)) {
            (Some(url), Some(mime_type)) => Ok(Some(Enclosure {
                url,
                length,
                mime_type,
            })),
            _ => {
                warn!("dropping enclosure without url or type");
                Ok(None)
            }
        }
    }
}

fn trim(value: &str) -> String {
    value.trim_matches(CUTSET).to_owned()
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn date(field: &'static str, value: Option<String>) -> Result<Option<DateTime<Utc>>, ParseError> {
    present(value)
        .map(|v| parse_date(&v).map_err(|source| ParseError::Date { field, source }))
        .transpose()
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::Number {
        field,
        value: value.to_owned(),
    })
}

fn optional_number<T: FromStr>(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ParseError> {
    present(value).map(|v| number(field, &v)).transpose()
}

fn weekday(value: &str) -> Result<Weekday, ParseError> {
    value.trim().parse().map_err(|_| ParseError::Weekday {
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<rss version="0.91">
  <channel>
    <title>Minimal</title>
    <link>http://example.com/</link>
    <description>Old dialect</description>
    <textinput>
      <title>Search</title>
      <description>Search the archive</description>
      <name>q</name>
      <link>http://example.com/search</link>
    </textinput>
    <item><title>Only title</title></item>
  </channel>
</rss>"#;

    #[test]
    fn old_dialect_is_accepted() {
        let snapshot = parse(MINIMAL).unwrap();
        assert_eq!(snapshot.version, "0.91");
        assert_eq!(snapshot.channel.items.len(), 1);
        assert_eq!(snapshot.channel.ttl, 0);
        let input = snapshot.channel.text_input.unwrap();
        assert_eq!(input.name, "q");
        assert_eq!(input.description, "Search the archive");
    }

    #[test]
    fn guid_is_not_a_permalink_unless_declared() {
        let doc = r#"<rss version="2.0"><channel><title>t</title>
            <item><guid>a</guid></item>
            <item><guid isPermaLink="true">http://e/b</guid></item>
            </channel></rss>"#;
        let items = parse(doc).unwrap().channel.items;
        assert!(!items[0].guid.as_ref().unwrap().is_perma_link);
        assert!(items[1].guid.as_ref().unwrap().is_perma_link);
        assert_eq!(items[1].guid.as_ref().unwrap().value, "http://e/b");
    }

    #[test]
    fn enclosure_without_type_is_dropped() {
        let doc = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>x</title><enclosure url="http://e/a.mp3" length="10"/></item>
            </channel></rss>"#;
        let items = parse(doc).unwrap().channel.items;
        assert!(items[0].enclosure.is_none());
    }

    #[test]
    fn non_numeric_ttl_is_rejected() {
        let doc = r#"<rss version="2.0"><channel><title>t</title><ttl>soon</ttl></channel></rss>"#;
        assert!(matches!(
            parse(doc),
            Err(ParseError::Number { field: "ttl", .. })
        ));
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        let doc = r#"<rss version="2.0"><channel><title>t</title>
            <skipDays><day>Someday</day></skipDays></channel></rss>"#;
        assert!(matches!(parse(doc), Err(ParseError::Weekday { .. })));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let bytes: &[u8] = &[0x3c, 0x72, 0xff, 0xfe];
        assert!(matches!(
            parse(Bytes::from_static(bytes)),
            Err(ParseError::Encoding(_))
        ));
    }
}
