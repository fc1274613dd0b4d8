//! Human-readable summaries of the feed model. Optional fields are only
//! listed when present.

use std::fmt::{self, Display, Formatter};

use crate::feed::FeedSnapshot;
use crate::models::{Category, Channel, Cloud, Enclosure, Image, Item, ItemSource, TextInput};

/// Collects `key: value` pairs and joins them with `, `.
struct Fields(Vec<String>);

impl Fields {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn quoted(&mut self, key: &str, value: &str) -> &mut Self {
        self.0.push(format!("{key}: {value:?}"));
        self
    }

    fn optional(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.quoted(key, value);
        }
        self
    }

    fn raw(&mut self, key: &str, value: impl Display) -> &mut Self {
        self.0.push(format!("{key}: {value}"));
        self
    }

    fn list<T: Display>(&mut self, key: &str, values: &[T]) -> &mut Self {
        if !values.is_empty() {
            let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
            self.0.push(format!("{key}: [{}]", joined.join(", ")));
        }
        self
    }
}

impl Display for Fields {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl Display for FeedSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Version: {:?}, Channel: {{{}}}", self.version, self.channel)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut fields = Fields::new();
        fields
            .quoted("Title", &self.title)
            .quoted("Link", &self.link)
            .quoted("Description", &self.description)
            .optional("Language", self.language.as_deref())
            .optional("Copyright", self.copyright.as_deref())
            .optional("ManagingEditor", self.managing_editor.as_deref())
            .optional("WebMaster", self.web_master.as_deref());
        if let Some(date) = self.pub_date {
            fields.raw("PubDate", date.to_rfc3339());
        }
        if let Some(date) = self.last_build_date {
            fields.raw("LastBuildDate", date.to_rfc3339());
        }
        fields
            .list("Category", &self.categories)
            .optional("Generator", self.generator.as_deref())
            .optional("Docs", self.docs.as_deref());
        if let Some(cloud) = &self.cloud {
            fields.raw("Cloud", format_args!("{{{cloud}}}"));
        }
        if self.ttl != 0 {
            fields.raw("TTL", self.ttl);
        }
        if let Some(image) = &self.image {
            fields.raw("Image", format_args!("{{{image}}}"));
        }
        fields.optional("Rating", self.rating.as_deref());
        if let Some(input) = &self.text_input {
            fields.raw("TextInput", format_args!("{{{input}}}"));
        }
        fields.list("SkipHours", &self.skip_hours).list("SkipDays", &self.skip_days);
        if !self.items.is_empty() {
            let items: Vec<String> = self.items.iter().map(ToString::to_string).collect();
            fields.raw("Items", format_args!("[{{{}}}]", items.join("}, {")));
        }
        fields.fmt(f)
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut fields = Fields::new();
        fields
            .optional("Title", self.title.as_deref())
            .optional("Description", self.description.as_deref())
            .optional("Link", self.link.as_deref())
            .optional("Author", self.author.as_deref())
            .list("Category", &self.categories)
            .optional("Comments", self.comments.as_deref());
        if let Some(enclosure) = &self.enclosure {
            fields.raw("Enclosure", format_args!("{{{enclosure}}}"));
        }
        if let Some(guid) = &self.guid {
            fields.quoted("GUID", &guid.value);
        }
        if let Some(date) = self.pub_date {
            fields.raw("PubDate", date.to_rfc3339());
        }
        if let Some(source) = &self.source {
            fields.raw("Source", format_args!("{{{source}}}"));
        }
        fields.fmt(f)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{:?}, domain={domain:?}", self.value),
            None => write!(f, "{:?}", self.value),
        }
    }
}

impl Display for Cloud {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Domain: {:?}, Port: {}, Path: {:?}, RegisterProcedure: {:?}, Protocol: {:?}",
            self.domain, self.port, self.path, self.register_procedure, self.protocol
        )
    }
}

impl Display for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut fields = Fields::new();
        fields
            .quoted("URL", &self.url)
            .quoted("Title", &self.title)
            .quoted("Link", &self.link);
        if let Some(width) = self.width {
            fields.raw("Width", width);
        }
        if let Some(height) = self.height {
            fields.raw("Height", height);
        }
        fields.optional("Description", self.description.as_deref());
        fields.fmt(f)
    }
}

impl Display for TextInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Title: {:?}, Description: {:?}, Name: {:?}, Link: {:?}",
            self.title, self.description, self.name, self.link
        )
    }
}

impl Display for Enclosure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "URL: {:?}, Length: {}, Type: {:?}",
            self.url, self.length, self.mime_type
        )
    }
}

impl Display for ItemSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, URL: {:?}", self.value, self.url)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    #[test]
    fn summary_lists_only_present_fields() {
        let snapshot = parse(
            r#"<rss version="2.0"><channel>
                <title>Blog</title><link>http://e/</link><description>d</description>
                <ttl>20</ttl>
                <item><title>First</title><category domain="tags">rust</category></item>
            </channel></rss>"#,
        )
        .unwrap();

        let text = snapshot.to_string();
        assert!(text.starts_with(r#"Version: "2.0", Channel: {Title: "Blog""#));
        assert!(text.contains("TTL: 20"));
        assert!(text.contains(r#"Items: [{Title: "First", Category: ["rust", domain="tags"]}]"#));
        assert!(!text.contains("Language"));
    }
}
