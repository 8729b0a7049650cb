use chrono::{DateTime, Utc};
use serenity::all::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, Embed, Timestamp};

/// Discord rejects embed field values longer than this.
pub const EMBED_FIELD_VALUE_LIMIT: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordEmbed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub author: Option<EmbedAuthor>,
    pub footer: Option<EmbedFooter>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl DiscordEmbed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(EmbedAuthor {
            name: name.into(),
            url: None,
            icon_url,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url: None,
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl AsRef<str>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: truncate_field_value(value.as_ref()),
            inline,
        });
        self
    }

    #[cfg(test)]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    pub fn to_builder(&self) -> CreateEmbed {
        let mut embed_builder = CreateEmbed::new();

        if let Some(ref title) = self.title {
            embed_builder = embed_builder.title(title);
        }

        if let Some(ref description) = self.description {
            embed_builder = embed_builder.description(description);
        }

        if let Some(ref url) = self.url {
            embed_builder = embed_builder.url(url);
        }

        if let Some(color) = self.color {
            embed_builder = embed_builder.color(color);
        }

        if let Some(timestamp) = self
            .timestamp
            .and_then(|ts| Timestamp::from_unix_timestamp(ts.timestamp()).ok())
        {
            embed_builder = embed_builder.timestamp(timestamp);
        }

        if let Some(author) = &self.author {
            let mut author_builder = CreateEmbedAuthor::new(&author.name);
            if let Some(ref icon_url) = author.icon_url {
                author_builder = author_builder.icon_url(icon_url);
            }
            if let Some(ref url) = author.url {
                author_builder = author_builder.url(url);
            }
            embed_builder = embed_builder.author(author_builder);
        }

        if let Some(footer) = &self.footer {
            let mut footer_builder = CreateEmbedFooter::new(&footer.text);
            if let Some(ref icon_url) = footer.icon_url {
                footer_builder = footer_builder.icon_url(icon_url);
            }
            embed_builder = embed_builder.footer(footer_builder);
        }

        if let Some(ref image_url) = self.image_url {
            embed_builder = embed_builder.image(image_url);
        }

        if let Some(ref thumbnail_url) = self.thumbnail_url {
            embed_builder = embed_builder.thumbnail(thumbnail_url);
        }

        for field in &self.fields {
            embed_builder = embed_builder.field(&field.name, &field.value, field.inline);
        }

        embed_builder
    }
}

impl From<&Embed> for DiscordEmbed {
    fn from(embed: &Embed) -> Self {
        Self {
            title: embed.title.clone(),
            description: embed.description.clone(),
            url: embed.url.clone(),
            color: embed.colour.map(|colour| colour.0),
            timestamp: embed
                .timestamp
                .as_ref()
                .and_then(|ts| DateTime::from_timestamp(ts.unix_timestamp(), 0)),
            author: embed.author.as_ref().map(|author| EmbedAuthor {
                name: author.name.clone(),
                url: author.url.clone(),
                icon_url: author.icon_url.clone(),
            }),
            footer: embed.footer.as_ref().map(|footer| EmbedFooter {
                text: footer.text.clone(),
                icon_url: footer.icon_url.clone(),
            }),
            image_url: embed.image.as_ref().map(|image| image.url.clone()),
            thumbnail_url: embed.thumbnail.as_ref().map(|thumb| thumb.url.clone()),
            fields: embed
                .fields
                .iter()
                .map(|field| EmbedField {
                    name: field.name.clone(),
                    value: field.value.clone(),
                    inline: field.inline,
                })
                .collect(),
        }
    }
}

pub fn truncate_field_value(value: &str) -> String {
    if value.chars().count() <= EMBED_FIELD_VALUE_LIMIT {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(EMBED_FIELD_VALUE_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_serenity_embed() {
        let embed: Embed = serde_json::from_value(json!({
            "title": "Patch 1.2",
            "description": "notes",
            "url": "https://example.com/patch",
            "color": 3447003,
            "footer": { "text": "steam" },
            "image": { "url": "https://example.com/banner.png" },
            "fields": [
                { "name": "Size", "value": "2 GB", "inline": true },
                { "name": "Region", "value": "EU", "inline": false }
            ]
        }))
        .expect("embed json should deserialize");

        let converted = DiscordEmbed::from(&embed);

        assert_eq!(converted.title.as_deref(), Some("Patch 1.2"));
        assert_eq!(converted.description.as_deref(), Some("notes"));
        assert_eq!(converted.url.as_deref(), Some("https://example.com/patch"));
        assert_eq!(converted.color, Some(3447003));
        assert_eq!(converted.footer.map(|f| f.text), Some("steam".to_string()));
        assert_eq!(
            converted.image_url.as_deref(),
            Some("https://example.com/banner.png")
        );
        assert_eq!(converted.fields.len(), 2);
        assert_eq!(converted.fields[0].name, "Size");
        assert!(converted.fields[0].inline);
        assert!(!converted.fields[1].inline);
    }

    #[test]
    fn builder_methods_compose() {
        let embed = DiscordEmbed::titled("t")
            .description("d")
            .color(0xff0000)
            .footer("f")
            .author("a (1)", Some("https://cdn/avatar.png".to_string()))
            .field("Before", "x", false);

        assert_eq!(embed.title.as_deref(), Some("t"));
        assert_eq!(embed.color, Some(0xff0000));
        assert_eq!(embed.author.as_ref().map(|a| a.name.as_str()), Some("a (1)"));
        assert_eq!(embed.field_value("Before"), Some("x"));
        assert_eq!(embed.field_value("After"), None);
    }

    #[test]
    fn long_field_values_are_truncated() {
        let long = "é".repeat(EMBED_FIELD_VALUE_LIMIT + 10);

        let value = truncate_field_value(&long);

        assert_eq!(value.chars().count(), EMBED_FIELD_VALUE_LIMIT);
        assert!(value.ends_with('…'));
    }

    #[test]
    fn short_field_values_are_kept() {
        assert_eq!(truncate_field_value("hello"), "hello");
    }
}
