use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::event::MessageSnapshot;
use crate::discord::DiscordEmbed;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("missing permissions: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// A live channel the bot can post into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
    pub files: Vec<FileUpload>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: DiscordEmbed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    /// Discord answers an empty message with HTTP 400.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.embeds.is_empty()
            && self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Kick,
    Ban,
    Unban,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub target_id: Option<u64>,
    pub executor_id: u64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, channel_id: u64) -> Option<ChannelHandle>;
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Returns the id of the posted message.
    async fn send(
        &self,
        channel: &ChannelHandle,
        message: OutboundMessage,
    ) -> Result<u64, PlatformError>;
}

#[async_trait]
pub trait MessageFetcher: Send + Sync {
    /// `Ok(None)` means the message no longer exists.
    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Option<MessageSnapshot>, PlatformError>;
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Newest first.
    async fn recent_actions(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError>;
}

#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct PlatformHandles {
    pub resolver: Arc<dyn ChannelResolver>,
    pub sink: Arc<dyn MessageSink>,
    pub fetcher: Arc<dyn MessageFetcher>,
    pub audit: Arc<dyn AuditTrail>,
    pub media: Arc<dyn AttachmentFetcher>,
}

impl PlatformHandles {
    /// Uses one gateway-backed value for every seam except downloads.
    pub fn new<P>(platform: Arc<P>, media: Arc<dyn AttachmentFetcher>) -> Self
    where
        P: ChannelResolver + MessageSink + MessageFetcher + AuditTrail + 'static,
    {
        Self {
            resolver: platform.clone(),
            sink: platform.clone(),
            fetcher: platform.clone(),
            audit: platform,
            media,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_emptiness() {
        assert!(OutboundMessage::default().is_empty());
        assert!(OutboundMessage::text("").is_empty());
        assert!(!OutboundMessage::text("hi").is_empty());
        assert!(!OutboundMessage::embed(DiscordEmbed::titled("t")).is_empty());

        let with_file = OutboundMessage {
            files: vec![FileUpload {
                filename: "a.txt".to_string(),
                data: b"a".to_vec(),
            }],
            ..OutboundMessage::default()
        };
        assert!(!with_file.is_empty());
    }
}
