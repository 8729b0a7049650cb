//! In-memory platform used by the relay tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::event::{MessageSnapshot, UserSummary};
use super::platform::{
    AttachmentFetcher, AuditAction, AuditEntry, AuditTrail, ChannelHandle, ChannelResolver,
    MessageFetcher, MessageSink, OutboundMessage, PlatformError, PlatformHandles,
};

type FetchResult = Result<Option<MessageSnapshot>, PlatformError>;

#[derive(Default)]
pub struct MockPlatform {
    channels: Mutex<HashSet<u64>>,
    resolved: Mutex<Vec<u64>>,
    sent: Mutex<Vec<(u64, OutboundMessage)>>,
    send_error: Mutex<Option<PlatformError>>,
    next_message_id: Mutex<u64>,
    fetch_script: Mutex<VecDeque<FetchResult>>,
    last_fetch: Mutex<Option<FetchResult>>,
    fetches: Mutex<Vec<(u64, u64, Instant)>>,
    audit_entries: Mutex<Vec<(AuditAction, AuditEntry)>>,
    audit_error: Mutex<Option<PlatformError>>,
    audit_queries: Mutex<Vec<(u64, AuditAction, u8)>>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
    download_calls: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn with_channels(ids: &[u64]) -> Arc<Self> {
        let platform = Self::default();
        platform.channels.lock().extend(ids.iter().copied());
        Arc::new(platform)
    }

    pub fn handles(self: &Arc<Self>) -> PlatformHandles {
        PlatformHandles::new(self.clone(), self.clone())
    }

    pub fn fail_sends_with(&self, err: PlatformError) {
        *self.send_error.lock() = Some(err);
    }

    /// Queues refetch answers. Once drained, the last answer repeats.
    pub fn script_fetches(&self, results: impl IntoIterator<Item = FetchResult>) {
        self.fetch_script.lock().extend(results);
    }

    pub fn add_audit_entry(&self, action: AuditAction, entry: AuditEntry) {
        self.audit_entries.lock().push((action, entry));
    }

    pub fn fail_audit_with(&self, err: PlatformError) {
        *self.audit_error.lock() = Some(err);
    }

    pub fn serve_download(&self, url: &str, data: &[u8]) {
        self.downloads.lock().insert(url.to_string(), data.to_vec());
    }

    pub fn resolved(&self) -> Vec<u64> {
        self.resolved.lock().clone()
    }

    pub fn sent(&self) -> Vec<(u64, OutboundMessage)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().iter().map(|(_, _, at)| *at).collect()
    }

    pub fn audit_queries(&self) -> Vec<(u64, AuditAction, u8)> {
        self.audit_queries.lock().clone()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.download_calls.lock().clone()
    }
}

#[async_trait]
impl ChannelResolver for MockPlatform {
    async fn resolve(&self, channel_id: u64) -> Option<ChannelHandle> {
        self.resolved.lock().push(channel_id);
        self.channels
            .lock()
            .contains(&channel_id)
            .then(|| ChannelHandle {
                id: channel_id,
                name: format!("channel-{channel_id}"),
            })
    }
}

#[async_trait]
impl MessageSink for MockPlatform {
    async fn send(
        &self,
        channel: &ChannelHandle,
        message: OutboundMessage,
    ) -> Result<u64, PlatformError> {
        if let Some(err) = self.send_error.lock().clone() {
            return Err(err);
        }
        self.sent.lock().push((channel.id, message));
        let mut next = self.next_message_id.lock();
        *next += 1;
        Ok(900_000 + *next)
    }
}

#[async_trait]
impl MessageFetcher for MockPlatform {
    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> FetchResult {
        self.fetches
            .lock()
            .push((channel_id, message_id, Instant::now()));

        let next = self.fetch_script.lock().pop_front();
        let mut last = self.last_fetch.lock();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last.clone().unwrap_or(Ok(None)),
        }
    }
}

#[async_trait]
impl AuditTrail for MockPlatform {
    async fn recent_actions(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        self.audit_queries.lock().push((guild_id, action, limit));
        if let Some(err) = self.audit_error.lock().clone() {
            return Err(err);
        }
        Ok(self
            .audit_entries
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == action)
            .map(|(_, entry)| entry.clone())
            .take(usize::from(limit))
            .collect())
    }
}

#[async_trait]
impl AttachmentFetcher for MockPlatform {
    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.download_calls.lock().push(url.to_string());
        self.downloads
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("failed to download {url}: HTTP 404"))
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

pub fn user(id: u64) -> UserSummary {
    UserSummary {
        id,
        tag: format!("user{id}"),
        avatar_url: format!("https://cdn.discordapp.com/avatars/{id}/avatar.png"),
        bot: false,
        created_at: DateTime::from_timestamp(1_600_000_000, 0).unwrap_or_default(),
    }
}

pub fn bot(id: u64) -> UserSummary {
    UserSummary {
        bot: true,
        ..user(id)
    }
}

pub fn message(id: u64, channel_id: u64, author: UserSummary, content: &str) -> MessageSnapshot {
    MessageSnapshot {
        id,
        guild_id: Some(1),
        channel_id,
        author,
        content: content.to_string(),
        embeds: Vec::new(),
        attachments: Vec::new(),
        stickers: Vec::new(),
        timestamp: fixed_time(),
    }
}
