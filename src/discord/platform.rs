use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelId, CreateAttachment, CreateMessage, GuildId, Http, MessageId,
};
use serenity::model::guild::audit_log::{Action, MemberAction};
use tracing::debug;

use super::convert::{message_snapshot, timestamp_to_utc};
use crate::relay::event::MessageSnapshot;
use crate::relay::platform::{
    AuditAction, AuditEntry, AuditTrail, ChannelHandle, ChannelResolver, MessageFetcher,
    MessageSink, OutboundMessage, PlatformError,
};

/// Platform seams backed by the gateway client's REST handle and cache.
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn cached_channel(&self, channel_id: ChannelId) -> Option<ChannelHandle> {
        self.cache.guilds().into_iter().find_map(|guild_id| {
            let guild = self.cache.guild(guild_id)?;
            guild.channels.get(&channel_id).map(|channel| ChannelHandle {
                id: channel.id.get(),
                name: channel.name.clone(),
            })
        })
    }
}

#[async_trait]
impl ChannelResolver for SerenityPlatform {
    async fn resolve(&self, channel_id: u64) -> Option<ChannelHandle> {
        if channel_id == 0 {
            return None;
        }
        let id = ChannelId::new(channel_id);

        if let Some(handle) = self.cached_channel(id) {
            return Some(handle);
        }

        match self.http.get_channel(id).await {
            Ok(channel) => channel.guild().map(|channel| ChannelHandle {
                id: channel.id.get(),
                name: channel.name,
            }),
            Err(err) => {
                debug!("failed to fetch channel {}: {}", channel_id, err);
                None
            }
        }
    }
}

#[async_trait]
impl MessageSink for SerenityPlatform {
    async fn send(
        &self,
        channel: &ChannelHandle,
        message: OutboundMessage,
    ) -> Result<u64, PlatformError> {
        let mut builder = CreateMessage::new();
        if let Some(content) = message.content {
            builder = builder.content(content);
        }
        if !message.embeds.is_empty() {
            builder = builder.embeds(
                message
                    .embeds
                    .iter()
                    .map(|embed| embed.to_builder())
                    .collect(),
            );
        }
        builder = builder.add_files(
            message
                .files
                .into_iter()
                .map(|file| CreateAttachment::bytes(file.data, file.filename)),
        );

        let sent = ChannelId::new(channel.id)
            .send_message(self.http.as_ref(), builder)
            .await
            .map_err(classify_error)?;
        Ok(sent.id.get())
    }
}

#[async_trait]
impl MessageFetcher for SerenityPlatform {
    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Option<MessageSnapshot>, PlatformError> {
        if channel_id == 0 || message_id == 0 {
            return Ok(None);
        }

        // Plain Http skips the message cache, which still holds the empty original.
        match ChannelId::new(channel_id)
            .message(self.http.as_ref(), MessageId::new(message_id))
            .await
        {
            Ok(message) => Ok(Some(message_snapshot(&message))),
            Err(err) => match classify_error(err) {
                PlatformError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }
}

#[async_trait]
impl AuditTrail for SerenityPlatform {
    async fn recent_actions(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        if guild_id == 0 {
            return Ok(Vec::new());
        }

        let logs = GuildId::new(guild_id)
            .audit_logs(&self.http, Some(audit_action(action)), None, None, Some(limit))
            .await
            .map_err(classify_error)?;

        Ok(logs
            .entries
            .into_iter()
            .map(|entry| AuditEntry {
                target_id: entry.target_id.map(|target| target.get()),
                executor_id: entry.user_id.get(),
                reason: entry.reason,
                created_at: timestamp_to_utc(entry.id.created_at()),
            })
            .collect())
    }
}

fn audit_action(action: AuditAction) -> Action {
    match action {
        AuditAction::Kick => Action::Member(MemberAction::Kick),
        AuditAction::Ban => Action::Member(MemberAction::BanAdd),
        AuditAction::Unban => Action::Member(MemberAction::BanRemove),
    }
}

fn classify_error(err: serenity::Error) -> PlatformError {
    let status = match &err {
        serenity::Error::Http(http_err) => http_err.status_code().map(|code| code.as_u16()),
        _ => None,
    };
    classify_status(status, err.to_string())
}

fn classify_status(status: Option<u16>, message: String) -> PlatformError {
    match status {
        Some(403) => PlatformError::Forbidden(message),
        Some(404) => PlatformError::NotFound(message),
        _ => PlatformError::Other(message),
    }
}
