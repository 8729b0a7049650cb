use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::debug;

use super::audit::AuditCorrelator;
use super::delivery::{Delivery, DeliveryOutcome};
use super::event::{GuildEvent, MessageSnapshot};
use super::formatter::{self, LogCategory, Notification};
use super::platform::{AttachmentFetcher, AuditAction, FileUpload};
use crate::config::{ChannelSetting, EventLogConfig};

/// Routes guild activity to the per-category log channels.
pub struct EventLogger {
    config: EventLogConfig,
    delivery: Delivery,
    correlator: AuditCorrelator,
    media: Arc<dyn AttachmentFetcher>,
}

impl EventLogger {
    pub fn new(
        config: EventLogConfig,
        delivery: Delivery,
        correlator: AuditCorrelator,
        media: Arc<dyn AttachmentFetcher>,
    ) -> Self {
        Self {
            config,
            delivery,
            correlator,
            media,
        }
    }

    pub fn channel_for(&self, category: LogCategory) -> Option<&ChannelSetting> {
        match category {
            LogCategory::Messages => self.config.messages.as_ref(),
            LogCategory::Members => self.config.members.as_ref(),
            LogCategory::Moderation => self.config.moderation.as_ref(),
            LogCategory::Server => self.config.server.as_ref(),
            LogCategory::Voice => self.config.voice.as_ref(),
        }
    }

    /// Returns where the event was routed, or `None` when it is not logged.
    pub async fn handle(&self, event: &GuildEvent) -> Option<(LogCategory, DeliveryOutcome)> {
        let notification = self.notification_for(event).await?;
        let category = notification.category;
        let outcome = self
            .delivery
            .deliver(
                category.label(),
                self.channel_for(category),
                notification.into_outbound(),
            )
            .await;
        Some((category, outcome))
    }

    async fn notification_for(&self, event: &GuildEvent) -> Option<Notification> {
        let now = Utc::now();
        match event {
            GuildEvent::Ready { .. } | GuildEvent::MessageCreated(_) => None,
            GuildEvent::MessageDeleted(message) => {
                if message.author.bot {
                    debug!("ignoring deletion of bot message {}", message.id);
                    return None;
                }
                let rescued = self.rescue_images(message).await;
                Some(formatter::message_deleted(message, rescued, now))
            }
            GuildEvent::MessageEdited { before, after } => {
                if before.author.bot || before.content == after.content {
                    return None;
                }
                Some(formatter::message_edited(before, after, now))
            }
            GuildEvent::MemberJoined { user, .. } => Some(formatter::member_joined(user, now)),
            GuildEvent::MemberRemoved { guild_id, user } => {
                match self
                    .correlator
                    .correlate(*guild_id, AuditAction::Kick, user.id)
                    .await
                {
                    Some(kick) => Some(formatter::member_kicked(user, &kick, now)),
                    None => Some(formatter::member_left(user, now)),
                }
            }
            GuildEvent::MemberBanned { guild_id, user } => {
                let ban = self
                    .correlator
                    .correlate(*guild_id, AuditAction::Ban, user.id)
                    .await;
                Some(formatter::member_banned(user, ban.as_ref(), now))
            }
            GuildEvent::MemberUnbanned { guild_id, user } => {
                let unban = self
                    .correlator
                    .correlate(*guild_id, AuditAction::Unban, user.id)
                    .await;
                Some(formatter::member_unbanned(user, unban.as_ref(), now))
            }
            GuildEvent::RoleCreated { name, .. } => Some(formatter::role_created(name, now)),
            GuildEvent::ChannelCreated { channel, .. } => {
                Some(formatter::channel_created(channel, now))
            }
            GuildEvent::ChannelUpdated { before, after, .. } => {
                formatter::channel_updated(before, after, now)
            }
            GuildEvent::EmojisUpdated { total, .. } => Some(formatter::emojis_updated(*total, now)),
            GuildEvent::VoiceStateChanged {
                member,
                before,
                after,
                ..
            } => formatter::voice_state_changed(member, before.as_ref(), after.as_ref(), now),
        }
    }

    /// Downloads the image attachments of a deleted message while the CDN
    /// still serves them. Failures are skipped.
    async fn rescue_images(&self, message: &MessageSnapshot) -> Vec<FileUpload> {
        let downloads = message
            .attachments
            .iter()
            .filter(|attachment| attachment.is_image())
            .map(|attachment| async move {
                match self.media.download(&attachment.url).await {
                    Ok(data) => Some(FileUpload {
                        filename: attachment.upload_name(),
                        data,
                    }),
                    Err(err) => {
                        debug!("could not rescue {}: {:#}", attachment.filename, err);
                        None
                    }
                }
            });

        join_all(downloads).await.into_iter().flatten().collect()
    }
}
