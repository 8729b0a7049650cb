use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::completeness::{CompletenessWait, RetryPolicy, WaitState};
use super::delivery::{Delivery, DeliveryOutcome};
use super::event::{AttachmentRef, MessageSnapshot, StickerRef};
use super::platform::{AttachmentFetcher, FileUpload, MessageFetcher, OutboundMessage};
use crate::config::{MirrorConfig, MirrorMapping};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    SelfAuthored,
    NoMapping,
    TargetUnresolved(u64),
    MessageGone,
    Cancelled,
    Empty,
    Delivered { target: u64, message_id: u64 },
    DeliveryFailed(u64),
}

pub struct MirrorRelay {
    mappings: Vec<MirrorMapping>,
    policy: RetryPolicy,
    fetcher: Arc<dyn MessageFetcher>,
    media: Arc<dyn AttachmentFetcher>,
    delivery: Delivery,
    identity: Arc<OnceCell<u64>>,
    shutdown: watch::Receiver<bool>,
}

impl MirrorRelay {
    pub fn new(
        config: &MirrorConfig,
        fetcher: Arc<dyn MessageFetcher>,
        media: Arc<dyn AttachmentFetcher>,
        delivery: Delivery,
        identity: Arc<OnceCell<u64>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            mappings: config.mappings.clone(),
            policy: RetryPolicy::from(config),
            fetcher,
            media,
            delivery,
            identity,
            shutdown,
        }
    }

    /// First mapping in declared order whose channel and author filter match.
    pub fn mapping_for(&self, channel_id: u64, author_id: u64) -> Option<&MirrorMapping> {
        self.mappings
            .iter()
            .find(|mapping| mapping.matches(channel_id, author_id))
    }

    pub async fn on_inbound_message(&self, snapshot: MessageSnapshot) -> MirrorOutcome {
        if self.identity.get() == Some(&snapshot.author.id) {
            return MirrorOutcome::SelfAuthored;
        }

        let Some(mapping) = self.mapping_for(snapshot.channel_id, snapshot.author.id) else {
            return MirrorOutcome::NoMapping;
        };
        let target_id = mapping.target_channel_id;

        let Some(target) = self.delivery.resolve(target_id).await else {
            warn!(
                "mirror target channel {} for source {} not found",
                target_id, snapshot.channel_id
            );
            return MirrorOutcome::TargetUnresolved(target_id);
        };

        let wait = CompletenessWait::new(self.fetcher.clone(), self.policy, self.shutdown.clone());
        let snapshot = match wait.run(snapshot).await {
            WaitState::ContentReady(snapshot) | WaitState::TimedOut(snapshot) => snapshot,
            WaitState::MessageGone => return MirrorOutcome::MessageGone,
            WaitState::Cancelled => return MirrorOutcome::Cancelled,
            WaitState::Waiting { snapshot, .. } => snapshot,
        };

        let replica = self.build_replica(&snapshot).await;
        if replica.is_empty() {
            debug!(
                "message {} from channel {} has nothing to mirror",
                snapshot.id, snapshot.channel_id
            );
            return MirrorOutcome::Empty;
        }

        match self.delivery.send_to(&target, replica).await {
            DeliveryOutcome::Sent { message_id, .. } => {
                info!(
                    "mirrored message {} from channel {} to channel {}",
                    snapshot.id, snapshot.channel_id, target_id
                );
                MirrorOutcome::Delivered {
                    target: target_id,
                    message_id,
                }
            }
            _ => MirrorOutcome::DeliveryFailed(target_id),
        }
    }

    async fn build_replica(&self, snapshot: &MessageSnapshot) -> OutboundMessage {
        let files = self.download_attachments(&snapshot.attachments).await;
        let mut content = (!snapshot.content.is_empty()).then(|| snapshot.content.clone());

        if content.is_none() && snapshot.embeds.is_empty() && files.is_empty() {
            content = sticker_marker(&snapshot.stickers);
        }

        OutboundMessage {
            content,
            embeds: snapshot.embeds.clone(),
            files,
        }
    }

    async fn download_attachments(&self, attachments: &[AttachmentRef]) -> Vec<FileUpload> {
        let downloads = attachments.iter().map(|attachment| async move {
            match self.media.download(&attachment.url).await {
                Ok(data) => Some(FileUpload {
                    filename: attachment.upload_name(),
                    data,
                }),
                Err(err) => {
                    warn!(
                        "dropping attachment {} from mirrored message: {:#}",
                        attachment.filename, err
                    );
                    None
                }
            }
        });

        join_all(downloads).await.into_iter().flatten().collect()
    }
}

/// `**[Sticker(s): a, b]**`, the text stand-in for messages carrying only stickers.
pub fn sticker_marker(stickers: &[StickerRef]) -> Option<String> {
    if stickers.is_empty() {
        return None;
    }
    let names: Vec<&str> = stickers.iter().map(|sticker| sticker.name.as_str()).collect();
    Some(format!("**[Sticker(s): {}]**", names.join(", ")))
}
