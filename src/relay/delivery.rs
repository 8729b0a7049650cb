use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::platform::{ChannelHandle, ChannelResolver, MessageSink, OutboundMessage, PlatformError};
use crate::config::{ChannelSetting, LogDestination};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { channel_id: u64, message_id: u64 },
    Disabled,
    Misconfigured,
    Unresolved(u64),
    Failed(u64),
}

/// Resolve-then-send with no retries. Failures end up in the log, never in the caller.
#[derive(Clone)]
pub struct Delivery {
    resolver: Arc<dyn ChannelResolver>,
    sink: Arc<dyn MessageSink>,
}

impl Delivery {
    pub fn new(resolver: Arc<dyn ChannelResolver>, sink: Arc<dyn MessageSink>) -> Self {
        Self { resolver, sink }
    }

    pub async fn resolve(&self, channel_id: u64) -> Option<ChannelHandle> {
        self.resolver.resolve(channel_id).await
    }

    pub async fn deliver(
        &self,
        label: &str,
        setting: Option<&ChannelSetting>,
        message: OutboundMessage,
    ) -> DeliveryOutcome {
        let channel_id = match LogDestination::of(setting) {
            LogDestination::Disabled => {
                debug!("{} channel is not configured, skipping", label);
                return DeliveryOutcome::Disabled;
            }
            LogDestination::Misconfigured(raw) => {
                error!(
                    "invalid {} channel id provided: '{}', must be an integer",
                    label, raw
                );
                return DeliveryOutcome::Misconfigured;
            }
            LogDestination::Channel(id) => id,
        };

        let Some(channel) = self.resolver.resolve(channel_id).await else {
            warn!("{} channel with id {} not found", label, channel_id);
            return DeliveryOutcome::Unresolved(channel_id);
        };

        self.send_to(&channel, message).await
    }

    pub async fn send_to(
        &self,
        channel: &ChannelHandle,
        message: OutboundMessage,
    ) -> DeliveryOutcome {
        match self.sink.send(channel, message).await {
            Ok(message_id) => {
                debug!(
                    "delivered message {} to channel {} ({})",
                    message_id, channel.name, channel.id
                );
                DeliveryOutcome::Sent {
                    channel_id: channel.id,
                    message_id,
                }
            }
            Err(PlatformError::Forbidden(reason)) => {
                warn!(
                    "missing permissions to send message in channel {} ({}): {}",
                    channel.name, channel.id, reason
                );
                DeliveryOutcome::Failed(channel.id)
            }
            Err(err) => {
                error!("could not send message to channel {}: {}", channel.id, err);
                DeliveryOutcome::Failed(channel.id)
            }
        }
    }
}

impl DeliveryOutcome {
    pub fn log_sent(&self, what: &str) {
        if let Self::Sent { channel_id, message_id } = self {
            info!("{} posted to channel {} as message {}", what, channel_id, message_id);
        }
    }
}
