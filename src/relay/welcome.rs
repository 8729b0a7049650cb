use super::delivery::{Delivery, DeliveryOutcome};
use super::event::UserSummary;
use super::platform::OutboundMessage;
use crate::config::ChannelSetting;

pub fn welcome_text(user: &UserSummary) -> String {
    format!("Welcome to the server, {}! 🎉", user.mention())
}

pub struct Greeter {
    channel: Option<ChannelSetting>,
    delivery: Delivery,
}

impl Greeter {
    pub fn new(channel: Option<ChannelSetting>, delivery: Delivery) -> Self {
        Self { channel, delivery }
    }

    pub async fn greet(&self, user: &UserSummary) -> DeliveryOutcome {
        self.delivery
            .deliver(
                "welcome",
                self.channel.as_ref(),
                OutboundMessage::text(welcome_text(user)),
            )
            .await
    }
}
