use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{ChannelSetting, Config};
use crate::discord::DiscordEmbed;

pub mod audit;
pub mod completeness;
pub mod delivery;
pub mod event;
pub mod formatter;
pub mod logger;
pub mod mirror;
pub mod platform;
pub mod welcome;

#[cfg(test)]
pub mod testing;

use self::audit::AuditCorrelator;
use self::delivery::Delivery;
use self::event::{GuildEvent, UserSummary};
use self::formatter::colors;
use self::logger::EventLogger;
use self::mirror::{MirrorOutcome, MirrorRelay};
use self::platform::{OutboundMessage, PlatformHandles};
use self::welcome::Greeter;

/// Owns every event consumer and fans gateway events out to them.
pub struct RelayCore {
    mirror: MirrorRelay,
    logger: EventLogger,
    greeter: Greeter,
    delivery: Delivery,
    ready_channel: Option<ChannelSetting>,
    identity: Arc<OnceCell<u64>>,
}

impl RelayCore {
    pub fn new(config: &Config, handles: PlatformHandles, shutdown: watch::Receiver<bool>) -> Self {
        let identity = Arc::new(OnceCell::new());
        let delivery = Delivery::new(handles.resolver.clone(), handles.sink.clone());
        let correlator =
            AuditCorrelator::new(handles.audit.clone(), config.event_log.audit_window());

        Self {
            mirror: MirrorRelay::new(
                &config.mirror,
                handles.fetcher.clone(),
                handles.media.clone(),
                delivery.clone(),
                identity.clone(),
                shutdown,
            ),
            logger: EventLogger::new(
                config.event_log.clone(),
                delivery.clone(),
                correlator,
                handles.media.clone(),
            ),
            greeter: Greeter::new(config.welcome_channel.clone(), delivery.clone()),
            delivery,
            ready_channel: config.ready_channel.clone(),
            identity,
        }
    }

    pub fn identity(&self) -> Option<u64> {
        self.identity.get().copied()
    }

    /// Handles one event. Panics are caught and logged so the gateway keeps
    /// delivering later events.
    pub async fn dispatch(&self, event: GuildEvent) {
        let kind = event.kind();
        let guild_id = event.guild_id();
        if let Err(panic) = AssertUnwindSafe(self.handle(event)).catch_unwind().await {
            error!(
                "{} handler panicked in guild {:?}: {}",
                kind,
                guild_id,
                panic_message(panic.as_ref())
            );
        }
    }

    async fn handle(&self, event: GuildEvent) {
        match event {
            GuildEvent::Ready { bot } => self.on_ready(&bot).await,
            GuildEvent::MessageCreated(message) => {
                let (id, channel_id) = (message.id, message.channel_id);
                match self.mirror.on_inbound_message(message).await {
                    MirrorOutcome::SelfAuthored | MirrorOutcome::NoMapping => {}
                    outcome => debug!(
                        "mirror of message {} from channel {} finished: {:?}",
                        id, channel_id, outcome
                    ),
                }
            }
            GuildEvent::MemberJoined { ref user, .. } => {
                self.logger.handle(&event).await;
                self.greeter.greet(user).await;
            }
            GuildEvent::MessageDeleted(_)
            | GuildEvent::MessageEdited { .. }
            | GuildEvent::MemberRemoved { .. }
            | GuildEvent::MemberBanned { .. }
            | GuildEvent::MemberUnbanned { .. }
            | GuildEvent::RoleCreated { .. }
            | GuildEvent::ChannelCreated { .. }
            | GuildEvent::ChannelUpdated { .. }
            | GuildEvent::EmojisUpdated { .. }
            | GuildEvent::VoiceStateChanged { .. } => {
                if let Some((category, outcome)) = self.logger.handle(&event).await {
                    debug!(
                        "{} event in guild {:?} routed to {} log: {:?}",
                        event.kind(),
                        event.guild_id(),
                        category.label(),
                        outcome
                    );
                }
            }
        }
    }

    async fn on_ready(&self, bot: &UserSummary) {
        if self.identity.set(bot.id).is_err() && self.identity() != Some(bot.id) {
            error!(
                "gateway reported a different bot identity {} after {:?}",
                bot.id,
                self.identity()
            );
        }
        info!("logged in as {} (ID: {})", bot.tag, bot.id);

        let notice = DiscordEmbed::titled("✅ Bot Online")
            .description(format!("Logged in as {}", bot.author_line()))
            .color(colors::GREEN)
            .timestamp(Utc::now());
        self.delivery
            .deliver("ready", self.ready_channel.as_ref(), OutboundMessage::embed(notice))
            .await
            .log_sent("ready notice");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::relay::platform::{ChannelHandle, ChannelResolver};
    use crate::relay::testing::{message, user, MockPlatform};

    const TOKEN_YAML: &str = "auth:\n  bot_token: t\n";

    fn config(extra: &str) -> Config {
        Config::from_yaml_str(&format!("{TOKEN_YAML}{extra}")).expect("config should parse")
    }

    fn build_core(
        platform: &Arc<MockPlatform>,
        config: &Config,
    ) -> (RelayCore, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (RelayCore::new(config, platform.handles(), rx), tx)
    }

    #[tokio::test]
    async fn ready_sets_identity_and_posts_notice() {
        let platform = MockPlatform::with_channels(&[50]);
        let (core, _tx) = build_core(&platform, &config("ready_channel: 50\n"));

        core.dispatch(GuildEvent::Ready { bot: user(4242) }).await;

        assert_eq!(core.identity(), Some(4242));
        let sent = platform.sent_to(50);
        assert_eq!(sent[0].embeds[0].title.as_deref(), Some("✅ Bot Online"));
        assert_eq!(
            sent[0].embeds[0].description.as_deref(),
            Some("Logged in as user4242 (4242)")
        );
    }

    #[tokio::test]
    async fn ready_without_channel_only_records_identity() {
        let platform = MockPlatform::with_channels(&[50]);
        let (core, _tx) = build_core(&platform, &config(""));

        core.dispatch(GuildEvent::Ready { bot: user(4242) }).await;

        assert_eq!(core.identity(), Some(4242));
        assert!(platform.resolved().is_empty());
    }

    #[tokio::test]
    async fn mirror_skips_own_messages_after_ready() {
        let platform = MockPlatform::with_channels(&[222]);
        let (core, _tx) = build_core(
            &platform,
            &config(
                "mirror:\n  mappings:\n    - source_channel_id: 111\n      target_channel_id: 222\n",
            ),
        );

        core.dispatch(GuildEvent::Ready { bot: user(4242) }).await;
        core.dispatch(GuildEvent::MessageCreated(message(1, 111, user(4242), "mine")))
            .await;
        core.dispatch(GuildEvent::MessageCreated(message(2, 111, user(7), "theirs")))
            .await;

        let sent = platform.sent_to(222);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content.as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn member_join_logs_and_greets() {
        let platform = MockPlatform::with_channels(&[20, 30]);
        let (core, _tx) = build_core(
            &platform,
            &config("event_log:\n  members: 20\nwelcome_channel: 30\n"),
        );

        core.dispatch(GuildEvent::MemberJoined {
            guild_id: 1,
            user: user(5),
        })
        .await;

        let log = platform.sent_to(20);
        assert_eq!(log[0].embeds[0].title.as_deref(), Some("📥 Member Joined"));
        let welcome = platform.sent_to(30);
        assert_eq!(
            welcome[0].content.as_deref(),
            Some("Welcome to the server, <@5>! 🎉")
        );
    }

    struct PanickingResolver;

    #[async_trait]
    impl ChannelResolver for PanickingResolver {
        async fn resolve(&self, _channel_id: u64) -> Option<ChannelHandle> {
            panic!("cache poisoned");
        }
    }

    #[tokio::test]
    async fn panicking_handler_does_not_escape_dispatch() {
        let platform = MockPlatform::with_channels(&[20]);
        let mut handles = platform.handles();
        handles.resolver = Arc::new(PanickingResolver);
        let (_tx, rx) = watch::channel(false);
        let core = RelayCore::new(&config("event_log:\n  server: 20\n"), handles, rx);

        core.dispatch(GuildEvent::RoleCreated {
            guild_id: 1,
            name: "Mods".to_string(),
        })
        .await;
        core.dispatch(GuildEvent::MessageCreated(message(1, 10, user(5), "still alive")))
            .await;

        assert!(platform.sent().is_empty());
    }

    #[test]
    fn panic_payloads_are_readable() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        let from_string: Box<dyn Any + Send> = Box::new("bang".to_string());
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(from_str.as_ref()), "boom");
        assert_eq!(panic_message(from_string.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
