use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use secrecy::ExposeSecret;
use serenity::all::{
    ChannelId, Client as SerenityClient, Context as SerenityContext, Emoji, EmojiId,
    EventHandler as SerenityEventHandler, GatewayIntents, GuildChannel, GuildId, Member,
    Message as SerenityMessage, MessageId, MessageUpdateEvent, Ready, Role, ShardManager, User,
    VoiceState,
};
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::media::MediaHandler;
use crate::relay::event::{ChannelSummary, GuildEvent};
use crate::relay::platform::PlatformHandles;
use crate::relay::RelayCore;

pub mod convert;
pub mod embed;
pub mod platform;

pub use self::embed::DiscordEmbed;
pub use self::platform::SerenityPlatform;

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT: Duration = Duration::from_secs(30);

type CoreSlot = Arc<RwLock<Option<Arc<RelayCore>>>>;

pub fn gateway_intents(use_privileged_intents: bool) -> GatewayIntents {
    let mut intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MODERATION
        | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
        | GatewayIntents::GUILD_VOICE_STATES;
    if use_privileged_intents {
        intents |= GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILD_MEMBERS;
    }
    intents
}

/// Owns the gateway connection and the relay bound to it.
#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    media: Arc<MediaHandler>,
    shutdown: watch::Receiver<bool>,
    login_state: Arc<Mutex<DiscordLoginState>>,
    core: CoreSlot,
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
    gateway_done: Option<watch::Receiver<bool>>,
    shard_manager: Option<Arc<ShardManager>>,
}

struct GatewayHandler {
    ready_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    core: CoreSlot,
}

impl GatewayHandler {
    async fn forward(&self, event: GuildEvent) {
        let core = self.core.read().await.clone();
        let Some(core) = core else {
            debug!("ignoring {} event before relay binding", event.kind());
            return;
        };
        core.dispatch(event).await;
    }
}

fn voice_channel(
    ctx: &SerenityContext,
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
) -> Option<ChannelSummary> {
    let channel_id = channel_id?;
    let name = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.channels.get(&channel_id).map(|channel| channel.name.clone()))
        .unwrap_or_else(|| channel_id.to_string());
    Some(ChannelSummary {
        id: channel_id.get(),
        name,
    })
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayHandler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
        self.forward(GuildEvent::Ready {
            bot: convert::user_summary(&ready.user),
        })
        .await;
    }

    async fn message(&self, _ctx: SerenityContext, msg: SerenityMessage) {
        self.forward(GuildEvent::MessageCreated(convert::message_snapshot(&msg)))
            .await;
    }

    async fn message_delete(
        &self,
        ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let cached = ctx
            .cache
            .message(channel_id, deleted_message_id)
            .map(|message| convert::message_snapshot(&message));
        let Some(mut snapshot) = cached else {
            debug!(
                "deleted message {} in channel {} was not cached",
                deleted_message_id, channel_id
            );
            return;
        };
        if snapshot.guild_id.is_none() {
            snapshot.guild_id = guild_id.map(|id| id.get());
        }
        self.forward(GuildEvent::MessageDeleted(snapshot)).await;
    }

    async fn message_update(
        &self,
        ctx: SerenityContext,
        old_if_available: Option<SerenityMessage>,
        new: Option<SerenityMessage>,
        event: MessageUpdateEvent,
    ) {
        let Some(before) = old_if_available else {
            debug!("edited message {} was not cached", event.id);
            return;
        };
        let after = match new {
            Some(message) => convert::message_snapshot(&message),
            None => {
                let cached = ctx
                    .cache
                    .message(event.channel_id, event.id)
                    .map(|message| convert::message_snapshot(&message));
                match cached {
                    Some(snapshot) => snapshot,
                    None => {
                        let mut snapshot = convert::message_snapshot(&before);
                        if let Some(content) = event.content {
                            snapshot.content = content;
                        }
                        snapshot
                    }
                }
            }
        };
        self.forward(GuildEvent::MessageEdited {
            before: convert::message_snapshot(&before),
            after,
        })
        .await;
    }

    async fn guild_member_addition(&self, _ctx: SerenityContext, new_member: Member) {
        self.forward(GuildEvent::MemberJoined {
            guild_id: new_member.guild_id.get(),
            user: convert::user_summary(&new_member.user),
        })
        .await;
    }

    async fn guild_member_removal(
        &self,
        _ctx: SerenityContext,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        self.forward(GuildEvent::MemberRemoved {
            guild_id: guild_id.get(),
            user: convert::user_summary(&user),
        })
        .await;
    }

    async fn guild_ban_addition(
        &self,
        _ctx: SerenityContext,
        guild_id: GuildId,
        banned_user: User,
    ) {
        self.forward(GuildEvent::MemberBanned {
            guild_id: guild_id.get(),
            user: convert::user_summary(&banned_user),
        })
        .await;
    }

    async fn guild_ban_removal(
        &self,
        _ctx: SerenityContext,
        guild_id: GuildId,
        unbanned_user: User,
    ) {
        self.forward(GuildEvent::MemberUnbanned {
            guild_id: guild_id.get(),
            user: convert::user_summary(&unbanned_user),
        })
        .await;
    }

    async fn guild_role_create(&self, _ctx: SerenityContext, new: Role) {
        self.forward(GuildEvent::RoleCreated {
            guild_id: new.guild_id.get(),
            name: new.name,
        })
        .await;
    }

    async fn channel_create(&self, _ctx: SerenityContext, channel: GuildChannel) {
        self.forward(GuildEvent::ChannelCreated {
            guild_id: channel.guild_id.get(),
            channel: convert::channel_summary(&channel),
        })
        .await;
    }

    async fn channel_update(
        &self,
        _ctx: SerenityContext,
        old: Option<GuildChannel>,
        new: GuildChannel,
    ) {
        let Some(old) = old else {
            debug!("updated channel {} was not cached", new.id);
            return;
        };
        self.forward(GuildEvent::ChannelUpdated {
            guild_id: new.guild_id.get(),
            before: convert::channel_summary(&old),
            after: convert::channel_summary(&new),
        })
        .await;
    }

    async fn guild_emojis_update(
        &self,
        _ctx: SerenityContext,
        guild_id: GuildId,
        current_state: HashMap<EmojiId, Emoji>,
    ) {
        self.forward(GuildEvent::EmojisUpdated {
            guild_id: guild_id.get(),
            total: current_state.len(),
        })
        .await;
    }

    async fn voice_state_update(
        &self,
        ctx: SerenityContext,
        old: Option<VoiceState>,
        new: VoiceState,
    ) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let user = match &new.member {
            Some(member) => Some(convert::user_summary(&member.user)),
            None => ctx
                .cache
                .user(new.user_id)
                .map(|user| convert::user_summary(&user)),
        };
        let Some(member) = user else {
            debug!("voice state for unknown user {}", new.user_id);
            return;
        };

        let before = voice_channel(&ctx, guild_id, old.and_then(|state| state.channel_id));
        let after = voice_channel(&ctx, guild_id, new.channel_id);
        self.forward(GuildEvent::VoiceStateChanged {
            guild_id: guild_id.get(),
            member,
            before,
            after,
        })
        .await;
    }
}

impl DiscordClient {
    pub fn new(
        config: Arc<Config>,
        media: Arc<MediaHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("initializing discord client");
        Self {
            config,
            media,
            shutdown,
            login_state: Arc::new(Mutex::new(DiscordLoginState::default())),
            core: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let token = self
            .config
            .auth
            .bot_token
            .as_ref()
            .ok_or_else(|| anyhow!("discord bot token is not configured"))?;
        let intents = gateway_intents(self.config.auth.use_privileged_intents);

        let mut cache_settings = serenity::cache::Settings::default();
        cache_settings.max_messages = self.config.cache.max_messages;

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = GatewayHandler {
            ready_sender: Arc::new(Mutex::new(Some(ready_tx))),
            core: self.core.clone(),
        };

        let mut gateway_client = SerenityClient::builder(token.expose_secret(), intents)
            .cache_settings(cache_settings)
            .event_handler(event_handler)
            .await
            .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let platform = Arc::new(SerenityPlatform::new(
            gateway_client.http.clone(),
            gateway_client.cache.clone(),
        ));
        let handles = PlatformHandles::new(platform, self.media.clone());
        let core = RelayCore::new(&self.config, handles, self.shutdown.clone());
        *self.core.write().await = Some(Arc::new(core));

        let shard_manager = gateway_client.shard_manager.clone();
        let (done_tx, done_rx) = watch::channel(false);
        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
            let _ = done_tx.send(true);
        });

        match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                state.gateway_done = Some(done_rx);
                state.shard_manager = Some(shard_manager);
                info!("discord bot login succeeded and gateway is connected");
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                shard_manager.shutdown_all().await;
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;
        let mut shutdown = self.shutdown.clone();

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::select! {
                        _ = shutdown.wait_for(|stop| *stop) => {
                            return Err(anyhow!("shutdown requested before discord login succeeded"));
                        }
                        _ = tokio::time::sleep(Duration::from_secs(retry_seconds)) => {}
                    }
                    retry_seconds = next_retry_seconds(retry_seconds);
                }
            }
        }
    }

    /// Waits for the gateway task, which only ends when the connection is lost
    /// for good or `stop` is called.
    /// Resolves when the gateway task ends. The task handle stays in place so
    /// `stop` can still join it after this future is dropped.
    pub async fn wait(&self) {
        let done = self.login_state.lock().await.gateway_done.clone();
        if let Some(mut done) = done {
            // A dropped sender means the task is gone as well.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(shard_manager) = state.shard_manager.take() {
            shard_manager.shutdown_all().await;
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.gateway_done = None;
        state.is_logged_in = false;
        *self.core.write().await = None;
        info!("discord client stopped");
        Ok(())
    }
}

fn next_retry_seconds(current: u64) -> u64 {
    (current * 2).min(MAX_LOGIN_RETRY_SECONDS)
}
