use chrono::{DateTime, Utc};
use url::Url;

use crate::discord::DiscordEmbed;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: u64,
    pub tag: String,
    pub avatar_url: String,
    pub bot: bool,
    pub created_at: DateTime<Utc>,
}

impl UserSummary {
    /// `name (id)`, the author line used on every log embed.
    pub fn author_line(&self) -> String {
        format!("{} ({})", self.tag, self.id)
    }

    pub fn mention(&self) -> String {
        user_mention(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

impl AttachmentRef {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|kind| kind.starts_with("image/"))
    }

    /// Name to re-upload under. Falls back to the last path segment of the
    /// CDN url when the gateway sent no filename.
    pub fn upload_name(&self) -> String {
        if !self.filename.trim().is_empty() {
            return self.filename.clone();
        }
        filename_from_url(&self.url)
    }
}

fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "attachment".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author: UserSummary,
    pub content: String,
    pub embeds: Vec<DiscordEmbed>,
    pub attachments: Vec<AttachmentRef>,
    pub stickers: Vec<StickerRef>,
    pub timestamp: DateTime<Utc>,
}

impl MessageSnapshot {
    /// Whether anything visible has landed on the message yet.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
            || !self.embeds.is_empty()
            || !self.attachments.is_empty()
            || !self.stickers.is_empty()
    }

    pub fn jump_url(&self) -> String {
        let guild = self
            .guild_id
            .map_or_else(|| "@me".to_string(), |id| id.to_string());
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild, self.channel_id, self.id
        )
    }
}

/// Everything the relay reacts to, one variant per gateway event kind.
#[derive(Debug, Clone)]
pub enum GuildEvent {
    Ready {
        bot: UserSummary,
    },
    MessageCreated(MessageSnapshot),
    MessageDeleted(MessageSnapshot),
    MessageEdited {
        before: MessageSnapshot,
        after: MessageSnapshot,
    },
    MemberJoined {
        guild_id: u64,
        user: UserSummary,
    },
    MemberRemoved {
        guild_id: u64,
        user: UserSummary,
    },
    MemberBanned {
        guild_id: u64,
        user: UserSummary,
    },
    MemberUnbanned {
        guild_id: u64,
        user: UserSummary,
    },
    RoleCreated {
        guild_id: u64,
        name: String,
    },
    ChannelCreated {
        guild_id: u64,
        channel: ChannelSummary,
    },
    ChannelUpdated {
        guild_id: u64,
        before: ChannelSummary,
        after: ChannelSummary,
    },
    EmojisUpdated {
        guild_id: u64,
        total: usize,
    },
    VoiceStateChanged {
        guild_id: u64,
        member: UserSummary,
        before: Option<ChannelSummary>,
        after: Option<ChannelSummary>,
    },
}

impl GuildEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::MessageCreated(_) => "message_create",
            Self::MessageDeleted(_) => "message_delete",
            Self::MessageEdited { .. } => "message_update",
            Self::MemberJoined { .. } => "member_join",
            Self::MemberRemoved { .. } => "member_remove",
            Self::MemberBanned { .. } => "member_ban",
            Self::MemberUnbanned { .. } => "member_unban",
            Self::RoleCreated { .. } => "role_create",
            Self::ChannelCreated { .. } => "channel_create",
            Self::ChannelUpdated { .. } => "channel_update",
            Self::EmojisUpdated { .. } => "emojis_update",
            Self::VoiceStateChanged { .. } => "voice_state_update",
        }
    }

    pub fn guild_id(&self) -> Option<u64> {
        match self {
            Self::Ready { .. } => None,
            Self::MessageCreated(message) | Self::MessageDeleted(message) => message.guild_id,
            Self::MessageEdited { after, .. } => after.guild_id,
            Self::MemberJoined { guild_id, .. }
            | Self::MemberRemoved { guild_id, .. }
            | Self::MemberBanned { guild_id, .. }
            | Self::MemberUnbanned { guild_id, .. }
            | Self::RoleCreated { guild_id, .. }
            | Self::ChannelCreated { guild_id, .. }
            | Self::ChannelUpdated { guild_id, .. }
            | Self::EmojisUpdated { guild_id, .. }
            | Self::VoiceStateChanged { guild_id, .. } => Some(*guild_id),
        }
    }
}

pub fn user_mention(id: u64) -> String {
    format!("<@{id}>")
}

pub fn channel_mention(id: u64) -> String {
    format!("<#{id}>")
}

/// Discord's relative timestamp markup, rendered client-side as "3 years ago".
pub fn relative_time(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}
