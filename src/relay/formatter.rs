//! Turns guild events into log embeds. Nothing here performs I/O; anything
//! that needs the network (audit lookups, image downloads) is passed in.

use chrono::{DateTime, Utc};

use super::event::{
    channel_mention, relative_time, user_mention, ChannelSummary, MessageSnapshot, UserSummary,
};
use super::platform::{AuditEntry, FileUpload, OutboundMessage};
use crate::discord::DiscordEmbed;

pub mod colors {
    pub const RED: u32 = 0xe74c3c;
    pub const ORANGE: u32 = 0xe67e22;
    pub const GREEN: u32 = 0x2ecc71;
    pub const DARK_GREY: u32 = 0x607d8b;
    pub const DARK_RED: u32 = 0x992d22;
    pub const BLUE: u32 = 0x3498db;
    pub const PURPLE: u32 = 0x9b59b6;
}

const NO_TEXT: &str = "*[No text]*";
const NO_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Messages,
    Members,
    Moderation,
    Server,
    Voice,
}

impl LogCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Members => "members",
            Self::Moderation => "moderation",
            Self::Server => "server",
            Self::Voice => "voice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub category: LogCategory,
    pub embed: DiscordEmbed,
    pub files: Vec<FileUpload>,
}

impl Notification {
    fn new(category: LogCategory, embed: DiscordEmbed) -> Self {
        Self {
            category,
            embed,
            files: Vec::new(),
        }
    }

    pub fn into_outbound(self) -> OutboundMessage {
        OutboundMessage {
            content: None,
            embeds: vec![self.embed],
            files: self.files,
        }
    }
}

fn user_embed(title: &str, color: u32, user: &UserSummary, now: DateTime<Utc>) -> DiscordEmbed {
    DiscordEmbed::titled(title)
        .color(color)
        .timestamp(now)
        .author(user.author_line(), Some(user.avatar_url.clone()))
}

fn text_or_placeholder(text: &str) -> &str {
    if text.is_empty() { NO_TEXT } else { text }
}

/// `rescued` holds the image attachments that could still be downloaded.
pub fn message_deleted(
    message: &MessageSnapshot,
    rescued: Vec<FileUpload>,
    now: DateTime<Utc>,
) -> Notification {
    let mut embed = user_embed("🗑️ Message Deleted", colors::RED, &message.author, now)
        .description(format!(
            "**Channel:** {}\n**Content:** {}",
            channel_mention(message.channel_id),
            text_or_placeholder(&message.content)
        ))
        .footer(format!("Message ID: {}", message.id));

    if !message.attachments.is_empty() {
        embed = embed.field(
            "Attachments",
            format!("{} file(s) found.", message.attachments.len()),
            false,
        );
    }

    Notification {
        category: LogCategory::Messages,
        embed,
        files: rescued,
    }
}

pub fn message_edited(
    before: &MessageSnapshot,
    after: &MessageSnapshot,
    now: DateTime<Utc>,
) -> Notification {
    let embed = user_embed("✏️ Message Edited", colors::ORANGE, &before.author, now)
        .description(format!(
            "**Channel:** {} [Jump to Message]({})",
            channel_mention(before.channel_id),
            before.jump_url()
        ))
        .field("Before", text_or_placeholder(&before.content), false)
        .field("After", text_or_placeholder(&after.content), false);

    Notification::new(LogCategory::Messages, embed)
}

pub fn member_joined(user: &UserSummary, now: DateTime<Utc>) -> Notification {
    let embed = user_embed("📥 Member Joined", colors::GREEN, user, now).field(
        "Account Created",
        relative_time(user.created_at),
        true,
    );
    Notification::new(LogCategory::Members, embed)
}

pub fn member_kicked(user: &UserSummary, kick: &AuditEntry, now: DateTime<Utc>) -> Notification {
    let embed = user_embed("🥾 Member Kicked", colors::ORANGE, user, now)
        .field("Kicked By", user_mention(kick.executor_id), true)
        .field("Reason", kick.reason.as_deref().unwrap_or(NO_REASON), false);
    Notification::new(LogCategory::Moderation, embed)
}

pub fn member_left(user: &UserSummary, now: DateTime<Utc>) -> Notification {
    Notification::new(
        LogCategory::Members,
        user_embed("📤 Member Left", colors::DARK_GREY, user, now),
    )
}

pub fn member_banned(
    user: &UserSummary,
    ban: Option<&AuditEntry>,
    now: DateTime<Utc>,
) -> Notification {
    let embed = with_executor(
        user_embed("🔨 Member Banned", colors::DARK_RED, user, now),
        "Banned By",
        ban,
    );
    Notification::new(LogCategory::Moderation, embed)
}

pub fn member_unbanned(
    user: &UserSummary,
    unban: Option<&AuditEntry>,
    now: DateTime<Utc>,
) -> Notification {
    let embed = with_executor(
        user_embed("🔓 Member Unbanned", colors::GREEN, user, now),
        "Unbanned By",
        unban,
    );
    Notification::new(LogCategory::Moderation, embed)
}

fn with_executor(embed: DiscordEmbed, label: &str, entry: Option<&AuditEntry>) -> DiscordEmbed {
    match entry {
        Some(entry) => embed
            .field(label, user_mention(entry.executor_id), true)
            .field("Reason", entry.reason.as_deref().unwrap_or(NO_REASON), false),
        None => embed,
    }
}

pub fn role_created(name: &str, now: DateTime<Utc>) -> Notification {
    let embed = DiscordEmbed::titled("🛡️ Role Created")
        .description(name)
        .color(colors::BLUE)
        .timestamp(now);
    Notification::new(LogCategory::Server, embed)
}

pub fn channel_created(channel: &ChannelSummary, now: DateTime<Utc>) -> Notification {
    let embed = DiscordEmbed::titled("📺 Channel Created")
        .description(channel.name.clone())
        .color(colors::BLUE)
        .timestamp(now);
    Notification::new(LogCategory::Server, embed)
}

/// Only renames are logged; `None` when the name did not change.
pub fn channel_updated(
    before: &ChannelSummary,
    after: &ChannelSummary,
    now: DateTime<Utc>,
) -> Option<Notification> {
    if before.name == after.name {
        return None;
    }

    let embed = DiscordEmbed::titled("Channel Updated")
        .description(format!(
            "🪭\u{2060}│ {}\nName changed: `#{}` → `#{}`",
            channel_mention(after.id),
            before.name,
            after.name
        ))
        .color(colors::BLUE)
        .footer(format!("ID: {} • {}", after.id, relative_time(now)));

    Some(Notification::new(LogCategory::Server, embed))
}

pub fn emojis_updated(total: usize, now: DateTime<Utc>) -> Notification {
    let embed = DiscordEmbed::titled("😀 Emojis Updated")
        .description(format!("Total Emojis: {total}"))
        .color(colors::BLUE)
        .timestamp(now);
    Notification::new(LogCategory::Server, embed)
}

/// `None` when the member stayed in the same channel (mute or deafen toggles).
pub fn voice_state_changed(
    member: &UserSummary,
    before: Option<&ChannelSummary>,
    after: Option<&ChannelSummary>,
    now: DateTime<Utc>,
) -> Option<Notification> {
    let (title, description) = match (before, after) {
        (Some(old), Some(new)) if old.id == new.id => return None,
        (None, None) => return None,
        (None, Some(new)) => ("🎙️ Joined Voice", format!("Joined **{}**", new.name)),
        (Some(old), None) => ("🔇 Left Voice", format!("Left **{}**", old.name)),
        (Some(old), Some(new)) => (
            "🔄 Moved Voice",
            format!("Moved from **{}** to **{}**", old.name, new.name),
        ),
    };

    let embed = user_embed(title, colors::PURPLE, member, now).description(description);
    Some(Notification::new(LogCategory::Voice, embed))
}
