use chrono::{DateTime, Utc};
use serenity::all::{GuildChannel, Message, Timestamp, User};

use super::embed::DiscordEmbed;
use crate::relay::event::{AttachmentRef, ChannelSummary, MessageSnapshot, StickerRef, UserSummary};

pub fn timestamp_to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

pub fn user_summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id.get(),
        tag: user.tag(),
        avatar_url: user.face(),
        bot: user.bot,
        created_at: timestamp_to_utc(user.id.created_at()),
    }
}

pub fn channel_summary(channel: &GuildChannel) -> ChannelSummary {
    ChannelSummary {
        id: channel.id.get(),
        name: channel.name.clone(),
    }
}

pub fn message_snapshot(message: &Message) -> MessageSnapshot {
    MessageSnapshot {
        id: message.id.get(),
        guild_id: message.guild_id.map(|id| id.get()),
        channel_id: message.channel_id.get(),
        author: user_summary(&message.author),
        content: message.content.clone(),
        embeds: message.embeds.iter().map(DiscordEmbed::from).collect(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| AttachmentRef {
                url: attachment.url.clone(),
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
            })
            .collect(),
        stickers: message
            .sticker_items
            .iter()
            .map(|sticker| StickerRef {
                id: sticker.id.get(),
                name: sticker.name.clone(),
            })
            .collect(),
        timestamp: timestamp_to_utc(message.timestamp),
    }
}
