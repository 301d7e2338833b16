//! Telegram update handlers.
//!
//! Each handler translates a teloxide update into a core event and hands it to
//! `gcast-core`. Errors are logged here; the dispatcher never sees them.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatMemberUpdated, Message},
};

use gcast_core::{
    conversation::{Conversation, Inbound},
    domain::{ChatId, UserId},
    membership::{handle_membership, MembershipChange},
    messaging::types::{MediaKind, MediaRef},
};

pub async fn handle_message(msg: Message, conversation: Arc<Conversation>) -> ResponseResult<()> {
    // The menu only lives in private chats.
    if !msg.chat.is_private() {
        return Ok(());
    }

    let inbound = Inbound {
        chat_id: ChatId(msg.chat.id.0),
        user_id: msg.from().map(|u| UserId(u.id.0 as i64)),
        text: msg.text().map(str::to_string),
        media: media_of(&msg),
    };

    if let Err(e) = conversation.handle(inbound).await {
        tracing::error!(chat_id = msg.chat.id.0, "message handling failed: {e}");
    }
    Ok(())
}

pub async fn handle_my_chat_member(
    upd: ChatMemberUpdated,
    conversation: Arc<Conversation>,
) -> ResponseResult<()> {
    if !(upd.chat.is_group() || upd.chat.is_supergroup()) {
        return Ok(());
    }

    let Some(change) = membership_change(
        ChatId(upd.chat.id.0),
        upd.chat.username(),
        UserId(upd.from.id.0 as i64),
        is_present(&upd.old_chat_member.kind),
        is_present(&upd.new_chat_member.kind),
    ) else {
        return Ok(());
    };

    if let Err(e) = handle_membership(conversation.app(), change).await {
        tracing::error!(chat_id = upd.chat.id.0, "membership update failed: {e}");
        conversation
            .app()
            .error_log
            .record(&format!("membership update for chat {}", upd.chat.id.0), &format!("{e:?}"));
    }
    Ok(())
}

fn is_present(kind: &ChatMemberKind) -> bool {
    !(kind.is_left() || kind.is_banned())
}

/// Only transitions into or out of the chat matter; promotions and the like are ignored.
fn membership_change(
    chat_id: ChatId,
    handle: Option<&str>,
    actor: UserId,
    was_present: bool,
    is_present: bool,
) -> Option<MembershipChange> {
    match (was_present, is_present) {
        (false, true) => Some(MembershipChange::Added {
            chat_id,
            handle: handle.map(str::to_string),
            added_by: actor,
        }),
        (true, false) => Some(MembershipChange::Removed { chat_id }),
        _ => None,
    }
}

fn media_of(msg: &Message) -> Option<MediaRef> {
    if let Some(doc) = msg.document() {
        return Some(MediaRef {
            file_id: doc.file.id.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            kind: MediaKind::Document,
        });
    }
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some(MediaRef {
            file_id: best.file.id.clone(),
            file_name: None,
            mime_type: None,
            kind: MediaKind::Photo,
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaRef {
            file_id: video.file.id.clone(),
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            kind: MediaKind::Video,
        });
    }
    if let Some(anim) = msg.animation() {
        return Some(MediaRef {
            file_id: anim.file.id.clone(),
            file_name: anim.file_name.clone(),
            mime_type: anim.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            kind: MediaKind::Animation,
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(MediaRef {
            file_id: audio.file.id.clone(),
            file_name: audio.file_name.clone(),
            mime_type: audio.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            kind: MediaKind::Audio,
        });
    }
    if let Some(voice) = msg.voice() {
        return Some(MediaRef {
            file_id: voice.file.id.clone(),
            file_name: None,
            mime_type: voice.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            kind: MediaKind::Voice,
        });
    }
    None
}
