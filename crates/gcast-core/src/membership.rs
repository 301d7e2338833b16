use std::sync::Arc;

use crate::{
    catalog::Reply,
    context::AppContext,
    domain::{ChatId, Group, UserId},
    groups::AddOutcome,
    Result,
};

/// The bot's own membership in a group chat changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipChange {
    Added {
        chat_id: ChatId,
        handle: Option<String>,
        added_by: UserId,
    },
    Removed {
        chat_id: ChatId,
    },
}

/// Keep the group registry in sync with where the bot is a member.
pub async fn handle_membership(app: &Arc<AppContext>, change: MembershipChange) -> Result<()> {
    match change {
        MembershipChange::Added {
            chat_id,
            handle,
            added_by,
        } => {
            let group = Group::new(chat_id, handle.as_deref());
            let label = group.username.clone();
            let outcome = app.groups.add(group).await?;
            tracing::info!(chat_id = chat_id.0, group = %label, ?outcome, "bot added to group");

            let reply = match outcome {
                AddOutcome::Added | AddOutcome::Refreshed => Reply::BotAdded,
                AddOutcome::CapacityReached => Reply::MaxGroupCountExceeded,
            };
            // The adder may never have opened a private chat with the bot.
            if let Err(e) = app
                .messenger
                .send_text(ChatId(added_by.0), &app.catalog.text(reply), None)
                .await
            {
                tracing::warn!(user_id = added_by.0, "could not notify group adder: {e}");
            }
        }
        MembershipChange::Removed { chat_id } => {
            let removed = app.groups.remove(chat_id).await?;
            tracing::info!(chat_id = chat_id.0, removed, "bot removed from group");
        }
    }
    Ok(())
}
