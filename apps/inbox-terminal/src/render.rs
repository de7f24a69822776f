//! Plain-text rendering of directory rows, timeline rows and query results.

use inbox_core::{
    ConversationSummary, EditHistoryEntry, GroupInfo, Message, Notice, OWN_REACTOR,
    PushConnectionState, PushStatus, TimelineStore,
};
use serde_json::Value;

/// `  3. [2] Alice — hi there  (id 7)`
pub fn directory_row(row: usize, conversation: &ConversationSummary) -> String {
    let mut line = format!(
        "{row:>3}. [{}] {} — {}",
        conversation.unread_count,
        conversation.display_name(),
        conversation.preview()
    );
    if conversation.is_group() {
        line.push_str("  [group]");
    }
    if conversation.is_blocked {
        line.push_str("  [blocked]");
    }
    if conversation.is_banned {
        line.push_str("  [banned]");
    }
    line.push_str(&format!("  (id {})", conversation.id));
    line
}

/// One timeline row. `timeline` resolves reply targets.
pub fn message_row(message: &Message, timeline: &TimelineStore) -> String {
    let marker = if message.is_outbound() { ">>" } else { "<<" };
    let mut line = format!(
        "#{} {} {marker} ",
        message.id,
        message.timestamp.format("%H:%M")
    );

    if !message.is_outbound()
        && let Some(sender) = message.sender_name.as_deref()
    {
        line.push_str(&format!("{sender}: "));
    }
    if let Some(origin) = message.forwarded_from.as_deref() {
        match message.forwarded_from_username.as_deref() {
            Some(username) => line.push_str(&format!("[fwd from {origin} @{username}] ")),
            None => line.push_str(&format!("[fwd from {origin}] ")),
        }
    }
    if let Some(target) = message.reply_to {
        match timeline.get(target) {
            Some(original) => line.push_str(&format!(
                "[re #{target}: {}] ",
                original.preview()
            )),
            None => line.push_str(&format!("[reply to #{target}] ")),
        }
    }
    if let Some(media) = message.media() {
        line.push_str(&format!("[📎 {}] ", media.kind.label()));
    }
    if let Some(text) = message.text.as_deref() {
        line.push_str(text);
    }
    if message.edited {
        line.push_str(" (edited)");
    }
    if !message.reactions.is_empty() {
        let reactions = message
            .reactions
            .iter()
            .map(|(who, emoji)| {
                if who == OWN_REACTOR {
                    format!("{emoji} (you)")
                } else {
                    emoji.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        line.push_str(&format!("  {{{reactions}}}"));
    }
    line.trim_end().to_owned()
}

pub fn edit_history(msg_id: i64, entries: &[EditHistoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![format!("#{msg_id} has no edit history")];
    }
    let mut lines = vec![format!("Edit history of #{msg_id}:")];
    lines.extend(entries.iter().map(|entry| {
        format!(
            "  {}  {}",
            entry.edited_at.as_deref().unwrap_or("?"),
            entry.text.as_deref().unwrap_or("(no text)")
        )
    }));
    lines
}

pub fn group_info(info: &GroupInfo) -> Vec<String> {
    let mut lines = vec![format!("Members: {}", info.member_count)];
    if !info.admins.is_empty() {
        let admins = info.admins.iter().map(admin_label).collect::<Vec<_>>();
        lines.push(format!("Admins: {}", admins.join(", ")));
    }
    if !info.active_members.is_empty() {
        let active = info
            .active_members
            .iter()
            .map(|member| format!("{} ({})", member.name, member.id))
            .collect::<Vec<_>>();
        lines.push(format!("Recently active: {}", active.join(", ")));
    }
    lines
}

fn admin_label(admin: &Value) -> String {
    match admin {
        Value::String(name) => name.clone(),
        Value::Object(fields) => fields
            .get("name")
            .or_else(|| fields.get("username"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| admin.to_string()),
        other => other.to_string(),
    }
}

pub fn push_status(status: PushStatus) -> Option<String> {
    match status.state {
        PushConnectionState::Connected => Some("* live updates connected".to_owned()),
        PushConnectionState::WaitingToReconnect => Some(format!(
            "* live updates lost, retrying in {} ms",
            status.retry_in_ms.unwrap_or_default()
        )),
        PushConnectionState::Stopped => Some("* live updates stopped".to_owned()),
        PushConnectionState::Idle | PushConnectionState::Connecting => None,
    }
}

pub fn notice(notice: &Notice) -> String {
    if notice.is_error() {
        format!("! {}", notice.text)
    } else {
        format!("* {}", notice.text)
    }
}
