//! Bridge between operator input, runtime events and the inbox session.
//!
//! The bridge owns the [`InboxSession`] and is driven by exactly one task, so
//! every input line and every runtime event is applied to completion before the
//! next one is looked at. Backend work leaves as [`ClientCommand`]s returned
//! from the `handle_*` methods; [`TerminalBridge::run`] forwards them to the
//! runtime.

use std::{io, sync::Arc};

use inbox_core::{
    ClientCommand, ClientEvent, ConversationId, InboxSession, MessageId, PushEvent, SessionEffect,
};
use inbox_http::InboxRuntimeHandle;
use inbox_platform::ClipboardSink;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{debug, info, warn};

use crate::{
    input::{HELP, InputCommand, parse_line},
    media_cache::MediaCache,
    render,
};

/// Whether the input loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct TerminalBridge<W: io::Write> {
    session: InboxSession,
    clipboard: Arc<dyn ClipboardSink>,
    media_cache: Option<MediaCache>,
    out: W,
    /// Conversation ids in the order of the last printed listing.
    listing: Vec<ConversationId>,
    /// Newest message already printed for the open conversation.
    last_printed: Option<MessageId>,
}

impl<W: io::Write> TerminalBridge<W> {
    pub fn new(
        session: InboxSession,
        clipboard: Arc<dyn ClipboardSink>,
        media_cache: Option<MediaCache>,
        out: W,
    ) -> Self {
        Self {
            session,
            clipboard,
            media_cache,
            out,
            listing: Vec::new(),
            last_printed: None,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &InboxSession {
        &self.session
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Commands that bring the client up.
    pub fn start(&mut self) -> Vec<ClientCommand> {
        let effects = self.session.start();
        self.apply_effects(effects)
    }

    /// Apply one input line.
    pub fn handle_line(&mut self, line: &str) -> io::Result<(Flow, Vec<ClientCommand>)> {
        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok((Flow::Continue, Vec::new())),
            Err(err) => {
                writeln!(self.out, "{err}")?;
                return Ok((Flow::Continue, Vec::new()));
            }
        };
        debug!(?command, "operator input");

        let effects = match command {
            InputCommand::Quit => return Ok((Flow::Quit, Vec::new())),
            InputCommand::Help => {
                writeln!(self.out, "{HELP}")?;
                Vec::new()
            }
            InputCommand::List => {
                self.print_directory()?;
                Vec::new()
            }
            InputCommand::Search(query) => {
                self.session.directory_mut().set_query(query);
                self.print_directory()?;
                Vec::new()
            }
            InputCommand::Open(target) => match self.resolve_conversation(target) {
                Some(id) => {
                    self.last_printed = None;
                    let effects = self.session.open_conversation(id);
                    if let Some(summary) = self.session.open_summary() {
                        writeln!(self.out, "== {} ==", summary.display_name())?;
                    }
                    effects
                }
                None => {
                    writeln!(self.out, "! No conversation {target}")?;
                    Vec::new()
                }
            },
            InputCommand::Close => {
                self.session.close_conversation();
                self.last_printed = None;
                Vec::new()
            }
            InputCommand::More => {
                let effects = self.session.load_older();
                if effects.is_empty()
                    && let Some(open) = self.session.open()
                    && !open.timeline().has_more()
                {
                    writeln!(self.out, "* Beginning of conversation")?;
                }
                effects
            }
            InputCommand::Reply(id) => {
                if self.session.set_reply(id) {
                    writeln!(self.out, "* Replying to #{id}")?;
                }
                Vec::new()
            }
            InputCommand::NoReply => {
                self.session.clear_reply();
                Vec::new()
            }
            InputCommand::Send(text) => self.session.compose_text(&text),
            InputCommand::Attach { path, caption } => {
                self.session.compose_attachment(path, &caption)
            }
            InputCommand::Select => {
                self.session.enter_selection();
                Vec::new()
            }
            InputCommand::Toggle(id) => {
                if self.session.toggle_selection(id) {
                    self.print_selection()?;
                }
                Vec::new()
            }
            InputCommand::Cancel => {
                self.session.exit_selection();
                Vec::new()
            }
            InputCommand::Delete { for_everyone } => self.session.delete_selected(for_everyone),
            InputCommand::Copy => self.session.copy_selected(),
            InputCommand::Forward(targets) => self.session.forward_selected(&targets),
            InputCommand::React { id, emoji } => self.session.react(id, &emoji),
            InputCommand::Unreact(id) => self.session.unreact(id),
            InputCommand::Edit { id, text } => self.session.edit(id, &text),
            InputCommand::History(id) => self.session.edit_history(id),
            InputCommand::Media(id) => match self.cached_media(id) {
                Some(path) => {
                    writeln!(self.out, "* #{id} cached at {}", path.display())?;
                    Vec::new()
                }
                None => self.session.fetch_media(id),
            },
            InputCommand::Pin(id) => self.session.pin(id),
            InputCommand::Unpin(id) => self.session.unpin(id),
            InputCommand::Block => self.session.block(),
            InputCommand::Unblock => self.session.unblock(),
            InputCommand::Ban(user) => self.session.ban(user),
            InputCommand::Unban(user) => self.session.unban(user),
            InputCommand::Leave => self.session.leave(),
            InputCommand::Info => self.session.group_info(),
        };

        let commands = self.apply_effects(effects);
        self.flush_notices()?;
        self.out.flush()?;
        Ok((Flow::Continue, commands))
    }

    /// Apply one runtime event.
    pub fn handle_event(&mut self, event: ClientEvent) -> io::Result<Vec<ClientCommand>> {
        match &event {
            ClientEvent::PushStatus(status) => {
                if let Some(line) = render::push_status(*status) {
                    writeln!(self.out, "{line}")?;
                }
            }
            ClientEvent::Push(push) => self.print_push_update(push)?,
            ClientEvent::BotInfoLoaded(info) => writeln!(self.out, "== {} ==", info.title())?,
            ClientEvent::GroupInfoLoaded { info, .. } => {
                for line in render::group_info(info) {
                    writeln!(self.out, "{line}")?;
                }
            }
            ClientEvent::EditHistoryLoaded {
                msg_id, entries, ..
            } => {
                for line in render::edit_history(*msg_id, entries) {
                    writeln!(self.out, "{line}")?;
                }
            }
            ClientEvent::MediaLoaded { media, .. } => match self.media_cache.as_mut() {
                Some(cache) => match cache.insert(media) {
                    Ok(path) => writeln!(self.out, "* Saved {}", path.display())?,
                    Err(err) => {
                        warn!(error = %err, "failed to cache media");
                        writeln!(self.out, "! Failed to save media: {err}")?;
                    }
                },
                None => writeln!(
                    self.out,
                    "* Downloaded {} bytes (no media cache)",
                    media.bytes.len()
                )?,
            },
            _ => {}
        }

        let effects = self.session.handle_event(event);
        let commands = self.apply_effects(effects);
        self.flush_notices()?;
        self.out.flush()?;
        Ok(commands)
    }

    /// Drive the bridge from stdin and the runtime until `/quit` or end of input.
    pub async fn run(mut self, handle: InboxRuntimeHandle) -> io::Result<()> {
        let mut events = handle.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let startup = self.start();
        submit(&handle, startup).await;
        writeln!(self.out, "Type /help for commands.")?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("input closed");
                        break;
                    };
                    let (flow, commands) = self.handle_line(&line)?;
                    submit(&handle, commands).await;
                    if flow == Flow::Quit {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        let commands = self.handle_event(event)?;
                        submit(&handle, commands).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event stream lagged; resynchronising");
                        let commands = self.resync();
                        submit(&handle, commands).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("runtime event stream closed");
                        break;
                    }
                },
            }
        }

        submit(&handle, vec![ClientCommand::Stop]).await;
        Ok(())
    }

    /// Reload directory and the open conversation after missed events.
    fn resync(&mut self) -> Vec<ClientCommand> {
        let mut effects = vec![self.session.refresh_directory()];
        if let Some(id) = self.session.open().map(|open| open.id()) {
            self.last_printed = None;
            effects.extend(self.session.open_conversation(id));
        }
        self.apply_effects(effects)
    }

    fn apply_effects(&mut self, effects: Vec<SessionEffect>) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        for effect in effects {
            match effect {
                SessionEffect::Command(command) => commands.push(command),
                SessionEffect::ScrollToBottom => {
                    if let Err(err) = self.print_new_tail() {
                        warn!(error = %err, "failed to print timeline");
                    }
                }
                SessionEffect::PreserveScrollAnchor { old_len, new_len } => {
                    if let Err(err) = self.print_prepended(new_len.saturating_sub(old_len)) {
                        warn!(error = %err, "failed to print older messages");
                    }
                }
                SessionEffect::CopyToClipboard(text) => match self.clipboard.set_text(&text) {
                    Ok(()) => debug!(chars = text.chars().count(), "copied selection"),
                    Err(err) => {
                        warn!(error = %err, "clipboard write failed");
                        let _ = writeln!(self.out, "! Copy failed: {err}");
                    }
                },
            }
        }
        commands
    }

    fn flush_notices(&mut self) -> io::Result<()> {
        for notice in self.session.take_notices() {
            writeln!(self.out, "{}", render::notice(&notice))?;
        }
        Ok(())
    }

    fn print_directory(&mut self) -> io::Result<()> {
        let rows = self
            .session
            .directory()
            .visible()
            .into_iter()
            .enumerate()
            .map(|(index, conversation)| {
                (conversation.id, render::directory_row(index + 1, conversation))
            })
            .collect::<Vec<_>>();
        if rows.is_empty() {
            writeln!(self.out, "* No conversations")?;
        }
        self.listing = rows.iter().map(|(id, _)| *id).collect();
        for (_, row) in rows {
            writeln!(self.out, "{row}")?;
        }
        Ok(())
    }

    fn print_selection(&mut self) -> io::Result<()> {
        let Some(open) = self.session.open() else {
            return Ok(());
        };
        let ids = open
            .selection()
            .ids()
            .into_iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>();
        writeln!(self.out, "* Selected: {}", ids.join(" "))
    }

    /// Print messages newer than the last printed one.
    fn print_new_tail(&mut self) -> io::Result<()> {
        let Some(open) = self.session.open() else {
            return Ok(());
        };
        let items = open.timeline().items();
        // The last printed row may have been deleted since; resume after its id.
        let start = match self.last_printed {
            Some(id) => items
                .iter()
                .position(|message| message.id == id)
                .map(|index| index + 1)
                .or_else(|| items.iter().position(|message| message.id > id))
                .unwrap_or(items.len()),
            None => 0,
        };
        for message in &items[start..] {
            writeln!(self.out, "{}", render::message_row(message, open.timeline()))?;
        }
        if let Some(newest) = items.last() {
            self.last_printed = Some(newest.id);
        }
        Ok(())
    }

    fn print_prepended(&mut self, count: usize) -> io::Result<()> {
        let Some(open) = self.session.open() else {
            return Ok(());
        };
        if count == 0 {
            return Ok(());
        }
        writeln!(self.out, "-- {count} older messages --")?;
        for message in open.timeline().items().iter().take(count) {
            writeln!(self.out, "{}", render::message_row(message, open.timeline()))?;
        }
        Ok(())
    }

    /// Echo in-place changes to the open conversation.
    fn print_push_update(&mut self, push: &PushEvent) -> io::Result<()> {
        let Some(open_id) = self.session.open().map(|open| open.id()) else {
            return Ok(());
        };
        if push.conversation_id() != Some(open_id) {
            return Ok(());
        }
        match push {
            PushEvent::MessagesDeleted { msg_ids, .. } => {
                let ids = msg_ids
                    .iter()
                    .map(|id| format!("#{id}"))
                    .collect::<Vec<_>>();
                writeln!(self.out, "* Deleted {}", ids.join(" "))
            }
            PushEvent::MessageEdited {
                msg_id,
                message: Some(message),
                ..
            } => {
                // Frames without text keep the stored text (usually a media caption).
                let text = message
                    .text
                    .as_deref()
                    .filter(|text| !text.is_empty())
                    .or_else(|| {
                        self.session
                            .open()
                            .and_then(|open| open.timeline().get(*msg_id))
                            .and_then(|stored| stored.text.as_deref())
                    })
                    .unwrap_or_default();
                writeln!(self.out, "* #{msg_id} edited: {text}")
            }
            PushEvent::ReactionUpdate {
                msg_id, reactions, ..
            } => {
                let emojis = reactions.values().cloned().collect::<Vec<_>>();
                writeln!(self.out, "* #{msg_id} reactions: {}", emojis.join(" "))
            }
            _ => Ok(()),
        }
    }

    fn resolve_conversation(&self, target: i64) -> Option<ConversationId> {
        let directory = self.session.directory();
        if directory.get(target).is_some() {
            return Some(target);
        }
        let row = usize::try_from(target).ok()?.checked_sub(1)?;
        self.listing.get(row).copied()
    }

    fn cached_media(&mut self, id: MessageId) -> Option<std::path::PathBuf> {
        let open = self.session.open()?;
        let conversation_id = open.id();
        let token = open.timeline().get(id)?.media_file.clone()?;
        self.media_cache.as_mut()?.get(conversation_id, &token)
    }
}

async fn submit(handle: &InboxRuntimeHandle, commands: Vec<ClientCommand>) {
    for command in commands {
        if let Err(err) = handle.send(command).await {
            warn!(error = %err, "failed to submit command");
        }
    }
}
