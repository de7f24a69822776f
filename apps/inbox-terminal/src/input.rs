//! Operator input line parsing.

use std::{error::Error, fmt, path::PathBuf};

use inbox_core::{ConversationId, MessageId};

pub const HELP: &str = "\
Commands:
  <text>                    send text to the open conversation
  /list                     show conversations
  /search <query>           filter conversations (empty query clears)
  /open <row|id>            open a conversation
  /close                    close the open conversation
  /more                     load older messages
  /reply <id> | /noreply    set or clear the reply target
  /attach <path> [caption]  upload a file
  /select | /cancel         enter or leave selection mode
  /toggle <id>              toggle a message in the selection
  /delete | /delete-all     delete selected messages for me / for everyone
  /copy                     copy selected message text
  /forward <id>...          forward selected messages to conversations
  /react <id> <emoji>       react to a message
  /unreact <id>             remove your reaction
  /edit <id> <text>         edit one of your messages
  /history <id>             show edit history
  /media <id>               download a message attachment
  /pin <id> | /unpin <id>   pin or unpin in a group
  /block | /unblock         block or unblock the open direct conversation
  /ban <user> | /unban <user>
  /leave                    leave the open group
  /info                     show group info
  /help                     show this help
  /quit                     exit";

/// One parsed operator action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Send(String),
    List,
    Search(String),
    /// Row number from the last listing, or a conversation id.
    Open(i64),
    Close,
    More,
    Reply(MessageId),
    NoReply,
    Attach { path: PathBuf, caption: String },
    Select,
    Toggle(MessageId),
    Cancel,
    Delete { for_everyone: bool },
    Copy,
    Forward(Vec<ConversationId>),
    React { id: MessageId, emoji: String },
    Unreact(MessageId),
    Edit { id: MessageId, text: String },
    History(MessageId),
    Media(MessageId),
    Pin(MessageId),
    Unpin(MessageId),
    Block,
    Unblock,
    Ban(i64),
    Unban(i64),
    Leave,
    Info,
    Help,
    Quit,
}

/// Unparseable input, carrying the usage line to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError {
    pub usage: &'static str,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usage: {}", self.usage)
    }
}

impl Error for InputError {}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<InputCommand>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(InputCommand::Send(line.to_owned())));
    };

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let command = match name {
        "list" => InputCommand::List,
        "search" => InputCommand::Search(rest.to_owned()),
        "open" => InputCommand::Open(number(rest, "/open <row|id>")?),
        "close" => InputCommand::Close,
        "more" => InputCommand::More,
        "reply" => InputCommand::Reply(number(rest, "/reply <id>")?),
        "noreply" => InputCommand::NoReply,
        "attach" => {
            let usage = "/attach <path> [caption]";
            let (path, caption) = match rest.split_once(char::is_whitespace) {
                Some((path, caption)) => (path, caption.trim()),
                None => (rest, ""),
            };
            if path.is_empty() {
                return Err(InputError { usage });
            }
            InputCommand::Attach {
                path: PathBuf::from(path),
                caption: caption.to_owned(),
            }
        }
        "select" => InputCommand::Select,
        "toggle" => InputCommand::Toggle(number(rest, "/toggle <id>")?),
        "cancel" => InputCommand::Cancel,
        "delete" => InputCommand::Delete {
            for_everyone: false,
        },
        "delete-all" => InputCommand::Delete { for_everyone: true },
        "copy" => InputCommand::Copy,
        "forward" => {
            let usage = "/forward <id>...";
            let targets = rest
                .split_whitespace()
                .map(|token| token.parse::<ConversationId>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| InputError { usage })?;
            if targets.is_empty() {
                return Err(InputError { usage });
            }
            InputCommand::Forward(targets)
        }
        "react" => {
            let (id, emoji) = id_and_text(rest, "/react <id> <emoji>")?;
            InputCommand::React { id, emoji }
        }
        "unreact" => InputCommand::Unreact(number(rest, "/unreact <id>")?),
        "edit" => {
            let (id, text) = id_and_text(rest, "/edit <id> <text>")?;
            InputCommand::Edit { id, text }
        }
        "history" => InputCommand::History(number(rest, "/history <id>")?),
        "media" => InputCommand::Media(number(rest, "/media <id>")?),
        "pin" => InputCommand::Pin(number(rest, "/pin <id>")?),
        "unpin" => InputCommand::Unpin(number(rest, "/unpin <id>")?),
        "block" => InputCommand::Block,
        "unblock" => InputCommand::Unblock,
        "ban" => InputCommand::Ban(number(rest, "/ban <user>")?),
        "unban" => InputCommand::Unban(number(rest, "/unban <user>")?),
        "leave" => InputCommand::Leave,
        "info" => InputCommand::Info,
        "help" => InputCommand::Help,
        "quit" | "exit" => InputCommand::Quit,
        _ => return Err(InputError { usage: "/help" }),
    };
    Ok(Some(command))
}

fn number(raw: &str, usage: &'static str) -> Result<i64, InputError> {
    raw.parse::<i64>().map_err(|_| InputError { usage })
}

fn id_and_text(raw: &str, usage: &'static str) -> Result<(i64, String), InputError> {
    let (id, text) = raw
        .split_once(char::is_whitespace)
        .ok_or(InputError { usage })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(InputError { usage });
    }
    Ok((number(id, usage)?, text.to_owned()))
}
