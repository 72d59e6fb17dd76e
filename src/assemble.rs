//! history windowing + prompt assembly.
//!
//! the outbound list is always `[system] + window + [user]`, where the
//! window is the newest [`HISTORY_WINDOW`] entries of the prior log in their
//! original order. a fixed message count keeps payloads bounded without any
//! tokenizer.

use crate::message::Message;
use crate::style::{StylePreset, UnknownStyleError};

/// how many prior messages (user + assistant) ride along with each request.
pub const HISTORY_WINDOW: usize = 12;

/// assemble the request for `new_user_text`, resolving `style_key` first.
pub fn assemble(
    prior_log: &[Message],
    new_user_text: &str,
    style_key: &str,
) -> Result<Vec<Message>, UnknownStyleError> {
    let style: StylePreset = style_key.parse()?;
    Ok(assemble_with(prior_log, new_user_text, style))
}

/// [`assemble`] for an already-resolved style.
pub fn assemble_with(prior_log: &[Message], new_user_text: &str, style: StylePreset) -> Vec<Message> {
    assemble_windowed(prior_log, new_user_text, style, HISTORY_WINDOW)
}

pub fn assemble_windowed(
    prior_log: &[Message],
    new_user_text: &str,
    style: StylePreset,
    window: usize,
) -> Vec<Message> {
    let start = prior_log.len().saturating_sub(window);
    let windowed = &prior_log[start..];

    let mut out = Vec::with_capacity(windowed.len() + 2);
    out.push(Message::system(style.instruction()));
    out.extend_from_slice(windowed);
    out.push(Message::user(new_user_text));
    out
}
