//! chat messages and the per-session conversation log.

use bevy::log::warn;
use bevy::prelude::Component;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// one chat message. fields are private: a message never changes after
/// it is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// ordered history of one chat session.
///
/// the core only ever appends; [`ConversationLog::clear`] is the one way to
/// shrink it and belongs to the ui (between turns, never mid-turn).
#[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
    pub fn len(&self) -> usize {
        self.messages.len()
    }
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// system instructions are added per request, never stored in the log.
impl FromIterator<Message> for ConversationLog {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let messages = iter
            .into_iter()
            .filter(|m| {
                let keep = m.role != Role::System;
                if !keep {
                    warn!(target: "bevy_chatbot", "dropping system message while seeding a conversation log");
                }
                keep
            })
            .collect();
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_in_chat_wire_shape() {
        let v = serde_json::to_value(Message::assistant("hey")).unwrap();
        assert_eq!(v, serde_json::json!({ "role": "assistant", "content": "hey" }));
    }

    #[test]
    fn log_keeps_insertion_order_until_cleared() {
        let mut log = ConversationLog::new();
        log.push(Message::user("a"));
        log.push(Message::assistant("b"));
        log.push(Message::user("c"));
        let contents: Vec<_> = log.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert_eq!(log.last(), Some(&Message::user("c")));

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.last(), None);
    }

    #[test]
    fn seeded_log_skips_system_messages() {
        let log: ConversationLog =
            [Message::user("u1"), Message::system("sneaky"), Message::assistant("a1")].into_iter().collect();
        assert_eq!(log.messages(), &[Message::user("u1"), Message::assistant("a1")]);

        let out = crate::assemble::assemble_with(log.messages(), "q", crate::style::StylePreset::Concise);
        let systems = out.iter().filter(|m| m.role() == Role::System).count();
        assert_eq!(systems, 1);
        assert_eq!(&out[1..3], log.messages());
    }
}
