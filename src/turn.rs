//! the turn controller: one user message in, one assistant message (or a
//! failure) out.
//!
//! `Idle -> Sending -> {Completed, Failed} -> Idle`. the phases are exposed
//! separately ([`PendingTurn::begin`], [`PendingTurn::dispatch`],
//! [`finish_turn`]) so a host can render the user line before the network
//! call and run the call off its main thread; [`handle_turn`] runs all three
//! in order.

use crate::assemble::assemble_with;
use crate::client::{CompletionClient, CompletionError};
use crate::config::RequestConfig;
use crate::message::{ConversationLog, Message};
use bevy::log::{debug, warn};
use bevy::prelude::Component;

/// whether a session has a request in flight. new input is ignored while
/// `Sending`.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
}

impl TurnState {
    pub fn is_busy(self) -> bool {
        matches!(self, TurnState::Sending)
    }
}

/// how a turn ended. `Failed` carries a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(String),
    Failed(String),
}

/// a turn whose user message is already in the log and whose request is
/// assembled, waiting to be sent.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<Message>,
}

impl PendingTurn {
    /// append the user message and assemble the outbound request from the
    /// log as it was before that append.
    pub fn begin(log: &mut ConversationLog, user_text: impl Into<String>, config: &RequestConfig) -> Self {
        let user_text = user_text.into();
        let prior = log.len();
        log.push(Message::user(user_text.clone()));

        let messages = assemble_with(&log.messages()[..prior], &user_text, config.style);
        debug!(target: "bevy_chatbot",
            "turn begin: style={} prior={} outbound={}",
            config.style, prior, messages.len()
        );
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            messages,
        }
    }

    /// the exact list that will be sent.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// make the one outbound call. no retries.
    pub async fn dispatch(&self, client: &dyn CompletionClient) -> Result<String, CompletionError> {
        client
            .complete(&self.model, &self.messages, self.temperature, self.max_tokens)
            .await
    }
}

/// record the result of a dispatched turn. the assistant text is stored
/// verbatim; a failure leaves the log untouched (the user message stays).
pub fn finish_turn(log: &mut ConversationLog, result: Result<String, CompletionError>) -> TurnOutcome {
    match result {
        Ok(text) => {
            log.push(Message::assistant(text.clone()));
            TurnOutcome::Completed(text)
        }
        Err(err) => {
            warn!(target: "bevy_chatbot", "turn failed: {err}");
            TurnOutcome::Failed(err.to_string())
        }
    }
}

/// run a whole turn against `log`.
pub async fn handle_turn(
    log: &mut ConversationLog,
    user_text: impl Into<String>,
    config: &RequestConfig,
    client: &dyn CompletionClient,
) -> TurnOutcome {
    let pending = PendingTurn::begin(log, user_text, config);
    let result = pending.dispatch(client).await;
    finish_turn(log, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeClient;
    use crate::message::Role;
    use crate::style::StylePreset;
    use pretty_assertions::assert_eq;

    fn concise() -> RequestConfig {
        RequestConfig { style: StylePreset::Concise, ..Default::default() }
    }

    fn seeded(n: usize) -> ConversationLog {
        (1..=n)
            .map(|i| {
                if i % 2 == 1 {
                    Message::user(format!("u{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[test]
    fn success_appends_user_then_verbatim_assistant() {
        let client = FakeClient::replying([Ok("  Hello!\n".to_string())]);
        let mut log = seeded(4);

        let outcome = pollster::block_on(handle_turn(&mut log, "Hi", &concise(), &client));

        assert_eq!(outcome, TurnOutcome::Completed("  Hello!\n".into()));
        assert_eq!(log.len(), 6);
        assert_eq!(log.messages()[4], Message::user("Hi"));
        assert_eq!(log.messages()[5], Message::assistant("  Hello!\n"));
    }

    #[test]
    fn failure_keeps_the_user_message_only() {
        let client = FakeClient::replying([Err(CompletionError::Provider("connection reset".into()))]);
        let mut log = seeded(3);

        let outcome = pollster::block_on(handle_turn(&mut log, "still there?", &concise(), &client));

        match outcome {
            TurnOutcome::Failed(desc) => assert!(desc.contains("connection reset")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(log.len(), 4);
        assert_eq!(log.last(), Some(&Message::user("still there?")));
    }

    #[test]
    fn empty_log_sends_system_and_user_only() {
        let client = FakeClient::replying([Ok("hey".to_string())]);
        let mut log = ConversationLog::new();
        let cfg = RequestConfig { temperature: 0.3, max_tokens: 128, ..concise() };

        pollster::block_on(handle_turn(&mut log, "Hi", &cfg, &client));

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].messages,
            vec![Message::system(StylePreset::Concise.instruction()), Message::user("Hi")]
        );
        assert_eq!(calls[0].model, cfg.model);
        assert_eq!(calls[0].temperature, 0.3);
        assert_eq!(calls[0].max_tokens, 128);
    }

    #[test]
    fn new_user_message_is_sent_exactly_once() {
        let client = FakeClient::replying([Ok("ok".to_string())]);
        let mut log = seeded(15);

        pollster::block_on(handle_turn(&mut log, "continue", &concise(), &client));

        let sent = &client.calls()[0].messages;
        assert_eq!(sent.len(), 14);
        assert_eq!(sent.iter().filter(|m| m.content() == "continue").count(), 1);
        assert_eq!(&sent[1..13], &seeded(15).messages()[3..15]);
    }

    #[tokio::test]
    async fn a_failed_turn_still_counts_as_context() {
        let client = FakeClient::replying([
            Err(CompletionError::Provider("timeout".into())),
            Ok("answer".to_string()),
        ]);
        let mut log = ConversationLog::new();

        handle_turn(&mut log, "first", &concise(), &client).await;
        handle_turn(&mut log, "second", &concise(), &client).await;

        let second = &client.calls()[1].messages;
        let roles: Vec<_> = second.iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::User]);
        assert_eq!(second[1].content(), "first");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn clearing_resets_to_the_empty_log_request() {
        let client = FakeClient::replying([Ok("one".to_string()), Ok("two".to_string())]);
        let mut log = ConversationLog::new();
        pollster::block_on(handle_turn(&mut log, "before", &concise(), &client));

        log.clear();
        pollster::block_on(handle_turn(&mut log, "Hi", &concise(), &client));

        assert_eq!(
            client.calls()[1].messages,
            vec![Message::system(StylePreset::Concise.instruction()), Message::user("Hi")]
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn begin_appends_before_anything_is_sent() {
        let mut log = ConversationLog::new();
        let pending = PendingTurn::begin(&mut log, "typed", &concise());
        assert_eq!(log.messages(), &[Message::user("typed")]);
        assert_eq!(pending.messages().len(), 2);
        assert_eq!(pending.model(), concise().model);
    }
}
