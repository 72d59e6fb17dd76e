//! bevy_chatbot: a windowed-history chat core with a thin bevy plugin on top.
//!
//! - every request is `[style instruction] + last 12 messages + [new user
//!   message]` (see [`assemble`]).
//! - one turn per session at a time: the user line lands in the log right
//!   away, the completion runs off-thread, the assistant line (or an error)
//!   lands when it returns (see [`turn`]).
//! - never blocks the main thread: on native we spawn onto a tiny tokio
//!   runtime; on wasm we use bevy's async pool, which yields to the browser.
//!
//! the session entity carries its own [`ConversationLog`], [`RequestConfig`]
//! and [`TurnState`]; the ui reads those and the events below.

pub mod assemble;
pub mod client;
pub mod config;
pub mod message;
pub mod style;
pub mod turn;

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::Arc;

pub use assemble::{HISTORY_WINDOW, assemble, assemble_windowed, assemble_with};
pub use client::{CompletionClient, CompletionError, LlmCompletionClient};
pub use config::{ClientSettings, ConfigError, RequestConfig};
pub use message::{ConversationLog, Message, Role};
pub use style::{StylePreset, UnknownStyleError};
pub use turn::{PendingTurn, TurnOutcome, TurnState, finish_turn, handle_turn};

/// re-export the llm backend selector so apps can build clients without a
/// direct `llm` dependency.
pub use llm::builder::LLMBackend;

/// the completion clients sessions can talk to.
///
/// - `default`: used when a `ChatSession` doesn't specify a `key`
/// - `per_key`: named clients if you want multiple backends
#[derive(Resource, Clone)]
pub struct CompletionClients {
    pub default: Arc<dyn CompletionClient>,
    pub per_key: HashMap<String, Arc<dyn CompletionClient>>,
}

impl CompletionClients {
    pub fn new(default: Arc<dyn CompletionClient>) -> Self {
        Self { default, per_key: HashMap::new() }
    }
    pub fn with(mut self, key: impl Into<String>, client: Arc<dyn CompletionClient>) -> Self {
        self.per_key.insert(key.into(), client);
        self
    }
    fn get(&self, key: Option<&String>) -> Arc<dyn CompletionClient> {
        key.and_then(|k| self.per_key.get(k))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// on native we keep a tiny tokio runtime to drive completion futures.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_chatbot", "ChatbotPlugin: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// clears and new turns are applied here
    Submit,
    /// Turn*/ChatCleared events are emitted here (in `Update`)
    Drain,
}

/// attach this to an entity you want to chat with. pulls in an empty log,
/// the default request config and an idle turn state.
#[derive(Component, Clone, Debug, Default)]
#[require(ConversationLog, RequestConfig, TurnState)]
pub struct ChatSession {
    /// optional key to pick a client from `CompletionClients::per_key`.
    pub key: Option<String>,
}

/// insert this component to submit a user message on a session entity.
#[derive(Component, Clone, Debug)]
pub struct ChatRequest {
    pub text: String,
}

/// helper to submit a user message on a session entity.
pub fn send_user_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    debug!(target: "bevy_chatbot", "send_user_text (len={})", text.len());
    commands.entity(target).insert(ChatRequest { text });
}

/// ask the plugin to empty a session's log. refused while a turn is in flight.
#[derive(Event, Debug, Clone, Copy)]
pub struct ClearChat {
    pub entity: Entity,
}

/// the user message is in the log and the request is on its way.
#[derive(Event, Debug)]
pub struct TurnStarted {
    pub entity: Entity,
    pub user_text: String,
}
#[derive(Event, Debug)]
pub struct TurnCompleted {
    pub entity: Entity,
    pub text: String,
}
#[derive(Event, Debug)]
pub struct TurnFailed {
    pub entity: Entity,
    pub error: String,
}
#[derive(Event, Debug)]
pub struct ChatCleared {
    pub entity: Entity,
}

/// cross-thread inbox for turn results; workers send, main thread drains.
#[derive(Resource, Clone)]
struct TurnInbox {
    tx: Sender<TurnMsg>,
    rx: Receiver<TurnMsg>,
}

impl Default for TurnInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

#[derive(Debug)]
pub enum TurnMsg {
    Done { entity: Entity, result: Result<String, CompletionError> },
}

/// send to inbox (warn when disconnected)
fn push_inbox(tx: &Sender<TurnMsg>, msg: TurnMsg) {
    if tx.send(msg).is_err() {
        warn!(target: "bevy_chatbot", "turn inbox closed; dropping result");
    }
}

/// bevy plugin: wires systems, events, resources.
/// requires a `CompletionClients` resource before the first request is sent.
/// on native, also inserts a tiny tokio runtime resource by default.
pub struct ChatbotPlugin;

impl Plugin for ChatbotPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_chatbot", "ChatbotPlugin: build()");
        app.init_resource::<TurnInbox>()
            .add_event::<ClearChat>()
            .add_event::<TurnStarted>()
            .add_event::<TurnCompleted>()
            .add_event::<TurnFailed>()
            .add_event::<ChatCleared>()
            .configure_sets(Update, (ChatSet::Submit, ChatSet::Drain).chain())
            .add_systems(
                Update,
                (apply_clear_requests, spawn_turns).chain().in_set(ChatSet::Submit),
            )
            .add_systems(Update, drain_turn_inbox.in_set(ChatSet::Drain));

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

fn apply_clear_requests(
    mut ev_clear: EventReader<ClearChat>,
    mut q: Query<(&mut ConversationLog, &TurnState)>,
    mut ev_cleared: EventWriter<ChatCleared>,
) {
    for ClearChat { entity } in ev_clear.read() {
        let Ok((mut log, state)) = q.get_mut(*entity) else {
            warn!(target: "bevy_chatbot", "clear for unknown session {:?}", entity);
            continue;
        };
        if state.is_busy() {
            warn!(target: "bevy_chatbot", "clear ignored: session {:?} is waiting on a reply", entity);
            continue;
        }
        info!(target: "bevy_chatbot", "clearing session {:?} ({} messages)", entity, log.len());
        log.clear();
        ev_cleared.write(ChatCleared { entity: *entity });
    }
}

/// starts a turn for every pending request: user message into the log on
/// this frame, completion off-thread.
fn spawn_turns(
    mut commands: Commands,
    registry: Option<Res<CompletionClients>>,
    inbox: Res<TurnInbox>,
    mut q: Query<(Entity, &ChatSession, &ChatRequest, &RequestConfig, &mut ConversationLog, &mut TurnState)>,
    mut ev_start: EventWriter<TurnStarted>,
    mut ev_failed: EventWriter<TurnFailed>,

    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, session, req, config, mut log, mut state) in q.iter_mut() {
        // one-shot marker removal
        commands.entity(e).remove::<ChatRequest>();

        if state.is_busy() {
            warn!(target: "bevy_chatbot", "request ignored: session {:?} is already sending", e);
            continue;
        }

        let pending = PendingTurn::begin(&mut log, req.text.clone(), config);
        ev_start.write(TurnStarted { entity: e, user_text: req.text.clone() });

        let Some(clients) = registry.as_ref() else {
            error!(target: "bevy_chatbot", "no CompletionClients resource; failing turn for {:?}", e);
            let outcome = finish_turn(
                &mut log,
                Err(CompletionError::Worker("no completion client configured".into())),
            );
            if let TurnOutcome::Failed(error) = outcome {
                ev_failed.write(TurnFailed { entity: e, error });
            }
            continue;
        };

        *state = TurnState::Sending;
        let client = clients.get(session.key.as_ref());
        let inbox_tx = inbox.tx.clone();
        #[cfg(not(target_arch = "wasm32"))]
        let panic_tx = inbox.tx.clone();
        info!(target: "bevy_chatbot",
            "turn started: entity={:?} model={} style={} outbound={} log={}",
            e, pending.model(), config.style, pending.messages().len(), log.len()
        );

        let pool = AsyncComputeTaskPool::get();
        #[cfg(not(target_arch = "wasm32"))]
        let rt = rt.0.clone();

        pool.spawn(async move {
            let run = async move {
                let result = pending.dispatch(client.as_ref()).await;
                match &result {
                    Ok(text) => info!(target: "bevy_chatbot", "completion returned: len={}", text.len()),
                    Err(err) => error!(target: "bevy_chatbot", "completion error: {}", err),
                }
                push_inbox(&inbox_tx, TurnMsg::Done { entity: e, result });
            };

            #[cfg(target_arch = "wasm32")]
            {
                run.await;
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                // native: hand off to tokio so bevy pools stay free.
                // a panicked worker must still release the session.
                if let Err(join_err) = rt.spawn(run).await {
                    push_inbox(&panic_tx, TurnMsg::Done {
                        entity: e,
                        result: Err(CompletionError::Worker(join_err.to_string())),
                    });
                }
            }
        })
        .detach();
    }
}

/// drains the inbox, finishes turns and emits user-facing events.
fn drain_turn_inbox(
    inbox: Res<TurnInbox>,
    mut q: Query<(&mut ConversationLog, &mut TurnState)>,
    mut ev_done: EventWriter<TurnCompleted>,
    mut ev_failed: EventWriter<TurnFailed>,
) {
    // drain up to a cap per frame to avoid long frames on bursts
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        };
        let TurnMsg::Done { entity, result } = msg;

        let Ok((mut log, mut state)) = q.get_mut(entity) else {
            warn!(target: "bevy_chatbot", "dropping turn result for despawned session {:?}", entity);
            continue;
        };
        match finish_turn(&mut log, result) {
            TurnOutcome::Completed(text) => {
                debug!(target: "bevy_chatbot", "turn completed: entity={:?} log={}", entity, log.len());
                ev_done.write(TurnCompleted { entity, text });
            }
            TurnOutcome::Failed(error) => {
                ev_failed.write(TurnFailed { entity, error });
            }
        }
        *state = TurnState::Idle;
    }
}
