//! minimal bevy chat window over bevy_chatbot.
//! - settings line: model, temperature, max tokens, assistant style.
//! - full conversation log, "Thinking..." while a turn is in flight.
//! - clear button (and F7) empties the log between turns.
//!
//! keys: enter send, F1 model, F2/F3 temperature -/+, F4/F5 max tokens -/+,
//! F6 style, F7 clear.
//!
//! env (native): GROQ_API_KEY (required), LLM_BASE_URL, LLM_BACKEND,
//! LLM_MODEL, CHAT_STYLE. on wasm the style comes from `?style=Teacher`.

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_chatbot::config::request_config_from_env;
use bevy_chatbot::{
    ChatCleared, ChatSession, ChatbotPlugin, ClearChat, ClientSettings, CompletionClient,
    CompletionClients, ConversationLog, LlmCompletionClient, RequestConfig, Role, StylePreset,
    TurnFailed, TurnStarted, TurnState, send_user_text,
};
use std::sync::Arc;

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct HistoryText;
#[derive(Component)]
struct StatusText;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct SettingsText;
#[derive(Component)]
struct BtnClear;

#[derive(Component, Copy, Clone)]
struct TargetSession(Entity);

#[derive(Resource, Default)]
struct PromptBuf(String);

/// the last thing worth telling the user that isn't part of the log.
#[derive(Resource, Default)]
struct Status {
    error: Option<String>,
}

/// startup problem (e.g. missing api key), shown instead of chatting.
#[derive(Resource, Default)]
struct ConfigProblem(Option<String>);

// ---------------------- startup config ----------------------

#[cfg(not(target_arch = "wasm32"))]
fn requested_style() -> Option<String> {
    std::env::var("CHAT_STYLE").ok()
}

#[cfg(target_arch = "wasm32")]
fn requested_style() -> Option<String> {
    let search = web_sys::window()?.location().search().ok()?;
    search
        .trim_start_matches('?')
        .split('&')
        .find_map(|kv| kv.strip_prefix("style="))
        .map(str::to_string)
}

fn initial_request_config() -> RequestConfig {
    let mut cfg = request_config_from_env();
    if let Some(key) = requested_style() {
        match key.parse::<StylePreset>() {
            Ok(style) => cfg.style = style,
            Err(err) => warn!(target: "chat", "{err}; keeping {}", cfg.style),
        }
    }
    cfg
}

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(PromptBuf::default())
        .insert_resource(Status::default())
        .insert_resource(ConfigProblem::default())
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "bevy chatbot".into(),
                fit_canvas_to_parent: true,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(ChatbotPlugin)
        .add_systems(Startup, (install_client, setup).chain())
        .add_systems(
            Update,
            (handle_text_input, handle_settings_keys, btn_clear).before(bevy_chatbot::ChatSet::Submit),
        )
        // event readers should run after bevy_chatbot emits events
        .add_systems(
            Update,
            (on_started, on_failed, on_cleared, refresh_history, refresh_settings, refresh_status, refresh_prompt)
                .chain()
                .after(bevy_chatbot::ChatSet::Drain),
        )
        .run();
}

fn install_client(mut commands: Commands, mut problem: ResMut<ConfigProblem>) {
    match ClientSettings::from_env() {
        Ok(settings) => {
            info!(target: "chat", "installing client: backend={:?} base_url={:?}", settings.backend, settings.base_url);
            let client: Arc<dyn CompletionClient> = Arc::new(LlmCompletionClient::from_settings(&settings));
            commands.insert_resource(CompletionClients::new(client));
        }
        Err(err) => {
            error!(target: "chat", "{err}");
            problem.0 = Some(err.to_string());
        }
    }
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);

    let session = commands.spawn((ChatSession::default(), initial_request_config())).id();

    let style_18 = TextFont { font_size: 18.0, ..default() };
    let style_14 = TextFont { font_size: 14.0, ..default() };

    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // --- settings bar ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_direction: FlexDirection::Row,
                    column_gap: Val::Px(12.0),
                    align_items: AlignItems::Center,
                    padding: UiRect::all(Val::Px(8.0)),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
            ))
            .with_children(|row| {
                row.spawn((Text::new(""), style_14.clone(), TextColor(Color::WHITE), SettingsText, TargetSession(session)));
                row.spawn((
                    Button,
                    Node {
                        width: Val::Px(110.0),
                        height: Val::Px(28.0),
                        align_items: AlignItems::Center,
                        justify_content: JustifyContent::Center,
                        ..default()
                    },
                    BackgroundColor(Color::srgb(0.2, 0.2, 0.25)),
                    BtnClear,
                    TargetSession(session),
                ))
                .with_children(|b| {
                    b.spawn((Text::new("clear chat"), style_14.clone(), TextColor(Color::WHITE)));
                });
            });

            // --- conversation ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_grow: 1.0,
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(8.0),
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    overflow: Overflow::clip(),
                    ..default()
                },
                BackgroundColor(Color::NONE),
            ))
            .with_children(|c| {
                c.spawn((Text::new(""), style_18.clone(), TextColor(Color::WHITE), HistoryText, TargetSession(session)));
                c.spawn((
                    Text::new(""),
                    style_18.clone(),
                    TextColor(Color::srgb_u8(200, 200, 200)),
                    StatusText,
                    TargetSession(session),
                ));
            });

            p.spawn((Text::new("> "), style_18.clone(), TextColor(Color::WHITE), PromptText, TargetSession(session)));
        });
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut prompt: ResMut<PromptBuf>,
    problem: Res<ConfigProblem>,
    q_target: Query<&TargetSession, With<PromptText>>,
    q_state: Query<&TurnState>,
) {
    for ev in ev_kbd.read() {
        if ev.state.is_pressed() {
            if let Some(txt) = &ev.text {
                let s: String = txt.chars().filter(|c| !c.is_control()).collect();
                prompt.0.push_str(&s);
            }
        }
    }
    if keys.just_pressed(KeyCode::Backspace) {
        prompt.0.pop();
    }

    if !keys.just_pressed(KeyCode::Enter) || prompt.0.is_empty() || problem.0.is_some() {
        return;
    }
    let Ok(TargetSession(e)) = q_target.single() else {
        return;
    };
    // input is disabled while a reply is pending
    if q_state.get(*e).is_ok_and(|s| s.is_busy()) {
        return;
    }
    let msg = std::mem::take(&mut prompt.0);
    send_user_text(&mut commands, *e, msg);
}

fn handle_settings_keys(
    keys: Res<ButtonInput<KeyCode>>,
    mut ev_clear: EventWriter<ClearChat>,
    mut q: Query<(Entity, &mut RequestConfig)>,
) {
    for (e, mut cfg) in &mut q {
        if keys.just_pressed(KeyCode::F1) {
            cfg.cycle_model();
        }
        if keys.just_pressed(KeyCode::F2) {
            cfg.step_temperature(-1);
        }
        if keys.just_pressed(KeyCode::F3) {
            cfg.step_temperature(1);
        }
        if keys.just_pressed(KeyCode::F4) {
            cfg.step_max_tokens(-1);
        }
        if keys.just_pressed(KeyCode::F5) {
            cfg.step_max_tokens(1);
        }
        if keys.just_pressed(KeyCode::F6) {
            cfg.style = cfg.style.next();
            info!(target: "chat", "style -> {}", cfg.style);
        }
        if keys.just_pressed(KeyCode::F7) {
            ev_clear.write(ClearChat { entity: e });
        }
    }
}

fn btn_clear(
    mut q: Query<(&Interaction, &TargetSession, &mut BackgroundColor), (Changed<Interaction>, With<BtnClear>)>,
    mut ev_clear: EventWriter<ClearChat>,
) {
    for (i, TargetSession(e), mut bg) in &mut q {
        match *i {
            Interaction::Pressed => {
                bg.0 = Color::srgb(0.3, 0.3, 0.35);
                ev_clear.write(ClearChat { entity: *e });
            }
            Interaction::Hovered => bg.0 = Color::srgb(0.25, 0.25, 0.3),
            Interaction::None => bg.0 = Color::srgb(0.2, 0.2, 0.25),
        }
    }
}

// ---------------------- chat events ----------------------

fn on_started(mut ev: EventReader<TurnStarted>, mut status: ResMut<Status>) {
    for TurnStarted { entity, .. } in ev.read() {
        debug!(target: "chat", "turn started for {:?}", entity);
        status.error = None;
    }
}

fn on_failed(mut ev: EventReader<TurnFailed>, mut status: ResMut<Status>) {
    for TurnFailed { entity, error } in ev.read() {
        error!(target: "chat", "chat error (entity={:?}): {}", entity, error);
        status.error = Some(error.clone());
    }
}

fn on_cleared(mut ev: EventReader<ChatCleared>, mut status: ResMut<Status>) {
    for _ in ev.read() {
        status.error = None;
    }
}

// ---------------------- text refresh ----------------------

fn refresh_history(
    q_log: Query<&ConversationLog, Changed<ConversationLog>>,
    mut q_text: Query<(&TargetSession, &mut Text), With<HistoryText>>,
) {
    for (TargetSession(e), mut text) in &mut q_text {
        let Ok(log) = q_log.get(*e) else { continue };
        let mut out = String::new();
        for m in log {
            let who = match m.role() {
                Role::User => "you",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            out.push_str(who);
            out.push_str(": ");
            out.push_str(m.content());
            out.push_str("\n\n");
        }
        text.0 = out;
    }
}

fn refresh_settings(
    q_cfg: Query<&RequestConfig, Changed<RequestConfig>>,
    mut q_text: Query<(&TargetSession, &mut Text), With<SettingsText>>,
) {
    for (TargetSession(e), mut text) in &mut q_text {
        if let Ok(cfg) = q_cfg.get(*e) {
            text.0 = format!(
                "model: {}   temperature: {:.2}   max tokens: {}   style: {}",
                cfg.model, cfg.temperature, cfg.max_tokens, cfg.style
            );
        }
    }
}

fn refresh_status(
    status: Res<Status>,
    problem: Res<ConfigProblem>,
    q_state: Query<&TurnState>,
    mut q_text: Query<(&TargetSession, &mut Text), With<StatusText>>,
) {
    for (TargetSession(e), mut text) in &mut q_text {
        let line = if let Some(p) = &problem.0 {
            format!("ERROR: {p}")
        } else if q_state.get(*e).is_ok_and(|s| s.is_busy()) {
            "Thinking...".to_string()
        } else if let Some(err) = &status.error {
            format!("Something went wrong. Please try again.\n{err}")
        } else {
            String::new()
        };
        if text.0 != line {
            text.0 = line;
        }
    }
}

fn refresh_prompt(
    prompt: Res<PromptBuf>,
    q_state: Query<&TurnState>,
    mut q_prompt: Query<(&TargetSession, &mut Text), With<PromptText>>,
) {
    for (TargetSession(e), mut t) in &mut q_prompt {
        let caret = if q_state.get(*e).is_ok_and(|s| s.is_busy()) { "" } else { " |" };
        let line = format!("> {}{}", prompt.0, caret);
        if t.0 != line {
            t.0 = line;
        }
    }
}
