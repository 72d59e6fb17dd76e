//! per-turn request settings, the value ranges a ui offers for them, and the
//! startup client settings read from the environment.

use crate::style::StylePreset;
use bevy::prelude::Component;
use llm::builder::LLMBackend;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// models the settings panel may offer.
pub const MODEL_ALLOW_LIST: &[&str] = &["openai/gpt-oss-120b"];

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const TEMPERATURE_STEP: f32 = 0.05;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 64..=2048;
pub const MAX_TOKENS_STEP: u32 = 64;

pub const API_KEY_ENV: &str = "GROQ_API_KEY";
pub const BASE_URL_ENV: &str = "LLM_BASE_URL";
pub const BACKEND_ENV: &str = "LLM_BACKEND";
pub const MODEL_ENV: &str = "LLM_MODEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API key not found. Set GROQ_API_KEY in the environment.")]
    MissingApiKey,
    #[error("unknown llm backend '{0}'")]
    UnknownBackend(String),
    #[error("invalid request config: {0}")]
    InvalidRequestConfig(#[from] serde_json::Error),
}

/// what the ui hands the core for each turn. only `style` is checked (by
/// its type); the numeric fields are the ui's job to keep in range.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub style: StylePreset,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: MODEL_ALLOW_LIST[0].to_string(),
            temperature: 0.7,
            max_tokens: 512,
            style: StylePreset::Professional,
        }
    }
}

impl RequestConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// move temperature by `steps` slider notches, clamped to range.
    pub fn step_temperature(&mut self, steps: i32) {
        let t = self.temperature + steps as f32 * TEMPERATURE_STEP;
        // snap to the slider grid so repeated steps don't drift
        let t = (t / TEMPERATURE_STEP).round() * TEMPERATURE_STEP;
        self.temperature = t.clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end());
    }

    /// move max_tokens by `steps` slider notches, clamped to range.
    pub fn step_max_tokens(&mut self, steps: i32) {
        let lo = *MAX_TOKENS_RANGE.start() as i64;
        let hi = *MAX_TOKENS_RANGE.end() as i64;
        let v = self.max_tokens as i64 + steps as i64 * MAX_TOKENS_STEP as i64;
        self.max_tokens = v.clamp(lo, hi) as u32;
    }

    /// pick the next allow-listed model, wrapping around.
    pub fn cycle_model(&mut self) {
        let idx = MODEL_ALLOW_LIST
            .iter()
            .position(|m| *m == self.model)
            .map_or(0, |i| (i + 1) % MODEL_ALLOW_LIST.len());
        self.model = MODEL_ALLOW_LIST[idx].to_string();
    }
}

/// provider connection settings, resolved once at startup.
#[derive(Clone)]
pub struct ClientSettings {
    pub backend: LLMBackend,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("backend", &self.backend)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ClientSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// resolve settings through `lookup` (env var name -> value); blank
    /// values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(API_KEY_ENV).ok_or(ConfigError::MissingApiKey)?;
        let backend = match get(BACKEND_ENV) {
            Some(name) => name
                .parse::<LLMBackend>()
                .map_err(|_| ConfigError::UnknownBackend(name))?,
            None => LLMBackend::Groq,
        };
        Ok(Self { backend, api_key, base_url: get(BASE_URL_ENV) })
    }
}

/// the initial request config, honoring `LLM_MODEL` when it is allow-listed.
pub fn request_config_from_env() -> RequestConfig {
    let mut cfg = RequestConfig::default();
    if let Ok(model) = std::env::var(MODEL_ENV) {
        if MODEL_ALLOW_LIST.contains(&model.as_str()) {
            cfg.model = model;
        } else {
            bevy::log::warn!(target: "bevy_chatbot", "{MODEL_ENV}='{model}' is not allow-listed; using '{}'", cfg.model);
        }
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_the_settings_panel() {
        let cfg = RequestConfig::default();
        assert_eq!(cfg.model, "openai/gpt-oss-120b");
        assert_eq!(cfg.temperature, 0.7);
        assert_eq!(cfg.max_tokens, 512);
        assert_eq!(cfg.style, StylePreset::Professional);
    }

    #[test]
    fn json_config_fills_missing_fields_and_rejects_unknown_styles() {
        let cfg = RequestConfig::from_json(r#"{ "style": "Teacher", "max_tokens": 1024 }"#).unwrap();
        assert_eq!(cfg.style, StylePreset::Teacher);
        assert_eq!(cfg.max_tokens, 1024);
        assert_eq!(cfg.model, MODEL_ALLOW_LIST[0]);

        let err = RequestConfig::from_json(r#"{ "style": "Poet" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRequestConfig(_)));
        assert!(err.to_string().contains("Poet"));
    }

    #[test]
    fn stepping_stays_on_grid_and_in_range() {
        let mut cfg = RequestConfig::default();
        cfg.step_temperature(1);
        assert!((cfg.temperature - 0.75).abs() < 1e-6);
        cfg.step_temperature(100);
        assert_eq!(cfg.temperature, 1.0);
        cfg.step_temperature(-100);
        assert_eq!(cfg.temperature, 0.0);

        cfg.step_max_tokens(-1);
        assert_eq!(cfg.max_tokens, 448);
        cfg.step_max_tokens(2);
        assert_eq!(cfg.max_tokens, 576);
        cfg.step_max_tokens(1000);
        assert_eq!(cfg.max_tokens, 2048);
        cfg.step_max_tokens(-1000);
        assert_eq!(cfg.max_tokens, 64);
    }

    #[test]
    fn cycle_model_stays_in_allow_list() {
        let mut cfg = RequestConfig { model: "not-a-model".into(), ..Default::default() };
        cfg.cycle_model();
        assert!(MODEL_ALLOW_LIST.contains(&cfg.model.as_str()));
    }

    #[test]
    fn missing_or_blank_key_is_a_config_error() {
        assert!(matches!(ClientSettings::from_lookup(lookup(&[])), Err(ConfigError::MissingApiKey)));
        assert!(matches!(
            ClientSettings::from_lookup(lookup(&[(API_KEY_ENV, "   ")])),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn env_settings_default_to_groq() {
        let s = ClientSettings::from_lookup(lookup(&[(API_KEY_ENV, "gsk_x"), (BASE_URL_ENV, "http://localhost:8080")]))
            .unwrap();
        assert_eq!(s.api_key, "gsk_x");
        assert_eq!(s.base_url.as_deref(), Some("http://localhost:8080"));
        assert!(matches!(s.backend, LLMBackend::Groq));
        assert!(!format!("{s:?}").contains("gsk_x"));
    }

    #[test]
    fn unknown_backend_is_reported() {
        let err = ClientSettings::from_lookup(lookup(&[(API_KEY_ENV, "k"), (BACKEND_ENV, "carrier-pigeon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(name) if name == "carrier-pigeon"));
    }
}
