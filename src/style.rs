//! assistant style presets: a closed set of named system instructions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// the system-instruction presets a session can pick from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StylePreset {
    #[default]
    Professional,
    Friendly,
    Teacher,
    Concise,
}

/// a style key that is not one of [`StylePreset::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown assistant style '{0}' (expected one of Professional, Friendly, Teacher, Concise)")]
pub struct UnknownStyleError(pub String);

impl StylePreset {
    /// every preset, in the order a ui should offer them.
    pub const ALL: [StylePreset; 4] = [
        StylePreset::Professional,
        StylePreset::Friendly,
        StylePreset::Teacher,
        StylePreset::Concise,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StylePreset::Professional => "Professional",
            StylePreset::Friendly => "Friendly",
            StylePreset::Teacher => "Teacher",
            StylePreset::Concise => "Concise",
        }
    }

    /// the system instruction sent at the head of every request.
    pub fn instruction(self) -> &'static str {
        match self {
            StylePreset::Professional => {
                "You are a professional assistant. \
                 Be clear, structured, and practical. \
                 Ask a short follow-up question if needed."
            }
            StylePreset::Friendly => {
                "You are a friendly, helpful assistant. \
                 Use a warm tone, simple words, and short paragraphs."
            }
            StylePreset::Teacher => {
                "You are a patient teacher. \
                 Explain step-by-step with examples, and check understanding."
            }
            StylePreset::Concise => {
                "You are a concise assistant. \
                 Give short, direct answers with bullet points when useful."
            }
        }
    }

    /// next preset in [`StylePreset::ALL`], wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// keys are matched exactly; a near miss is still an error.
impl FromStr for StylePreset {
    type Err = UnknownStyleError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == key)
            .ok_or_else(|| UnknownStyleError(key.to_string()))
    }
}

impl TryFrom<String> for StylePreset {
    type Error = UnknownStyleError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        key.parse()
    }
}

impl From<StylePreset> for String {
    fn from(style: StylePreset) -> Self {
        style.name().to_string()
    }
}
