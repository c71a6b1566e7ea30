//! Engine configuration
//!
//! Defaults reproduce the behavior of the engine without any configuration:
//! German default locale, no language policy, unbounded prompt retries and
//! cancel/help interruptions routed to the built-in dialogs.
//!
//! ```ignore
//! let config = EngineConfig::default()
//!     .with_default_locale("en")
//!     .with_fallback_locales(vec!["en".to_string()])
//!     .with_max_prompt_attempts(3)
//!     .with_rng_seed(7);
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dialogs::builtin::{CANCEL_DIALOG_ID, HELP_DIALOG_ID};

/// Top-level engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Locale used when an activity carries none
    pub default_locale: String,
    /// Locales every rendered template tries after the activity locale and any
    /// template manager policy, before `default`
    pub fallback_locales: Vec<String>,
    /// Failed attempts after which a prompting dialog is ended; `None` retries forever
    pub max_prompt_attempts: Option<u32>,
    /// Conversation-visible text sent when a turn fails
    pub error_message: String,
    /// Seed for response-variant selection; entropy when `None`
    pub rng_seed: Option<u64>,
    /// Global intent handling
    pub interruption: InterruptionConfig,
}

/// Which intents interrupt a running stack and what they start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InterruptionConfig {
    pub cancel_intent: String,
    pub help_intent: String,
    /// Dialog pushed on a cancel intent (awaits confirmation)
    pub cancel_dialog: String,
    /// Dialog pushed on a help intent
    pub help_dialog: String,
    /// Score the top intent must reach to interrupt; `0.0` accepts any top intent
    pub min_score: f64,
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        Self {
            cancel_intent: "Cancel".to_string(),
            help_intent: "Help".to_string(),
            cancel_dialog: CANCEL_DIALOG_ID.to_string(),
            help_dialog: HELP_DIALOG_ID.to_string(),
            min_score: 0.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_locale: "de".to_string(),
            fallback_locales: Vec::new(),
            max_prompt_attempts: None,
            error_message: "Es tut mir leid. Leider ist ein Fehler aufgetreten".to_string(),
            rng_seed: None,
            interruption: InterruptionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys keep their defaults, unknown keys are rejected
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid engine configuration")
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine configuration {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    pub fn with_fallback_locales(mut self, locales: Vec<String>) -> Self {
        self.fallback_locales = locales;
        self
    }

    pub fn with_max_prompt_attempts(mut self, attempts: u32) -> Self {
        self.max_prompt_attempts = Some(attempts);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_interruption(mut self, interruption: InterruptionConfig) -> Self {
        self.interruption = interruption;
        self
    }
}
