//! Global intent handling
//!
//! Before the active stack is continued, the inbound text is run through the
//! [`Recognizer`]. A cancel intent pushes the cancel-confirmation dialog and
//! ends the turn ([`InterruptionStatus::Waiting`]); a help intent pushes the help
//! dialog and re-displays the interrupted prompt once help has popped
//! ([`InterruptionStatus::Interrupted`]). Only the top intent interrupts; when
//! cancel and help share the top score, cancel wins.
//!
//! A recognizer failure fails the turn; the stack is never continued without
//! the intent check having run.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::InterruptionConfig;
use crate::dialogs::{DialogContext, DialogTurnStatus};
use crate::error::DialogResult;
use crate::events::DialogEvent;

/// Outcome of the interruption check for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterruptionStatus {
    /// Continue the active stack normally
    NoAction,
    /// A dialog awaiting confirmation was pushed; the turn ends
    Waiting,
    /// A transient dialog was pushed; the interrupted prompt is shown again after it
    Interrupted,
}

/// Intents and entities recognized in an utterance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerResult {
    pub text: String,
    /// Intent name to score in `0.0..=1.0`
    pub intents: HashMap<String, f64>,
    #[serde(default)]
    pub entities: Value,
}

impl RecognizerResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>, score: f64) -> Self {
        self.intents.insert(intent.into(), score);
        self
    }

    /// Highest scoring intent; ties go to the lexically smaller name
    pub fn top_intent(&self) -> Option<(&str, f64)> {
        self.intents
            .iter()
            .max_by(|(a_name, a_score), (b_name, b_score)| {
                a_score
                    .total_cmp(b_score)
                    .then_with(|| b_name.cmp(a_name))
            })
            .map(|(name, score)| (name.as_str(), *score))
    }

    pub fn score(&self, intent: &str) -> f64 {
        self.intents.get(intent).copied().unwrap_or(0.0)
    }
}

/// External intent recognizer
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize `text`; failures should be `DialogError::RecognizerUnavailable`
    async fn recognize(&self, text: &str, locale: &str) -> DialogResult<RecognizerResult>;
}

/// Which interruption a recognition result asks for
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptionDecision {
    pub status: InterruptionStatus,
    pub intent: Option<String>,
    pub dialog_id: Option<String>,
}

impl InterruptionDecision {
    fn no_action() -> Self {
        Self {
            status: InterruptionStatus::NoAction,
            intent: None,
            dialog_id: None,
        }
    }
}

/// Runs the intent check ahead of stack continuation
#[derive(Clone)]
pub struct InterruptionRouter {
    recognizer: Arc<dyn Recognizer>,
    config: InterruptionConfig,
}

impl std::fmt::Debug for InterruptionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptionRouter")
            .field("config", &self.config)
            .finish()
    }
}

impl InterruptionRouter {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: InterruptionConfig) -> Self {
        Self { recognizer, config }
    }

    pub fn config(&self) -> &InterruptionConfig {
        &self.config
    }

    /// `intent` holds the top score and reaches the configured floor
    fn matches(&self, result: &RecognizerResult, intent: &str) -> bool {
        let Some(score) = result.intents.get(intent).copied() else {
            return false;
        };
        result
            .top_intent()
            .is_some_and(|(_, top)| score >= top && score >= self.config.min_score)
    }

    /// Decide from a recognition result, given the innermost active dialog
    pub fn decide(&self, result: &RecognizerResult, active_dialog: Option<&str>) -> InterruptionDecision {
        let config = &self.config;

        if self.matches(result, &config.cancel_intent) {
            if active_dialog == Some(config.cancel_dialog.as_str()) {
                return InterruptionDecision::no_action();
            }
            return InterruptionDecision {
                status: InterruptionStatus::Waiting,
                intent: Some(config.cancel_intent.clone()),
                dialog_id: Some(config.cancel_dialog.clone()),
            };
        }

        if self.matches(result, &config.help_intent) {
            if active_dialog == Some(config.help_dialog.as_str()) {
                return InterruptionDecision::no_action();
            }
            return InterruptionDecision {
                status: InterruptionStatus::Interrupted,
                intent: Some(config.help_intent.clone()),
                dialog_id: Some(config.help_dialog.clone()),
            };
        }

        InterruptionDecision::no_action()
    }

    /// Check for an interruption, then continue the stack if there was none
    pub async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnStatus> {
        let Some(active) = dc.active_dialog().map(|frame| frame.dialog_id.clone()) else {
            return Ok(DialogTurnStatus::Empty);
        };

        let decision = self.evaluate(dc, &active).await?;
        let Some(dialog_id) = decision.dialog_id else {
            return dc.continue_dialog().await;
        };

        info!(
            intent = decision.intent.as_deref().unwrap_or_default(),
            dialog_id = %dialog_id,
            status = ?decision.status,
            "interruption raised"
        );
        dc.turn_mut().record(DialogEvent::InterruptionRaised {
            intent: decision.intent.unwrap_or_default(),
            status: decision.status,
            at: Utc::now(),
        });

        let status = dc.begin_interruption(&dialog_id).await?;
        if decision.status == InterruptionStatus::Waiting
            || matches!(status, DialogTurnStatus::Cancelled | DialogTurnStatus::Complete(_))
        {
            return Ok(status);
        }

        let transient_on_top = dc
            .active_dialog()
            .is_some_and(|frame| frame.dialog_id == dialog_id);
        if transient_on_top {
            return Ok(status);
        }
        dc.reprompt_dialog().await
    }

    async fn evaluate(&self, dc: &DialogContext<'_>, active: &str) -> DialogResult<InterruptionDecision> {
        if !dc.registry().is_interruptible(dc.state()) {
            return Ok(InterruptionDecision::no_action());
        }
        let Some(text) = dc.turn().activity().trimmed_text() else {
            return Ok(InterruptionDecision::no_action());
        };

        let result = self
            .recognizer
            .recognize(text, dc.turn().locale())
            .await
            .inspect_err(|err| error!(error = %err, "intent recognition failed"))?;
        debug!(top_intent = ?result.top_intent(), active_dialog = active, "intents recognized");

        Ok(self.decide(&result, Some(active)))
    }
}
