//! Prompt specs, recognition and validation
//!
//! A dialog registers its prompts by id. When a step suspends on a prompt the
//! frame records a [`PendingPrompt`]; on the next turn the raw input is
//! recognized according to the prompt's [`PromptKind`] and handed to the
//! optional validator. Recognition failure and validator rejection are treated
//! the same way: the step is re-run and the prompt shown again.

use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

use crate::aggregate::PendingPrompt;
use crate::templates::TemplateManager;
use crate::turn::TurnContext;
use crate::value_objects::{Activity, OutgoingActivity};

/// Kind of input a prompt expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Any non-blank text
    Text,
    /// A decimal number (`3`, `12.5`, `12,5`)
    Number,
    /// Yes/no answer
    Confirm,
    /// One of the offered choices, by 1-based index or value
    Choice,
    /// At least one attachment
    Attachment,
}

/// Custom validation of a recognized value
pub type PromptValidator = Arc<dyn Fn(&mut PromptValidatorContext<'_>) -> bool + Send + Sync>;

/// Input to a [`PromptValidator`]
pub struct PromptValidatorContext<'a> {
    turn: &'a mut TurnContext,
    recognized: &'a Value,
    attempts: u32,
}

impl PromptValidatorContext<'_> {
    /// Value produced by recognition
    pub fn recognized(&self) -> &Value {
        self.recognized
    }

    /// Failed attempts before this one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn turn(&self) -> &TurnContext {
        &*self.turn
    }

    /// Send an explanation alongside the rejection
    pub fn reply_with(&mut self, templates: &TemplateManager, template_id: &str, data: &Value) -> bool {
        templates.reply_with(&mut *self.turn, template_id, data)
    }

    pub fn reply_text(&mut self, text: impl Into<String>) {
        self.turn.send_text(text);
    }
}

/// Prompt registered by a dialog
#[derive(Clone)]
pub struct PromptSpec {
    pub id: String,
    pub kind: PromptKind,
    validator: Option<PromptValidator>,
}

impl fmt::Debug for PromptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptSpec")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl PromptSpec {
    pub fn new(id: impl Into<String>, kind: PromptKind) -> Self {
        Self {
            id: id.into(),
            kind,
            validator: None,
        }
    }

    pub fn text(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Text)
    }

    pub fn number(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Number)
    }

    pub fn confirm(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Confirm)
    }

    pub fn choice(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Choice)
    }

    pub fn attachment(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Attachment)
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&mut PromptValidatorContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Recognize and validate this turn's input; `Some` only on a pass
    pub fn evaluate(&self, turn: &mut TurnContext, pending: &PendingPrompt) -> Option<Value> {
        let recognized = recognize(self.kind, turn.activity(), &pending.choices)?;
        let Some(validator) = &self.validator else {
            return Some(recognized);
        };

        let mut context = PromptValidatorContext {
            turn,
            recognized: &recognized,
            attempts: pending.attempts,
        };
        if validator(&mut context) {
            Some(recognized)
        } else {
            None
        }
    }
}

/// What to show when a prompt is issued
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptOptions {
    /// First display of the prompt
    pub prompt: Option<OutgoingActivity>,
    /// Display after a rejected answer; falls back to `prompt`
    pub retry_prompt: Option<OutgoingActivity>,
    /// Choices for choice prompts
    pub choices: Vec<String>,
}

impl PromptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompt with plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            prompt: Some(OutgoingActivity::text(text)),
            ..Self::default()
        }
    }

    /// Prompt with rendered content (typically from a template)
    pub fn from_prompt(prompt: Option<OutgoingActivity>) -> Self {
        Self {
            prompt,
            ..Self::default()
        }
    }

    pub fn with_retry_prompt(mut self, retry: Option<OutgoingActivity>) -> Self {
        self.retry_prompt = retry;
        self
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    /// Activity to send for the given attempt number
    pub(crate) fn activity_for_attempt(&self, attempts: u32) -> Option<OutgoingActivity> {
        let activity = if attempts > 0 {
            self.retry_prompt.as_ref().or(self.prompt.as_ref())
        } else {
            self.prompt.as_ref()
        };

        activity.cloned().map(|activity| {
            if self.choices.is_empty() {
                activity
            } else {
                activity.with_suggested_actions(self.choices.clone())
            }
        })
    }
}

const YES_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "true", "ja", "j", "jawohl", "klar", "gerne",
];
const NO_WORDS: &[&str] = &["no", "n", "nope", "false", "nein", "ne", "nö", "nee"];

/// Turn raw activity input into a value for the given kind
pub fn recognize(kind: PromptKind, activity: &Activity, choices: &[String]) -> Option<Value> {
    match kind {
        PromptKind::Text => activity.trimmed_text().map(|text| json!(text)),
        PromptKind::Number => {
            let text = activity.trimmed_text()?.replace(',', ".");
            let number: f64 = text.parse().ok()?;
            serde_json::Number::from_f64(number).map(Value::Number)
        }
        PromptKind::Confirm => {
            if let Some(Value::Bool(answer)) = &activity.value {
                return Some(json!(answer));
            }
            let word = normalize(activity.trimmed_text()?);
            if YES_WORDS.contains(&word.as_str()) {
                Some(json!(true))
            } else if NO_WORDS.contains(&word.as_str()) {
                Some(json!(false))
            } else {
                None
            }
        }
        PromptKind::Choice => {
            let input = activity
                .trimmed_text()
                .map(str::to_string)
                .or_else(|| activity.value.as_ref().and_then(choice_from_value))?;
            find_choice(&input, choices)
                .map(|index| json!({ "value": choices[index], "index": index }))
        }
        PromptKind::Attachment => {
            if activity.attachments.is_empty() {
                None
            } else {
                serde_json::to_value(&activity.attachments).ok()
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim_end_matches(['.', '!', '?'])
        .trim()
        .to_lowercase()
}

fn choice_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(fields) => fields.get("value").and_then(choice_from_value),
        _ => None,
    }
}

fn find_choice(input: &str, choices: &[String]) -> Option<usize> {
    if let Ok(number) = input.trim().parse::<usize>() {
        return (1..=choices.len()).contains(&number).then(|| number - 1);
    }

    let wanted = normalize(input);
    choices
        .iter()
        .position(|choice| choice.to_lowercase() == wanted)
}
