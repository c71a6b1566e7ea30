//! Dialog stack events
//!
//! Every stack transition inside a turn is recorded as a [`DialogEvent`]. The
//! events of one turn are returned with its outcome so hosts can project or
//! audit conversations without inspecting the persisted stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interruption::InterruptionStatus;

/// Stack transitions recorded during a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DialogEvent {
    /// A frame was pushed
    DialogBegun {
        dialog_id: String,
        depth: usize,
        at: DateTime<Utc>,
    },
    /// A frame was popped with its result
    DialogEnded {
        dialog_id: String,
        result: Option<Value>,
        depth: usize,
        at: DateTime<Utc>,
    },
    /// The top frame was restarted as another (or the same) dialog
    DialogReplaced {
        from: String,
        to: String,
        depth: usize,
        at: DateTime<Utc>,
    },
    /// The turn suspended on a prompt
    PromptIssued {
        dialog_id: String,
        prompt_id: String,
        step_index: usize,
        attempt: u32,
        at: DateTime<Utc>,
    },
    /// Input failed recognition or validation
    PromptRejected {
        dialog_id: String,
        prompt_id: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
    /// A global intent suspended the active stack
    InterruptionRaised {
        intent: String,
        status: InterruptionStatus,
        at: DateTime<Utc>,
    },
    /// Every frame was dropped
    StackCancelled { dropped: usize, at: DateTime<Utc> },
}

impl DialogEvent {
    /// Short name of the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            DialogEvent::DialogBegun { .. } => "DialogBegun",
            DialogEvent::DialogEnded { .. } => "DialogEnded",
            DialogEvent::DialogReplaced { .. } => "DialogReplaced",
            DialogEvent::PromptIssued { .. } => "PromptIssued",
            DialogEvent::PromptRejected { .. } => "PromptRejected",
            DialogEvent::InterruptionRaised { .. } => "InterruptionRaised",
            DialogEvent::StackCancelled { .. } => "StackCancelled",
        }
    }
}
