//! Conversation dialog state - the unit of durability
//!
//! One [`ConversationDialogState`] exists per conversation. It holds:
//! - The ordered dialog stack (last element = innermost active frame)
//! - A version used for optimistic concurrency in the store
//!
//! It is loaded at the start of a turn, mutated while the turn runs and saved
//! before the turn ends. An absent state is an empty stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted marker for a frame that suspended the turn on a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingPrompt {
    /// Prompt registered by the frame's dialog
    pub prompt_id: String,
    /// Failed validations so far
    pub attempts: u32,
    /// Choices offered, needed to recognize the answer next turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// One activation record of a dialog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogStackFrame {
    /// Unique id of this activation
    pub instance_id: Uuid,
    /// Registered dialog id
    pub dialog_id: String,
    /// Cursor into the dialog's step list
    pub step_index: usize,
    /// Private key-value state of this activation
    pub instance_state: HashMap<String, Value>,
    /// Arguments passed to `begin_dialog`
    pub options: Option<Value>,
    /// Previous-step result the current step was run with
    pub step_input: Option<Value>,
    /// Set while the frame waits for the user's answer
    pub pending_prompt: Option<PendingPrompt>,
    /// When the frame was pushed
    pub started_at: DateTime<Utc>,
}

impl DialogStackFrame {
    /// Create a frame positioned at step 0
    pub fn new(dialog_id: impl Into<String>, options: Option<Value>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            dialog_id: dialog_id.into(),
            step_index: 0,
            instance_state: HashMap::new(),
            options,
            step_input: None,
            pending_prompt: None,
            started_at: Utc::now(),
        }
    }

    /// Whether the frame is suspended on a prompt
    pub fn is_awaiting_input(&self) -> bool {
        self.pending_prompt.is_some()
    }
}

/// Per-conversation dialog stack
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationDialogState {
    /// Conversation this state belongs to
    pub conversation_id: String,
    /// Stack of frames, top = last
    stack: Vec<DialogStackFrame>,
    /// Version for optimistic concurrency
    pub version: u64,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl ConversationDialogState {
    /// Implicit empty stack for a conversation without persisted state
    pub fn empty(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            stack: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Frames from root to top
    pub fn frames(&self) -> &[DialogStackFrame] {
        &self.stack
    }

    /// Number of nested active dialogs
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Innermost active frame
    pub fn top(&self) -> Option<&DialogStackFrame> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut DialogStackFrame> {
        self.stack.last_mut()
    }

    /// Whether any frame runs the given dialog
    pub fn contains(&self, dialog_id: &str) -> bool {
        self.stack.iter().any(|frame| frame.dialog_id == dialog_id)
    }

    /// Push a new frame on top
    pub fn push(&mut self, frame: DialogStackFrame) {
        self.stack.push(frame);
        self.touch();
    }

    /// Pop the top frame
    pub fn pop(&mut self) -> Option<DialogStackFrame> {
        let frame = self.stack.pop();
        if frame.is_some() {
            self.touch();
        }
        frame
    }

    /// Swap the top frame for a new one in the same slot
    pub fn replace_top(&mut self, frame: DialogStackFrame) -> Option<DialogStackFrame> {
        let previous = self.stack.pop();
        self.stack.push(frame);
        self.touch();
        previous
    }

    /// Drop every frame
    pub fn clear(&mut self) -> usize {
        let dropped = self.stack.len();
        self.stack.clear();
        self.touch();
        dropped
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
