//! Error types for the dialog turn engine

use thiserror::Error;

/// Result alias used across the engine
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised while building the engine or running a turn
#[derive(Debug, Error)]
pub enum DialogError {
    /// `begin`/`replace` referenced an id that is not registered
    #[error("unknown dialog '{dialog_id}'")]
    UnknownDialog { dialog_id: String },

    /// Two definitions share the same id
    #[error("dialog '{dialog_id}' is registered more than once")]
    DuplicateDialog { dialog_id: String },

    /// A step advanced past the last step of its waterfall
    #[error("dialog '{dialog_id}' ran past its last step (step {step_index})")]
    WaterfallOverrun { dialog_id: String, step_index: usize },

    /// A step prompted with an id its dialog never registered
    #[error("dialog '{dialog_id}' has no prompt '{prompt_id}'")]
    UnknownPrompt { dialog_id: String, prompt_id: String },

    /// A stack operation needed an active frame
    #[error("no active dialog for {operation}")]
    EmptyStack { operation: &'static str },

    /// The intent recognizer could not be reached
    #[error("recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    /// A required collaborator was not supplied at construction
    #[error("missing service: {0} is required")]
    MissingService(&'static str),

    /// A save raced with a newer persisted state
    #[error("state for '{conversation_id}' is at version {found}, expected {expected}")]
    StateConflict {
        conversation_id: String,
        expected: u64,
        found: u64,
    },

    /// State store failure
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Failure raised by a step's own business logic
    #[error("step failed: {0}")]
    Step(String),
}
