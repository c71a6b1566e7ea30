//! Conversational turn engine
//!
//! On every inbound activity the engine resumes a persisted stack of nested,
//! multi-step dialogs. It provides:
//! - A per-conversation dialog stack with begin/end/replace/reprompt/cancel-all
//! - Waterfall steps that each return one directive (next, prompt, begin, ...)
//! - Prompts with recognition, validation and re-prompting on invalid input
//! - Cancel/help interruptions that keep the interrupted prompt's position
//! - Locale-aware template rendering with a fallback chain ending in `default`
//! - Turn routing to host hooks (start, route, complete, events, system messages)
//!
//! Exactly one turn per conversation runs at a time; the transport adapter is
//! responsible for serializing turns of the same conversation. Turns of
//! different conversations are independent.

pub mod aggregate;
pub mod config;
pub mod dialogs;
pub mod error;
pub mod events;
pub mod interruption;
pub mod routing;
pub mod store;
pub mod templates;
pub mod turn;
pub mod value_objects;

// Re-export main types
pub use aggregate::{ConversationDialogState, DialogStackFrame, PendingPrompt};

pub use config::{EngineConfig, InterruptionConfig};

pub use dialogs::builtin::{
    CANCEL_DIALOG_ID, HELP_DIALOG_ID, cancel_dialog, help_dialog, variant_response_dialog,
};
pub use dialogs::{
    DialogContext, DialogDefinition, DialogRegistry, DialogTurnStatus, Directive, FnStep,
    PromptKind, PromptOptions, PromptSpec, PromptValidatorContext, Step, StepContext,
};

pub use error::{DialogError, DialogResult};
pub use events::DialogEvent;

pub use interruption::{InterruptionRouter, InterruptionStatus, Recognizer, RecognizerResult};

pub use routing::{DialogEngine, DialogEngineBuilder, TurnHandler, TurnOutcome};

pub use store::{InMemoryStateStore, StateStore};

pub use templates::{
    DictionaryRenderer, LocaleResources, RenderOutput, ResponseVariants, StaticResources,
    TemplateManager, TemplateRenderer,
};

pub use turn::TurnContext;

pub use value_objects::{
    Activity, ActivityType, Attachment, ChannelAccount, InputHint, OutgoingActivity,
};
