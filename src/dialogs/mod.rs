//! Dialog definitions and the registry they are looked up in
//!
//! A [`DialogDefinition`] is immutable once built: an id, an ordered list of
//! waterfall steps, the prompts it may issue and the child definitions it may
//! begin. The [`DialogRegistry`] flattens a set of definitions (children
//! included) into one id-keyed table at process start.
//!
//! ```ignore
//! let order = DialogDefinition::builder("order")
//!     .prompt(PromptSpec::number("quantity"))
//!     .step(|step| Ok(Directive::prompt("quantity", PromptOptions::text("How many?"))))
//!     .step(|step| Ok(Directive::end_dialog(step.result().cloned())))
//!     .build();
//! let registry = DialogRegistry::new(vec![order])?;
//! ```

pub mod builtin;
pub mod context;
pub mod prompt;
pub mod waterfall;

pub use context::{DialogContext, DialogTurnStatus};
pub use prompt::{PromptKind, PromptOptions, PromptSpec, PromptValidator, PromptValidatorContext};
pub use waterfall::{Directive, FnStep, Step, StepContext};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::aggregate::ConversationDialogState;
use crate::error::{DialogError, DialogResult};

/// Immutable dialog: id, steps, prompts, children
#[derive(Clone)]
pub struct DialogDefinition {
    id: String,
    steps: Vec<Arc<dyn Step>>,
    prompts: HashMap<String, PromptSpec>,
    children: Vec<DialogDefinition>,
    interruptible: bool,
}

impl fmt::Debug for DialogDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogDefinition")
            .field("id", &self.id)
            .field("steps", &self.steps.len())
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .field("interruptible", &self.interruptible)
            .finish()
    }
}

impl DialogDefinition {
    pub fn builder(id: impl Into<String>) -> DialogDefinitionBuilder {
        DialogDefinitionBuilder {
            definition: DialogDefinition {
                id: id.into(),
                steps: Vec::new(),
                prompts: HashMap::new(),
                children: Vec::new(),
                interruptible: true,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<Arc<dyn Step>> {
        self.steps.get(index).cloned()
    }

    pub fn prompt(&self, prompt_id: &str) -> Option<&PromptSpec> {
        self.prompts.get(prompt_id)
    }

    pub fn children(&self) -> &[DialogDefinition] {
        &self.children
    }

    /// Whether cancel/help intents are checked while this dialog is on the stack
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }
}

/// Builder for [`DialogDefinition`]
pub struct DialogDefinitionBuilder {
    definition: DialogDefinition,
}

impl DialogDefinitionBuilder {
    /// Append a synchronous step
    pub fn step<F>(self, step: F) -> Self
    where
        F: Fn(&mut StepContext<'_>) -> DialogResult<Directive> + Send + Sync + 'static,
    {
        self.step_with(FnStep(step))
    }

    /// Append a step implemented as a type (e.g. one that awaits a service)
    pub fn step_with(mut self, step: impl Step + 'static) -> Self {
        self.definition.steps.push(Arc::new(step));
        self
    }

    pub fn prompt(mut self, prompt: PromptSpec) -> Self {
        self.definition.prompts.insert(prompt.id.clone(), prompt);
        self
    }

    /// Register a child dialog this one may begin
    pub fn child(mut self, child: DialogDefinition) -> Self {
        self.definition.children.push(child);
        self
    }

    pub fn interruptible(mut self, interruptible: bool) -> Self {
        self.definition.interruptible = interruptible;
        self
    }

    pub fn build(self) -> DialogDefinition {
        self.definition
    }
}

/// Id-keyed table of every registered dialog
#[derive(Debug, Clone, Default)]
pub struct DialogRegistry {
    dialogs: HashMap<String, Arc<DialogDefinition>>,
}

impl DialogRegistry {
    /// Register definitions and, recursively, their children
    pub fn new(definitions: impl IntoIterator<Item = DialogDefinition>) -> DialogResult<Self> {
        let mut registry = Self::default();
        for definition in definitions {
            registry.add(definition)?;
        }
        Ok(registry)
    }

    /// Register one definition tree; fails on an id that is already taken
    pub fn add(&mut self, definition: DialogDefinition) -> DialogResult<()> {
        let mut pending = vec![definition];
        while let Some(definition) = pending.pop() {
            if self.dialogs.contains_key(&definition.id) {
                return Err(DialogError::DuplicateDialog {
                    dialog_id: definition.id,
                });
            }
            pending.extend(definition.children.iter().cloned());
            debug!(dialog_id = %definition.id, steps = definition.steps.len(), "dialog registered");
            self.dialogs
                .insert(definition.id.clone(), Arc::new(definition));
        }
        Ok(())
    }

    pub fn get(&self, dialog_id: &str) -> DialogResult<Arc<DialogDefinition>> {
        self.dialogs
            .get(dialog_id)
            .cloned()
            .ok_or_else(|| DialogError::UnknownDialog {
                dialog_id: dialog_id.to_string(),
            })
    }

    pub fn contains(&self, dialog_id: &str) -> bool {
        self.dialogs.contains_key(dialog_id)
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// True when the innermost frame runs an interruptible dialog
    pub fn is_interruptible(&self, state: &ConversationDialogState) -> bool {
        state.top().is_some_and(|frame| {
            self.dialogs
                .get(&frame.dialog_id)
                .is_some_and(|definition| definition.interruptible)
        })
    }
}
