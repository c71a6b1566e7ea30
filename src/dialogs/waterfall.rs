//! Waterfall steps and the directives they return
//!
//! A step receives a [`StepContext`] (turn, frame state, previous result) and
//! returns exactly one [`Directive`] telling the sequencer how to proceed.

use async_trait::async_trait;
use rand::rngs::StdRng;
use serde_json::Value;
use std::collections::HashMap;

use super::prompt::PromptOptions;
use crate::aggregate::DialogStackFrame;
use crate::error::DialogResult;
use crate::templates::TemplateManager;
use crate::turn::TurnContext;
use crate::value_objects::{Activity, OutgoingActivity};

/// How a step wants the waterfall to proceed
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Advance the cursor and run the next step in this turn
    Next(Option<Value>),
    /// Suspend the turn until the user answers
    Prompt {
        prompt_id: String,
        options: PromptOptions,
    },
    /// Push a child; this step's result becomes the child's result
    BeginDialog {
        dialog_id: String,
        args: Option<Value>,
    },
    /// Restart the top frame as `dialog_id` from step 0
    ReplaceDialog {
        dialog_id: String,
        args: Option<Value>,
    },
    /// Pop this frame and hand `result` to the parent
    EndDialog(Option<Value>),
    /// Drop every frame on the stack
    CancelAllDialogs,
}

impl Directive {
    pub fn next(result: impl Into<Option<Value>>) -> Self {
        Directive::Next(result.into())
    }

    pub fn prompt(prompt_id: impl Into<String>, options: PromptOptions) -> Self {
        Directive::Prompt {
            prompt_id: prompt_id.into(),
            options,
        }
    }

    pub fn begin_dialog(dialog_id: impl Into<String>, args: impl Into<Option<Value>>) -> Self {
        Directive::BeginDialog {
            dialog_id: dialog_id.into(),
            args: args.into(),
        }
    }

    pub fn replace_dialog(dialog_id: impl Into<String>, args: impl Into<Option<Value>>) -> Self {
        Directive::ReplaceDialog {
            dialog_id: dialog_id.into(),
            args: args.into(),
        }
    }

    pub fn end_dialog(result: impl Into<Option<Value>>) -> Self {
        Directive::EndDialog(result.into())
    }
}

/// One waterfall step
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, step: &mut StepContext<'_>) -> DialogResult<Directive>;
}

/// Adapter turning a synchronous closure into a [`Step`]
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> DialogResult<Directive> + Send + Sync,
{
    async fn run(&self, step: &mut StepContext<'_>) -> DialogResult<Directive> {
        (self.0)(step)
    }
}

/// What a running step can see and touch
pub struct StepContext<'a> {
    turn: &'a mut TurnContext,
    frame: &'a mut DialogStackFrame,
    result: Option<Value>,
    reprompt: bool,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        turn: &'a mut TurnContext,
        frame: &'a mut DialogStackFrame,
        result: Option<Value>,
        reprompt: bool,
    ) -> Self {
        Self {
            turn,
            frame,
            result,
            reprompt,
        }
    }

    /// Previous step result (prompt answer, child result or `next` value)
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Arguments the dialog was begun with
    pub fn options(&self) -> Option<&Value> {
        self.frame.options.as_ref()
    }

    pub fn dialog_id(&self) -> &str {
        &self.frame.dialog_id
    }

    pub fn step_index(&self) -> usize {
        self.frame.step_index
    }

    /// True when the step is re-run to display its prompt again
    pub fn is_reprompt(&self) -> bool {
        self.reprompt
    }

    /// Failed answers to this step's pending prompt
    pub fn attempts(&self) -> u32 {
        self.frame
            .pending_prompt
            .as_ref()
            .map_or(0, |pending| pending.attempts)
    }

    /// Read a value from this instance's private state
    pub fn state(&self, key: &str) -> Option<&Value> {
        self.frame.instance_state.get(key)
    }

    /// Write a value into this instance's private state
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.frame.instance_state.insert(key.into(), value);
    }

    pub fn instance_state(&self) -> &HashMap<String, Value> {
        &self.frame.instance_state
    }

    pub fn activity(&self) -> &Activity {
        self.turn.activity()
    }

    pub fn locale(&self) -> &str {
        self.turn.locale()
    }

    pub fn turn(&self) -> &TurnContext {
        &*self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnContext {
        &mut *self.turn
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.turn.rng()
    }

    pub fn reply(&mut self, reply: OutgoingActivity) {
        self.turn.send(reply);
    }

    pub fn reply_text(&mut self, text: impl Into<String>) {
        self.turn.send_text(text);
    }

    /// Render a template in the turn locale
    pub fn render(
        &self,
        templates: &TemplateManager,
        template_id: &str,
        data: &Value,
    ) -> Option<OutgoingActivity> {
        templates.render_template(&*self.turn, template_id, Some(self.turn.locale()), data)
    }

    /// Render and send; no-op when the template produced nothing
    pub fn reply_with(&mut self, templates: &TemplateManager, template_id: &str, data: &Value) -> bool {
        templates.reply_with(&mut *self.turn, template_id, data)
    }
}
