//! Stack interpreter for one turn
//!
//! [`DialogContext`] binds the turn, the conversation's loaded stack and the
//! registry. Stack operations run the affected waterfall synchronously inside
//! the turn until a step suspends on a prompt or the stack empties. The driver
//! is an explicit loop over [`Flow`] so nested begin/end chains never recurse.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::DialogRegistry;
use super::prompt::PromptOptions;
use super::waterfall::{Directive, StepContext};
use crate::aggregate::{ConversationDialogState, DialogStackFrame, PendingPrompt};
use crate::error::{DialogError, DialogResult};
use crate::events::DialogEvent;
use crate::turn::TurnContext;

/// Where the stack stands when control returns to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum DialogTurnStatus {
    /// No dialog was active
    Empty,
    /// The top frame awaits the user's next input
    Waiting,
    /// The last frame ended with this result
    Complete(Option<Value>),
    /// Every frame was cancelled
    Cancelled,
}

/// How the stack was emptied during the turn
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StackOutcome {
    Completed(Option<Value>),
    Cancelled,
}

/// Why the top frame's step is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// First run at this cursor
    Fresh,
    /// The last answer was rejected
    Retry,
    /// Show the pending prompt again as first issued
    Redisplay,
}

enum Flow {
    /// Run the top frame's current step with this input
    Run { input: Option<Value>, entry: Entry },
    Done(DialogTurnStatus),
}

/// Turn-scoped handle on a conversation's dialog stack
pub struct DialogContext<'a> {
    turn: &'a mut TurnContext,
    state: &'a mut ConversationDialogState,
    registry: &'a DialogRegistry,
    max_prompt_attempts: Option<u32>,
    suppress_resume_reprompt: bool,
    outcome: Option<StackOutcome>,
}

impl<'a> DialogContext<'a> {
    pub fn new(
        turn: &'a mut TurnContext,
        state: &'a mut ConversationDialogState,
        registry: &'a DialogRegistry,
    ) -> Self {
        Self {
            turn,
            state,
            registry,
            max_prompt_attempts: None,
            suppress_resume_reprompt: false,
            outcome: None,
        }
    }

    /// End a prompting dialog after this many failed answers
    pub fn with_max_prompt_attempts(mut self, max: Option<u32>) -> Self {
        self.max_prompt_attempts = max;
        self
    }

    pub fn turn(&self) -> &TurnContext {
        &*self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnContext {
        &mut *self.turn
    }

    pub fn state(&self) -> &ConversationDialogState {
        &*self.state
    }

    pub fn registry(&self) -> &DialogRegistry {
        self.registry
    }

    /// Innermost active frame
    pub fn active_dialog(&self) -> Option<&DialogStackFrame> {
        self.state.top()
    }

    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    /// Push `dialog_id` and run its first step
    ///
    /// A parent awaiting a prompt keeps it: when the child ends, the parent is
    /// prompted again instead of taking the child's result as its answer.
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        args: Option<Value>,
    ) -> DialogResult<DialogTurnStatus> {
        let flow = self.push_frame(dialog_id.to_string(), args)?;
        self.drive(flow).await
    }

    /// Pop the top frame and resume its parent with `result`
    pub async fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnStatus> {
        let flow = self.pop_and_resume(result)?;
        self.drive(flow).await
    }

    /// Restart the top frame as `dialog_id`, keeping the depth
    pub async fn replace_dialog(
        &mut self,
        dialog_id: &str,
        args: Option<Value>,
    ) -> DialogResult<DialogTurnStatus> {
        let flow = self.replace_frame(dialog_id.to_string(), args)?;
        self.drive(flow).await
    }

    /// Re-run the top frame's current step without moving its cursor
    ///
    /// A prompt issued by the step is shown as first issued, not as a retry.
    pub async fn reprompt_dialog(&mut self) -> DialogResult<DialogTurnStatus> {
        let frame = self.state.top().ok_or(DialogError::EmptyStack {
            operation: "reprompt_dialog",
        })?;
        debug!(dialog_id = %frame.dialog_id, step_index = frame.step_index, "reprompting");
        let input = frame.step_input.clone();
        self.drive(Flow::Run {
            input,
            entry: Entry::Redisplay,
        })
        .await
    }

    /// Drop every frame
    pub fn cancel_all_dialogs(&mut self) -> DialogTurnStatus {
        let dropped = self.state.clear();
        info!(
            conversation_id = %self.state.conversation_id,
            dropped, "dialog stack cancelled"
        );
        self.turn.record(DialogEvent::StackCancelled {
            dropped,
            at: Utc::now(),
        });
        self.outcome = Some(StackOutcome::Cancelled);
        DialogTurnStatus::Cancelled
    }

    /// Feed this turn's input to the top frame
    ///
    /// A frame awaiting a prompt has the input recognized and validated: a pass
    /// advances the cursor by one with the value, a failure re-runs the same step
    /// so it prompts again. A frame without a pending prompt re-runs its step.
    pub async fn continue_dialog(&mut self) -> DialogResult<DialogTurnStatus> {
        let Some(frame) = self.state.top_mut() else {
            return Ok(DialogTurnStatus::Empty);
        };
        let Some(pending) = frame.pending_prompt.clone() else {
            let input = frame.step_input.clone();
            return self
                .drive(Flow::Run {
                    input,
                    entry: Entry::Fresh,
                })
                .await;
        };

        let definition = self.registry.get(&frame.dialog_id)?;
        let prompt = definition
            .prompt(&pending.prompt_id)
            .ok_or_else(|| DialogError::UnknownPrompt {
                dialog_id: frame.dialog_id.clone(),
                prompt_id: pending.prompt_id.clone(),
            })?;

        if let Some(value) = prompt.evaluate(&mut *self.turn, &pending) {
            debug!(
                dialog_id = %frame.dialog_id,
                prompt_id = %pending.prompt_id,
                step_index = frame.step_index,
                "prompt answered"
            );
            let flow = self.advance(Some(value))?;
            return self.drive(flow).await;
        }

        let attempts = pending.attempts + 1;
        debug!(
            dialog_id = %frame.dialog_id,
            prompt_id = %pending.prompt_id,
            attempts, "prompt input rejected"
        );
        self.turn.record(DialogEvent::PromptRejected {
            dialog_id: frame.dialog_id.clone(),
            prompt_id: pending.prompt_id.clone(),
            attempts,
            at: Utc::now(),
        });
        let input = frame.step_input.clone();
        frame.pending_prompt = Some(PendingPrompt {
            attempts,
            ..pending
        });

        if self.max_prompt_attempts.is_some_and(|max| attempts >= max) {
            warn!(
                dialog_id = %frame.dialog_id,
                attempts, "prompt attempts exhausted, ending dialog"
            );
            let flow = self.pop_and_resume(None)?;
            return self.drive(flow).await;
        }

        self.drive(Flow::Run {
            input,
            entry: Entry::Retry,
        })
        .await
    }

    /// Begin an interruption dialog on top of a suspended frame
    ///
    /// The interrupted frame keeps its pending prompt. If the interruption ends
    /// within this call the resumed frame is not re-prompted; the caller decides.
    pub(crate) async fn begin_interruption(
        &mut self,
        dialog_id: &str,
    ) -> DialogResult<DialogTurnStatus> {
        self.suppress_resume_reprompt = true;
        let status = match self.push_frame(dialog_id.to_string(), None) {
            Ok(flow) => self.drive(flow).await,
            Err(err) => Err(err),
        };
        self.suppress_resume_reprompt = false;
        status
    }

    pub(crate) fn take_outcome(&mut self) -> Option<StackOutcome> {
        self.outcome.take()
    }

    async fn drive(&mut self, mut flow: Flow) -> DialogResult<DialogTurnStatus> {
        loop {
            match flow {
                Flow::Done(status) => return Ok(status),
                Flow::Run { input, entry } => {
                    let directive = self.run_top_step(input, entry).await?;
                    flow = self.apply(directive, entry)?;
                }
            }
        }
    }

    async fn run_top_step(
        &mut self,
        input: Option<Value>,
        entry: Entry,
    ) -> DialogResult<Directive> {
        let frame = self.state.top_mut().ok_or(DialogError::EmptyStack {
            operation: "run_step",
        })?;
        let definition = self.registry.get(&frame.dialog_id)?;
        let step = definition
            .step(frame.step_index)
            .ok_or_else(|| DialogError::WaterfallOverrun {
                dialog_id: frame.dialog_id.clone(),
                step_index: frame.step_index,
            })?;

        frame.step_input = input.clone();
        let reprompt = entry != Entry::Fresh;
        if !reprompt {
            frame.pending_prompt = None;
        }
        debug!(
            dialog_id = %frame.dialog_id,
            step_index = frame.step_index,
            ?entry, "running step"
        );

        let mut step_context = StepContext::new(&mut *self.turn, frame, input, reprompt);
        step.run(&mut step_context).await
    }

    fn apply(&mut self, directive: Directive, entry: Entry) -> DialogResult<Flow> {
        match directive {
            Directive::Next(result) => self.advance(result),
            Directive::Prompt { prompt_id, options } => {
                self.issue_prompt(prompt_id, options, entry == Entry::Redisplay)
            }
            Directive::BeginDialog { dialog_id, args } => {
                if let Some(frame) = self.state.top_mut() {
                    frame.pending_prompt = None;
                }
                self.push_frame(dialog_id, args)
            }
            Directive::ReplaceDialog { dialog_id, args } => self.replace_frame(dialog_id, args),
            Directive::EndDialog(result) => self.pop_and_resume(result),
            Directive::CancelAllDialogs => Ok(Flow::Done(self.cancel_all_dialogs())),
        }
    }

    fn advance(&mut self, result: Option<Value>) -> DialogResult<Flow> {
        let frame = self
            .state
            .top_mut()
            .ok_or(DialogError::EmptyStack { operation: "next" })?;
        let definition = self.registry.get(&frame.dialog_id)?;
        let next_index = frame.step_index + 1;
        if next_index >= definition.step_count() {
            return Err(DialogError::WaterfallOverrun {
                dialog_id: frame.dialog_id.clone(),
                step_index: next_index,
            });
        }

        frame.step_index = next_index;
        frame.pending_prompt = None;
        Ok(Flow::Run {
            input: result,
            entry: Entry::Fresh,
        })
    }

    fn issue_prompt(
        &mut self,
        prompt_id: String,
        options: PromptOptions,
        redisplay: bool,
    ) -> DialogResult<Flow> {
        let frame = self
            .state
            .top_mut()
            .ok_or(DialogError::EmptyStack { operation: "prompt" })?;
        let definition = self.registry.get(&frame.dialog_id)?;
        if definition.prompt(&prompt_id).is_none() {
            return Err(DialogError::UnknownPrompt {
                dialog_id: frame.dialog_id.clone(),
                prompt_id,
            });
        }

        let attempts = frame
            .pending_prompt
            .as_ref()
            .filter(|pending| pending.prompt_id == prompt_id)
            .map_or(0, |pending| pending.attempts);
        frame.pending_prompt = Some(PendingPrompt {
            prompt_id: prompt_id.clone(),
            attempts,
            choices: options.choices.clone(),
        });

        debug!(
            dialog_id = %frame.dialog_id,
            prompt_id = %prompt_id,
            step_index = frame.step_index,
            attempts, "prompt issued"
        );
        let event = DialogEvent::PromptIssued {
            dialog_id: frame.dialog_id.clone(),
            prompt_id,
            step_index: frame.step_index,
            attempt: attempts,
            at: Utc::now(),
        };
        let shown = if redisplay { 0 } else { attempts };
        if let Some(activity) = options.activity_for_attempt(shown) {
            self.turn.send(activity);
        }
        self.turn.record(event);
        Ok(Flow::Done(DialogTurnStatus::Waiting))
    }

    fn push_frame(&mut self, dialog_id: String, args: Option<Value>) -> DialogResult<Flow> {
        self.registry.get(&dialog_id)?;
        self.state.push(DialogStackFrame::new(dialog_id.clone(), args));

        let depth = self.state.depth();
        info!(
            conversation_id = %self.state.conversation_id,
            dialog_id = %dialog_id,
            depth, "dialog begun"
        );
        self.turn.record(DialogEvent::DialogBegun {
            dialog_id,
            depth,
            at: Utc::now(),
        });
        Ok(Flow::Run {
            input: None,
            entry: Entry::Fresh,
        })
    }

    fn replace_frame(&mut self, dialog_id: String, args: Option<Value>) -> DialogResult<Flow> {
        self.registry.get(&dialog_id)?;
        let previous = self.state.top().map(|frame| frame.dialog_id.clone()).ok_or(
            DialogError::EmptyStack {
                operation: "replace_dialog",
            },
        )?;
        self.state
            .replace_top(DialogStackFrame::new(dialog_id.clone(), args));

        let depth = self.state.depth();
        info!(from = %previous, to = %dialog_id, depth, "dialog replaced");
        self.turn.record(DialogEvent::DialogReplaced {
            from: previous,
            to: dialog_id,
            depth,
            at: Utc::now(),
        });
        Ok(Flow::Run {
            input: None,
            entry: Entry::Fresh,
        })
    }

    fn pop_and_resume(&mut self, result: Option<Value>) -> DialogResult<Flow> {
        let frame = self.state.pop().ok_or(DialogError::EmptyStack {
            operation: "end_dialog",
        })?;
        let depth = self.state.depth();
        info!(
            conversation_id = %self.state.conversation_id,
            dialog_id = %frame.dialog_id,
            depth, "dialog ended"
        );
        self.turn.record(DialogEvent::DialogEnded {
            dialog_id: frame.dialog_id,
            result: result.clone(),
            depth,
            at: Utc::now(),
        });

        let Some(parent) = self.state.top() else {
            self.outcome = Some(StackOutcome::Completed(result.clone()));
            return Ok(Flow::Done(DialogTurnStatus::Complete(result)));
        };

        // An interrupted parent is still waiting on its own prompt.
        if parent.is_awaiting_input() {
            if self.suppress_resume_reprompt {
                return Ok(Flow::Done(DialogTurnStatus::Waiting));
            }
            return Ok(Flow::Run {
                input: parent.step_input.clone(),
                entry: Entry::Redisplay,
            });
        }

        self.advance(result)
    }
}
