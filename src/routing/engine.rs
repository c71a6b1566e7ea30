//! Per-turn dispatch
//!
//! [`DialogEngine`] is the entry point the transport adapter calls once per
//! inbound activity. It loads the conversation's stack, dispatches on the
//! activity type, fires the [`TurnHandler`] hooks and saves the stack.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

use crate::aggregate::ConversationDialogState;
use crate::config::EngineConfig;
use crate::dialogs::context::StackOutcome;
use crate::dialogs::{DialogContext, DialogRegistry, DialogTurnStatus};
use crate::error::{DialogError, DialogResult};
use crate::events::DialogEvent;
use crate::interruption::{InterruptionRouter, Recognizer};
use crate::store::StateStore;
use crate::turn::TurnContext;
use crate::value_objects::{Activity, ActivityType, OutgoingActivity};

/// Host hooks invoked by the engine
#[async_trait]
pub trait TurnHandler: Send + Sync {
    /// A message arrived while no dialog is active
    async fn route(&self, dc: &mut DialogContext<'_>) -> DialogResult<()>;

    /// The user entered the conversation
    async fn on_start(&self, _dc: &mut DialogContext<'_>) -> DialogResult<()> {
        Ok(())
    }

    /// The last frame ended during this turn
    async fn complete(&self, _dc: &mut DialogContext<'_>, _result: Option<Value>) -> DialogResult<()> {
        Ok(())
    }

    /// The stack was cancelled during this turn
    async fn on_cancelled(&self, _dc: &mut DialogContext<'_>) -> DialogResult<()> {
        Ok(())
    }

    /// Event activity, or a message with a `value` while no dialog is active
    async fn on_event(&self, _dc: &mut DialogContext<'_>) -> DialogResult<()> {
        Ok(())
    }

    /// Any other activity type; start activities arrive here after `on_start`
    async fn on_system_message(&self, _dc: &mut DialogContext<'_>) -> DialogResult<()> {
        Ok(())
    }
}

/// What one turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// Replies for the transport, in send order
    pub responses: Vec<OutgoingActivity>,
    pub events: Vec<DialogEvent>,
    /// Stack depth after the turn
    pub depth: usize,
    /// The turn failed and the conversation's state was cleared
    pub failed: bool,
}

impl TurnOutcome {
    fn from_turn(turn: &mut TurnContext, depth: usize, failed: bool) -> Self {
        Self {
            conversation_id: turn.activity().conversation_id.clone(),
            responses: turn.take_responses(),
            events: turn.take_events(),
            depth,
            failed,
        }
    }

    /// Texts of the replies, skipping non-text ones
    pub fn texts(&self) -> Vec<&str> {
        self.responses
            .iter()
            .filter_map(|reply| reply.text.as_deref())
            .collect()
    }
}

/// Conversational turn engine
pub struct DialogEngine {
    registry: Arc<DialogRegistry>,
    store: Arc<dyn StateStore>,
    interruptions: InterruptionRouter,
    handler: Arc<dyn TurnHandler>,
    config: EngineConfig,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for DialogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogEngine")
            .field("dialogs", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl DialogEngine {
    pub fn builder() -> DialogEngineBuilder {
        DialogEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DialogRegistry {
        &self.registry
    }

    /// Run one turn; errors propagate and nothing is saved
    pub async fn on_turn(&self, activity: Activity) -> DialogResult<TurnOutcome> {
        let mut turn = self.begin_turn(activity);
        let depth = self.run(&mut turn).await?;
        Ok(TurnOutcome::from_turn(&mut turn, depth, false))
    }

    /// Run one turn at the outermost boundary
    ///
    /// A failure is logged, the configured error message is appended to the
    /// replies and the conversation's persisted state is deleted.
    pub async fn process_turn(&self, activity: Activity) -> TurnOutcome {
        let mut turn = self.begin_turn(activity);
        match self.run(&mut turn).await {
            Ok(depth) => TurnOutcome::from_turn(&mut turn, depth, false),
            Err(err) => {
                let conversation_id = turn.activity().conversation_id.clone();
                error!(conversation_id = %conversation_id, error = %err, "turn failed");
                turn.send_text(self.config.error_message.clone());
                if let Err(clear_err) = self.store.delete(&conversation_id).await {
                    error!(conversation_id = %conversation_id, error = %clear_err, "failed to clear dialog state");
                }
                TurnOutcome::from_turn(&mut turn, 0, true)
            }
        }
    }

    fn begin_turn(&self, activity: Activity) -> TurnContext {
        let seed = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_u64();
        TurnContext::new(
            activity,
            self.config.default_locale.clone(),
            StdRng::seed_from_u64(seed),
        )
        .with_fallback_locales(self.config.fallback_locales.clone())
    }

    async fn run(&self, turn: &mut TurnContext) -> DialogResult<usize> {
        let conversation_id = turn.activity().conversation_id.clone();
        let mut state = self
            .store
            .load(&conversation_id)
            .await?
            .unwrap_or_else(|| ConversationDialogState::empty(conversation_id.clone()));
        debug!(
            conversation_id = %conversation_id,
            activity_type = ?turn.activity().activity_type,
            depth = state.depth(),
            "turn started"
        );

        self.dispatch(turn, &mut state).await?;

        self.store.save(&conversation_id, &mut state).await?;
        Ok(state.depth())
    }

    async fn dispatch(
        &self,
        turn: &mut TurnContext,
        state: &mut ConversationDialogState,
    ) -> DialogResult<()> {
        let mut dc = DialogContext::new(turn, state, &self.registry)
            .with_max_prompt_attempts(self.config.max_prompt_attempts);
        let is_start = dc.turn().activity().is_start_activity();
        let activity_type = dc.turn().activity().activity_type;

        if is_start {
            info!("conversation started");
            self.handler.on_start(&mut dc).await?;
        }

        match activity_type {
            ActivityType::Message => self.on_message(&mut dc).await?,
            ActivityType::Event => self.handler.on_event(&mut dc).await?,
            ActivityType::ConversationUpdate
            | ActivityType::ContactRelationUpdate
            | ActivityType::EndOfConversation
            | ActivityType::Typing => self.handler.on_system_message(&mut dc).await?,
        }

        match dc.take_outcome() {
            Some(StackOutcome::Completed(result)) => self.handler.complete(&mut dc, result).await,
            Some(StackOutcome::Cancelled) => self.handler.on_cancelled(&mut dc).await,
            None => Ok(()),
        }
    }

    async fn on_message(&self, dc: &mut DialogContext<'_>) -> DialogResult<()> {
        let activity = dc.turn().activity();
        let has_text = activity.trimmed_text().is_some();
        let has_value = activity.value.is_some();
        if !has_text && !has_value && activity.attachments.is_empty() {
            debug!("empty message ignored");
            return Ok(());
        }

        if has_value && dc.active_dialog().is_none() {
            return self.handler.on_event(dc).await;
        }

        if self.interruptions.continue_dialog(dc).await? == DialogTurnStatus::Empty {
            self.handler.route(dc).await?;
        }
        Ok(())
    }
}

/// Collects the engine's collaborators; every one is required
#[derive(Default)]
pub struct DialogEngineBuilder {
    registry: Option<DialogRegistry>,
    store: Option<Arc<dyn StateStore>>,
    recognizer: Option<Arc<dyn Recognizer>>,
    handler: Option<Arc<dyn TurnHandler>>,
    config: EngineConfig,
}

impl DialogEngineBuilder {
    pub fn registry(mut self, registry: DialogRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn TurnHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with `MissingService` for an absent collaborator and with
    /// `UnknownDialog` when the configured cancel/help dialogs are not registered
    pub fn build(self) -> DialogResult<DialogEngine> {
        let registry = self
            .registry
            .ok_or(DialogError::MissingService("dialog registry"))?;
        let store = self.store.ok_or(DialogError::MissingService("state store"))?;
        let recognizer = self
            .recognizer
            .ok_or(DialogError::MissingService("recognizer"))?;
        let handler = self
            .handler
            .ok_or(DialogError::MissingService("turn handler"))?;

        let interruption = &self.config.interruption;
        for dialog_id in [&interruption.cancel_dialog, &interruption.help_dialog] {
            if !registry.contains(dialog_id) {
                return Err(DialogError::UnknownDialog {
                    dialog_id: dialog_id.clone(),
                });
            }
        }

        let rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            dialogs = registry.len(),
            default_locale = %self.config.default_locale,
            max_prompt_attempts = ?self.config.max_prompt_attempts,
            "dialog engine ready"
        );

        Ok(DialogEngine {
            registry: Arc::new(registry),
            store,
            interruptions: InterruptionRouter::new(recognizer, self.config.interruption.clone()),
            handler,
            config: self.config,
            rng: Mutex::new(rng),
        })
    }
}
