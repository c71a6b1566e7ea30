//! Locale-aware response rendering
//!
//! A [`TemplateManager`] resolves `templateId × locale` to content by walking a
//! candidate locale list - the requested locale, then the manager's language
//! policy, then the engine's fallback locales carried by the turn, then
//! `default` - and asking each registered [`TemplateRenderer`] in registration
//! order. The first non-empty result wins; when nothing matches the caller gets
//! `None` and treats it as a no-op.

pub mod dictionary;
pub mod resources;

pub use dictionary::{DictionaryRenderer, TemplateFn};
pub use resources::{LocaleResources, ResponseVariants, StaticResources, format_template};

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::turn::TurnContext;
use crate::value_objects::OutgoingActivity;

/// Locale key tried after every other candidate
pub const DEFAULT_LOCALE: &str = "default";

/// What a render function produced
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    /// Plain text, wrapped into a message on the way out
    Text(String),
    /// Structured message (cards, suggested actions, ...)
    Activity(OutgoingActivity),
}

impl RenderOutput {
    fn is_empty(&self) -> bool {
        match self {
            RenderOutput::Text(text) => text.is_empty(),
            RenderOutput::Activity(activity) => activity.is_empty(),
        }
    }

    fn into_activity(self) -> OutgoingActivity {
        match self {
            RenderOutput::Text(text) => OutgoingActivity::text(text),
            RenderOutput::Activity(activity) => activity,
        }
    }
}

impl From<String> for RenderOutput {
    fn from(text: String) -> Self {
        RenderOutput::Text(text)
    }
}

impl From<&str> for RenderOutput {
    fn from(text: &str) -> Self {
        RenderOutput::Text(text.to_string())
    }
}

impl From<OutgoingActivity> for RenderOutput {
    fn from(activity: OutgoingActivity) -> Self {
        RenderOutput::Activity(activity)
    }
}

/// Binds data to a template for one locale
pub trait TemplateRenderer: Send + Sync {
    /// Render `template_id` for exactly `locale`; `None` when this renderer has no entry
    fn render_template(
        &self,
        turn: &TurnContext,
        locale: &str,
        template_id: &str,
        data: &Value,
    ) -> Option<RenderOutput>;
}

/// Registered renderers plus the language fallback policy
#[derive(Clone, Default)]
pub struct TemplateManager {
    renderers: Vec<Arc<dyn TemplateRenderer>>,
    language_policy: Vec<String>,
}

impl std::fmt::Debug for TemplateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateManager")
            .field("renderers", &self.renderers.len())
            .field("language_policy", &self.language_policy)
            .finish()
    }
}

impl TemplateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a renderer unless that same renderer is already registered
    pub fn register(&mut self, renderer: Arc<dyn TemplateRenderer>) -> &mut Self {
        if !self.renderers.iter().any(|known| Arc::ptr_eq(known, &renderer)) {
            self.renderers.push(renderer);
        }
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.register(renderer);
        self
    }

    pub fn list(&self) -> &[Arc<dyn TemplateRenderer>] {
        &self.renderers
    }

    pub fn set_language_policy(&mut self, fallback: Vec<String>) {
        self.language_policy = fallback;
    }

    pub fn with_language_policy(mut self, fallback: Vec<String>) -> Self {
        self.language_policy = fallback;
        self
    }

    pub fn language_policy(&self) -> &[String] {
        &self.language_policy
    }

    /// Candidate locales in lookup order
    pub fn candidate_locales(&self, locale: Option<&str>) -> Vec<String> {
        self.candidate_chain(locale, &[])
    }

    fn candidate_chain(&self, locale: Option<&str>, turn_fallback: &[String]) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let candidates = locale
            .into_iter()
            .map(str::to_string)
            .chain(self.language_policy.iter().cloned())
            .chain(turn_fallback.iter().cloned())
            .chain(std::iter::once(DEFAULT_LOCALE.to_string()));
        for candidate in candidates {
            if !chain.contains(&candidate) {
                chain.push(candidate);
            }
        }
        chain
    }

    /// Render a template through the fallback chain
    pub fn render_template(
        &self,
        turn: &TurnContext,
        template_id: &str,
        locale: Option<&str>,
        data: &Value,
    ) -> Option<OutgoingActivity> {
        for candidate in self.candidate_chain(locale, turn.fallback_locales()) {
            for renderer in &self.renderers {
                let Some(output) = renderer.render_template(turn, &candidate, template_id, data)
                else {
                    continue;
                };
                if output.is_empty() {
                    continue;
                }
                debug!(template_id, locale = %candidate, "template resolved");
                return Some(output.into_activity());
            }
        }

        debug!(template_id, ?locale, "no template content");
        None
    }

    /// Render with the turn's locale and send when something was produced
    pub fn reply_with(&self, turn: &mut TurnContext, template_id: &str, data: &Value) -> bool {
        let locale = turn.locale().to_string();
        match self.render_template(turn, template_id, Some(&locale), data) {
            Some(reply) => {
                turn.send(reply);
                true
            }
            None => false,
        }
    }
}
