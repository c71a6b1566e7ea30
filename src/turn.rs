//! Turn-scoped context
//!
//! A [`TurnContext`] lives for exactly one inbound activity. Everything that is
//! specific to the turn - the activity, the replies produced so far, the events
//! recorded and the random source - is carried here instead of in dialogs.

use rand::rngs::StdRng;

use crate::events::DialogEvent;
use crate::value_objects::{Activity, OutgoingActivity};

/// State of one inbound-activity/outbound-response cycle
#[derive(Debug)]
pub struct TurnContext {
    activity: Activity,
    default_locale: String,
    fallback_locales: Vec<String>,
    responses: Vec<OutgoingActivity>,
    events: Vec<DialogEvent>,
    rng: StdRng,
}

impl TurnContext {
    pub fn new(activity: Activity, default_locale: impl Into<String>, rng: StdRng) -> Self {
        Self {
            activity,
            default_locale: default_locale.into(),
            fallback_locales: Vec::new(),
            responses: Vec::new(),
            events: Vec::new(),
            rng,
        }
    }

    /// The inbound activity
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Activity locale, or the configured default
    pub fn locale(&self) -> &str {
        self.activity
            .locale
            .as_deref()
            .filter(|locale| !locale.is_empty())
            .unwrap_or(&self.default_locale)
    }

    /// Engine-wide locales tried after a template manager's own policy
    pub fn with_fallback_locales(mut self, locales: Vec<String>) -> Self {
        self.fallback_locales = locales;
        self
    }

    pub fn fallback_locales(&self) -> &[String] {
        &self.fallback_locales
    }

    /// Queue a reply for the transport
    pub fn send(&mut self, mut reply: OutgoingActivity) {
        if reply.locale.is_none() {
            reply.locale = self.activity.locale.clone();
        }
        if reply.reply_to_id.is_none() {
            reply.reply_to_id = self.activity.id.clone();
        }
        self.responses.push(reply);
    }

    pub fn send_text(&mut self, text: impl Into<String>) {
        self.send(OutgoingActivity::text(text));
    }

    /// Replies produced so far this turn
    pub fn responses(&self) -> &[OutgoingActivity] {
        &self.responses
    }

    pub fn take_responses(&mut self) -> Vec<OutgoingActivity> {
        std::mem::take(&mut self.responses)
    }

    /// Injected random source for response variants
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn record(&mut self, event: DialogEvent) {
        self.events.push(event);
    }

    /// Stack events recorded so far this turn
    pub fn events(&self) -> &[DialogEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DialogEvent> {
        std::mem::take(&mut self.events)
    }
}
