//! Integration tests for the turn engine
//!
//! These tests verify complete multi-turn conversations including:
//! - Cancel and help interruptions with prompt re-display
//! - Turn failure handling and state clearing
//! - Locale fallback in rendered replies
//! - Seeded response variants
//! - Independent concurrent conversations

use async_trait::async_trait;
use dialog_turn_engine::{
    Activity, ActivityType, DialogContext, DialogDefinition, DialogEngine, DialogError, DialogEvent,
    DialogRegistry, DialogResult, Directive, DictionaryRenderer, EngineConfig, InMemoryStateStore,
    InterruptionStatus, OutgoingActivity, PromptOptions, PromptSpec, Recognizer,
    RecognizerResult, ResponseVariants, StateStore, StaticResources, TemplateManager,
    TurnHandler, cancel_dialog, help_dialog, variant_response_dialog,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keyword-driven stand-in for the intent service
#[derive(Default)]
struct KeywordRecognizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Recognizer for KeywordRecognizer {
    async fn recognize(&self, text: &str, _locale: &str) -> DialogResult<RecognizerResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        if lower.contains("offline") {
            return Err(DialogError::RecognizerUnavailable("intent service timed out".to_string()));
        }

        let mut result = RecognizerResult::new(text).with_intent("None", 0.3);
        if lower.contains("abbrechen") || lower.contains("cancel") {
            result = result.with_intent("Cancel", 0.9);
        }
        if lower.contains("hilfe") || lower.contains("help") {
            result = result.with_intent("Help", 0.9);
        }
        Ok(result)
    }
}

struct ShopHandler {
    templates: Arc<TemplateManager>,
}

#[async_trait]
impl TurnHandler for ShopHandler {
    async fn route(&self, dc: &mut DialogContext<'_>) -> DialogResult<()> {
        let text = dc.turn().activity().trimmed_text().unwrap_or_default().to_lowercase();
        if text.contains("bestellen") {
            dc.begin_dialog("order", None).await?;
        } else if text.contains("tschüss") {
            dc.begin_dialog("farewell", None).await?;
        } else if text.contains("kaputt") {
            dc.begin_dialog("does-not-exist", None).await?;
        } else {
            let templates = Arc::clone(&self.templates);
            templates.reply_with(dc.turn_mut(), "greeting", &json!({}));
        }
        Ok(())
    }

    async fn on_event(&self, dc: &mut DialogContext<'_>) -> DialogResult<()> {
        if dc.turn().activity().name.as_deref() == Some("note") {
            dc.begin_dialog("note", None).await?;
        }
        Ok(())
    }

    async fn complete(
        &self,
        dc: &mut DialogContext<'_>,
        result: Option<serde_json::Value>,
    ) -> DialogResult<()> {
        if let Some(quantity) = result.as_ref().and_then(serde_json::Value::as_f64) {
            dc.turn_mut().send_text(format!("{quantity} Stück bestellt."));
        }
        Ok(())
    }
}

fn templates() -> Arc<TemplateManager> {
    let resources: Arc<StaticResources> = Arc::new(
        StaticResources::from_json(
            "de",
            r#"{
                "de": {"cancel.prompt": "Wirklich abbrechen?", "farewell.user": "Tschüss {firstName}!"},
                "en": {"cancel.prompt": "Really cancel?"}
            }"#,
        )
        .unwrap(),
    );

    let renderer = DictionaryRenderer::new()
        .with_resource("default", "cancelPrompt", resources.clone(), "cancel.prompt")
        .with_template("default", "cancelConfirmed", |_, _| Some("Abgebrochen.".into()))
        .with_template("default", "cancelDenied", |_, _| Some("Dann machen wir weiter.".into()))
        .with_template("default", "helpPrompt", |_, _| Some("Wobei kann ich helfen?".into()))
        .with_template("default", "optionNr1", |_, _| Some("Bestellen".into()))
        .with_template("default", "optionNr2", |_, _| Some("Kontakt".into()))
        .with_template("default", "textNr1", |_, _| Some("Sag einfach 'bestellen'.".into()))
        .with_template("default", "textNr2", |_, _| Some("Ruf uns an: 0800 123".into()))
        .with_template("default", "textDefault", |_, _| Some("Dazu habe ich nichts.".into()))
        .with_template("default", "greeting", |_, _| Some("Hallo".into()))
        .with_template("en", "greeting", |_, _| Some("Hello".into()))
        .with_template("default", "farewellNr1", |_, _| Some("Bis bald!".into()))
        .with_template("default", "farewellNr2", |_, _| Some("Auf Wiedersehen!".into()))
        .with_template("default", "farewellNr3", |_, _| Some("Ciao!".into()))
        .with_resource("default", "farewellUser", resources, "farewell.user");

    Arc::new(TemplateManager::new().with_renderer(Arc::new(renderer)))
}

fn order_dialog() -> DialogDefinition {
    DialogDefinition::builder("order")
        .prompt(PromptSpec::number("quantity").with_validator(|ctx| {
            ctx.recognized().as_f64().is_some_and(|quantity| quantity >= 1.0)
        }))
        .step(|_| {
            Ok(Directive::prompt(
                "quantity",
                PromptOptions::text("Wie viele?").with_retry_prompt(Some(OutgoingActivity::text(
                    "Bitte eine Zahl ab 1.",
                ))),
            ))
        })
        .step(|step| Ok(Directive::end_dialog(step.result().cloned())))
        .build()
}

fn note_dialog() -> DialogDefinition {
    DialogDefinition::builder("note")
        .step(|step| {
            step.reply_text("Notiert.");
            Ok(Directive::end_dialog(json!("x")))
        })
        .build()
}

struct Fixture {
    engine: DialogEngine,
    store: Arc<InMemoryStateStore>,
    recognizer: Arc<KeywordRecognizer>,
}

fn fixture(config: EngineConfig) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let templates = templates();
    let registry = DialogRegistry::new(vec![
        order_dialog(),
        note_dialog(),
        cancel_dialog(Arc::clone(&templates)),
        help_dialog(Arc::clone(&templates)),
        variant_response_dialog(
            "farewell",
            Arc::clone(&templates),
            ResponseVariants::new("farewellNr", 3),
            "farewellUser",
        ),
    ])
    .unwrap();

    let store = Arc::new(InMemoryStateStore::new());
    let recognizer = Arc::new(KeywordRecognizer::default());
    let engine = DialogEngine::builder()
        .registry(registry)
        .store(store.clone())
        .recognizer(recognizer.clone())
        .handler(Arc::new(ShopHandler { templates }))
        .config(config)
        .build()
        .unwrap();

    Fixture {
        engine,
        store,
        recognizer,
    }
}

fn say(text: &str) -> Activity {
    Activity::message("conv-shop", text)
}

#[tokio::test]
async fn test_order_conversation() {
    let fx = fixture(EngineConfig::default());

    let outcome = fx.engine.on_turn(say("Ich möchte bestellen")).await.unwrap();
    assert_eq!(outcome.texts(), ["Wie viele?"]);
    assert_eq!(outcome.depth, 1);
    // no intent check with an empty stack
    assert_eq!(fx.recognizer.calls.load(Ordering::SeqCst), 0);

    let outcome = fx.engine.on_turn(say("0")).await.unwrap();
    assert_eq!(outcome.texts(), ["Bitte eine Zahl ab 1."]);
    assert_eq!(outcome.depth, 1);

    let outcome = fx.engine.on_turn(say("3")).await.unwrap();
    assert_eq!(outcome.texts(), ["3 Stück bestellt."]);
    assert_eq!(outcome.depth, 0);
    assert!(!outcome.failed);
}

#[tokio::test]
async fn test_cancel_confirmed_clears_stack() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();

    let outcome = fx.engine.on_turn(say("abbrechen")).await.unwrap();
    assert_eq!(outcome.texts(), ["Wirklich abbrechen?"]);
    assert_eq!(outcome.depth, 2);
    assert!(outcome.events.iter().any(|event| matches!(
        event,
        DialogEvent::InterruptionRaised { status: InterruptionStatus::Waiting, .. }
    )));

    let calls_before = fx.recognizer.calls.load(Ordering::SeqCst);
    let outcome = fx.engine.on_turn(say("ja")).await.unwrap();
    assert_eq!(outcome.texts(), ["Abgebrochen."]);
    assert_eq!(outcome.depth, 0);
    // the confirmation dialog is not interruptible
    assert_eq!(fx.recognizer.calls.load(Ordering::SeqCst), calls_before);

    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_cancel_denied_redisplays_prompt() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();
    fx.engine.on_turn(say("abbrechen")).await.unwrap();

    let outcome = fx.engine.on_turn(say("nein")).await.unwrap();
    assert_eq!(outcome.texts(), ["Dann machen wir weiter.", "Wie viele?"]);
    assert_eq!(outcome.depth, 1);

    let outcome = fx.engine.on_turn(say("2")).await.unwrap();
    assert_eq!(outcome.texts(), ["2 Stück bestellt."]);
}

#[tokio::test]
async fn test_help_returns_to_interrupted_prompt() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();

    let outcome = fx.engine.on_turn(say("Hilfe")).await.unwrap();
    assert_eq!(outcome.texts(), ["Wobei kann ich helfen?"]);
    assert_eq!(outcome.responses[0].suggested_actions, ["Bestellen", "Kontakt"]);
    assert_eq!(outcome.depth, 2);

    let outcome = fx.engine.on_turn(say("2")).await.unwrap();
    assert_eq!(outcome.texts(), ["Ruf uns an: 0800 123", "Wie viele?"]);
    assert_eq!(outcome.depth, 1);

    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    let order = state.top().unwrap();
    assert_eq!(order.dialog_id, "order");
    assert_eq!(order.step_index, 0);
}

#[tokio::test]
async fn test_interruption_redisplays_original_prompt_after_retry() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();
    let outcome = fx.engine.on_turn(say("0")).await.unwrap();
    assert_eq!(outcome.texts(), ["Bitte eine Zahl ab 1."]);

    fx.engine.on_turn(say("Hilfe")).await.unwrap();
    let outcome = fx.engine.on_turn(say("1")).await.unwrap();
    assert_eq!(outcome.texts(), ["Sag einfach 'bestellen'.", "Wie viele?"]);

    fx.engine.on_turn(say("abbrechen")).await.unwrap();
    let outcome = fx.engine.on_turn(say("nein")).await.unwrap();
    assert_eq!(outcome.texts(), ["Dann machen wir weiter.", "Wie viele?"]);

    // the failed answer is still counted
    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    assert_eq!(state.top().unwrap().pending_prompt.as_ref().unwrap().attempts, 1);

    let outcome = fx.engine.on_turn(say("-2")).await.unwrap();
    assert_eq!(outcome.texts(), ["Bitte eine Zahl ab 1."]);
}

#[tokio::test]
async fn test_event_dialog_over_pending_prompt_keeps_it_pending() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();

    let mut event = Activity::new(ActivityType::Event, "conv-shop");
    event.name = Some("note".to_string());
    let outcome = fx.engine.on_turn(event).await.unwrap();

    assert_eq!(outcome.texts(), ["Notiert.", "Wie viele?"]);
    assert_eq!(outcome.depth, 1);
    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    let order = state.top().unwrap();
    assert_eq!(order.dialog_id, "order");
    assert_eq!(order.step_index, 0);
    assert_eq!(order.pending_prompt.as_ref().unwrap().prompt_id, "quantity");

    // the note's result was not taken as the quantity
    let outcome = fx.engine.on_turn(say("3")).await.unwrap();
    assert_eq!(outcome.texts(), ["3 Stück bestellt."]);
}

#[tokio::test]
async fn test_cancel_takes_priority_over_help() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();

    let outcome = fx.engine.on_turn(say("Hilfe, abbrechen!")).await.unwrap();

    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    assert_eq!(state.top().unwrap().dialog_id, "CancelDialog");
    assert_eq!(outcome.texts(), ["Wirklich abbrechen?"]);
}

#[tokio::test]
async fn test_recognizer_outage_fails_turn_without_saving() {
    let fx = fixture(EngineConfig::default());
    fx.engine.on_turn(say("bestellen")).await.unwrap();
    let version = fx.store.load("conv-shop").await.unwrap().unwrap().version;

    let err = fx.engine.on_turn(say("offline?")).await.unwrap_err();
    assert!(matches!(err, DialogError::RecognizerUnavailable(_)));

    let state = fx.store.load("conv-shop").await.unwrap().unwrap();
    assert_eq!(state.version, version);
    assert_eq!(state.depth(), 1);
}

#[tokio::test]
async fn test_failed_turn_clears_state_and_apologizes() {
    let fx = fixture(EngineConfig::default().with_error_message("Da ist etwas schiefgelaufen."));
    fx.engine.on_turn(say("bestellen")).await.unwrap();

    let outcome = fx.engine.process_turn(say("offline")).await;
    assert!(outcome.failed);
    assert_eq!(outcome.depth, 0);
    assert_eq!(outcome.texts(), ["Da ist etwas schiefgelaufen."]);
    assert!(fx.store.load("conv-shop").await.unwrap().is_none());

    // the next turn starts from an empty stack
    let outcome = fx.engine.process_turn(say("bestellen")).await;
    assert!(!outcome.failed);
    assert_eq!(outcome.texts(), ["Wie viele?"]);
}

#[tokio::test]
async fn test_unknown_dialog_fails_turn() {
    let fx = fixture(EngineConfig::default());

    let err = fx.engine.on_turn(say("alles kaputt")).await.unwrap_err();
    assert!(matches!(err, DialogError::UnknownDialog { ref dialog_id } if dialog_id == "does-not-exist"));

    let outcome = fx.engine.process_turn(say("alles kaputt")).await;
    assert!(outcome.failed);
    assert_eq!(outcome.texts(), [EngineConfig::default().error_message.as_str()]);
}

#[tokio::test]
async fn test_locale_fallback_chain() {
    let fx = fixture(EngineConfig::default().with_fallback_locales(vec!["it".to_string()]));

    let outcome = fx.engine.on_turn(say("hi").with_locale("en")).await.unwrap();
    assert_eq!(outcome.texts(), ["Hello"]);
    assert_eq!(outcome.responses[0].locale.as_deref(), Some("en"));

    let outcome = fx.engine.on_turn(say("salut").with_locale("fr")).await.unwrap();
    assert_eq!(outcome.texts(), ["Hallo"]);

    fx.engine.on_turn(say("bestellen").with_locale("en")).await.unwrap();
    let outcome = fx.engine.on_turn(say("cancel").with_locale("en-US")).await.unwrap();
    assert_eq!(outcome.texts(), ["Really cancel?"]);
}

#[tokio::test]
async fn test_configured_fallback_locales_reach_templates() {
    let fx = fixture(EngineConfig::default().with_fallback_locales(vec!["en".to_string()]));
    let outcome = fx.engine.on_turn(say("salut").with_locale("fr")).await.unwrap();
    assert_eq!(outcome.texts(), ["Hello"]);

    let fx = fixture(EngineConfig::default());
    let outcome = fx.engine.on_turn(say("salut").with_locale("fr")).await.unwrap();
    assert_eq!(outcome.texts(), ["Hallo"]);
}

#[tokio::test]
async fn test_seeded_farewell_variants_repeat() {
    let first = fixture(EngineConfig::default().with_rng_seed(42));
    let second = fixture(EngineConfig::default().with_rng_seed(42));

    let mut first_texts = Vec::new();
    let mut second_texts = Vec::new();
    for _ in 0..6 {
        let outcome = first.engine.on_turn(say("tschüss")).await.unwrap();
        first_texts.push(outcome.texts().concat());
        let outcome = second.engine.on_turn(say("tschüss")).await.unwrap();
        second_texts.push(outcome.texts().concat());
    }

    assert_eq!(first_texts, second_texts);
    assert!(first_texts
        .iter()
        .all(|text| ["Bis bald!", "Auf Wiedersehen!", "Ciao!"].contains(&text.as_str())));
}

#[tokio::test]
async fn test_conversations_are_independent() {
    let fx = fixture(EngineConfig::default());

    let (a, b) = tokio::join!(
        fx.engine.on_turn(Activity::message("conv-a", "bestellen")),
        fx.engine.on_turn(Activity::message("conv-b", "bestellen")),
    );
    assert_eq!(a.unwrap().depth, 1);
    assert_eq!(b.unwrap().depth, 1);

    let a = fx
        .engine
        .on_turn(Activity::message("conv-a", "5"))
        .await
        .unwrap();
    assert_eq!(a.depth, 0);

    let b_state = fx.store.load("conv-b").await.unwrap().unwrap();
    assert_eq!(b_state.depth(), 1);
    assert_eq!(fx.store.len().await, 2);
}

#[tokio::test]
async fn test_engine_from_json_config() {
    let config = EngineConfig::from_json_str(
        r#"{"default_locale": "en", "max_prompt_attempts": 2, "error_message": "Sorry!"}"#,
    )
    .unwrap();
    let fx = fixture(config);
    assert_eq!(fx.engine.config().default_locale, "en");

    fx.engine.on_turn(say("bestellen")).await.unwrap();
    fx.engine.on_turn(say("null")).await.unwrap();
    let outcome = fx.engine.on_turn(say("keine")).await.unwrap();

    // second failed answer ends the order without a result
    assert_eq!(outcome.depth, 0);
    assert!(outcome.texts().is_empty());
}
