//! Built-in dialogs
//!
//! The cancel and help dialogs are what the interruption router pushes. Both
//! receive their [`TemplateManager`] at construction; their texts are looked up
//! by the template ids below so hosts supply wording per locale.

use serde_json::{Value, json};
use std::sync::Arc;

use super::prompt::{PromptOptions, PromptSpec};
use super::waterfall::Directive;
use super::DialogDefinition;
use crate::templates::{ResponseVariants, TemplateManager};

pub const CANCEL_DIALOG_ID: &str = "CancelDialog";
pub const HELP_DIALOG_ID: &str = "HelpDialog";

pub const CANCEL_PROMPT_TEMPLATE: &str = "cancelPrompt";
pub const CANCEL_CONFIRMED_TEMPLATE: &str = "cancelConfirmed";
pub const CANCEL_DENIED_TEMPLATE: &str = "cancelDenied";
pub const HELP_PROMPT_TEMPLATE: &str = "helpPrompt";
/// Topic labels are `optionNr1..=optionNr{HELP_TOPICS}`
pub const HELP_OPTION_PREFIX: &str = "optionNr";
/// Topic texts are `textNr1..=textNr{HELP_TOPICS}`
pub const HELP_TEXT_PREFIX: &str = "textNr";
pub const HELP_TEXT_DEFAULT_TEMPLATE: &str = "textDefault";
pub const HELP_TOPICS: usize = 4;

const CONFIRM_CANCEL_PROMPT: &str = "confirmCancel";
const HELP_TOPIC_PROMPT: &str = "helpTopic";

/// Confirm, then cancel every frame (yes) or return to the interrupted prompt (no)
pub fn cancel_dialog(templates: Arc<TemplateManager>) -> DialogDefinition {
    let prompt_templates = Arc::clone(&templates);

    DialogDefinition::builder(CANCEL_DIALOG_ID)
        .interruptible(false)
        .prompt(PromptSpec::confirm(CONFIRM_CANCEL_PROMPT))
        .step(move |step| {
            let prompt = step.render(&prompt_templates, CANCEL_PROMPT_TEMPLATE, &Value::Null);
            Ok(Directive::prompt(
                CONFIRM_CANCEL_PROMPT,
                PromptOptions::from_prompt(prompt),
            ))
        })
        .step(move |step| {
            let confirmed = step.result().and_then(Value::as_bool).unwrap_or(false);
            if confirmed {
                step.reply_with(&templates, CANCEL_CONFIRMED_TEMPLATE, &Value::Null);
                Ok(Directive::CancelAllDialogs)
            } else {
                step.reply_with(&templates, CANCEL_DENIED_TEMPLATE, &Value::Null);
                Ok(Directive::end_dialog(json!(false)))
            }
        })
        .build()
}

/// Offer the help topics, then show the chosen topic's text
pub fn help_dialog(templates: Arc<TemplateManager>) -> DialogDefinition {
    let prompt_templates = Arc::clone(&templates);

    DialogDefinition::builder(HELP_DIALOG_ID)
        .prompt(PromptSpec::choice(HELP_TOPIC_PROMPT))
        .step(move |step| {
            let choices: Vec<String> = (1..=HELP_TOPICS)
                .filter_map(|number| {
                    let template_id = format!("{HELP_OPTION_PREFIX}{number}");
                    step.render(&prompt_templates, &template_id, &Value::Null)
                        .and_then(|option| option.text)
                })
                .collect();
            let prompt = step.render(&prompt_templates, HELP_PROMPT_TEMPLATE, &Value::Null);
            Ok(Directive::prompt(
                HELP_TOPIC_PROMPT,
                PromptOptions::from_prompt(prompt).with_choices(choices),
            ))
        })
        .step(move |step| {
            let topic = step
                .result()
                .and_then(|choice| choice.get("index"))
                .and_then(Value::as_u64);
            let shown = topic.is_some_and(|index| {
                let template_id = format!("{HELP_TEXT_PREFIX}{}", index + 1);
                step.reply_with(&templates, &template_id, &Value::Null)
            });
            if !shown {
                step.reply_with(&templates, HELP_TEXT_DEFAULT_TEMPLATE, &Value::Null);
            }
            Ok(Directive::end_dialog(None))
        })
        .build()
}

/// One-step dialog sending a greeting/farewell style message
///
/// With a `firstName` in the begin arguments the personalized template is
/// rendered with those arguments; otherwise a numbered variant is picked with
/// the turn's random source.
pub fn variant_response_dialog(
    dialog_id: impl Into<String>,
    templates: Arc<TemplateManager>,
    variants: ResponseVariants,
    personalized_template: impl Into<String>,
) -> DialogDefinition {
    let personalized_template = personalized_template.into();

    DialogDefinition::builder(dialog_id)
        .step(move |step| {
            let data = step.options().cloned().unwrap_or(Value::Null);
            let has_name = data
                .get("firstName")
                .and_then(Value::as_str)
                .is_some_and(|name| !name.is_empty());

            let template_id = if has_name {
                personalized_template.clone()
            } else {
                variants.pick(step.rng())
            };
            step.reply_with(&templates, &template_id, &data);
            Ok(Directive::end_dialog(None))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ConversationDialogState;
    use crate::dialogs::{DialogContext, DialogRegistry, DialogTurnStatus};
    use crate::templates::DictionaryRenderer;
    use crate::turn::TurnContext;
    use crate::value_objects::Activity;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn templates() -> Arc<TemplateManager> {
        let renderer = DictionaryRenderer::new()
            .with_template("default", "greetingNr1", |_, _| Some("Hallo!".into()))
            .with_template("default", "greetingNr2", |_, _| Some("Servus!".into()))
            .with_template("default", "greetingUser", |_, data| {
                Some(format!("Hallo {}!", data["firstName"].as_str().unwrap_or_default()).into())
            });
        Arc::new(TemplateManager::new().with_renderer(Arc::new(renderer)))
    }

    #[test]
    fn test_personalized_greeting() {
        let registry = DialogRegistry::new(vec![variant_response_dialog(
            "greeting",
            templates(),
            ResponseVariants::new("greetingNr", 2),
            "greetingUser",
        )])
        .unwrap();
        let mut state = ConversationDialogState::empty("c1");
        let mut turn = TurnContext::new(Activity::message("c1", "hi"), "de", StdRng::seed_from_u64(9));
        let mut dc = DialogContext::new(&mut turn, &mut state, &registry);

        let status = tokio_test::block_on(dc.begin_dialog("greeting", Some(json!({"firstName": "Ada"}))))
            .unwrap();
        assert_eq!(status, DialogTurnStatus::Complete(None));
        assert_eq!(turn.responses()[0].text.as_deref(), Some("Hallo Ada!"));
    }

    #[test]
    fn test_anonymous_greeting_picks_a_variant() {
        let registry = DialogRegistry::new(vec![variant_response_dialog(
            "greeting",
            templates(),
            ResponseVariants::new("greetingNr", 2),
            "greetingUser",
        )])
        .unwrap();
        let mut state = ConversationDialogState::empty("c1");
        let mut turn = TurnContext::new(Activity::message("c1", "hi"), "de", StdRng::seed_from_u64(9));
        let mut dc = DialogContext::new(&mut turn, &mut state, &registry);

        tokio_test::block_on(dc.begin_dialog("greeting", None)).unwrap();
        let text = turn.responses()[0].text.clone().unwrap();
        assert!(text == "Hallo!" || text == "Servus!");
    }
}
