//! Dictionary-backed template renderer
//!
//! Two-level lookup `locale → templateId → render fn`:
//!
//! ```ignore
//! let renderer = DictionaryRenderer::new()
//!     .with_template("en", "greeting", |_, data| Some(format!("Hi {}", data["name"]).into()))
//!     .with_template("default", "greeting", |_, _| Some("Hallo".into()));
//! templates.register(Arc::new(renderer));
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{LocaleResources, RenderOutput, TemplateRenderer, format_template};
use crate::turn::TurnContext;

/// Render function for one `(locale, templateId)` entry
pub type TemplateFn = Arc<dyn Fn(&TurnContext, &Value) -> Option<RenderOutput> + Send + Sync>;

/// Immutable-after-build dictionary of render functions
#[derive(Clone, Default)]
pub struct DictionaryRenderer {
    languages: HashMap<String, HashMap<String, TemplateFn>>,
}

impl std::fmt::Debug for DictionaryRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut locales: Vec<_> = self.languages.keys().collect();
        locales.sort();
        f.debug_struct("DictionaryRenderer")
            .field("locales", &locales)
            .finish()
    }
}

impl DictionaryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a render function
    pub fn with_template<F>(
        mut self,
        locale: impl Into<String>,
        template_id: impl Into<String>,
        render: F,
    ) -> Self
    where
        F: Fn(&TurnContext, &Value) -> Option<RenderOutput> + Send + Sync + 'static,
    {
        self.languages
            .entry(locale.into())
            .or_default()
            .insert(template_id.into(), Arc::new(render));
        self
    }

    /// Add a template whose text comes from locale resources
    ///
    /// The resource is looked up in the turn locale, and `{field}`
    /// placeholders are filled from the render data.
    pub fn with_resource(
        self,
        locale: impl Into<String>,
        template_id: impl Into<String>,
        resources: Arc<dyn LocaleResources>,
        key: impl Into<String>,
    ) -> Self {
        let key = key.into();
        self.with_template(locale, template_id, move |turn, data| {
            resources
                .get(&key, turn.locale())
                .map(|text| RenderOutput::Text(format_template(&text, data)))
        })
    }

    /// Whether an entry exists for the pair
    pub fn contains(&self, locale: &str, template_id: &str) -> bool {
        self.languages
            .get(locale)
            .is_some_and(|templates| templates.contains_key(template_id))
    }
}

impl TemplateRenderer for DictionaryRenderer {
    fn render_template(
        &self,
        turn: &TurnContext,
        locale: &str,
        template_id: &str,
        data: &Value,
    ) -> Option<RenderOutput> {
        let template = self.languages.get(locale)?.get(template_id)?;
        template(turn, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::StaticResources;
    use crate::value_objects::Activity;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    #[test]
    fn test_resource_template_formats_data() {
        let resources = StaticResources::new("de")
            .with_entry("de", "greeting.withName", "Hallo {firstName}!")
            .with_entry("en", "greeting.withName", "Hello {firstName}!");
        let renderer = DictionaryRenderer::new().with_resource(
            "default",
            "greetingUser",
            Arc::new(resources),
            "greeting.withName",
        );

        let turn = TurnContext::new(
            Activity::message("c1", "hi").with_locale("en"),
            "de",
            StdRng::seed_from_u64(3),
        );
        let output = renderer
            .render_template(&turn, "default", "greetingUser", &json!({"firstName": "Ada"}))
            .unwrap();
        assert_eq!(output, RenderOutput::Text("Hello Ada!".to_string()));
        assert!(renderer.contains("default", "greetingUser"));
        assert!(renderer.render_template(&turn, "en", "greetingUser", &json!({})).is_none());
    }
}
