//! Locale resource lookup and response variants

use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::DialogResult;

/// `get(key, locale) → text` lookup used by render functions
pub trait LocaleResources: Send + Sync {
    fn get(&self, key: &str, locale: &str) -> Option<String>;
}

/// In-memory resource table with a default locale
///
/// A locale such as `de-DE` is tried as-is, then as its language (`de`),
/// then as the default locale.
#[derive(Debug, Clone, Default)]
pub struct StaticResources {
    default_locale: String,
    entries: HashMap<String, HashMap<String, String>>,
}

impl StaticResources {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            entries: HashMap::new(),
        }
    }

    /// Load `{ "<locale>": { "<key>": "<text>" } }`
    pub fn from_json(default_locale: impl Into<String>, json: &str) -> DialogResult<Self> {
        let entries: HashMap<String, HashMap<String, String>> = serde_json::from_str(json)?;
        Ok(Self {
            default_locale: default_locale.into(),
            entries,
        })
    }

    pub fn with_entry(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.entries
            .entry(locale.into())
            .or_default()
            .insert(key.into(), text.into());
        self
    }

    fn lookup(&self, key: &str, locale: &str) -> Option<&String> {
        self.entries.get(locale)?.get(key)
    }
}

impl LocaleResources for StaticResources {
    fn get(&self, key: &str, locale: &str) -> Option<String> {
        let language = locale.split(['-', '_']).next().unwrap_or(locale);
        self.lookup(key, locale)
            .or_else(|| self.lookup(key, language))
            .or_else(|| self.lookup(key, &self.default_locale))
            .cloned()
    }
}

/// Fill `{field}` placeholders from a JSON object; `{0}` takes `firstName`
pub fn format_template(template: &str, data: &Value) -> String {
    let Some(fields) = data.as_object() else {
        return template.to_string();
    };

    let mut rendered = template.to_string();
    for (name, value) in fields {
        let text = match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&format!("{{{name}}}"), &text);
        if name == "firstName" {
            rendered = rendered.replace("{0}", &text);
        }
    }
    rendered
}

/// Numbered response variants (`farewellNr1` .. `farewellNrN`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseVariants {
    prefix: String,
    count: u32,
}

impl ResponseVariants {
    pub fn new(prefix: impl Into<String>, count: u32) -> Self {
        Self {
            prefix: prefix.into(),
            count: count.max(1),
        }
    }

    /// Template id of a uniformly chosen variant
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let number = rng.gen_range(1..=self.count);
        format!("{}{}", self.prefix, number)
    }
}
