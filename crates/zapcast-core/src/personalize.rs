//! Message personalization
//!
//! Placeholders are written `{{key}}` or `{key}` and matched
//! case-insensitively. Keys missing from the variable map are left in the
//! text untouched.

use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Placeholder holding the contact's display name
pub const NAME_TOKEN: &str = "nome";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}|\{([^{}\s]+)\}").expect("placeholder regex is valid")
    })
}

/// Resolves the literal text sent to each contact
#[derive(Debug, Clone, Default)]
pub struct MessagePersonalizer;

impl MessagePersonalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produce the text for one contact.
    ///
    /// A pre-rendered `custom` message replaces the template. Otherwise every
    /// placeholder found in `variables` is substituted. The name token is
    /// resolved last in both cases, and only when a name is present.
    pub fn personalize(
        &self,
        template: &str,
        variables: &BTreeMap<String, String>,
        name: Option<&str>,
        custom: Option<&str>,
    ) -> String {
        let text = match custom {
            Some(custom) => custom.to_string(),
            None => self.substitute(template, variables),
        };

        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => self.substitute_name(&text, name),
            None => text,
        }
    }

    /// Replace every placeholder whose key exists in `variables`.
    ///
    /// Runs as a single pass, so substituted values are never scanned again.
    pub fn substitute(&self, template: &str, variables: &BTreeMap<String, String>) -> String {
        if variables.is_empty() {
            return template.to_string();
        }

        let lookup: HashMap<String, &str> = variables
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.as_str()))
            .collect();

        placeholder_regex()
            .replace_all(template, |caps: &Captures| {
                let key = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_lowercase())
                    .unwrap_or_default();
                match lookup.get(&key) {
                    Some(value) => (*value).to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Replace the name token with `name`
    pub fn substitute_name(&self, text: &str, name: &str) -> String {
        let mut vars = BTreeMap::new();
        vars.insert(NAME_TOKEN.to_string(), name.to_string());
        self.substitute(text, &vars)
    }
}
