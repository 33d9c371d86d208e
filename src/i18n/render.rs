//! Turning a resolved leaf into a value.

use crate::error::{I18nError, I18nResult};
use crate::i18n::entry::Entry;
use crate::i18n::helpers::{HelperFacade, HelperRegistry};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").ok());

/// Look up a dotted path (`user.name`, `items.0`) inside `params`.
pub fn lookup_path<'a>(params: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(params, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a value the way it reads inside text: strings verbatim, null as empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Substitute every `{dotted.path}` placeholder. Missing or null values become empty.
pub fn interpolate(template: &str, params: Option<&Value>) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref().filter(|_| template.contains('{')) else {
        return template.to_string();
    };

    placeholder
        .replace_all(template, |caps: &Captures<'_>| {
            params
                .and_then(|p| lookup_path(p, caps[1].trim()))
                .map(display_value)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Everything materialization needs besides the entry itself.
pub struct RenderContext<'a> {
    pub key: &'a str,
    pub helpers: &'a HelperRegistry,
    pub strict: bool,
}

impl RenderContext<'_> {
    pub fn materialize(&self, entry: &Entry, params: Option<&Value>) -> I18nResult<Value> {
        let facade = HelperFacade::new(self.helpers);

        match entry {
            Entry::Template(template) => Ok(Value::String(interpolate(template, params))),
            Entry::HelperRef { name, args } => {
                let Some(helper) = self.helpers.get(name) else {
                    return self.degrade(I18nError::UnknownHelper(name.clone()));
                };
                let mut merged = match params {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                merged.insert("args".to_string(), args.clone());
                helper
                    .call(&Value::Object(merged), &facade)
                    .map_err(I18nError::Helper)
            }
            Entry::Callable(callback) => {
                let empty = Value::Object(Map::new());
                callback
                    .call(params.unwrap_or(&empty), &facade)
                    .map_err(I18nError::Helper)
            }
            Entry::Unsupported(value) => self.degrade(I18nError::UnsupportedValueShape {
                key: self.key.to_string(),
                reason: format!("cannot render {}", json_kind(value)),
            }),
        }
    }

    fn degrade(&self, err: I18nError) -> I18nResult<Value> {
        if self.strict {
            return Err(err);
        }
        warn!(key = %self.key, error = %err, "Rendering entry as empty text");
        Ok(Value::String(String::new()))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
