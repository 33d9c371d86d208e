//! Leaf values, pattern entries and the raw trees they are ingested from.

use crate::error::BoxError;
use crate::i18n::helpers::HelperFacade;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type CallbackFn = dyn Fn(&Value, &HelperFacade<'_>) -> Result<Value, BoxError> + Send + Sync;

/// A user function invoked with `(params, helper facade)`.
///
/// Used both for registered helpers and for in-memory callable leaves.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &HelperFacade<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, params: &Value, facade: &HelperFacade<'_>) -> Result<Value, BoxError> {
        (self.0)(params, facade)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// A terminal value in a locale table.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Text with `{dotted.path}` placeholders
    Template(String),
    /// Dispatch to the helper registered under `name`
    HelperRef { name: String, args: Value },
    /// In-memory only
    Callable(Callback),
    /// Anything the ingestion walk could not classify; renders as an error or empty text
    Unsupported(Value),
}

impl Entry {
    pub fn as_template(&self) -> Option<&str> {
        match self {
            Entry::Template(text) => Some(text),
            _ => None,
        }
    }
}

/// Compiled regex of a pattern entry. `None` never matches.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    regex: Option<Regex>,
}

impl CompiledPattern {
    pub fn new(regex: Regex) -> Self {
        Self {
            source: regex.as_str().to_string(),
            regex: Some(regex),
        }
    }

    pub fn never(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            regex: None,
        }
    }

    pub fn is_never(&self) -> bool {
        self.regex.is_none()
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(key))
    }
}

#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub pattern: CompiledPattern,
    pub value: Entry,
    pub else_value: Option<Entry>,
}

/// Flattened string table plus ordered pattern table of one locale.
#[derive(Debug, Clone, Default)]
pub struct LocaleTable {
    pub strings: HashMap<String, Entry>,
    pub patterns: Vec<PatternEntry>,
}

impl LocaleTable {
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.patterns.is_empty()
    }
}

/// Source of a pattern's regex inside a raw tree.
#[derive(Debug, Clone)]
pub enum PatternSource {
    Compiled(Regex),
    Text(String),
}

/// Nested, not yet flattened locale data.
#[derive(Debug, Clone)]
pub enum RawNode {
    Text(String),
    Helper { name: String, args: Value },
    Callable(Callback),
    Pattern {
        regex: PatternSource,
        value: Box<RawNode>,
        else_value: Option<Box<RawNode>>,
    },
    Map(Vec<(String, RawNode)>),
    Other(Value),
}

impl RawNode {
    pub fn text(text: impl Into<String>) -> Self {
        RawNode::Text(text.into())
    }

    pub fn helper(name: impl Into<String>, args: Value) -> Self {
        RawNode::Helper {
            name: name.into(),
            args,
        }
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&Value, &HelperFacade<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        RawNode::Callable(Callback::new(f))
    }

    pub fn pattern(regex: Regex, value: RawNode, else_value: Option<RawNode>) -> Self {
        RawNode::Pattern {
            regex: PatternSource::Compiled(regex),
            value: Box::new(value),
            else_value: else_value.map(Box::new),
        }
    }

    /// Pattern whose regex is compiled by the translator, honouring strict mode.
    pub fn pattern_str(regex: impl Into<String>, value: RawNode, else_value: Option<RawNode>) -> Self {
        RawNode::Pattern {
            regex: PatternSource::Text(regex.into()),
            value: Box::new(value),
            else_value: else_value.map(Box::new),
        }
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RawNode)>,
    {
        RawNode::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert resource JSON into a raw tree.
    ///
    /// `{"$pattern": .., "value": .., "elseValue": ..}` objects become patterns,
    /// `{"$fn": .., "args": ..}` objects become helper references, strings become
    /// templates and other objects nest. Everything else is kept as `Other`.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => RawNode::Text(text),
            Value::Object(mut obj) => {
                let pattern = obj.get("$pattern").and_then(Value::as_str).map(str::to_string);
                if let Some(source) = pattern {
                    let value = obj.remove("value").unwrap_or(Value::Null);
                    let else_value = obj.remove("elseValue");
                    return RawNode::Pattern {
                        regex: PatternSource::Text(source),
                        value: Box::new(RawNode::from_json(value)),
                        else_value: else_value.map(|v| Box::new(RawNode::from_json(v))),
                    };
                }
                let helper = obj.get("$fn").and_then(Value::as_str).map(str::to_string);
                if let Some(name) = helper {
                    return RawNode::Helper {
                        name,
                        args: obj.remove("args").unwrap_or(Value::Null),
                    };
                }
                RawNode::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, RawNode::from_json(v)))
                        .collect(),
                )
            }
            other => RawNode::Other(other),
        }
    }
}

impl From<&str> for RawNode {
    fn from(text: &str) -> Self {
        RawNode::Text(text.to_string())
    }
}
