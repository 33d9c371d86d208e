//! Depth-first walk that flattens raw trees into locale tables.

use crate::error::{I18nError, I18nResult};
use crate::i18n::entry::{CompiledPattern, Entry, LocaleTable, PatternEntry, PatternSource, RawNode};
use crate::i18n::render::json_kind;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Memoized compilation of regex sources; failures are remembered as never-matching.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<String, CompiledPattern>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn clear(&mut self) {
        self.compiled.clear();
    }

    /// Compile `source` without flags.
    pub fn compile(&mut self, source: &str, strict: bool) -> I18nResult<CompiledPattern> {
        if let Some(pattern) = self.compiled.get(source) {
            if strict && pattern.is_never() {
                return Err(invalid_regex(source, "previously failed to compile"));
            }
            return Ok(pattern.clone());
        }

        let pattern = match Regex::new(source) {
            Ok(regex) => CompiledPattern::new(regex),
            Err(err) if strict => return Err(invalid_regex(source, &err.to_string())),
            Err(err) => {
                warn!(pattern = %source, error = %err, "Invalid regex, installing never-matching pattern");
                CompiledPattern::never(source)
            }
        };
        self.compiled.insert(source.to_string(), pattern.clone());
        Ok(pattern)
    }
}

fn invalid_regex(source: &str, reason: &str) -> I18nError {
    I18nError::InvalidRegex {
        pattern: source.to_string(),
        reason: reason.to_string(),
    }
}

/// Walks a raw tree into a locale table.
pub struct Ingestor<'a> {
    pub strict: bool,
    /// File-backed data may not carry callables
    pub file_backed: bool,
    pub regex_cache: &'a mut RegexCache,
}

impl Ingestor<'_> {
    /// Merge `tree` into `table`: existing keys are overwritten, patterns appended.
    pub fn ingest(&mut self, tree: RawNode, table: &mut LocaleTable) -> I18nResult<()> {
        let before = (table.strings.len(), table.patterns.len());
        self.walk(tree, String::new(), table)?;
        debug!(
            strings = table.strings.len() - before.0,
            patterns = table.patterns.len() - before.1,
            "Ingested locale tree"
        );
        Ok(())
    }

    fn walk(&mut self, node: RawNode, path: String, table: &mut LocaleTable) -> I18nResult<()> {
        match node {
            RawNode::Map(children) => {
                for (key, child) in children {
                    let child_path = if path.is_empty() {
                        key
                    } else {
                        format!("{}.{}", path, key)
                    };
                    self.walk(child, child_path, table)?;
                }
                Ok(())
            }
            RawNode::Pattern {
                regex,
                value,
                else_value,
            } => {
                let pattern = match regex {
                    PatternSource::Compiled(regex) => CompiledPattern::new(regex),
                    PatternSource::Text(source) => self.regex_cache.compile(&source, self.strict)?,
                };
                let value = self.leaf(*value, &path)?;
                let else_value = else_value.map(|node| self.leaf(*node, &path)).transpose()?;
                table.patterns.push(PatternEntry {
                    pattern,
                    value,
                    else_value,
                });
                Ok(())
            }
            leaf => {
                if path.is_empty() {
                    return self.reject(I18nError::UnsupportedValueShape {
                        key: String::new(),
                        reason: "a leaf value needs a non-empty key".to_string(),
                    });
                }
                let entry = self.leaf(leaf, &path)?;
                table.strings.insert(path, entry);
                Ok(())
            }
        }
    }

    /// Convert a node into a leaf entry. Shapes that cannot be leaves become
    /// `Entry::Unsupported` and fail when rendered.
    fn leaf(&self, node: RawNode, path: &str) -> I18nResult<Entry> {
        Ok(match node {
            RawNode::Text(text) => Entry::Template(text),
            RawNode::Helper { name, args } => Entry::HelperRef { name, args },
            RawNode::Callable(_) if self.file_backed => {
                return Err(I18nError::UnsupportedValueShape {
                    key: path.to_string(),
                    reason: "callables are not allowed in file-backed resources".to_string(),
                });
            }
            RawNode::Callable(callback) => Entry::Callable(callback),
            RawNode::Other(value) => {
                debug!(key = %path, kind = json_kind(&value), "Storing unsupported value");
                Entry::Unsupported(value)
            }
            RawNode::Map(_) | RawNode::Pattern { .. } => {
                Entry::Unsupported(serde_json::Value::String(format!("<nested node at {}>", path)))
            }
        })
    }

    fn reject(&self, err: I18nError) -> I18nResult<()> {
        if self.strict {
            return Err(err);
        }
        warn!(error = %err, "Skipping entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ingest(tree: RawNode, strict: bool) -> I18nResult<LocaleTable> {
        let mut cache = RegexCache::new();
        let mut table = LocaleTable::default();
        Ingestor {
            strict,
            file_backed: false,
            regex_cache: &mut cache,
        }
        .ingest(tree, &mut table)?;
        Ok(table)
    }

    #[test]
    fn test_keys_are_flattened() {
        let tree = RawNode::from_json(json!({
            "menu": { "file": { "open": "Open", "close": "Close" } },
            "title": "Title"
        }));
        let table = ingest(tree, true).unwrap();

        assert_eq!(table.strings.len(), 3);
        assert_eq!(table.strings["menu.file.open"].as_template(), Some("Open"));
        assert_eq!(table.strings["title"].as_template(), Some("Title"));
    }

    #[test]
    fn test_patterns_keep_order_and_append() {
        let mut cache = RegexCache::new();
        let mut table = LocaleTable::default();
        let mut ingestor = Ingestor {
            strict: true,
            file_backed: false,
            regex_cache: &mut cache,
        };

        ingestor
            .ingest(RawNode::map([("a", RawNode::pattern_str("^a", "A".into(), None))]), &mut table)
            .unwrap();
        ingestor
            .ingest(RawNode::map([("b", RawNode::pattern_str("^b", "B".into(), None))]), &mut table)
            .unwrap();

        let sources: Vec<&str> = table.patterns.iter().map(|p| p.pattern.source.as_str()).collect();
        assert_eq!(sources, vec!["^a", "^b"]);
        assert!(table.strings.is_empty());
    }

    #[test]
    fn test_bare_root_rejected() {
        assert!(matches!(
            ingest(RawNode::text("root"), true),
            Err(I18nError::UnsupportedValueShape { .. })
        ));
        assert!(ingest(RawNode::text("root"), false).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_regex_strictness() {
        let tree = RawNode::map([("bad", RawNode::pattern_str("(unclosed", "x".into(), None))]);
        assert!(matches!(
            ingest(tree.clone(), true),
            Err(I18nError::InvalidRegex { .. })
        ));

        let table = ingest(tree, false).unwrap();
        assert_eq!(table.patterns.len(), 1);
        assert!(table.patterns[0].pattern.is_never());
        assert!(!table.patterns[0].pattern.is_match("(unclosed"));
    }

    #[test]
    fn test_regex_cache_memoizes() {
        let mut cache = RegexCache::new();
        cache.compile("^x$", true).unwrap();
        cache.compile("^x$", true).unwrap();
        cache.compile("(", false).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.compile("(", true).is_err());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_callables_rejected_when_file_backed() {
        let mut cache = RegexCache::new();
        let mut table = LocaleTable::default();
        let tree = RawNode::map([("f", RawNode::callable(|_, _| Ok(json!(1))))]);
        let result = Ingestor {
            strict: false,
            file_backed: true,
            regex_cache: &mut cache,
        }
        .ingest(tree, &mut table);
        assert!(matches!(result, Err(I18nError::UnsupportedValueShape { .. })));
    }

    #[test]
    fn test_unsupported_values_are_kept_as_entries() {
        let table = ingest(RawNode::from_json(json!({"n": 1, "list": [1]})), true).unwrap();
        assert!(matches!(table.strings["n"], Entry::Unsupported(_)));
        assert!(matches!(table.strings["list"], Entry::Unsupported(_)));
    }
}
