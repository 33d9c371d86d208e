use crate::i18n::RawNode;
use serde::Deserialize;
use std::path::PathBuf;

/// Where locale tables come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Mode {
    /// Tables are supplied by the caller and kept for the translator's lifetime.
    InMemory,
    /// Tables are read lazily from `<base_path>/<locale>.json`.
    FileBacked { base_path: PathBuf },
}

/// Translator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    #[serde(flatten)]
    pub mode: Mode,

    /// Locale whose tables always exist and are searched last
    pub default_locale: String,

    /// Initial `locale -> tree` data, only honoured in memory mode
    #[serde(skip)]
    pub local_resources: Vec<(String, RawNode)>,

    /// Raise engine errors instead of degrading to fallbacks
    #[serde(default)]
    pub strict: bool,
}

impl TranslatorConfig {
    pub fn in_memory(default_locale: impl Into<String>) -> Self {
        Self {
            mode: Mode::InMemory,
            default_locale: default_locale.into(),
            local_resources: Vec::new(),
            strict: false,
        }
    }

    pub fn file_backed(default_locale: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::FileBacked {
                base_path: base_path.into(),
            },
            default_locale: default_locale.into(),
            local_resources: Vec::new(),
            strict: false,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Add an initial tree for `locale`. Repeated locales are merged in order.
    pub fn with_resources(mut self, locale: impl Into<String>, tree: RawNode) -> Self {
        self.local_resources.push((locale.into(), tree));
        self
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.mode, Mode::FileBacked { .. })
    }
}
