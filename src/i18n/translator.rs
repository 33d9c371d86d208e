use crate::config::{Mode, TranslatorConfig};
use crate::config_validator::ConfigValidator;
use crate::error::{BoxError, I18nError, I18nResult};
use crate::i18n::entry::{Callback, Entry, LocaleTable, RawNode};
use crate::i18n::helpers::{HelperFacade, HelperRegistry};
use crate::i18n::ingest::{Ingestor, RegexCache};
use crate::i18n::reader::{FsReader, ResourceReader};
use crate::i18n::render::{display_value, RenderContext};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry counts of one loaded locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleStats {
    pub strings: usize,
    pub patterns: usize,
    pub is_default: bool,
    pub is_current: bool,
}

/// Key to value resolution against the current and default locales.
///
/// Lookups search `[forced locale, current locale, default locale]` in that
/// order, skipping duplicates, and the first hit wins.
pub struct Translator {
    mode: Mode,
    strict: bool,
    default_locale: String,
    current_locale: Option<String>,
    tables: HashMap<String, LocaleTable>,
    helpers: HelperRegistry,
    regex_cache: RegexCache,
    reader: Arc<dyn ResourceReader>,
    default_loaded: bool,
}

impl Translator {
    /// Create a translator reading file-backed resources from disk.
    pub fn new(config: TranslatorConfig) -> I18nResult<Self> {
        Self::with_reader(config, Arc::new(FsReader))
    }

    pub fn with_reader(config: TranslatorConfig, reader: Arc<dyn ResourceReader>) -> I18nResult<Self> {
        ConfigValidator::validate_translator(&config)?;

        let TranslatorConfig {
            mode,
            default_locale,
            local_resources,
            strict,
        } = config;

        let mut tables = HashMap::new();
        tables.insert(default_locale.clone(), LocaleTable::default());

        let mut translator = Self {
            default_loaded: mode == Mode::InMemory,
            mode,
            strict,
            default_locale,
            current_locale: None,
            tables,
            helpers: HelperRegistry::new(),
            regex_cache: RegexCache::new(),
            reader,
        };

        if translator.is_file_backed() {
            if !local_resources.is_empty() {
                warn!(
                    count = local_resources.len(),
                    "Ignoring local resources in file-backed mode"
                );
            }
        } else {
            for (locale, tree) in local_resources {
                translator.load_locale_in_memory(&locale, tree)?;
            }
        }

        info!(
            default_locale = %translator.default_locale,
            file_backed = translator.is_file_backed(),
            strict = translator.strict,
            "Translator created"
        );
        Ok(translator)
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.mode, Mode::FileBacked { .. })
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn current_locale(&self) -> Option<&str> {
        self.current_locale.as_deref()
    }

    /// Locales with tables present, sorted.
    pub fn loaded_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.tables.keys().cloned().collect();
        locales.sort();
        locales
    }

    /// Load the default locale's file. No-op in memory or once loaded.
    pub async fn init(&mut self) -> I18nResult<()> {
        if self.default_loaded {
            return Ok(());
        }
        let locale = self.default_locale.clone();
        self.load_file(&locale).await?;
        self.default_loaded = true;
        Ok(())
    }

    /// Select `locale`, or only the default when `None`.
    ///
    /// File-backed translators read the locale's file on first use and unload the
    /// previously selected non-default locale.
    pub async fn set_locale(&mut self, locale: Option<&str>) -> I18nResult<()> {
        let Some(locale) = locale else {
            self.unload_current();
            self.current_locale = None;
            debug!("Locale cleared, using default only");
            return Ok(());
        };
        ConfigValidator::validate_locale(locale)?;

        if self.is_file_backed() {
            self.init().await?;
            if !self.tables.contains_key(locale) {
                self.load_file(locale).await?;
            }
            if self.current_locale.as_deref() != Some(locale) {
                self.unload_current();
            }
        }

        self.current_locale = Some(locale.to_string());
        info!(locale = %locale, "Locale selected");
        Ok(())
    }

    /// Merge `tree` into the tables of `locale`. Not available when file-backed.
    ///
    /// The tree is ingested completely before anything is merged, so a failed
    /// load leaves the locale's tables untouched.
    pub fn load_locale_in_memory(&mut self, locale: &str, tree: RawNode) -> I18nResult<()> {
        if self.is_file_backed() {
            return Err(I18nError::LoadNotAllowed(locale.to_string()));
        }
        ConfigValidator::validate_locale(locale)?;

        let mut staged = LocaleTable::default();
        Ingestor {
            strict: self.strict,
            file_backed: false,
            regex_cache: &mut self.regex_cache,
        }
        .ingest(tree, &mut staged)?;

        let table = self.tables.entry(locale.to_string()).or_default();
        table.strings.extend(staged.strings);
        table.patterns.extend(staged.patterns);

        debug!(locale = %locale, "Locale data merged in memory");
        Ok(())
    }

    pub fn register_helper<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value, &HelperFacade<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(helper = %name, "Helper registered");
        self.helpers.insert(name, Callback::new(f));
    }

    /// Returns whether a helper was removed.
    pub fn unregister_helper(&mut self, name: &str) -> bool {
        self.helpers.remove(name).is_some()
    }

    pub fn helper_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.helpers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn helpers(&self) -> HelperFacade<'_> {
        HelperFacade::new(&self.helpers)
    }

    /// Exact-key resolution.
    ///
    /// A miss in every searched locale fails in strict mode and returns the key
    /// itself otherwise.
    pub fn get(&self, key: &str, params: Option<&Value>, locale: Option<&str>) -> I18nResult<Value> {
        let order = self.search_order(locale);

        for loc in &order {
            if let Some(entry) = self.tables.get(*loc).and_then(|t| t.strings.get(key)) {
                return self.render(key, entry, params);
            }
        }

        self.miss(key, &order)
            .map(|()| Value::String(key.to_string()))
    }

    /// Alias of [`Translator::get`].
    pub fn t(&self, key: &str, params: Option<&Value>, locale: Option<&str>) -> I18nResult<Value> {
        self.get(key, params, locale)
    }

    /// [`Translator::get`] rendered as display text.
    pub fn text(&self, key: &str, params: Option<&Value>) -> I18nResult<String> {
        self.get(key, params, None).map(|value| display_value(&value))
    }

    pub fn has_key(&self, key: &str, locale: Option<&str>) -> bool {
        self.search_order(locale)
            .iter()
            .any(|loc| self.tables.get(*loc).is_some_and(|t| t.strings.contains_key(key)))
    }

    /// Regex resolution returning the raw, unrendered value.
    ///
    /// Only the first pattern entry of the first locale that has any patterns is
    /// consulted: its `value` is returned when the regex matches `key`, its
    /// `else_value` (possibly `None`) when it does not. Later entries are never
    /// tested.
    pub fn resolve_by_pattern(&self, key: &str, locale: Option<&str>) -> I18nResult<Option<Entry>> {
        let order = self.search_order(locale);

        for loc in &order {
            let Some(table) = self.tables.get(*loc) else {
                continue;
            };
            if let Some(entry) = table.patterns.first() {
                if entry.pattern.is_match(key) {
                    return Ok(Some(entry.value.clone()));
                }
                return Ok(entry.else_value.clone());
            }
        }

        self.miss(key, &order)
            .map(|()| Some(Entry::Template(key.to_string())))
    }

    /// Alias of [`Translator::resolve_by_pattern`].
    pub fn p(&self, key: &str, locale: Option<&str>) -> I18nResult<Option<Entry>> {
        self.resolve_by_pattern(key, locale)
    }

    /// Pattern resolution followed by rendering. An absent `else_value` renders as null.
    pub fn render_pattern(&self, key: &str, params: Option<&Value>, locale: Option<&str>) -> I18nResult<Value> {
        match self.resolve_by_pattern(key, locale)? {
            Some(entry) => self.render(key, &entry, params),
            None => Ok(Value::Null),
        }
    }

    /// Drop every non-default locale and clear the selection.
    pub fn reset_to_default_only(&mut self) {
        let default = self.default_locale.clone();
        self.tables.retain(|locale, _| *locale == default);
        self.current_locale = None;
        info!(default_locale = %default, "Reset to default locale only");
    }

    pub fn clear_regex_cache(&mut self) {
        debug!(entries = self.regex_cache.len(), "Regex cache cleared");
        self.regex_cache.clear();
    }

    pub fn stats(&self) -> BTreeMap<String, LocaleStats> {
        self.tables
            .iter()
            .map(|(locale, table)| {
                let stats = LocaleStats {
                    strings: table.strings.len(),
                    patterns: table.patterns.len(),
                    is_default: *locale == self.default_locale,
                    is_current: self.current_locale.as_deref() == Some(locale.as_str()),
                };
                (locale.clone(), stats)
            })
            .collect()
    }

    fn search_order<'a>(&'a self, forced: Option<&'a str>) -> Vec<&'a str> {
        let mut order: Vec<&str> = Vec::with_capacity(3);
        for locale in [forced, self.current_locale.as_deref(), Some(self.default_locale.as_str())]
            .into_iter()
            .flatten()
        {
            if !order.contains(&locale) {
                order.push(locale);
            }
        }
        order
    }

    fn render(&self, key: &str, entry: &Entry, params: Option<&Value>) -> I18nResult<Value> {
        RenderContext {
            key,
            helpers: &self.helpers,
            strict: self.strict,
        }
        .materialize(entry, params)
    }

    fn miss(&self, key: &str, order: &[&str]) -> I18nResult<()> {
        if self.strict {
            return Err(I18nError::MissingKey {
                key: key.to_string(),
                locale: order.join(","),
            });
        }
        debug!(key = %key, locales = ?order, "Missing translation, returning key");
        Ok(())
    }

    fn unload_current(&mut self) {
        if !self.is_file_backed() {
            return;
        }
        if let Some(previous) = self.current_locale.take() {
            if previous != self.default_locale && self.tables.remove(&previous).is_some() {
                info!(locale = %previous, "Locale unloaded");
            }
        }
    }

    async fn load_file(&mut self, locale: &str) -> I18nResult<()> {
        let Mode::FileBacked { base_path } = &self.mode else {
            return Ok(());
        };
        let path = base_path.join(format!("{}.json", locale));

        let loaded = match self.reader.read(&path).await {
            Ok(bytes) => parse_resource(&bytes),
            Err(err) => Err(err.to_string()),
        };

        let mut table = LocaleTable::default();
        match loaded {
            Ok(json) => {
                Ingestor {
                    strict: self.strict,
                    file_backed: true,
                    regex_cache: &mut self.regex_cache,
                }
                .ingest(RawNode::from_json(json), &mut table)?;
                info!(
                    locale = %locale,
                    path = %path.display(),
                    strings = table.strings.len(),
                    patterns = table.patterns.len(),
                    "Locale loaded"
                );
            }
            Err(reason) if self.strict => {
                return Err(I18nError::MissingLocaleData {
                    locale: locale.to_string(),
                    reason,
                });
            }
            Err(reason) => {
                warn!(locale = %locale, path = %path.display(), reason = %reason, "Locale data unavailable, using empty table");
            }
        }

        self.tables.insert(locale.to_string(), table);
        Ok(())
    }
}

fn parse_resource(bytes: &[u8]) -> Result<Value, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))?;
    serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))
}
