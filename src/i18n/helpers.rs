use crate::error::{I18nError, I18nResult};
use crate::i18n::entry::Callback;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Name-addressed helper functions owned by one translator.
pub type HelperRegistry = HashMap<String, Callback>;

/// Read-only view of the helper registry handed to helpers and callables.
///
/// Calls to unknown helpers always fail here, strict mode or not.
#[derive(Clone, Copy)]
pub struct HelperFacade<'a> {
    helpers: &'a HelperRegistry,
}

impl<'a> HelperFacade<'a> {
    pub fn new(helpers: &'a HelperRegistry) -> Self {
        Self { helpers }
    }

    pub fn has(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    /// Invoke helper `name`.
    ///
    /// An object `arg` is passed through with `extras` merged on top; any other
    /// `arg` is wrapped as `{"value": arg}` before merging.
    pub fn call(&self, name: &str, arg: Value, extras: Option<&Value>) -> I18nResult<Value> {
        let helper = self
            .helpers
            .get(name)
            .ok_or_else(|| I18nError::UnknownHelper(name.to_string()))?;

        let mut params = match arg {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        if let Some(Value::Object(extra)) = extras {
            for (k, v) in extra {
                params.insert(k.clone(), v.clone());
            }
        }

        helper
            .call(&Value::Object(params), self)
            .map_err(I18nError::Helper)
    }
}
