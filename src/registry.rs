//! Per-host storage for the results of earlier actions.

use crate::error::{ActionError, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Maps a register name to the last value an action recorded under it.
///
/// Values are either raw command output (a JSON string) or structured stat results (a JSON
/// object). Later actions read them back through `results[...]` and `eval(...)` expressions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registry(IndexMap<String, Value>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any earlier value.
    pub fn record(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let _ = self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Like [Self::get], but an unregistered name is an error.
    pub fn lookup(&self, name: &str) -> Result<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| ActionError::KeyNotFound(name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// A JSON object snapshot of the registry, for use inside expressions.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<_, _>>(),
        )
    }
}
