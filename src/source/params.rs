//! Bound parameter container.
//!
//! Parameters are keyed by name. Combining the parameter sets of several
//! sources renames colliding names and reports the renames so the owning
//! expressions can be rewritten.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered name -> value map of bound parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every parameter of `other` into `self`.
    ///
    /// A name already bound to an equal value is shared. A name bound to a
    /// different value is renamed to the first free `{name}_{n}`; the
    /// returned map holds `old -> new` for each rename so the caller can
    /// rewrite the expressions that came with `other`.
    pub fn include(&mut self, other: &Parameters) -> HashMap<String, String> {
        let mut renames = HashMap::new();

        for (name, value) in &other.values {
            match self.values.get(name) {
                None => {
                    self.values.insert(name.clone(), value.clone());
                }
                Some(existing) if existing == value => {}
                Some(_) => {
                    let fresh = self.fresh_name(name, other);
                    tracing::debug!(from = %name, to = %fresh, "renamed colliding parameter");
                    self.values.insert(fresh.clone(), value.clone());
                    renames.insert(name.clone(), fresh);
                }
            }
        }

        renames
    }

    /// First `{base}_{n}` not bound here nor in `incoming`.
    fn fresh_name(&self, base: &str, incoming: &Parameters) -> String {
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.contains(candidate) && !incoming.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// All parameters as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
