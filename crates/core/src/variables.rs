//! Typed process variables.
//!
//! Variables are a name → JSON value mapping. Merging has overwrite
//! semantics: a later stage writing a key replaces the earlier value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
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

    /// Read a string variable.
    ///
    /// Missing and `null` values read as `None`; any other non-string value is
    /// a type error.
    pub fn get_str(&self, name: &str) -> CoreResult<Option<&str>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(CoreError::variable_type(name, "string", type_name(other))),
        }
    }

    /// Read a boolean variable (missing/`null` → `None`).
    pub fn get_bool(&self, name: &str) -> CoreResult<Option<bool>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(CoreError::variable_type(name, "boolean", type_name(other))),
        }
    }

    /// Overwrite-merge `other` into `self`.
    pub fn merge(&mut self, other: Variables) {
        self.0.extend(other.0);
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Variables {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn missing_and_null_read_as_none() {
        let vars = Variables::new().with("email", Value::Null);
        assert_eq!(vars.get_str("email").unwrap(), None);
        assert_eq!(vars.get_str("customerName").unwrap(), None);
    }

    #[test]
    fn wrong_type_is_an_error() {
        let vars = Variables::new().with("customerName", 42);
        let err = vars.get_str("customerName").unwrap_err();
        assert_eq!(
            err,
            CoreError::VariableType {
                name: "customerName".to_string(),
                expected: "string",
                found: "number",
            }
        );
    }

    #[test]
    fn merge_overwrites_earlier_keys() {
        let mut vars = Variables::new()
            .with("isValid", true)
            .with("validationMessage", "ok");
        vars.merge(Variables::new().with("isValid", false).with("errorCode", "VALIDATION_ERROR"));

        assert_eq!(vars.get("isValid"), Some(&json!(false)));
        assert_eq!(vars.get("validationMessage"), Some(&json!("ok")));
        assert_eq!(vars.get("errorCode"), Some(&json!("VALIDATION_ERROR")));
    }

    proptest! {
        /// Property: after a merge, every key of the later map holds the later value.
        #[test]
        fn later_writes_win(
            first in prop::collection::btree_map("[a-e]", 0i64..100, 0..5),
            second in prop::collection::btree_map("[a-e]", 100i64..200, 0..5),
        ) {
            let mut vars: Variables = first.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let later: Variables = second.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            vars.merge(later);

            for (k, v) in &second {
                prop_assert_eq!(vars.get(k), Some(&json!(v)));
            }
            for (k, v) in &first {
                if !second.contains_key(k) {
                    prop_assert_eq!(vars.get(k), Some(&json!(v)));
                }
            }
        }
    }
}
