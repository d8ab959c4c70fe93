//! Numeric Records
//!
//! A record is one row of named numeric measurements (depth, weight on bit,
//! rotary speed, ...). Records are validated at the data source boundary so
//! that only numbers ever reach the broadcast core.
//!
//! Values are kept as [`serde_json::Number`] so integers stay integers on the
//! wire (`200`, not `200.0`) and non-finite floats are unrepresentable.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Error raised when untyped input cannot become a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Input was not a JSON object.
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field carried a non-numeric value.
    #[error("field '{field}' is not numeric ({kind})")]
    NonNumericField {
        /// Offending field name.
        field: String,
        /// JSON kind of the rejected value.
        kind: &'static str,
    },

    /// A float value was NaN or infinite.
    #[error("field '{0}' is not a finite number")]
    NonFinite(String),
}

/// One row of named numeric measurements.
///
/// Immutable once built; field order is irrelevant (stored sorted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Number>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Add an integer field, replacing any previous value.
    #[must_use]
    pub fn with_int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields.insert(name.into(), Number::from(value));
        self
    }

    /// Add a float field.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NonFinite`] for NaN or infinite values.
    pub fn with_float(mut self, name: impl Into<String>, value: f64) -> Result<Self, RecordError> {
        let name = name.into();
        let number = Number::from_f64(value).ok_or_else(|| RecordError::NonFinite(name.clone()))?;
        self.fields.insert(name, number);
        Ok(self)
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Number> {
        self.fields.get(name)
    }

    /// Look up a field as `f64`.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Number::as_f64)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Number);
    type IntoIter = btree_map::Iter<'a, String, Number>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FromIterator<(String, Number)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Number)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    /// Strict conversion: every field must be a number.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(RecordError::NotAnObject(value_kind(&value)));
        };

        map.into_iter()
            .map(|(field, value)| match value {
                Value::Number(n) => Ok((field, n)),
                other => Err(RecordError::NonNumericField {
                    kind: value_kind(&other),
                    field,
                }),
            })
            .collect()
    }
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
