// Typed field values
//
// The wire format stores onboarding data as an untyped JSON bag keyed by field key. Internally we
// keep a small tagged variant instead; the matching FieldDescriptor's fieldType is the
// discriminant used to interpret a value at the validation boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One stored field value. `#[serde(untagged)]` keeps the JSON shape identical to the wire
/// contract: booleans, numbers, strings and string arrays round-trip without a type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// The per-entity value bag. Owned exclusively by the wizard store for the session lifetime.
pub type EntityData = HashMap<String, FieldValue>;

impl FieldValue {
    /// Empty in the "nothing entered yet" sense: blank text or an empty multi-select.
    /// Booleans and numbers always count as entered.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Truthiness for `truthy` visibility conditions: a set checkbox, a non-zero number,
    /// non-blank text, or a non-empty selection.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.trim().is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: native numbers directly, text via parse (number inputs arrive as text
    /// from some form widgets).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}
