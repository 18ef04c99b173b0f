// Condition evaluation
//
// Pure visibility decisions over the current entity data. Safe to call on every keystroke.
// Degradation policy: a condition that cannot be resolved (missing sibling field, unknown
// operator) evaluates to HIDDEN, so a broken catalog entry disappears instead of corrupting
// the form.

use serde_json::Value as JsonValue;

use crate::models::catalog::{Condition, ConditionOperator, FieldDescriptor};
use crate::models::value::{EntityData, FieldValue};

/// Whether a field is currently visible. No condition means always visible.
pub fn is_visible(field: &FieldDescriptor, data: &EntityData) -> bool {
    match &field.condition {
        None => true,
        Some(condition) => evaluate(condition, data),
    }
}

/// Evaluate one condition against the data snapshot. Total: never panics, always terminates.
pub fn evaluate(condition: &Condition, data: &EntityData) -> bool {
    let Some(actual) = data.get(&condition.field) else {
        // Unresolved reference: treat as hidden rather than guessing.
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => condition
            .value
            .as_ref()
            .map_or(false, |expected| value_matches(actual, expected)),
        ConditionOperator::NotEquals => condition
            .value
            .as_ref()
            .map_or(true, |expected| !value_matches(actual, expected)),
        ConditionOperator::In => condition
            .value
            .as_ref()
            .and_then(JsonValue::as_array)
            .map_or(false, |choices| {
                choices.iter().any(|expected| value_matches(actual, expected))
            }),
        ConditionOperator::Truthy => actual.is_truthy(),
        ConditionOperator::Unknown => false,
    }
}

/// Stable filter over the catalog order; never sorts.
pub fn visible_fields<'a>(fields: &'a [FieldDescriptor], data: &EntityData) -> Vec<&'a FieldDescriptor> {
    fields.iter().filter(|f| is_visible(f, data)).collect()
}

/// Loose equality between a stored value and a condition operand. Multi-select values match
/// by membership, numeric text matches numeric operands.
fn value_matches(actual: &FieldValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (FieldValue::Text(s), JsonValue::String(e)) => s == e,
        (FieldValue::Bool(b), JsonValue::Bool(e)) => b == e,
        (FieldValue::List(items), JsonValue::String(e)) => items.iter().any(|i| i == e),
        (FieldValue::Number(_) | FieldValue::Text(_), JsonValue::Number(_)) => {
            match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(e)) => (a - e).abs() < f64::EPSILON,
                _ => false,
            }
        }
        _ => false,
    }
}
