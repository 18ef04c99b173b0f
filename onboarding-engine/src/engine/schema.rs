// Dynamic validator synthesis
//
// No hand-written per-field validators: each check is derived from the FieldDescriptor at call
// time. Callers pass the CURRENTLY VISIBLE field list only; invisibility is a validation
// bypass, so this module never consults conditions itself.
//
// Policy: unknown field types are always valid (catalog entries newer than this engine must not
// reject user input), and a rule that cannot be evaluated (e.g. a malformed pattern) surfaces as
// a generic message instead of propagating.

use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;

use crate::models::catalog::{FieldDescriptor, FieldType, ValidationRule};
use crate::models::value::FieldValue;
use crate::utils::logging::{mask_email, mask_phone};

/// Field key -> human-readable message. Recomputed wholesale for the fields considered;
/// a field that became valid is absent, not blanked.
pub type ValidationErrorMap = HashMap<String, String>;

/// Outcome of validating a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl FieldCheck {
    fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }
}

/// Validate one field against its descriptor. Synchronous, side-effect-free, total.
pub fn validate_field(field: &FieldDescriptor, value: Option<&FieldValue>) -> FieldCheck {
    let entered = value.map_or(false, |v| !v.is_empty());

    if !entered {
        if field.required && !matches!(field.field_type, FieldType::Unknown) {
            return FieldCheck::invalid(format!("{} is required", field.label));
        }
        // Optional and empty: nothing further to check.
        return FieldCheck::valid();
    }

    // value is present and non-empty from here on.
    let value = match value {
        Some(v) => v,
        None => return FieldCheck::valid(),
    };

    let base = match field.field_type {
        FieldType::Email => check_email(field, value),
        FieldType::Phone => check_phone(field, value),
        FieldType::Number => check_number(field, value),
        FieldType::Select => check_select(field, value),
        FieldType::MultiSelect => check_multi_select(field, value),
        FieldType::Date => check_date(field, value),
        FieldType::Text | FieldType::Textarea | FieldType::Boolean => FieldCheck::valid(),
        FieldType::Unknown => FieldCheck::valid(),
    };
    if !base.is_valid {
        return base;
    }

    match &field.validation {
        Some(rule) => check_custom_rule(field, rule, value),
        None => FieldCheck::valid(),
    }
}

/// Validate a set of (descriptor, value) pairs and collect failures into a fresh error map.
/// The caller supplies visible fields only.
pub fn validate_fields<'a, I>(entries: I) -> ValidationErrorMap
where
    I: IntoIterator<Item = (&'a FieldDescriptor, Option<&'a FieldValue>)>,
{
    let mut errors = ValidationErrorMap::new();
    for (field, value) in entries {
        let check = validate_field(field, value);
        if let Some(message) = check.error {
            errors.insert(field.key.clone(), message);
        }
    }
    errors
}

fn check_email(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    let Some(text) = value.as_str() else {
        return FieldCheck::invalid(format!("{} must be an email address", field.label));
    };
    match Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$") {
        Ok(re) if re.is_match(text.trim()) => FieldCheck::valid(),
        Ok(_) => {
            // Customer data never reaches a log unmasked.
            debug!(
                "[PHASE: validation] [STEP: format_check] Rejected email for '{}': {}",
                field.key,
                mask_email(text)
            );
            FieldCheck::invalid(format!("{} must be a valid email address", field.label))
        }
        Err(e) => could_not_validate(field, &e.to_string()),
    }
}

fn check_phone(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    let Some(text) = value.as_str() else {
        return FieldCheck::invalid(format!("{} must be a phone number", field.label));
    };
    // Lenient: digits with common separators, optional leading +.
    match Regex::new(r"^\+?[0-9][0-9 \-/().]{4,}$") {
        Ok(re) if re.is_match(text.trim()) => FieldCheck::valid(),
        Ok(_) => {
            debug!(
                "[PHASE: validation] [STEP: format_check] Rejected phone for '{}': {}",
                field.key,
                mask_phone(text)
            );
            FieldCheck::invalid(format!("{} must be a valid phone number", field.label))
        }
        Err(e) => could_not_validate(field, &e.to_string()),
    }
}

fn check_number(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    match value.as_f64() {
        Some(_) => FieldCheck::valid(),
        None => FieldCheck::invalid(format!("{} must be a number", field.label)),
    }
}

fn check_select(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    if field.options.is_empty() {
        // Free-form select (options served elsewhere): non-empty is enough.
        return FieldCheck::valid();
    }
    let selected = value.as_str().unwrap_or_default();
    if field.options.iter().any(|o| o.value == selected) {
        FieldCheck::valid()
    } else {
        FieldCheck::invalid(format!("{} has an invalid selection", field.label))
    }
}

fn check_multi_select(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    if field.options.is_empty() {
        return FieldCheck::valid();
    }
    let selections: Vec<&str> = match value {
        FieldValue::List(items) => items.iter().map(String::as_str).collect(),
        FieldValue::Text(s) => vec![s.as_str()],
        _ => return FieldCheck::invalid(format!("{} has an invalid selection", field.label)),
    };
    let all_known = selections
        .iter()
        .all(|s| field.options.iter().any(|o| o.value == *s));
    if all_known {
        FieldCheck::valid()
    } else {
        FieldCheck::invalid(format!("{} has an invalid selection", field.label))
    }
}

fn check_date(field: &FieldDescriptor, value: &FieldValue) -> FieldCheck {
    let Some(text) = value.as_str() else {
        return FieldCheck::invalid(format!("{} must be a date", field.label));
    };
    match chrono::NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        Ok(_) => FieldCheck::valid(),
        Err(_) => FieldCheck::invalid(format!("{} must be a date (YYYY-MM-DD)", field.label)),
    }
}

fn check_custom_rule(field: &FieldDescriptor, rule: &ValidationRule, value: &FieldValue) -> FieldCheck {
    if let Some(pattern) = &rule.pattern {
        let Some(text) = value.as_str() else {
            return could_not_validate(field, "pattern rule on a non-text value");
        };
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(text) {
                    let message = rule
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("{} has an invalid format", field.label));
                    return FieldCheck::invalid(message);
                }
            }
            Err(e) => return could_not_validate(field, &e.to_string()),
        }
    }

    if let Some(text) = value.as_str() {
        let len = text.trim().chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                return FieldCheck::invalid(format!(
                    "{} must be at least {} characters",
                    field.label, min
                ));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                return FieldCheck::invalid(format!(
                    "{} must be at most {} characters",
                    field.label, max
                ));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.min {
            if n < min {
                return FieldCheck::invalid(format!("{} must be at least {}", field.label, min));
            }
        }
        if let Some(max) = rule.max {
            if n > max {
                return FieldCheck::invalid(format!("{} must be at most {}", field.label, max));
            }
        }
    }

    FieldCheck::valid()
}

// A rule we cannot evaluate is a catalog defect, not a user mistake. Log it and surface a
// generic message on the offending field so the form never ends up unvalidated.
fn could_not_validate(field: &FieldDescriptor, detail: &str) -> FieldCheck {
    warn!(
        "[PHASE: validation] [STEP: rule_eval] Rule for field '{}' could not be evaluated: {}",
        field.key, detail
    );
    FieldCheck::invalid(format!("{} could not be validated", field.label))
}
