// Field catalog models
//
// The catalog is a load-once document keyed by entity type, each entry holding a `base` list of
// field descriptors plus industry-specific additions. It is data, not code: visibility and
// validation are derived from it at runtime, so a broken entry must degrade, never crash.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{CatalogError, CatalogIntegrityWarning};

/// Closed set of field types the validator understands. Anything the catalog ships that we don't
/// recognize yet parses as `Unknown` and validates as always-valid (forward compatibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Email,
    Phone,
    Select,
    MultiSelect,
    Boolean,
    Date,
    #[serde(other)]
    Unknown,
}

/// Visibility condition operators. Unrecognized operators parse as `Unknown` and evaluate
/// to hidden (same degradation policy as a dangling field reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    In,
    Truthy,
    #[serde(other)]
    Unknown,
}

/// Declarative visibility rule against a sibling field of the same entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    /// Comparison operand; absent for `truthy`. For `in` this is an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Optional custom rule on top of the per-type base validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// One catalog entry. `key` is the storage key in the entity's value bag; everything under the
/// `wizard*` names is presentation grouping the engine carries but never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    /// Stamped by the loader from the catalog's entity-type key when absent on the entry.
    #[serde(default)]
    pub entity_type: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wizard_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wizard_section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wizard_section_title: Option<String>,
    #[serde(default)]
    pub show_divider_after: bool,
}

/// Per-entity-type catalog slice: the shared `base` list plus industry specializations
/// appended for the active industry code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCatalog {
    #[serde(default)]
    pub base: Vec<FieldDescriptor>,
    #[serde(default)]
    pub industry_specific: HashMap<String, Vec<FieldDescriptor>>,
}

/// The whole catalog document, keyed by entity type (`customer`, `location`, ...).
/// Loaded once per session and immutable thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldCatalog {
    #[serde(flatten)]
    entities: HashMap<String, EntityCatalog>,
}

impl FieldCatalog {
    /// Parse a catalog document from JSON text. Only a malformed document fails; broken
    /// individual entries surface later through [`Self::integrity_warnings`].
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let mut catalog: Self = serde_json::from_str(json)?;
        catalog.stamp_entity_types();
        Ok(catalog)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// The merged field list for an entity type: `base` first, then the active industry's
    /// additions, both in catalog order. Unknown entity types and industries yield what exists.
    pub fn fields_for(&self, entity_type: &str, industry: Option<&str>) -> Vec<FieldDescriptor> {
        let Some(entry) = self.entities.get(entity_type) else {
            return Vec::new();
        };

        let mut fields = entry.base.clone();
        if let Some(code) = industry {
            if let Some(extra) = entry.industry_specific.get(code) {
                fields.extend(extra.iter().cloned());
            }
        }
        fields
    }

    /// Scan the document for soft integrity problems: duplicate keys, conditions referencing
    /// fields that do not exist, repeated select option values. Findings are logged and
    /// returned; they never fail the load.
    pub fn integrity_warnings(&self) -> Vec<CatalogIntegrityWarning> {
        let mut warnings = Vec::new();

        for (entity_type, entry) in &self.entities {
            // Conditions may reference industry-specific siblings, so resolve against the
            // union of all keys declared for this entity type.
            let mut all_keys: HashSet<&str> = HashSet::new();
            let mut seen: HashSet<&str> = HashSet::new();
            let everything = entry
                .base
                .iter()
                .chain(entry.industry_specific.values().flatten());

            for field in everything.clone() {
                if !seen.insert(field.key.as_str()) {
                    warnings.push(CatalogIntegrityWarning::DuplicateFieldKey {
                        entity_type: entity_type.clone(),
                        key: field.key.clone(),
                    });
                }
                all_keys.insert(field.key.as_str());
            }

            for field in everything {
                if let Some(cond) = &field.condition {
                    if !all_keys.contains(cond.field.as_str()) {
                        warnings.push(CatalogIntegrityWarning::DanglingConditionRef {
                            entity_type: entity_type.clone(),
                            key: field.key.clone(),
                            referenced: cond.field.clone(),
                        });
                    }
                }

                let mut values: HashSet<&str> = HashSet::new();
                for option in &field.options {
                    if !values.insert(option.value.as_str()) {
                        warnings.push(CatalogIntegrityWarning::DuplicateOptionValue {
                            entity_type: entity_type.clone(),
                            key: field.key.clone(),
                            value: option.value.clone(),
                        });
                    }
                }
            }
        }

        for warning in &warnings {
            warn!("[PHASE: catalog_load] [STEP: integrity_scan] {:?}", warning);
        }
        warnings
    }

    fn stamp_entity_types(&mut self) {
        for (entity_type, entry) in &mut self.entities {
            let all = entry
                .base
                .iter_mut()
                .chain(entry.industry_specific.values_mut().flatten());
            for field in all {
                if field.entity_type.is_empty() {
                    field.entity_type = entity_type.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "customer": {
            "base": [
                { "key": "companyName", "label": "Firmenname", "fieldType": "text", "required": true },
                { "key": "industry", "label": "Branche", "fieldType": "select",
                  "options": [
                    { "value": "hotel", "label": "Hotel" },
                    { "value": "restaurant", "label": "Restaurant" }
                  ] },
                { "key": "starRating", "label": "Sterne", "fieldType": "number", "required": true,
                  "condition": { "field": "industry", "operator": "equals", "value": "hotel" } }
            ],
            "industrySpecific": {
                "hotel": [
                    { "key": "roomCount", "label": "Zimmeranzahl", "fieldType": "number" }
                ]
            }
        },
        "location": {
            "base": [
                { "key": "street", "label": "Strasse", "fieldType": "text", "required": true }
            ]
        }
    }"#;

    #[test]
    fn parses_document_and_stamps_entity_types() {
        let catalog = FieldCatalog::from_json_str(DOC).unwrap();
        let fields = catalog.fields_for("customer", None);
        assert_eq!(fields.len(), 3);
        assert!(fields.iter().all(|f| f.entity_type == "customer"));
        assert_eq!(catalog.fields_for("location", None).len(), 1);
    }

    #[test]
    fn industry_merge_appends_in_catalog_order() {
        let catalog = FieldCatalog::from_json_str(DOC).unwrap();
        let fields = catalog.fields_for("customer", Some("hotel"));
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["companyName", "industry", "starRating", "roomCount"]);

        // Industries with no specialization fall back to base only.
        assert_eq!(catalog.fields_for("customer", Some("restaurant")).len(), 3);
    }

    #[test]
    fn unknown_entity_type_yields_empty_list() {
        let catalog = FieldCatalog::from_json_str(DOC).unwrap();
        assert!(catalog.fields_for("supplier", None).is_empty());
    }

    #[test]
    fn unknown_field_type_and_operator_parse_as_unknown() {
        let json = r#"{
            "customer": { "base": [
                { "key": "futuristic", "label": "X", "fieldType": "hologram",
                  "condition": { "field": "companyName", "operator": "matchesVibe", "value": 1 } }
            ] }
        }"#;
        let catalog = FieldCatalog::from_json_str(json).unwrap();
        let fields = catalog.fields_for("customer", None);
        assert_eq!(fields[0].field_type, FieldType::Unknown);
        assert_eq!(
            fields[0].condition.as_ref().unwrap().operator,
            ConditionOperator::Unknown
        );
    }

    #[test]
    fn integrity_scan_flags_dangling_refs_and_duplicates() {
        let json = r#"{
            "customer": { "base": [
                { "key": "a", "label": "A", "fieldType": "text" },
                { "key": "a", "label": "A again", "fieldType": "text" },
                { "key": "b", "label": "B", "fieldType": "select",
                  "options": [
                    { "value": "x", "label": "X" },
                    { "value": "x", "label": "X again" }
                  ],
                  "condition": { "field": "missing", "operator": "truthy" } }
            ] }
        }"#;
        let catalog = FieldCatalog::from_json_str(json).unwrap();
        let warnings = catalog.integrity_warnings();

        assert!(warnings.iter().any(|w| matches!(
            w,
            CatalogIntegrityWarning::DuplicateFieldKey { key, .. } if key == "a"
        )));
        assert!(warnings.iter().any(|w| matches!(
            w,
            CatalogIntegrityWarning::DanglingConditionRef { referenced, .. } if referenced == "missing"
        )));
        assert!(warnings.iter().any(|w| matches!(
            w,
            CatalogIntegrityWarning::DuplicateOptionValue { value, .. } if value == "x"
        )));
    }

    #[test]
    fn clean_catalog_has_no_warnings() {
        let catalog = FieldCatalog::from_json_str(DOC).unwrap();
        assert!(catalog.integrity_warnings().is_empty());
    }
}
