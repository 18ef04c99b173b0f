// Wizard step definitions
//
// Steps are data, like fields: each one groups catalog field keys for presentation and may carry
// a visibility condition keyed off the accumulated entity data (e.g. the locations step only
// exists once the user declares a multi-site business).

use serde::{Deserialize, Serialize};

use crate::engine::condition;
use crate::models::catalog::Condition;
use crate::models::value::EntityData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardStep {
    pub id: String,
    pub title: String,
    /// Keys into the customer entity catalog shown on this step.
    #[serde(default)]
    pub field_keys: Vec<String>,
    /// When set, the step exists only while the condition holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Marks the step that edits the location sub-entities; its validation runs against each
    /// location's own value bag instead of the customer data.
    #[serde(default)]
    pub collects_locations: bool,
}

impl WizardStep {
    pub fn is_visible(&self, data: &EntityData) -> bool {
        match &self.condition {
            None => true,
            Some(cond) => condition::evaluate(cond, data),
        }
    }
}

/// Stable filter in declaration order, mirroring the field-level primitive.
pub fn visible_steps<'a>(steps: &'a [WizardStep], data: &EntityData) -> Vec<&'a WizardStep> {
    steps.iter().filter(|s| s.is_visible(data)).collect()
}

/// Progress snapshot for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_index: usize,
    pub step_count: usize,
    pub step_id: String,
    pub is_last: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::ConditionOperator;
    use crate::models::value::FieldValue;

    fn steps() -> Vec<WizardStep> {
        vec![
            WizardStep {
                id: "company".into(),
                title: "Unternehmen".into(),
                field_keys: vec!["companyName".into(), "industry".into()],
                condition: None,
                collects_locations: false,
            },
            WizardStep {
                id: "contact".into(),
                title: "Kontakt".into(),
                field_keys: vec!["email".into(), "phone".into()],
                condition: None,
                collects_locations: false,
            },
            WizardStep {
                id: "locations".into(),
                title: "Standorte".into(),
                field_keys: vec![],
                condition: Some(Condition {
                    field: "multiSite".into(),
                    operator: ConditionOperator::Truthy,
                    value: None,
                }),
                collects_locations: true,
            },
        ]
    }

    #[test]
    fn conditional_step_appears_with_its_flag() {
        let steps = steps();
        let mut data = EntityData::new();
        assert_eq!(visible_steps(&steps, &data).len(), 2);

        data.insert("multiSite".into(), FieldValue::Bool(true));
        let visible: Vec<&str> = visible_steps(&steps, &data)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(visible, vec!["company", "contact", "locations"]);
    }

    #[test]
    fn unconditional_steps_always_visible() {
        let steps = steps();
        assert!(steps[0].is_visible(&EntityData::new()));
        assert!(steps[1].is_visible(&EntityData::new()));
    }
}
