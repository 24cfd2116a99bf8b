use serde::Serialize;

use crate::fields::{FieldEntry, PreviewPair};
use crate::rules::{ChangeState, MaskOperator, RuleState};

/// One rule as submitted to the preview renderer. Persisted rules go by id;
/// a drifted rule the user has not yet accepted is submitted inline with its
/// current stored definition so the preview reflects what is actually still
/// in effect, not the pending server version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreviewRule {
    ById { rule_id: i64 },
    Inline {
        match_pattern: String,
        #[serde(flatten)]
        operator: MaskOperator,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPreviewConfig {
    pub field_name: String,
    pub rules: Vec<PreviewRule>,
}

/// Build the renderer request for the given fields. Fields with no active
/// (non-disabled) rule are not submitted at all.
pub fn build_preview_configs(fields: &[FieldEntry]) -> Vec<FieldPreviewConfig> {
    fields
        .iter()
        .filter(|f| f.rules.iter().any(|r| !r.disabled))
        .map(|f| FieldPreviewConfig {
            field_name: f.field_name.clone(),
            rules: f
                .rules
                .iter()
                .filter(|r| !r.disabled)
                .map(|r| {
                    if r.state == RuleState::Update && r.change_state != ChangeState::Update {
                        PreviewRule::Inline {
                            match_pattern: r.def.match_pattern.clone(),
                            operator: r.def.operator.clone(),
                        }
                    } else {
                        PreviewRule::ById { rule_id: r.rule_id() }
                    }
                })
                .collect(),
        })
        .collect()
}

/// How many preview slots a field may show: at most one per attached rule,
/// with a single synthetic slot for a rule-less origin-log field.
pub fn preview_capacity(field: &FieldEntry) -> usize {
    if field.is_origin() && field.rules.is_empty() {
        1
    } else {
        field.rules.len()
    }
}

/// Zip the renderer's masked values for one field against the locally
/// flattened origin values. The service returns one entry per document that
/// contained the field, in document order, with nulls for documents it chose
/// to skip; nulls are filtered before zipping. Missing masked values pair
/// with an empty string.
pub fn align_preview(
    field: &FieldEntry,
    origin_values: Option<&Vec<String>>,
    masked: &[Option<String>],
) -> Vec<PreviewPair> {
    let Some(origins) = origin_values else {
        return Vec::new();
    };
    if masked.is_empty() || origins.is_empty() {
        return Vec::new();
    }
    let masked: Vec<&String> = masked.iter().flatten().collect();
    let mut pairs: Vec<PreviewPair> = origins
        .iter()
        .enumerate()
        .map(|(i, origin)| PreviewPair {
            origin: origin.clone(),
            masked: masked.get(i).map(|m| (*m).clone()).unwrap_or_default(),
        })
        .collect();
    pairs.truncate(preview_capacity(field));
    pairs
}
