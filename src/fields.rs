use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::rules::RuleBinding;

/// Field name conventionally holding the raw, unparsed log line.
pub const ORIGIN_FIELD_NAME: &str = "log";
/// Type the raw log field must carry to count as origin.
pub const ORIGIN_FIELD_TYPE: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    BuiltIn,
    Cleaned,
    OriginLog,
}

/// Flat field descriptor as reported by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_name: String,
    #[serde(default)]
    pub field_alias: String,
    #[serde(default)]
    pub field_type: String,
}

/// One origin/masked value pair shown in the preview column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPair {
    pub origin: String,
    pub masked: String,
}

/// One row of the masking table: a field plus its attached rules, the cached
/// recommended-rule snapshot from the last pattern-matcher call, and the
/// current preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub field_name: String,
    #[serde(default)]
    pub field_alias: String,
    #[serde(default)]
    pub field_type: String,
    pub field_class: FieldClass,
    #[serde(default)]
    pub rules: Vec<RuleBinding>,
    #[serde(default)]
    pub recommended_rules: Vec<RuleBinding>,
    #[serde(default)]
    pub preview: Vec<PreviewPair>,
}

impl FieldEntry {
    pub fn new(field_name: impl Into<String>, field_class: FieldClass) -> Self {
        Self {
            field_name: field_name.into(),
            field_alias: String::new(),
            field_type: String::new(),
            field_class,
            rules: Vec::new(),
            recommended_rules: Vec::new(),
            preview: Vec::new(),
        }
    }

    pub fn from_spec(spec: &FieldSpec, field_class: FieldClass) -> Self {
        Self {
            field_name: spec.field_name.clone(),
            field_alias: spec.field_alias.clone(),
            field_type: spec.field_type.clone(),
            field_class,
            rules: Vec::new(),
            recommended_rules: Vec::new(),
            preview: Vec::new(),
        }
    }

    pub fn is_origin(&self) -> bool {
        self.field_class == FieldClass::OriginLog
    }

    pub fn has_rule(&self, rule_id: i64) -> bool {
        self.rules.iter().any(|r| r.rule_id() == rule_id)
    }
}

/// Classify a single field by name and type.
pub fn field_class(name: &str, field_type: &str, built_in: &HashSet<String>) -> FieldClass {
    if built_in.contains(name) {
        FieldClass::BuiltIn
    } else if name == ORIGIN_FIELD_NAME && field_type == ORIGIN_FIELD_TYPE {
        FieldClass::OriginLog
    } else {
        FieldClass::Cleaned
    }
}

/// Partition a flat descriptor list into the three ordered buckets
/// (built-in, cleaned, origin-log), preserving relative order within each
/// bucket. Duplicate field names are deduplicated last-write-wins.
pub fn classify_fields(specs: &[FieldSpec], built_in: &HashSet<String>) -> Vec<FieldEntry> {
    let mut seen: ahash::AHashMap<String, usize> = ahash::AHashMap::new();
    let mut deduped: Vec<&FieldSpec> = Vec::new();
    for spec in specs {
        match seen.get(&spec.field_name) {
            Some(&i) => deduped[i] = spec,
            None => {
                seen.insert(spec.field_name.clone(), deduped.len());
                deduped.push(spec);
            }
        }
    }

    let entries = deduped
        .into_iter()
        .map(|spec| FieldEntry::from_spec(spec, field_class(&spec.field_name, &spec.field_type, built_in)))
        .collect();
    order_by_class(entries)
}

/// Stable bucket ordering: built-in first, cleaned next, origin-log last.
pub fn order_by_class(mut entries: Vec<FieldEntry>) -> Vec<FieldEntry> {
    entries.sort_by_key(|e| e.field_class);
    entries
}
