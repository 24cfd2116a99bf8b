use std::collections::HashMap;

use ahash::{AHashMap, AHashSet};

use crate::rules::RuleDefinition;

/// Per-field recommended rule ids plus a catalog of the definitions the
/// pattern matcher last returned.
///
/// Rebuilt from every matcher response; purely advisory and never persisted.
/// Passed explicitly into the merge/lifecycle calls instead of living as
/// shared module state so rebuilds stay deterministic.
#[derive(Debug, Clone, Default)]
pub struct RecommendationIndex {
    by_field: AHashMap<String, AHashSet<i64>>,
    catalog: AHashMap<i64, RuleDefinition>,
}

impl RecommendationIndex {
    pub fn from_matches(matches: &HashMap<String, Vec<RuleDefinition>>) -> Self {
        let mut index = Self::default();
        for (field, defs) in matches {
            let ids = defs.iter().map(|d| d.rule_id).collect();
            index.by_field.insert(field.clone(), ids);
            for def in defs {
                index.catalog.insert(def.rule_id, def.clone());
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    /// Pure disabled check: a rule is disabled iff the field has a non-empty
    /// recommended set that does not contain it. With no entry (or an empty
    /// index) nothing is disabled.
    pub fn is_disabled(&self, field: &str, rule_id: i64) -> bool {
        match self.by_field.get(field) {
            Some(ids) if !ids.is_empty() => !ids.contains(&rule_id),
            _ => false,
        }
    }

    pub fn recommended_ids(&self, field: &str) -> Option<&AHashSet<i64>> {
        self.by_field.get(field)
    }

    /// The server's current definition for a rule id, if it still exists
    /// anywhere in the latest matcher response.
    pub fn definition(&self, rule_id: i64) -> Option<&RuleDefinition> {
        self.catalog.get(&rule_id)
    }

    pub fn knows_rule(&self, rule_id: i64) -> bool {
        self.catalog.contains_key(&rule_id)
    }
}
