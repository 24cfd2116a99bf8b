use ahash::AHashMap;
use tracing::warn;

use crate::fields::FieldEntry;

/// Policy applied when two field tables are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Wipe every rule list after merging (the "clear all rules" action).
    AllClear,
    /// Rebuild from a saved config plus a fresh matcher snapshot; unseen rules
    /// travel on the later entry's `rules` list.
    AllInit,
    /// One-click generation: unseen rules travel on the later entry's
    /// `recommended_rules` snapshot.
    Merge,
}

/// Merge `existing` then `incoming` into one table, keyed by field name in
/// first-seen order.
///
/// A later occurrence of a known field updates the working entry's
/// `recommended_rules` snapshot and appends any rule whose id the working
/// entry does not yet carry. Rule lists are never replaced; the origin-log
/// field in particular is a catch-all that only ever grows, so for it both
/// the later entry's `rules` and its `recommended_rules` are candidates
/// regardless of mode. Entries missing a field name are dropped rather than
/// poisoning the merge.
pub fn merge_fields(
    existing: Vec<FieldEntry>,
    incoming: Vec<FieldEntry>,
    mode: MergeMode,
) -> Vec<FieldEntry> {
    let mut order: Vec<FieldEntry> = Vec::new();
    let mut seen: AHashMap<String, usize> = AHashMap::new();

    for entry in existing.into_iter().chain(incoming) {
        if entry.field_name.is_empty() {
            warn!("dropping field entry with no field_name from merge");
            continue;
        }
        match seen.get(&entry.field_name) {
            None => {
                seen.insert(entry.field_name.clone(), order.len());
                order.push(entry);
            }
            Some(&i) => {
                let working = &mut order[i];
                if working.is_origin() {
                    append_unseen(working, entry.rules.iter().chain(&entry.recommended_rules));
                } else {
                    let source = match mode {
                        MergeMode::Merge => &entry.recommended_rules,
                        _ => &entry.rules,
                    };
                    append_unseen(working, source.iter());
                }
                working.recommended_rules = entry.recommended_rules;
            }
        }
    }

    if mode == MergeMode::AllClear {
        for entry in &mut order {
            entry.rules.clear();
        }
    }
    order
}

fn append_unseen<'a>(
    working: &mut FieldEntry,
    source: impl Iterator<Item = &'a crate::rules::RuleBinding>,
) {
    for rule in source {
        if !working.has_rule(rule.rule_id()) {
            working.rules.push(rule.clone());
        }
    }
}
