use tracing::debug;

use crate::fields::FieldEntry;
use crate::recommend::RecommendationIndex;
use crate::rules::{ChangeState, RuleState};

/// Re-derive every binding's diff status and disabled flag against a fresh
/// recommendation index. Runs after each merge.
///
/// Drift detection is skipped entirely when the index is empty (no samples
/// were submitted, so the server had no say); disabled flags are still
/// recomputed because they are a pure function of the index.
pub fn annotate_table(fields: &mut [FieldEntry], index: &RecommendationIndex) {
    for field in fields.iter_mut() {
        for binding in &mut field.rules {
            // Hand-picked rules not yet persisted have no server-side history
            // to diff against; only their disabled flag is refreshed.
            let transient = binding.change_state == ChangeState::Add;
            if !index.is_empty() && !transient {
                match index.definition(binding.rule_id()) {
                    Some(server_def) if binding.def.drifted_from(server_def) => {
                        debug!(rule_id = binding.rule_id(), field = %field.field_name, "rule drifted");
                        binding.state = RuleState::Update;
                        binding.new_rule = Some(server_def.clone());
                    }
                    Some(_) => {
                        binding.state = RuleState::Normal;
                        binding.new_rule = None;
                    }
                    None => {
                        debug!(rule_id = binding.rule_id(), field = %field.field_name, "rule removed server-side");
                        binding.state = RuleState::Delete;
                        binding.new_rule = None;
                    }
                }
            }

            // A delete-state rule awaiting a decision keeps its badge instead
            // of the grey-out; disabled stays recomputed for everything else.
            let pending_delete =
                binding.state == RuleState::Delete && binding.change_state == ChangeState::Undecided;
            binding.disabled = if pending_delete {
                false
            } else {
                index.is_disabled(&field.field_name, binding.rule_id())
            };
        }
    }
}

/// Outcome of a single-rule sync, so the caller knows which preview scope to
/// refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The delete-state rule was removed from this field only.
    RemovedLocally,
    /// The accepted update cascaded to every field carrying the rule id.
    Cascaded,
    /// The binding had nothing to sync.
    Unchanged,
}

/// Accept a drifted rule at `rule_index` of `field`.
///
/// Delete-state rules are removed from the field (accepting a deletion means
/// dropping the rule). Update-state rules cascade: every binding of the same
/// rule id anywhere in the table adopts the server definition, matching the
/// all-rules sync semantics.
pub fn sync_one(fields: &mut [FieldEntry], field_name: &str, rule_index: usize) -> SyncOutcome {
    let Some(field) = fields.iter_mut().find(|f| f.field_name == field_name) else {
        return SyncOutcome::Unchanged;
    };
    let Some(binding) = field.rules.get(rule_index) else {
        return SyncOutcome::Unchanged;
    };

    match binding.state {
        RuleState::Delete => {
            field.rules.remove(rule_index);
            SyncOutcome::RemovedLocally
        }
        RuleState::Update => {
            let rule_id = binding.rule_id();
            if sync_rules(fields, Some(rule_id)) {
                SyncOutcome::Cascaded
            } else {
                SyncOutcome::Unchanged
            }
        }
        _ => SyncOutcome::Unchanged,
    }
}

/// Bulk synchronization. With a rule id, every binding of that id is resolved
/// (updates accepted, deletions removed); with `None` every drifted rule in
/// the table is resolved in one pass. Returns whether anything changed.
pub fn sync_rules(fields: &mut [FieldEntry], rule_id: Option<i64>) -> bool {
    let mut changed = false;
    for field in fields.iter_mut() {
        let before = field.rules.len();
        field.rules.retain(|b| {
            let targeted = rule_id.map(|id| b.rule_id() == id).unwrap_or(true);
            !(targeted && b.state == RuleState::Delete)
        });
        changed |= field.rules.len() != before;

        for binding in &mut field.rules {
            let targeted = rule_id.map(|id| binding.rule_id() == id).unwrap_or(true);
            if targeted && binding.state == RuleState::Update && binding.accept_update() {
                debug!(rule_id = binding.rule_id(), field = %field.field_name, "accepted rule update");
                changed = true;
            }
        }
    }
    changed
}

/// Whether any rule in the table still awaits a sync decision (drives the
/// "sync all changes" affordance).
pub fn has_pending_drift(fields: &[FieldEntry]) -> bool {
    fields
        .iter()
        .flat_map(|f| &f.rules)
        .any(|b| b.needs_decision())
}
