use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fields::{self, FieldEntry, FieldSpec};
use crate::lifecycle::{self, SyncOutcome};
use crate::merge::{merge_fields, MergeMode};
use crate::preview::{align_preview, build_preview_configs, FieldPreviewConfig};
use crate::recommend::RecommendationIndex;
use crate::rules::{ChangeState, RuleBinding, RuleDefinition, RuleError, RuleState};
use crate::samples::origin_value_table;
use crate::services::{
    ConfigStore, PersistedFieldConfig, PersistedRule, PreviewRenderer, RuleMatcher, SavePayload,
    ServiceError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown field {0}")]
    UnknownField(String),
    #[error("no rule at index {index} for field {field}")]
    RuleIndexOutOfRange { field: String, index: usize },
    #[error("reordered rule ids do not match the field's current rules")]
    ReorderMismatch,
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// The three external collaborators the engine talks to.
#[derive(Clone)]
pub struct MaskingServices {
    pub matcher: Arc<dyn RuleMatcher>,
    pub renderer: Arc<dyn PreviewRenderer>,
    pub store: Arc<dyn ConfigStore>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub space_uid: String,
    pub fieldset_id: i64,
}

/// Scope of one preview round-trip: a single field or the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreviewScope {
    Table,
    Field(String),
}

/// An issued preview request. Responses are applied back through
/// [`MaskingEngine::apply_preview`], which discards any response that is no
/// longer the latest issued for its scope.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    pub scope: PreviewScope,
    pub seq: u64,
    pub field_configs: Vec<FieldPreviewConfig>,
    pub text_fields: Vec<String>,
}

/// Single source of truth for the masking table.
///
/// Reconciles the persisted rule set, the user's edits and the server's
/// recommendations into one previewable table, tracking per-rule lifecycle
/// state. Single-threaded by design; the only suspension points are the
/// service round-trips.
pub struct MaskingEngine {
    services: MaskingServices,
    space_uid: String,
    fieldset_id: i64,
    specs: Vec<FieldSpec>,
    built_in: HashSet<String>,
    samples: Vec<Value>,
    origin_values: HashMap<String, Vec<String>>,
    table: Vec<FieldEntry>,
    index: RecommendationIndex,
    preview_enabled: bool,
    all_synced: bool,
    from_saved: bool,
    preview_seq: AHashMap<PreviewScope, u64>,
}

impl MaskingEngine {
    pub fn new(
        services: MaskingServices,
        config: EngineConfig,
        specs: Vec<FieldSpec>,
        built_in: HashSet<String>,
    ) -> Self {
        Self {
            services,
            space_uid: config.space_uid,
            fieldset_id: config.fieldset_id,
            specs,
            built_in,
            samples: Vec::new(),
            origin_values: HashMap::new(),
            table: Vec::new(),
            index: RecommendationIndex::default(),
            preview_enabled: true,
            all_synced: false,
            from_saved: false,
            preview_seq: AHashMap::new(),
        }
    }

    pub fn table(&self) -> &[FieldEntry] {
        &self.table
    }

    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.table.iter().find(|f| f.field_name == name)
    }

    pub fn recommendations(&self) -> &RecommendationIndex {
        &self.index
    }

    /// Whether the table was rebuilt from a previously saved config.
    pub fn is_update(&self) -> bool {
        self.from_saved
    }

    /// Initial construction of the table: saved config merged with a fresh
    /// matcher snapshot, or a clean table straight from the field list. Load
    /// failures degrade to the fresh path.
    pub async fn load(&mut self) -> Result<(), EngineError> {
        let saved = match self.services.store.load_config(self.fieldset_id).await {
            Ok(saved) => saved,
            Err(err) => {
                warn!(error = %err, "saved masking config unavailable, starting fresh");
                Vec::new()
            }
        };
        self.from_saved = !saved.is_empty();

        if self.from_saved {
            self.table = saved
                .into_iter()
                .map(|cfg| {
                    let mut entry = self.entry_for(&cfg.field_name);
                    entry.rules = cfg.rules;
                    entry
                })
                .collect();
            let incoming = self.refresh_matches().await;
            self.rebuild(incoming, MergeMode::AllInit);
        } else {
            self.table = fields::classify_fields(&self.specs, &self.built_in);
            let incoming = self.refresh_matches().await;
            self.rebuild(incoming, MergeMode::AllClear);
        }
        self.refresh_preview(PreviewScope::Table).await;
        Ok(())
    }

    /// Replace the sample document set and rebuild recommendations, table and
    /// preview around it.
    pub async fn set_samples(&mut self, samples: Vec<Value>) {
        self.samples = samples;
        self.origin_values = origin_value_table(&self.samples);
        let incoming = self.refresh_matches().await;
        self.rebuild(incoming, MergeMode::AllInit);
        self.refresh_preview(PreviewScope::Table).await;
    }

    /// One-click generation: pull recommendations into the rule lists.
    pub async fn generate_rules(&mut self) {
        let incoming = self.refresh_matches().await;
        self.rebuild(incoming, MergeMode::Merge);
        self.refresh_preview(PreviewScope::Table).await;
    }

    /// Clear every rule from every field, keeping the fields themselves.
    pub async fn clear_rules(&mut self) {
        self.rebuild(Vec::new(), MergeMode::AllClear);
        self.refresh_preview(PreviewScope::Table).await;
    }

    /// Apply a rule-picker submission for one field: the picker hands back the
    /// full selected set, and the engine appends the newly selected rules and
    /// drops the deselected ones. Rules already attached are left untouched.
    pub async fn select_rules(
        &mut self,
        field_name: &str,
        selection: Vec<RuleDefinition>,
    ) -> Result<(), EngineError> {
        let mut picked_ids: HashSet<i64> = HashSet::new();
        for def in &selection {
            def.validate()?;
            if !picked_ids.insert(def.rule_id) {
                return Err(RuleError::Duplicate {
                    rule_id: def.rule_id,
                    field: field_name.to_string(),
                }
                .into());
            }
        }

        // The recommendation index only changes with the sample set or field
        // list; a pick grades its disabled flags against the cached one.
        let index = &self.index;
        let field = self
            .table
            .iter_mut()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| EngineError::UnknownField(field_name.to_string()))?;

        // Deselected rules go away; delete-state rules were never shown in
        // the picker and are not part of the diff.
        field
            .rules
            .retain(|b| b.state == RuleState::Delete || picked_ids.contains(&b.rule_id()));

        for def in selection {
            if !field.has_rule(def.rule_id) {
                let mut binding = RuleBinding::added(def);
                binding.disabled = index.is_disabled(&field.field_name, binding.rule_id());
                field.rules.push(binding);
            }
        }

        self.refresh_preview(PreviewScope::Field(field_name.to_string()))
            .await;
        Ok(())
    }

    /// Swap the rule at `rule_index` for a freshly picked definition.
    pub async fn replace_rule(
        &mut self,
        field_name: &str,
        rule_index: usize,
        def: RuleDefinition,
    ) -> Result<(), EngineError> {
        def.validate()?;

        let index = &self.index;
        let field = self
            .table
            .iter_mut()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| EngineError::UnknownField(field_name.to_string()))?;
        if rule_index >= field.rules.len() {
            return Err(EngineError::RuleIndexOutOfRange {
                field: field_name.to_string(),
                index: rule_index,
            });
        }
        if field
            .rules
            .iter()
            .enumerate()
            .any(|(i, b)| i != rule_index && b.rule_id() == def.rule_id)
        {
            return Err(RuleError::Duplicate {
                rule_id: def.rule_id,
                field: field_name.to_string(),
            }
            .into());
        }

        let mut binding = RuleBinding::added(def);
        binding.disabled = index.is_disabled(&field.field_name, binding.rule_id());
        field.rules[rule_index] = binding;

        self.refresh_preview(PreviewScope::Field(field_name.to_string()))
            .await;
        Ok(())
    }

    /// Detach the rule at `rule_index` from the field.
    pub async fn remove_rule(
        &mut self,
        field_name: &str,
        rule_index: usize,
    ) -> Result<(), EngineError> {
        let field = self
            .table
            .iter_mut()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| EngineError::UnknownField(field_name.to_string()))?;
        if rule_index >= field.rules.len() {
            return Err(EngineError::RuleIndexOutOfRange {
                field: field_name.to_string(),
                index: rule_index,
            });
        }
        field.rules.remove(rule_index);
        self.refresh_preview(PreviewScope::Field(field_name.to_string()))
            .await;
        Ok(())
    }

    /// Apply a drag-reorder: `order` is the field's rule ids in their new
    /// positions. Order is user-significant but purely presentational.
    pub async fn reorder_rules(
        &mut self,
        field_name: &str,
        order: &[i64],
    ) -> Result<(), EngineError> {
        let field = self
            .table
            .iter_mut()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| EngineError::UnknownField(field_name.to_string()))?;
        if order.len() != field.rules.len() {
            return Err(EngineError::ReorderMismatch);
        }
        let by_id: HashMap<i64, usize> = field
            .rules
            .iter()
            .enumerate()
            .map(|(i, b)| (b.rule_id(), i))
            .collect();
        let mut positions = Vec::with_capacity(order.len());
        let mut used: HashSet<i64> = HashSet::new();
        for id in order {
            let &i = by_id.get(id).ok_or(EngineError::ReorderMismatch)?;
            if !used.insert(*id) {
                return Err(EngineError::ReorderMismatch);
            }
            positions.push(i);
        }
        let old = std::mem::take(&mut field.rules);
        field.rules = positions.into_iter().map(|i| old[i].clone()).collect();

        self.refresh_preview(PreviewScope::Field(field_name.to_string()))
            .await;
        Ok(())
    }

    /// Accept the drift decision for a single rule. Update acceptance cascades
    /// to every field carrying the rule id; delete acceptance removes the rule
    /// from this field only.
    pub async fn sync_one(&mut self, field_name: &str, rule_index: usize) -> SyncOutcome {
        if self.all_synced {
            return SyncOutcome::Unchanged;
        }
        let outcome = lifecycle::sync_one(&mut self.table, field_name, rule_index);
        match outcome {
            SyncOutcome::RemovedLocally => {
                self.refresh_preview(PreviewScope::Field(field_name.to_string()))
                    .await;
            }
            SyncOutcome::Cascaded => {
                self.refresh_preview(PreviewScope::Table).await;
            }
            SyncOutcome::Unchanged => {}
        }
        outcome
    }

    /// Bulk synchronization. With `None`, resolves every drifted rule in the
    /// table and latches until the next rebuild so the bulk action cannot be
    /// applied twice.
    pub async fn sync_all(&mut self, rule_id: Option<i64>) -> bool {
        if self.table.is_empty() || self.all_synced {
            return false;
        }
        let changed = lifecycle::sync_rules(&mut self.table, rule_id);
        if rule_id.is_none() {
            self.all_synced = true;
        }
        if changed {
            self.refresh_preview(PreviewScope::Table).await;
        }
        changed
    }

    /// Whether a sync affordance should be offered at all.
    pub fn needs_sync(&self) -> bool {
        !self.all_synced && lifecycle::has_pending_drift(&self.table)
    }

    /// Number of derived/built-in fields whose masking results the origin-log
    /// field already aggregates ("already synced N masked results").
    pub fn synced_count(&self) -> usize {
        self.table
            .iter()
            .filter(|f| !f.is_origin() && !f.rules.is_empty())
            .count()
    }

    /// Pure search projection over the single source-of-truth table.
    pub fn filtered_view(&self, query: &str) -> Vec<FieldEntry> {
        let needle = query.to_lowercase();
        self.table
            .iter()
            .filter(|f| f.field_name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview_enabled
    }

    /// Toggle the preview switch; turning it back on refreshes the whole
    /// table, since previews were left to go stale while it was off.
    pub async fn set_preview_enabled(&mut self, enabled: bool) {
        let was = self.preview_enabled;
        self.preview_enabled = enabled;
        if enabled && !was {
            self.refresh_preview(PreviewScope::Table).await;
        }
    }

    /// Issue a preview request for the scope. The returned ticket carries the
    /// request payload and a sequence number; any earlier ticket for the same
    /// scope is superseded from this point on.
    pub fn begin_preview(&mut self, scope: PreviewScope) -> PreviewTicket {
        let counter = self.preview_seq.entry(scope.clone()).or_insert(0);
        *counter += 1;
        let seq = *counter;

        let field_configs = if self.samples.is_empty() {
            Vec::new()
        } else {
            match &scope {
                PreviewScope::Table => build_preview_configs(&self.table),
                PreviewScope::Field(name) => {
                    let scoped: Vec<FieldEntry> = self
                        .table
                        .iter()
                        .filter(|f| &f.field_name == name)
                        .cloned()
                        .collect();
                    build_preview_configs(&scoped)
                }
            }
        };
        PreviewTicket {
            scope,
            seq,
            field_configs,
            text_fields: self.text_field_names(),
        }
    }

    /// Publish a preview response. Responses that are not the latest issued
    /// for their scope are dropped so a slow request can never overwrite a
    /// newer result. Returns whether the response was applied.
    pub fn apply_preview(
        &mut self,
        ticket: &PreviewTicket,
        result: HashMap<String, Vec<Option<String>>>,
    ) -> bool {
        let current = self.preview_seq.get(&ticket.scope).copied().unwrap_or(0);
        if ticket.seq != current {
            debug!(scope = ?ticket.scope, seq = ticket.seq, current, "dropping stale preview response");
            return false;
        }
        let origin_values = &self.origin_values;
        match &ticket.scope {
            PreviewScope::Table => {
                for field in &mut self.table {
                    let masked = result
                        .get(&field.field_name)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    let pairs =
                        align_preview(field, origin_values.get(&field.field_name), masked);
                    field.preview = pairs;
                }
            }
            PreviewScope::Field(name) => {
                if let Some(field) = self.table.iter_mut().find(|f| &f.field_name == name) {
                    let masked = result
                        .get(&field.field_name)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    let pairs =
                        align_preview(field, origin_values.get(&field.field_name), masked);
                    field.preview = pairs;
                }
            }
        }
        true
    }

    /// Round-trip convenience: issue, call the renderer, publish. A failed
    /// call degrades to an empty preview for the scope rather than keeping
    /// stale data. Fields with no active rules never hit the network.
    pub async fn refresh_preview(&mut self, scope: PreviewScope) {
        if !self.preview_enabled {
            return;
        }
        let ticket = self.begin_preview(scope);
        if ticket.field_configs.is_empty() {
            self.apply_preview(&ticket, HashMap::new());
            return;
        }
        let result = match self
            .services
            .renderer
            .render_preview(&self.samples, &ticket.field_configs, &ticket.text_fields)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "preview request failed, clearing scope");
                HashMap::new()
            }
        };
        self.apply_preview(&ticket, result);
    }

    /// Persisted shape: only fields with rules, only the user's accepted
    /// decision per rule (`Undecided` persists as "normal").
    pub fn save_payload(&self) -> SavePayload {
        let field_configs = self
            .table
            .iter()
            .filter(|f| !f.rules.is_empty())
            .map(|f| PersistedFieldConfig {
                field_name: f.field_name.clone(),
                rules: f
                    .rules
                    .iter()
                    .map(|b| PersistedRule {
                        rule_id: b.rule_id(),
                        state: b.change_state.into(),
                    })
                    .collect(),
            })
            .collect();
        SavePayload {
            space_uid: self.space_uid.clone(),
            field_configs,
            text_fields: self.text_field_names(),
        }
    }

    /// Persist the table. On success the transient add/update markers are
    /// cleared; the next rebuild starts from a clean diff base.
    pub async fn save(&mut self) -> Result<(), EngineError> {
        let payload = self.save_payload();
        self.services
            .store
            .save_config(self.fieldset_id, &payload)
            .await?;
        for field in &mut self.table {
            for binding in &mut field.rules {
                binding.state = RuleState::Normal;
                binding.change_state = ChangeState::Undecided;
                binding.new_rule = None;
            }
        }
        self.from_saved = true;
        Ok(())
    }

    /// Ask the matcher for fresh recommendations and rebuild the index.
    /// Returns one incoming entry per known field, carrying the recommended
    /// rules as its snapshot. An empty sample set short-circuits locally; a
    /// failed call degrades to an empty index.
    async fn refresh_matches(&mut self) -> Vec<FieldEntry> {
        if self.samples.is_empty() {
            self.index = RecommendationIndex::default();
            return self.plain_entries();
        }
        let names: Vec<String> = self.specs.iter().map(|s| s.field_name.clone()).collect();
        match self
            .services
            .matcher
            .match_rules(&self.space_uid, &self.samples, &names)
            .await
        {
            Ok(matches) => {
                self.index = RecommendationIndex::from_matches(&matches);
                self.specs
                    .iter()
                    .map(|spec| {
                        let mut entry = fields::FieldEntry::from_spec(
                            spec,
                            fields::field_class(&spec.field_name, &spec.field_type, &self.built_in),
                        );
                        if let Some(defs) = matches.get(&spec.field_name) {
                            entry.recommended_rules =
                                defs.iter().cloned().map(RuleBinding::added).collect();
                        }
                        entry
                    })
                    .collect()
            }
            Err(err) => {
                warn!(error = %err, "rule matching failed, recommendations cleared");
                self.index = RecommendationIndex::default();
                self.plain_entries()
            }
        }
    }

    fn plain_entries(&self) -> Vec<FieldEntry> {
        self.specs
            .iter()
            .map(|spec| {
                fields::FieldEntry::from_spec(
                    spec,
                    fields::field_class(&spec.field_name, &spec.field_type, &self.built_in),
                )
            })
            .collect()
    }

    fn rebuild(&mut self, incoming: Vec<FieldEntry>, mode: MergeMode) {
        let existing = std::mem::take(&mut self.table);
        let merged = merge_fields(existing, incoming, mode);
        let mut table = fields::order_by_class(merged);
        lifecycle::annotate_table(&mut table, &self.index);
        self.table = table;
        self.all_synced = false;
    }

    fn entry_for(&self, field_name: &str) -> FieldEntry {
        match self.specs.iter().find(|s| s.field_name == field_name) {
            Some(spec) => fields::FieldEntry::from_spec(
                spec,
                fields::field_class(&spec.field_name, &spec.field_type, &self.built_in),
            ),
            None => {
                // Saved configs carry no field type; the origin-log naming
                // convention still has to hold for fields the current field
                // list no longer reports.
                let assumed_type = if field_name == fields::ORIGIN_FIELD_NAME {
                    fields::ORIGIN_FIELD_TYPE
                } else {
                    ""
                };
                let mut entry = fields::FieldEntry::new(
                    field_name,
                    fields::field_class(field_name, assumed_type, &self.built_in),
                );
                entry.field_type = assumed_type.to_string();
                entry
            }
        }
    }

    fn text_field_names(&self) -> Vec<String> {
        self.table
            .iter()
            .filter(|f| f.is_origin())
            .map(|f| f.field_name.clone())
            .collect()
    }
}
