use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule_id} has an invalid match pattern: {source}")]
    InvalidPattern {
        rule_id: i64,
        #[source]
        source: regex::Error,
    },
    #[error("rule {rule_id} is already attached to field {field}")]
    Duplicate { rule_id: i64, field: String },
}

/// Masking operator plus its operator-specific parameters.
///
/// Serializes to the wire shape `{"operator": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", content = "params", rename_all = "snake_case")]
pub enum MaskOperator {
    MaskShield {
        #[serde(default)]
        preserve_head: u32,
        #[serde(default)]
        preserve_tail: u32,
        #[serde(default = "default_replace_mark")]
        replace_mark: String,
    },
    TextReplace { template_string: String },
}

fn default_replace_mark() -> String {
    "*".to_string()
}

impl MaskOperator {
    /// Human-readable one-line summary, e.g. "mask | keep first 2, last 2".
    pub fn describe(&self) -> String {
        match self {
            MaskOperator::MaskShield { preserve_head, preserve_tail, .. } => {
                format!("mask | keep first {}, last {}", preserve_head, preserve_tail)
            }
            MaskOperator::TextReplace { template_string } => {
                format!("replace | with {}", template_string)
            }
        }
    }
}

/// A masking rule as defined server-side, identified by `rule_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: i64,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub match_fields: Vec<String>,
    #[serde(default)]
    pub match_pattern: String,
    #[serde(flatten)]
    pub operator: MaskOperator,
}

impl RuleDefinition {
    /// Whether two definitions of the same rule id diverge in any part that
    /// affects masking output. Names are cosmetic and not compared.
    pub fn drifted_from(&self, other: &RuleDefinition) -> bool {
        self.match_pattern != other.match_pattern
            || self.match_fields != other.match_fields
            || self.operator != other.operator
    }

    /// Validate the definition at the point of user addition. The match
    /// pattern must compile as a regex; an empty pattern is allowed (it means
    /// "match everything the operator is pointed at").
    pub fn validate(&self) -> Result<(), RuleError> {
        if !self.match_pattern.is_empty() {
            Regex::new(&self.match_pattern).map_err(|source| RuleError::InvalidPattern {
                rule_id: self.rule_id,
                source,
            })?;
        }
        Ok(())
    }
}

/// Diff status of a binding against the server's latest recommendation,
/// computed at rebuild time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    #[default]
    Normal,
    Add,
    Update,
    Delete,
}

/// The user's accepted decision for a drifted rule. `Undecided` replaces the
/// empty string the original wire format used for "no decision yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeState {
    #[default]
    #[serde(rename = "")]
    Undecided,
    Add,
    Update,
}

/// A rule attached to a field, together with its lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBinding {
    #[serde(flatten)]
    pub def: RuleDefinition,
    #[serde(default)]
    pub state: RuleState,
    #[serde(default)]
    pub change_state: ChangeState,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_rule: Option<RuleDefinition>,
}

impl RuleBinding {
    pub fn new(def: RuleDefinition) -> Self {
        Self {
            def,
            state: RuleState::Normal,
            change_state: ChangeState::Undecided,
            disabled: false,
            new_rule: None,
        }
    }

    /// Binding for a rule the user just picked manually.
    pub fn added(def: RuleDefinition) -> Self {
        Self {
            change_state: ChangeState::Add,
            ..Self::new(def)
        }
    }

    pub fn rule_id(&self) -> i64 {
        self.def.rule_id
    }

    /// Drifted and still waiting on a user decision.
    pub fn needs_decision(&self) -> bool {
        matches!(self.state, RuleState::Update | RuleState::Delete)
            && self.change_state == ChangeState::Undecided
    }

    /// Accept the server's updated definition: the visible fields are replaced
    /// by `new_rule`, `rule_id` is preserved, and the decision is recorded.
    /// Returns false when there is nothing to accept (not in `update` state).
    pub fn accept_update(&mut self) -> bool {
        if self.state != RuleState::Update {
            return false;
        }
        let Some(new_def) = self.new_rule.clone() else {
            return false;
        };
        let rule_id = self.def.rule_id;
        self.def = new_def;
        self.def.rule_id = rule_id;
        self.change_state = ChangeState::Update;
        true
    }
}
