use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::preview::FieldPreviewConfig;
use crate::rules::{ChangeState, RuleBinding, RuleDefinition};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service request failed: {0}")]
    Transport(String),
    #[error("service returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("failed to decode service response: {0}")]
    Decode(String),
}

/// Remote pattern matcher: which rules apply to which fields, judged from the
/// sample documents. Opaque; only the contract matters here.
#[async_trait]
pub trait RuleMatcher: Send + Sync {
    async fn match_rules(
        &self,
        space_uid: &str,
        samples: &[Value],
        field_names: &[String],
    ) -> Result<HashMap<String, Vec<RuleDefinition>>, ServiceError>;
}

/// Remote preview renderer: per field, one masked value (or null) per sample
/// document that contained the field.
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render_preview(
        &self,
        samples: &[Value],
        field_configs: &[FieldPreviewConfig],
        text_fields: &[String],
    ) -> Result<HashMap<String, Vec<Option<String>>>, ServiceError>;
}

/// Persistence of the finalized table, invoked only on explicit confirmation.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_config(&self, fieldset_id: i64) -> Result<Vec<SavedFieldConfig>, ServiceError>;

    async fn save_config(&self, fieldset_id: i64, payload: &SavePayload)
        -> Result<(), ServiceError>;
}

/// One field's rules as previously persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedFieldConfig {
    pub field_name: String,
    #[serde(default)]
    pub rules: Vec<RuleBinding>,
}

/// Only the user's accepted decision is persisted per rule; the transient
/// server-diff state never leaves the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedState {
    Normal,
    Add,
    Update,
}

impl From<ChangeState> for PersistedState {
    fn from(value: ChangeState) -> Self {
        match value {
            ChangeState::Undecided => PersistedState::Normal,
            ChangeState::Add => PersistedState::Add,
            ChangeState::Update => PersistedState::Update,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRule {
    pub rule_id: i64,
    pub state: PersistedState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFieldConfig {
    pub field_name: String,
    pub rules: Vec<PersistedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePayload {
    pub space_uid: String,
    pub field_configs: Vec<PersistedFieldConfig>,
    pub text_fields: Vec<String>,
}
