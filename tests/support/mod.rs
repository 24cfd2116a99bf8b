#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use logmask::engine::{EngineConfig, MaskingEngine, MaskingServices};
use logmask::fields::FieldSpec;
use logmask::preview::FieldPreviewConfig;
use logmask::rules::{MaskOperator, RuleBinding, RuleDefinition};
use logmask::services::{
    ConfigStore, PreviewRenderer, RuleMatcher, SavePayload, SavedFieldConfig, ServiceError,
};

pub fn shield(head: u32, tail: u32) -> MaskOperator {
    MaskOperator::MaskShield {
        preserve_head: head,
        preserve_tail: tail,
        replace_mark: "*".to_string(),
    }
}

pub fn def(id: i64, pattern: &str) -> RuleDefinition {
    RuleDefinition {
        rule_id: id,
        rule_name: format!("rule-{}", id),
        match_fields: vec![],
        match_pattern: pattern.to_string(),
        operator: shield(2, 2),
    }
}

pub fn binding(id: i64, pattern: &str) -> RuleBinding {
    RuleBinding::new(def(id, pattern))
}

pub fn spec(name: &str, field_type: &str) -> FieldSpec {
    FieldSpec {
        field_name: name.to_string(),
        field_alias: String::new(),
        field_type: field_type.to_string(),
    }
}

/// In-memory pattern matcher with a fixed response and a call counter.
#[derive(Default)]
pub struct FakeMatcher {
    pub response: Mutex<HashMap<String, Vec<RuleDefinition>>>,
    pub calls: Mutex<usize>,
    pub fail: AtomicBool,
}

impl FakeMatcher {
    pub fn returning(response: HashMap<String, Vec<RuleDefinition>>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        let matcher = Self::default();
        matcher.fail.store(true, Ordering::SeqCst);
        Arc::new(matcher)
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn set_response(&self, response: HashMap<String, Vec<RuleDefinition>>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleMatcher for FakeMatcher {
    async fn match_rules(
        &self,
        _space_uid: &str,
        _samples: &[Value],
        _field_names: &[String],
    ) -> Result<HashMap<String, Vec<RuleDefinition>>, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("matcher down".to_string()));
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

/// In-memory preview renderer recording every request it receives.
#[derive(Default)]
pub struct FakeRenderer {
    pub response: Mutex<HashMap<String, Vec<Option<String>>>>,
    pub requests: Mutex<Vec<Vec<FieldPreviewConfig>>>,
    pub fail: bool,
}

impl FakeRenderer {
    pub fn returning(response: HashMap<String, Vec<Option<String>>>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<Vec<FieldPreviewConfig>> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PreviewRenderer for FakeRenderer {
    async fn render_preview(
        &self,
        _samples: &[Value],
        field_configs: &[FieldPreviewConfig],
        _text_fields: &[String],
    ) -> Result<HashMap<String, Vec<Option<String>>>, ServiceError> {
        self.requests.lock().unwrap().push(field_configs.to_vec());
        if self.fail {
            return Err(ServiceError::Transport("renderer down".to_string()));
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

/// In-memory config store.
#[derive(Default)]
pub struct FakeStore {
    pub saved: Mutex<Vec<SavedFieldConfig>>,
    pub payloads: Mutex<Vec<SavePayload>>,
    pub fail_load: bool,
}

impl FakeStore {
    pub fn with_saved(saved: Vec<SavedFieldConfig>) -> Arc<Self> {
        Arc::new(Self {
            saved: Mutex::new(saved),
            ..Self::default()
        })
    }

    pub fn failing_load() -> Arc<Self> {
        Arc::new(Self {
            fail_load: true,
            ..Self::default()
        })
    }

    pub fn last_payload(&self) -> Option<SavePayload> {
        self.payloads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn load_config(&self, _fieldset_id: i64) -> Result<Vec<SavedFieldConfig>, ServiceError> {
        if self.fail_load {
            return Err(ServiceError::Transport("store down".to_string()));
        }
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save_config(
        &self,
        _fieldset_id: i64,
        payload: &SavePayload,
    ) -> Result<(), ServiceError> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub fn engine_with(
    matcher: Arc<FakeMatcher>,
    renderer: Arc<FakeRenderer>,
    store: Arc<FakeStore>,
    specs: Vec<FieldSpec>,
    built_in: &[&str],
) -> MaskingEngine {
    let services = MaskingServices {
        matcher,
        renderer,
        store,
    };
    let config = EngineConfig {
        space_uid: "space-1".to_string(),
        fieldset_id: 7,
    };
    let built_in: HashSet<String> = built_in.iter().map(|s| s.to_string()).collect();
    MaskingEngine::new(services, config, specs, built_in)
}

/// The usual three-field layout: one built-in, one cleaned, the origin log.
pub fn default_specs() -> Vec<FieldSpec> {
    vec![
        spec("ts", "date"),
        spec("user_id", "keyword"),
        spec("log", "text"),
    ]
}
