use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::preview::FieldPreviewConfig;
use crate::rules::RuleDefinition;
use crate::services::{
    ConfigStore, PreviewRenderer, RuleMatcher, SavePayload, SavedFieldConfig, ServiceError,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid masking service url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Typed HTTP client implementing all three masking service ports against the
/// backend REST API.
#[derive(Clone)]
pub struct RemoteMaskingApi {
    http: reqwest::Client,
    base_url: Url,
}

impl RemoteMaskingApi {
    /// Create a client bound to the given base URL.
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let mut url = Url::parse(base_url).map_err(|source| RemoteError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        if !url.path().ends_with('/') {
            let mut path = url.path().to_string();
            path.push('/');
            url.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|err| ServiceError::Transport(err.to_string()))
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ServiceError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        decode(response).await
    }
}

async fn decode<R: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<R, ServiceError> {
    if !response.status().is_success() {
        return Err(ServiceError::UnexpectedStatus {
            status: response.status().as_u16(),
        });
    }
    response
        .json()
        .await
        .map_err(|err| ServiceError::Decode(err.to_string()))
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    space_uid: &'a str,
    logs: &'a [Value],
    fields: &'a [String],
}

#[derive(Serialize)]
struct PreviewRequest<'a> {
    logs: &'a [Value],
    field_configs: &'a [FieldPreviewConfig],
    text_fields: &'a [String],
}

#[derive(Deserialize)]
struct ConfigResponse {
    #[serde(default)]
    field_configs: Vec<SavedFieldConfig>,
}

#[async_trait]
impl RuleMatcher for RemoteMaskingApi {
    async fn match_rules(
        &self,
        space_uid: &str,
        samples: &[Value],
        field_names: &[String],
    ) -> Result<HashMap<String, Vec<RuleDefinition>>, ServiceError> {
        let request = MatchRequest {
            space_uid,
            logs: samples,
            fields: field_names,
        };
        self.post_json("masking/match_rule", &request).await
    }
}

#[async_trait]
impl PreviewRenderer for RemoteMaskingApi {
    async fn render_preview(
        &self,
        samples: &[Value],
        field_configs: &[FieldPreviewConfig],
        text_fields: &[String],
    ) -> Result<HashMap<String, Vec<Option<String>>>, ServiceError> {
        let request = PreviewRequest {
            logs: samples,
            field_configs,
            text_fields,
        };
        self.post_json("masking/preview", &request).await
    }
}

#[async_trait]
impl ConfigStore for RemoteMaskingApi {
    async fn load_config(&self, fieldset_id: i64) -> Result<Vec<SavedFieldConfig>, ServiceError> {
        let url = self.endpoint(&format!("masking/configs/{}", fieldset_id))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        let body: ConfigResponse = decode(response).await?;
        Ok(body.field_configs)
    }

    async fn save_config(
        &self,
        fieldset_id: i64,
        payload: &SavePayload,
    ) -> Result<(), ServiceError> {
        let url = self.endpoint(&format!("masking/configs/{}", fieldset_id))?;
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::UnexpectedStatus {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
