//! Databricks model registry lookups.
//!
//! The registry API moved between releases, so the latest-version lookup
//! walks a fixed list of endpoints and skips the ones a workspace does not
//! serve.
use crate::util::ensure_https;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

const ENDPOINT_NOT_FOUND: &str = "ENDPOINT_NOT_FOUND";

/// Non-success HTTP response from the Databricks REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub body: String,
}

impl ApiError {
    pub fn is_endpoint_not_found(&self) -> bool {
        self.body.contains(ENDPOINT_NOT_FOUND)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Databricks API error {}: {}", self.status, self.body)
    }
}

impl std::error::Error for ApiError {}

/// Authenticated JSON POST against a Databricks workspace.
///
/// Non-success statuses must surface as an [`ApiError`] in the error chain.
pub trait RegistryTransport {
    fn post_json(&self, url: &str, token: &str, body: &Value) -> Result<Value>;
}

/// Blocking HTTP transport backed by `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl RegistryTransport for UreqTransport {
    fn post_json(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        let mut response = self
            .agent
            .post(url)
            .header("Authorization", &format!("Bearer {token}"))
            .send_json(body)
            .with_context(|| format!("POST {url}"))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("read response from {url}"))?;
        if !(200..300).contains(&status) {
            return Err(ApiError { status, body: text }.into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text).with_context(|| format!("parse JSON response from {url}"))
    }
}

/// What a single registry endpoint said about a model.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointOutcome {
    Versions(Vec<i64>),
    NotFound,
}

fn registry_requests(model_name: &str) -> [(&'static str, Value); 3] {
    let filter = json!({ "filter": format!("name='{model_name}'") });
    [
        (
            "/api/2.0/mlflow/registered-models/get-latest-versions",
            json!({ "name": model_name }),
        ),
        ("/api/2.0/mlflow/model-versions/search", filter.clone()),
        ("/api/2.0/preview/mlflow/model-versions/search", filter),
    ]
}

fn query_endpoint(
    transport: &dyn RegistryTransport,
    url: &str,
    token: &str,
    body: &Value,
) -> Result<EndpointOutcome> {
    match transport.post_json(url, token, body) {
        Ok(response) => Ok(EndpointOutcome::Versions(numeric_versions(&response))),
        Err(err) if is_endpoint_not_found(&err) => Ok(EndpointOutcome::NotFound),
        Err(err) => Err(err),
    }
}

fn is_endpoint_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ApiError>())
        .any(ApiError::is_endpoint_not_found)
}

/// Integer `model_versions[].version` values; anything non-numeric is skipped.
fn numeric_versions(response: &Value) -> Vec<i64> {
    let Some(items) = response.get("model_versions").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item.get("version")? {
            Value::String(text) => text.trim().parse().ok(),
            Value::Number(number) => number.as_i64(),
            _ => None,
        })
        .collect()
}

/// Highest registered version of `model_name`, or `None` when no endpoint
/// reports any version.
pub fn get_latest_model_version(
    transport: &dyn RegistryTransport,
    host: &str,
    token: &str,
    model_name: &str,
) -> Result<Option<String>> {
    let base = ensure_https(host);
    let base = base.trim_end_matches('/');
    for (path, body) in registry_requests(model_name) {
        let url = format!("{base}{path}");
        match query_endpoint(transport, &url, token, &body)? {
            EndpointOutcome::NotFound => {
                tracing::debug!(%url, "registry endpoint not served; trying next");
            }
            EndpointOutcome::Versions(versions) => {
                if let Some(latest) = versions.iter().max() {
                    tracing::info!(model = model_name, version = latest, "found model version");
                    return Ok(Some(latest.to_string()));
                }
                tracing::debug!(%url, "registry endpoint returned no versions");
            }
        }
    }
    Ok(None)
}
