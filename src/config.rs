//! Deployment configuration.
//!
//! Built once at startup from defaults, optionally overlaid with a JSON file,
//! and passed by reference to every stage. Nothing reads configuration from
//! globals.
use crate::stages::StageId;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub resource_group_name_prefix: String,
    pub location: String,
    pub account_name_prefix: String,
    pub sku_name: String,
    pub deployment_name: String,
    pub model_name: String,
    pub model_version: String,
    pub scale_type: String,
    pub deployment_capacity: u32,
    pub openai_api_version: String,
    pub workspace_name_prefix: String,
    pub databricks_sku: String,
    pub key_vault_name_prefix: String,
    pub key_vault_sku_name: String,
    pub secret_scope_name: String,
    pub openai_pypi_package: String,
    pub use_ml_runtime: bool,
    pub serving_endpoint_name: String,
    pub serving_model_name: String,
    /// Pinned model version; looked up in the registry when unset.
    pub serving_model_version: Option<String>,
    pub serving_workload_size: String,
    pub serving_scale_to_zero: bool,
    pub serving_traffic_percentage: u32,
    pub terraform_bin: String,
    /// Explicit Azure CLI path; discovered on PATH when unset.
    pub az_bin: Option<String>,
    /// Stack directory, relative to the repository root.
    pub stack_dir: String,
    /// Env file, relative to the repository root.
    pub env_file: String,
    pub http_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            resource_group_name_prefix: "rg-dbgenai".to_string(),
            location: "eastus2".to_string(),
            account_name_prefix: "aoaidbgenai".to_string(),
            sku_name: "S0".to_string(),
            deployment_name: "gpt-5-chat".to_string(),
            model_name: "gpt-5-chat".to_string(),
            model_version: "2025-10-03".to_string(),
            scale_type: "GlobalStandard".to_string(),
            deployment_capacity: 1,
            openai_api_version: "2024-02-15-preview".to_string(),
            workspace_name_prefix: "adb-genai".to_string(),
            databricks_sku: "premium".to_string(),
            key_vault_name_prefix: "kvdbgenai".to_string(),
            key_vault_sku_name: "standard".to_string(),
            secret_scope_name: "aoai-scope".to_string(),
            openai_pypi_package: "openai==1.56.0".to_string(),
            use_ml_runtime: true,
            serving_endpoint_name: "basic-chatbot-endpoint".to_string(),
            serving_model_name: "basic-chatbot".to_string(),
            serving_model_version: None,
            serving_workload_size: "Small".to_string(),
            serving_scale_to_zero: true,
            serving_traffic_percentage: 100,
            terraform_bin: "terraform".to_string(),
            az_bin: None,
            stack_dir: "terraform".to_string(),
            env_file: ".env".to_string(),
            http_timeout_secs: 60,
        }
    }
}

/// Load defaults, overlaid by the JSON file at `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    let config = match path {
        None => DeployConfig::default(),
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("parse config JSON {}", path.display()))?
        }
    };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &DeployConfig) -> Result<()> {
    let required = [
        ("terraform_bin", &config.terraform_bin),
        ("deployment_name", &config.deployment_name),
        ("serving_model_name", &config.serving_model_name),
        ("stack_dir", &config.stack_dir),
        ("env_file", &config.env_file),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(anyhow!("config field {name} must not be empty"));
        }
    }
    if config.serving_traffic_percentage > 100 {
        return Err(anyhow!(
            "serving_traffic_percentage must be at most 100 (got {})",
            config.serving_traffic_percentage
        ));
    }
    if config.http_timeout_secs == 0 {
        return Err(anyhow!("http_timeout_secs must be positive"));
    }
    Ok(())
}

/// Filesystem locations derived from the repository root.
#[derive(Debug, Clone)]
pub struct DeployPaths {
    root: PathBuf,
    stack_root: PathBuf,
    env_file: PathBuf,
}

impl DeployPaths {
    pub fn new(root: PathBuf, config: &DeployConfig) -> Self {
        let stack_root = root.join(&config.stack_dir);
        let env_file = root.join(&config.env_file);
        Self {
            root,
            stack_root,
            env_file,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: StageId) -> PathBuf {
        self.stack_root.join(stage.spec().dir)
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }
}
