//! Propagation of Azure OpenAI connection values.
//!
//! Values reach consumers through two sinks: the repository `.env` file and
//! the Key Vault secrets read by Databricks. Either sink accepts a partially
//! filled [`SecretBundle`], since which values exist depends on the stages
//! that ran.
mod env_file;
mod vault;

pub use env_file::{write_env_file, ENV_KEYS};
pub use vault::KeyVault;

/// Connection values gathered during a run. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretBundle {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub deployment_name: Option<String>,
    pub workspace_url: Option<String>,
}

impl SecretBundle {
    /// Values keyed by their environment variable names, in canonical order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 5] {
        [
            (ENV_KEYS[0], self.api_base.as_deref()),
            (ENV_KEYS[1], self.api_key.as_deref()),
            (ENV_KEYS[2], self.api_version.as_deref()),
            (ENV_KEYS[3], self.deployment_name.as_deref()),
            (ENV_KEYS[4], self.workspace_url.as_deref()),
        ]
    }
}
