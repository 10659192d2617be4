use super::SecretBundle;
use crate::azcli::{AzCli, DATABRICKS_APP_ID};
use crate::runner::CommandRunner;
use anyhow::Result;

/// Key Vault secret names, in the order they are set.
pub const KEY_VAULT_SECRET_NAMES: [&str; 4] = [
    "openai-api-base",
    "openai-api-key",
    "openai-api-version",
    "openai-deployment-name",
];

/// Key Vault operations through the Azure CLI.
pub struct KeyVault<'a> {
    runner: &'a dyn CommandRunner,
    az: &'a AzCli,
}

impl<'a> KeyVault<'a> {
    pub fn new(runner: &'a dyn CommandRunner, az: &'a AzCli) -> Self {
        Self { runner, az }
    }

    /// Let the Databricks service principal read secrets from `vault`.
    pub fn grant_databricks_access(&self, vault: &str) -> Result<()> {
        let cmd = self.az.command()?.args([
            "keyvault",
            "set-policy",
            "--name",
            vault,
            "--spn",
            DATABRICKS_APP_ID,
            "--secret-permissions",
            "get",
            "list",
        ]);
        self.runner.run(&cmd)
    }

    /// Set one secret; `None` is a no-op. The value never appears in logs.
    pub fn set_secret(&self, vault: &str, name: &str, value: Option<&str>) -> Result<()> {
        let Some(value) = value else {
            tracing::debug!(secret = name, "no value; skipping");
            return Ok(());
        };
        let cmd = self.az.command()?.args([
            "keyvault",
            "secret",
            "set",
            "--vault-name",
            vault,
            "--name",
            name,
            "--value",
            value,
        ]);
        let value_position = cmd.argc() - 1;
        self.runner.run_sensitive(&cmd, &[value_position])
    }

    /// Set the four OpenAI secrets in order, stopping at the first failure.
    pub fn sync_openai_secrets(&self, vault: &str, bundle: &SecretBundle) -> Result<()> {
        let values = [
            bundle.api_base.as_deref(),
            bundle.api_key.as_deref(),
            bundle.api_version.as_deref(),
            bundle.deployment_name.as_deref(),
        ];
        for (name, value) in KEY_VAULT_SECRET_NAMES.into_iter().zip(values) {
            self.set_secret(vault, name, value)?;
        }
        Ok(())
    }
}
