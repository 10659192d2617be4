//! Azure CLI discovery and token exchange.
use crate::runner::{CommandLine, CommandRunner};
use anyhow::Result;
use std::fmt;
use std::path::Path;

/// First-party application id of Azure Databricks.
///
/// Used both as the token resource and as the service principal granted
/// access to the vault.
pub const DATABRICKS_APP_ID: &str = "2ff814a6-3304-4ab8-85cb-cd0e6f879c1d";

const AZ_FALLBACK_PATHS: &[&str] = &[
    r"C:\Program Files (x86)\Microsoft SDKs\Azure\CLI2\wbin\az.cmd",
    r"C:\Program Files\Microsoft SDKs\Azure\CLI2\wbin\az.cmd",
];

/// A required external tool that could not be located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub tool: &'static str,
}

impl fmt::Display for MissingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} not found. Install Azure CLI or ensure az is on PATH.",
            self.tool
        )
    }
}

impl std::error::Error for MissingTool {}

/// Location of the `az` binary, if any.
///
/// Absence only becomes an error when an operation actually needs `az`.
#[derive(Debug, Clone)]
pub struct AzCli {
    bin: Option<String>,
}

impl AzCli {
    /// Look for `az` on PATH, then in the default Windows install locations.
    pub fn discover() -> Self {
        let bin = which::which("az")
            .ok()
            .map(|path| path.display().to_string())
            .or_else(|| {
                AZ_FALLBACK_PATHS
                    .iter()
                    .find(|path| Path::new(path).is_file())
                    .map(|path| path.to_string())
            });
        match &bin {
            Some(path) => tracing::debug!(az = %path, "located Azure CLI"),
            None => tracing::debug!("Azure CLI not found"),
        }
        Self { bin }
    }

    pub fn at(bin: impl Into<String>) -> Self {
        Self {
            bin: Some(bin.into()),
        }
    }

    #[cfg(test)]
    pub fn missing() -> Self {
        Self { bin: None }
    }

    /// Start an `az` command line, failing with [`MissingTool`] when absent.
    pub fn command(&self) -> Result<CommandLine> {
        let bin = self
            .bin
            .as_deref()
            .ok_or(MissingTool { tool: "Azure CLI" })?;
        Ok(CommandLine::new(bin))
    }

    /// Obtain an Azure AD access token for the Databricks resource.
    pub fn databricks_token(&self, runner: &dyn CommandRunner) -> Result<String> {
        let cmd = self.command()?.args([
            "account",
            "get-access-token",
            "--resource",
            DATABRICKS_APP_ID,
            "--query",
            "accessToken",
            "-o",
            "tsv",
        ]);
        runner.run_capture(&cmd)
    }
}
