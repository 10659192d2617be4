//! The fixed stage table.
//!
//! Each stage names its stack directory, the earlier stages whose outputs
//! feed its variables, and the outputs it publishes. The pipeline driver
//! consumes this table; no stage has its own control flow.
use crate::config::DeployConfig;
use crate::tfvars::{TfValue, TfVar};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    ResourceGroup,
    OpenAi,
    Deployment,
    Databricks,
    KeyVault,
    Compute,
    Notebooks,
    Serving,
}

impl StageId {
    /// Every stage in dependency order.
    pub const ALL: [StageId; 8] = [
        StageId::ResourceGroup,
        StageId::OpenAi,
        StageId::Deployment,
        StageId::Databricks,
        StageId::KeyVault,
        StageId::Compute,
        StageId::Notebooks,
        StageId::Serving,
    ];

    pub fn spec(self) -> &'static StageSpec {
        let spec = &STAGES[self as usize];
        debug_assert_eq!(spec.id, self, "stage table out of order");
        spec
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named values published by stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputKey {
    ResourceGroupName,
    OpenAiAccountName,
    OpenAiAccountId,
    OpenAiEndpoint,
    OpenAiPrimaryKey,
    WorkspaceUrl,
    KeyVaultName,
}

impl OutputKey {
    /// Terraform output name.
    pub fn output_name(self) -> &'static str {
        match self {
            OutputKey::ResourceGroupName => "resource_group_name",
            OutputKey::OpenAiAccountName => "openai_account_name",
            OutputKey::OpenAiAccountId => "openai_account_id",
            OutputKey::OpenAiEndpoint => "openai_endpoint",
            OutputKey::OpenAiPrimaryKey => "openai_primary_key",
            OutputKey::WorkspaceUrl => "databricks_workspace_url",
            OutputKey::KeyVaultName => "key_vault_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Required,
    /// Re-apply once if the output is missing from state.
    WithApply,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputSpec {
    pub key: OutputKey,
    pub mode: ReadMode,
}

const fn required(key: OutputKey) -> OutputSpec {
    OutputSpec {
        key,
        mode: ReadMode::Required,
    }
}

#[derive(Debug)]
pub struct StageSpec {
    pub id: StageId,
    pub name: &'static str,
    /// Directory under the stack root.
    pub dir: &'static str,
    pub consumes: &'static [StageId],
    pub outputs: &'static [OutputSpec],
    /// Apply imports an existing model deployment on conflict.
    pub import_on_conflict: bool,
}

pub static STAGES: [StageSpec; 8] = [
    StageSpec {
        id: StageId::ResourceGroup,
        name: "resource-group",
        dir: "01_resource_group",
        consumes: &[],
        outputs: &[required(OutputKey::ResourceGroupName)],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::OpenAi,
        name: "openai",
        dir: "02_azure_openai",
        consumes: &[StageId::ResourceGroup],
        outputs: &[
            required(OutputKey::OpenAiAccountName),
            required(OutputKey::OpenAiAccountId),
            required(OutputKey::OpenAiEndpoint),
            OutputSpec {
                key: OutputKey::OpenAiPrimaryKey,
                mode: ReadMode::WithApply,
            },
        ],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::Deployment,
        name: "deployment",
        dir: "03_openai_deployment",
        consumes: &[StageId::ResourceGroup, StageId::OpenAi],
        outputs: &[],
        import_on_conflict: true,
    },
    StageSpec {
        id: StageId::Databricks,
        name: "databricks",
        dir: "04_databricks_workspace",
        consumes: &[StageId::ResourceGroup],
        outputs: &[required(OutputKey::WorkspaceUrl)],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::KeyVault,
        name: "keyvault",
        dir: "05_key_vault",
        consumes: &[StageId::ResourceGroup],
        outputs: &[required(OutputKey::KeyVaultName)],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::Compute,
        name: "compute",
        dir: "06_databricks_compute",
        consumes: &[StageId::ResourceGroup],
        outputs: &[],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::Notebooks,
        name: "notebooks",
        dir: "07_notebooks",
        consumes: &[StageId::ResourceGroup],
        outputs: &[],
        import_on_conflict: false,
    },
    StageSpec {
        id: StageId::Serving,
        name: "serving",
        dir: "08_serving_endpoint",
        consumes: &[StageId::ResourceGroup, StageId::Databricks],
        outputs: &[],
        import_on_conflict: false,
    },
];

/// Outputs collected during one run.
#[derive(Debug, Clone, Default)]
pub struct StackOutputs {
    values: BTreeMap<OutputKey, String>,
}

impl StackOutputs {
    pub fn insert(&mut self, key: OutputKey, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: OutputKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn require(&self, key: OutputKey) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| anyhow!("output {} has not been read", key.output_name()))
    }
}

/// Variables for `stage`, in render order.
///
/// `serving_model_version` must be resolved before rendering the serving
/// stage and is ignored elsewhere.
pub fn stage_variables(
    stage: StageId,
    config: &DeployConfig,
    outputs: &StackOutputs,
    serving_model_version: Option<&str>,
) -> Result<Vec<TfVar>> {
    let rg_name = || -> Result<TfValue> {
        Ok(outputs.require(OutputKey::ResourceGroupName)?.into())
    };
    let vars = match stage {
        StageId::ResourceGroup => vec![
            ("resource_group_name", TfValue::Null),
            (
                "resource_group_name_prefix",
                (&config.resource_group_name_prefix).into(),
            ),
            ("location", (&config.location).into()),
        ],
        StageId::OpenAi => vec![
            ("resource_group_name", rg_name()?),
            ("location", (&config.location).into()),
            ("account_name_prefix", (&config.account_name_prefix).into()),
            ("sku_name", (&config.sku_name).into()),
        ],
        StageId::Deployment => vec![
            ("resource_group_name", rg_name()?),
            (
                "account_name",
                outputs.require(OutputKey::OpenAiAccountName)?.into(),
            ),
            ("deployment_name", (&config.deployment_name).into()),
            ("model_name", (&config.model_name).into()),
            ("model_version", (&config.model_version).into()),
            ("scale_type", (&config.scale_type).into()),
            ("deployment_capacity", config.deployment_capacity.into()),
        ],
        StageId::Databricks => vec![
            ("resource_group_name", rg_name()?),
            ("location", (&config.location).into()),
            ("workspace_name_prefix", (&config.workspace_name_prefix).into()),
            ("sku", (&config.databricks_sku).into()),
            ("managed_resource_group_name", TfValue::Null),
        ],
        StageId::KeyVault => vec![
            ("resource_group_name", rg_name()?),
            ("location", (&config.location).into()),
            ("key_vault_name_prefix", (&config.key_vault_name_prefix).into()),
            ("sku_name", (&config.key_vault_sku_name).into()),
        ],
        StageId::Compute => vec![
            ("resource_group_name", rg_name()?),
            ("secret_scope_name", (&config.secret_scope_name).into()),
            ("openai_pypi_package", (&config.openai_pypi_package).into()),
            ("use_ml_runtime", config.use_ml_runtime.into()),
        ],
        StageId::Notebooks => vec![("resource_group_name", rg_name()?)],
        StageId::Serving => {
            let model_version = serving_model_version
                .ok_or_else(|| anyhow!("serving model version has not been resolved"))?;
            vec![
                ("resource_group_name", rg_name()?),
                ("endpoint_name", (&config.serving_endpoint_name).into()),
                ("served_model_name", (&config.serving_model_name).into()),
                ("model_name", (&config.serving_model_name).into()),
                ("model_version", model_version.into()),
                ("secret_scope_name", (&config.secret_scope_name).into()),
                ("workload_size", (&config.serving_workload_size).into()),
                ("scale_to_zero_enabled", config.serving_scale_to_zero.into()),
                (
                    "traffic_percentage",
                    config.serving_traffic_percentage.into(),
                ),
            ]
        }
    };
    Ok(vars)
}
