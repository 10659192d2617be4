//! Stage sequencing.
//!
//! A run walks the selected stages in table order. Before a stage renders its
//! variables, every stage it consumes that has not applied in this run is
//! re-initialized (never re-applied) and its outputs are read from state.
use crate::azcli::AzCli;
use crate::config::{DeployConfig, DeployPaths};
use crate::databricks::{get_latest_model_version, RegistryTransport};
use crate::runner::CommandRunner;
use crate::secrets::{write_env_file, KeyVault, SecretBundle};
use crate::stages::{stage_variables, OutputKey, ReadMode, StackOutputs, StageId};
use crate::terraform::{DeploymentRecord, Terraform};
use crate::tfvars::{write_tfvars, TFVARS_FILE};
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;

/// Which stages a run applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Only(StageId),
}

impl Selection {
    pub fn stages(self) -> Vec<StageId> {
        match self {
            Selection::All => StageId::ALL.to_vec(),
            Selection::Only(stage) => vec![stage],
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a DeployConfig,
    paths: &'a DeployPaths,
    runner: &'a dyn CommandRunner,
    az: &'a AzCli,
    registry: &'a dyn RegistryTransport,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a DeployConfig,
        paths: &'a DeployPaths,
        runner: &'a dyn CommandRunner,
        az: &'a AzCli,
        registry: &'a dyn RegistryTransport,
    ) -> Self {
        Self {
            config,
            paths,
            runner,
            az,
            registry,
        }
    }

    fn terraform(&self) -> Terraform<'a> {
        Terraform::new(self.runner, &self.config.terraform_bin)
    }

    pub fn run(&self, selection: Selection) -> Result<StackOutputs> {
        let mut outputs = StackOutputs::default();
        let mut applied = BTreeSet::new();
        for stage in selection.stages() {
            self.load_consumed(stage, &applied, &mut outputs)?;
            self.apply_stage(stage, &mut outputs)
                .with_context(|| format!("stage {stage}"))?;
            applied.insert(stage);
            self.after_apply(stage, &outputs)
                .with_context(|| format!("propagate secrets after stage {stage}"))?;
        }
        Ok(outputs)
    }

    fn load_consumed(
        &self,
        stage: StageId,
        applied: &BTreeSet<StageId>,
        outputs: &mut StackOutputs,
    ) -> Result<()> {
        for &consumed in stage.spec().consumes {
            if applied.contains(&consumed) {
                continue;
            }
            tracing::info!(%stage, from = %consumed, "reading outputs from applied state");
            let dir = self.paths.stage_dir(consumed);
            self.terraform()
                .init(&dir)
                .with_context(|| format!("init stage {consumed}"))?;
            self.read_outputs(consumed, outputs)
                .with_context(|| format!("read outputs of stage {consumed}"))?;
        }
        Ok(())
    }

    fn read_outputs(&self, stage: StageId, outputs: &mut StackOutputs) -> Result<()> {
        let tf = self.terraform();
        let dir = self.paths.stage_dir(stage);
        for output in stage.spec().outputs {
            let name = output.key.output_name();
            let value = match output.mode {
                ReadMode::Required => tf.output(&dir, name)?,
                ReadMode::WithApply => tf.output_with_apply(&dir, name)?,
            };
            outputs.insert(output.key, value);
        }
        Ok(())
    }

    fn apply_stage(&self, stage: StageId, outputs: &mut StackOutputs) -> Result<()> {
        let dir = self.paths.stage_dir(stage);
        tracing::info!(
            %stage,
            dir = %display_path(&dir, Some(self.paths.root())),
            "applying stage"
        );
        let model_version = match stage {
            StageId::Serving => Some(self.resolve_serving_model_version(outputs)?),
            _ => None,
        };
        let vars = stage_variables(stage, self.config, outputs, model_version.as_deref())?;
        write_tfvars(&dir.join(TFVARS_FILE), &vars)?;

        let tf = self.terraform();
        tf.init(&dir)?;
        if stage.spec().import_on_conflict {
            let record = DeploymentRecord {
                account_id: outputs.require(OutputKey::OpenAiAccountId)?,
                deployment_name: &self.config.deployment_name,
            };
            tf.apply_with_import(&dir, &record)?;
        } else {
            tf.apply(&dir)?;
        }
        self.read_outputs(stage, outputs)?;
        tracing::info!(%stage, "stage applied");
        Ok(())
    }

    fn after_apply(&self, stage: StageId, outputs: &StackOutputs) -> Result<()> {
        match stage {
            StageId::OpenAi | StageId::Deployment => {
                write_env_file(self.paths.env_file(), &self.openai_bundle(outputs))
            }
            StageId::Databricks => {
                let bundle = SecretBundle {
                    workspace_url: outputs.get(OutputKey::WorkspaceUrl).map(str::to_string),
                    ..SecretBundle::default()
                };
                write_env_file(self.paths.env_file(), &bundle)
            }
            StageId::KeyVault => self.sync_key_vault(outputs),
            _ => Ok(()),
        }
    }

    fn openai_bundle(&self, outputs: &StackOutputs) -> SecretBundle {
        SecretBundle {
            api_base: outputs.get(OutputKey::OpenAiEndpoint).map(str::to_string),
            api_key: outputs.get(OutputKey::OpenAiPrimaryKey).map(str::to_string),
            api_version: Some(self.config.openai_api_version.clone()),
            deployment_name: Some(self.config.deployment_name.clone()),
            workspace_url: None,
        }
    }

    /// Grant Databricks access to the vault, then push the OpenAI secrets if
    /// the OpenAI stack has published them.
    fn sync_key_vault(&self, outputs: &StackOutputs) -> Result<()> {
        let vault_name = outputs.require(OutputKey::KeyVaultName)?;
        let vault = KeyVault::new(self.runner, self.az);
        vault.grant_databricks_access(vault_name)?;

        let mut bundle = self.openai_bundle(outputs);
        let openai_dir = self.paths.stage_dir(StageId::OpenAi);
        let tf = self.terraform();
        if bundle.api_base.is_none() {
            bundle.api_base = tf
                .output_optional(&openai_dir, OutputKey::OpenAiEndpoint.output_name())
                .into_option();
        }
        if bundle.api_key.is_none() {
            bundle.api_key = tf
                .output_optional(&openai_dir, OutputKey::OpenAiPrimaryKey.output_name())
                .into_option();
        }
        if bundle.api_base.is_none() || bundle.api_key.is_none() {
            tracing::warn!(
                vault = vault_name,
                "OpenAI endpoint or key unavailable; skipping Key Vault secret sync"
            );
            return Ok(());
        }
        vault.sync_openai_secrets(vault_name, &bundle)
    }

    fn resolve_serving_model_version(&self, outputs: &StackOutputs) -> Result<String> {
        let model_name = &self.config.serving_model_name;
        if let Some(version) = &self.config.serving_model_version {
            tracing::info!(model = %model_name, %version, "using pinned model version");
            return Ok(version.clone());
        }
        let host = outputs.require(OutputKey::WorkspaceUrl)?;
        let token = self.az.databricks_token(self.runner)?;
        get_latest_model_version(self.registry, host, &token, model_name)?.ok_or_else(|| {
            anyhow!(
                "could not find any model versions for '{model_name}'; register the model \
                 in MLflow before deploying the serving endpoint"
            )
        })
    }
}
