//! CLI argument parsing for the deployment pipeline.
use crate::pipeline::Selection;
use crate::stages::StageId;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Root CLI entrypoint.
///
/// At most one `--<stage>-only` flag may be given; without one the whole
/// pipeline runs.
#[derive(Parser, Debug)]
#[command(
    name = "genai-deploy",
    version,
    about = "Deploy Terraform stacks for Azure OpenAI and Databricks",
    group(ArgGroup::new("stage").multiple(false)),
    after_help = "Stages run in order: rg, openai, deployment, databricks, keyvault, compute, notebooks, serving.\n\nExamples:\n  genai-deploy\n  genai-deploy --keyvault-only\n  genai-deploy --repo-root ~/src/dbgenai --config deploy.json --serving-only"
)]
pub struct RootArgs {
    /// Deploy only the resource group stack
    #[arg(long, group = "stage")]
    pub rg_only: bool,

    /// Deploy only the Azure OpenAI account stack
    #[arg(long, group = "stage")]
    pub openai_only: bool,

    /// Deploy only the Azure OpenAI deployment stack
    #[arg(long, group = "stage")]
    pub deployment_only: bool,

    /// Deploy only the Databricks workspace stack
    #[arg(long, group = "stage")]
    pub databricks_only: bool,

    /// Deploy only the Key Vault stack
    #[arg(long, group = "stage")]
    pub keyvault_only: bool,

    /// Deploy only the Databricks compute stack
    #[arg(long, group = "stage")]
    pub compute_only: bool,

    /// Deploy only the notebooks stack
    #[arg(long, group = "stage")]
    pub notebooks_only: bool,

    /// Deploy only the serving endpoint stack
    #[arg(long, group = "stage")]
    pub serving_only: bool,

    /// Repository root containing the terraform/ stacks and .env
    #[arg(long, value_name = "DIR")]
    pub repo_root: Option<PathBuf>,

    /// JSON file overriding deployment defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl RootArgs {
    pub fn selection(&self) -> Selection {
        let flags = [
            (self.rg_only, StageId::ResourceGroup),
            (self.openai_only, StageId::OpenAi),
            (self.deployment_only, StageId::Deployment),
            (self.databricks_only, StageId::Databricks),
            (self.keyvault_only, StageId::KeyVault),
            (self.compute_only, StageId::Compute),
            (self.notebooks_only, StageId::Notebooks),
            (self.serving_only, StageId::Serving),
        ];
        flags
            .into_iter()
            .find_map(|(set, stage)| set.then_some(stage))
            .map_or(Selection::All, Selection::Only)
    }
}
