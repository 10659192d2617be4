use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod azcli;
mod cli;
mod config;
mod databricks;
mod pipeline;
mod runner;
mod secrets;
mod stages;
mod terraform;
#[cfg(test)]
mod testing;
mod tfvars;
mod util;

use azcli::AzCli;
use cli::RootArgs;
use config::{load_config, DeployPaths};
use databricks::UreqTransport;
use pipeline::Pipeline;
use runner::{exit_code_for, CommandFailed, ProcessRunner};

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let failed_command = err
                .chain()
                .any(|cause| cause.downcast_ref::<CommandFailed>().is_some());
            if failed_command {
                eprintln!("Command failed: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: &RootArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let root = match &args.repo_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve repo root {}", root.display()))?;
    let paths = DeployPaths::new(root, &config);

    let az = match &config.az_bin {
        Some(bin) => AzCli::at(bin.clone()),
        None => AzCli::discover(),
    };
    let registry = UreqTransport::new(Duration::from_secs(config.http_timeout_secs));
    let runner = ProcessRunner;
    let selection = args.selection();
    tracing::debug!(?selection, root = %paths.root().display(), "starting deployment");

    Pipeline::new(&config, &paths, &runner, &az, &registry).run(selection)?;
    tracing::info!(env_file = %display_env(&paths), "deployment finished");
    Ok(())
}

fn display_env(paths: &DeployPaths) -> String {
    util::display_path(paths.env_file(), Some(paths.root()))
}

/// `RUST_LOG` wins over the command-line verbosity flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("info"),
                1 => EnvFilter::new("debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
