//! Shared test infrastructure for integration tests.
//!
//! Each fixture builds a throwaway repository with empty stage directories
//! and stub `terraform`/`az` scripts that log their argv instead of touching
//! any cloud.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes fixtures so no other test thread forks while a stub script is
/// open for writing (avoids ETXTBSY on exec).
static SERIAL: Mutex<()> = Mutex::new(());

pub const STAGE_DIRS: [&str; 8] = [
    "01_resource_group",
    "02_azure_openai",
    "03_openai_deployment",
    "04_databricks_workspace",
    "05_key_vault",
    "06_databricks_compute",
    "07_notebooks",
    "08_serving_endpoint",
];

const TERRAFORM_STUB: &str = r#"#!/bin/sh
echo "terraform $*" >> "$STUB_LOG"
case "$2" in
  output)
    echo "stub-$4"
    ;;
  apply)
    if [ -n "$STUB_APPLY_EXIT" ]; then
      echo "Error: apply failed" >&2
      exit "$STUB_APPLY_EXIT"
    fi
    ;;
esac
exit 0
"#;

const AZ_STUB: &str = r#"#!/bin/sh
echo "az $*" >> "$STUB_LOG"
exit 0
"#;

pub struct StubRepo {
    _temp: TempDir,
    pub root: PathBuf,
    log: PathBuf,
    config: PathBuf,
}

pub struct RunResult {
    pub output: Output,
    pub log: Vec<String>,
}

impl RunResult {
    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write stub script");
    let mut perms = fs::metadata(path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod stub");
}

impl StubRepo {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().join("repo");
        for dir in STAGE_DIRS {
            fs::create_dir_all(root.join("terraform").join(dir)).expect("create stage dir");
        }
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).expect("create bin dir");
        let terraform = bin.join("terraform");
        let az = bin.join("az");
        write_script(&terraform, TERRAFORM_STUB);
        write_script(&az, AZ_STUB);

        let config = temp.path().join("deploy.json");
        let config_json = serde_json::json!({
            "terraform_bin": terraform.display().to_string(),
            "az_bin": az.display().to_string(),
            "serving_model_version": "4",
        });
        fs::write(&config, config_json.to_string()).expect("write config");

        let log = temp.path().join("calls.log");
        Self {
            _temp: temp,
            root,
            log,
            config,
        }
    }

    pub fn stage_dir(&self, dir: &str) -> PathBuf {
        self.root.join("terraform").join(dir)
    }

    pub fn tfvars(&self, dir: &str) -> Option<String> {
        fs::read_to_string(self.stage_dir(dir).join("terraform.tfvars")).ok()
    }

    pub fn env_file(&self) -> Option<String> {
        fs::read_to_string(self.root.join(".env")).ok()
    }

    /// Run the binary with `args`; `apply_exit` makes every stub apply fail.
    pub fn run(&self, args: &[&str], apply_exit: Option<i32>) -> RunResult {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_genai-deploy"));
        cmd.arg("--repo-root")
            .arg(&self.root)
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env("STUB_LOG", &self.log)
            .env_remove("STUB_APPLY_EXIT")
            .env_remove("RUST_LOG");
        if let Some(code) = apply_exit {
            cmd.env("STUB_APPLY_EXIT", code.to_string());
        }
        let output = cmd.output().expect("run genai-deploy");
        let log = fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(|line| line.replace(&self.root.display().to_string(), "<root>"))
            .collect();
        RunResult { output, log }
    }
}
