//! Terraform stage driver.
//!
//! Wraps `init`/`apply`/`output`/`import` for one stack directory. All verbs
//! are scoped with `-chdir=<dir>` so the process working directory never
//! changes.
use crate::runner::{CommandFailed, CommandLine, CommandRunner};
use anyhow::{Context, Result};
use std::path::Path;

/// Resource type whose pre-existing instances are imported on conflict.
pub const DEPLOYMENT_RESOURCE_TYPE: &str = "azurerm_cognitive_deployment";
const DEPLOYMENT_RESOURCE_ADDRESS: &str = "azurerm_cognitive_deployment.main";
const CONFLICT_MARKER: &str = "already exists";

/// Account and deployment name of a model deployment.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentRecord<'a> {
    pub account_id: &'a str,
    pub deployment_name: &'a str,
}

impl DeploymentRecord<'_> {
    /// Azure resource id of the deployment, used as the import id.
    pub fn resource_id(&self) -> String {
        format!("{}/deployments/{}", self.account_id, self.deployment_name)
    }
}

/// Result of reading an output that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRead {
    Value(String),
    Missing,
}

impl OutputRead {
    pub fn into_option(self) -> Option<String> {
        match self {
            OutputRead::Value(value) => Some(value),
            OutputRead::Missing => None,
        }
    }
}

/// True when apply output reports an existing model deployment.
///
/// This matches Terraform's error phrasing and breaks if the provider rewords
/// it.
pub fn is_existing_deployment_conflict(text: &str) -> bool {
    text.contains(CONFLICT_MARKER) && text.contains(DEPLOYMENT_RESOURCE_TYPE)
}

pub struct Terraform<'a> {
    runner: &'a dyn CommandRunner,
    bin: &'a str,
}

impl<'a> Terraform<'a> {
    pub fn new(runner: &'a dyn CommandRunner, bin: &'a str) -> Self {
        Self { runner, bin }
    }

    fn command(&self, dir: &Path) -> CommandLine {
        CommandLine::new(self.bin).arg(format!("-chdir={}", dir.display()))
    }

    fn apply_command(&self, dir: &Path) -> CommandLine {
        self.command(dir).args(["apply", "-auto-approve"])
    }

    pub fn init(&self, dir: &Path) -> Result<()> {
        self.runner.run(&self.command(dir).arg("init"))
    }

    pub fn apply(&self, dir: &Path) -> Result<()> {
        self.runner.run(&self.apply_command(dir))
    }

    /// Apply, importing an existing model deployment and retrying once when
    /// the first apply fails on that conflict.
    pub fn apply_with_import(&self, dir: &Path, record: &DeploymentRecord<'_>) -> Result<()> {
        let apply = self.apply_command(dir);
        let first = self.runner.run_combined(&apply)?;
        if first.success {
            return Ok(());
        }
        if !is_existing_deployment_conflict(&first.text) {
            return Err(CommandFailed {
                command: apply.display(),
                code: first.code,
            }
            .into());
        }
        let resource_id = record.resource_id();
        tracing::warn!(
            resource = DEPLOYMENT_RESOURCE_ADDRESS,
            id = %resource_id,
            "deployment already exists outside state; importing"
        );
        let import = self
            .command(dir)
            .args(["import", DEPLOYMENT_RESOURCE_ADDRESS])
            .arg(resource_id);
        self.runner
            .run(&import)
            .context("import existing model deployment")?;
        self.runner.run(&apply)
    }

    pub fn output(&self, dir: &Path, name: &str) -> Result<String> {
        let cmd = self.command(dir).args(["output", "-raw", name]);
        let value = self.runner.run_capture(&cmd)?;
        tracing::debug!(output = name, dir = %dir.display(), "read stack output");
        Ok(value)
    }

    /// Read an output, treating any failure as "not available yet".
    pub fn output_optional(&self, dir: &Path, name: &str) -> OutputRead {
        match self.output(dir, name) {
            Ok(value) => OutputRead::Value(value),
            Err(err) => {
                tracing::debug!(output = name, error = %err, "stack output unavailable");
                OutputRead::Missing
            }
        }
    }

    /// Read an output, re-applying once if the first read fails.
    ///
    /// Some Terraform versions only record sensitive outputs such as access
    /// keys after a fresh apply.
    pub fn output_with_apply(&self, dir: &Path, name: &str) -> Result<String> {
        match self.output(dir, name) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::info!(output = name, error = %err, "output missing; re-applying");
                self.apply(dir)?;
                self.output(dir, name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::exit_code_for;
    use crate::testing::{verb, FakeRunner, Outcome};
    use std::cell::Cell;
    use std::path::PathBuf;

    const CONFLICT_TEXT: &str = "Error: a resource with the ID \"/subscriptions/x/deployments/gpt\" \
        already exists - to be managed via Terraform this resource needs to be imported \
        into the State. with azurerm_cognitive_deployment.main";

    fn dir() -> PathBuf {
        PathBuf::from("/repo/terraform/03_openai_deployment")
    }

    fn record() -> DeploymentRecord<'static> {
        DeploymentRecord {
            account_id: "/subscriptions/x/accounts/aoai",
            deployment_name: "gpt-5-chat",
        }
    }

    fn count_verb(runner: &FakeRunner, wanted: &str) -> usize {
        runner
            .calls()
            .iter()
            .filter(|argv| verb(argv) == Some(wanted))
            .count()
    }

    #[test]
    fn commands_are_scoped_with_chdir() {
        let runner = FakeRunner::succeeding();
        let tf = Terraform::new(&runner, "terraform");
        tf.init(&dir()).unwrap();
        tf.apply(&dir()).unwrap();
        assert_eq!(
            runner.call_lines(),
            vec![
                "terraform -chdir=/repo/terraform/03_openai_deployment init",
                "terraform -chdir=/repo/terraform/03_openai_deployment apply -auto-approve",
            ]
        );
    }

    #[test]
    fn conflict_triggers_one_import_and_one_retry() {
        let applies = Cell::new(0);
        let runner = FakeRunner::new(move |argv| {
            if verb(argv) == Some("apply") {
                applies.set(applies.get() + 1);
                if applies.get() == 1 {
                    return Outcome::fail(1, CONFLICT_TEXT);
                }
            }
            Outcome::ok("")
        });
        let tf = Terraform::new(&runner, "terraform");

        tf.apply_with_import(&dir(), &record()).unwrap();

        assert_eq!(count_verb(&runner, "import"), 1);
        assert_eq!(count_verb(&runner, "apply"), 2);
        let calls = runner.calls();
        assert_eq!(
            calls[1][3..],
            [
                "azurerm_cognitive_deployment.main".to_string(),
                "/subscriptions/x/accounts/aoai/deployments/gpt-5-chat".to_string(),
            ]
        );
    }

    #[test]
    fn other_failures_propagate_without_import() {
        let runner = FakeRunner::new(|argv| {
            if verb(argv) == Some("apply") {
                return Outcome::fail(7, "Error: quota exceeded");
            }
            Outcome::ok("")
        });
        let tf = Terraform::new(&runner, "terraform");

        let err = tf.apply_with_import(&dir(), &record()).unwrap_err();

        assert_eq!(count_verb(&runner, "import"), 0);
        assert_eq!(count_verb(&runner, "apply"), 1);
        assert_eq!(exit_code_for(&err), 7);
    }

    #[test]
    fn conflict_on_other_resource_type_is_fatal() {
        let runner = FakeRunner::new(|argv| {
            if verb(argv) == Some("apply") {
                return Outcome::fail(1, "azurerm_key_vault.main already exists");
            }
            Outcome::ok("")
        });
        let tf = Terraform::new(&runner, "terraform");
        assert!(tf.apply_with_import(&dir(), &record()).is_err());
        assert_eq!(count_verb(&runner, "import"), 0);
    }

    #[test]
    fn second_apply_failure_is_fatal() {
        let runner = FakeRunner::new(|argv| match verb(argv) {
            Some("apply") => Outcome::fail(1, CONFLICT_TEXT),
            _ => Outcome::ok(""),
        });
        let tf = Terraform::new(&runner, "terraform");

        let err = tf.apply_with_import(&dir(), &record()).unwrap_err();

        assert_eq!(count_verb(&runner, "import"), 1);
        assert_eq!(count_verb(&runner, "apply"), 2);
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn import_failure_skips_retry() {
        let runner = FakeRunner::new(|argv| match verb(argv) {
            Some("apply") => Outcome::fail(1, CONFLICT_TEXT),
            Some("import") => Outcome::fail(5, ""),
            _ => Outcome::ok(""),
        });
        let tf = Terraform::new(&runner, "terraform");

        let err = tf.apply_with_import(&dir(), &record()).unwrap_err();

        assert_eq!(count_verb(&runner, "apply"), 1);
        assert_eq!(exit_code_for(&err), 5);
    }

    #[test]
    fn optional_output_maps_failure_to_missing() {
        let runner = FakeRunner::new(|_| Outcome::fail(1, ""));
        let tf = Terraform::new(&runner, "terraform");
        assert_eq!(
            tf.output_optional(&dir(), "openai_endpoint"),
            OutputRead::Missing
        );
    }

    #[test]
    fn output_with_apply_reapplies_once() {
        let reads = Cell::new(0);
        let runner = FakeRunner::new(move |argv| {
            if verb(argv) == Some("output") {
                reads.set(reads.get() + 1);
                if reads.get() == 1 {
                    return Outcome::fail(1, "");
                }
                return Outcome::ok("primary-key\n");
            }
            Outcome::ok("")
        });
        let tf = Terraform::new(&runner, "terraform");

        let key = tf
            .output_with_apply(&dir(), "openai_primary_key")
            .unwrap();

        assert_eq!(key, "primary-key");
        assert_eq!(count_verb(&runner, "apply"), 1);
        assert_eq!(count_verb(&runner, "output"), 2);
    }

    #[test]
    fn output_with_apply_fails_when_second_read_fails() {
        let runner = FakeRunner::new(|argv| match verb(argv) {
            Some("output") => Outcome::fail(1, ""),
            _ => Outcome::ok(""),
        });
        let tf = Terraform::new(&runner, "terraform");
        assert!(tf.output_with_apply(&dir(), "openai_primary_key").is_err());
        assert_eq!(count_verb(&runner, "apply"), 1);
    }
}
