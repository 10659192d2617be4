//! Recording fakes shared by unit tests.
use crate::runner::{CombinedOutput, CommandFailed, CommandLine, CommandRunner};
use anyhow::Result;
use std::cell::RefCell;

/// Scripted result of one fake command.
pub(crate) struct Outcome {
    pub(crate) code: i32,
    pub(crate) stdout: String,
}

impl Outcome {
    pub(crate) fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
        }
    }

    pub(crate) fn fail(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
        }
    }
}

type Handler = Box<dyn Fn(&[String]) -> Outcome>;

/// Records every argv it is asked to run and answers from a handler.
pub(crate) struct FakeRunner {
    handler: Handler,
    calls: RefCell<Vec<Vec<String>>>,
    echoed: RefCell<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new(handler: impl Fn(&[String]) -> Outcome + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
            echoed: RefCell::new(Vec::new()),
        }
    }

    /// Answers `output -raw <name>` with `<name>-value` and succeeds otherwise.
    pub(crate) fn succeeding() -> Self {
        Self::new(|argv| match output_name(argv) {
            Some(name) => Outcome::ok(format!("{name}-value")),
            None => Outcome::ok(""),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Calls rendered as space-joined strings for easy assertions.
    pub(crate) fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|argv| argv.join(" ")).collect()
    }

    pub(crate) fn echoed(&self) -> Vec<String> {
        self.echoed.borrow().clone()
    }

    fn dispatch(&self, cmd: &CommandLine, shown: String) -> (Outcome, String) {
        let argv: Vec<String> = cmd.argv().into_iter().map(str::to_string).collect();
        self.calls.borrow_mut().push(argv.clone());
        self.echoed.borrow_mut().push(shown.clone());
        ((self.handler)(&argv), shown)
    }

    fn check(outcome: Outcome, shown: String) -> Result<String> {
        if outcome.code != 0 {
            return Err(CommandFailed {
                command: shown,
                code: Some(outcome.code),
            }
            .into());
        }
        Ok(outcome.stdout.trim().to_string())
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &CommandLine) -> Result<()> {
        let (outcome, shown) = self.dispatch(cmd, cmd.display());
        Self::check(outcome, shown).map(|_| ())
    }

    fn run_capture(&self, cmd: &CommandLine) -> Result<String> {
        let (outcome, shown) = self.dispatch(cmd, cmd.display());
        Self::check(outcome, shown)
    }

    fn run_sensitive(&self, cmd: &CommandLine, redacted: &[usize]) -> Result<()> {
        let (outcome, shown) = self.dispatch(cmd, cmd.display_redacted(redacted));
        Self::check(outcome, shown).map(|_| ())
    }

    fn run_combined(&self, cmd: &CommandLine) -> Result<CombinedOutput> {
        let (outcome, _) = self.dispatch(cmd, cmd.display());
        Ok(CombinedOutput {
            success: outcome.code == 0,
            code: Some(outcome.code),
            text: outcome.stdout,
        })
    }
}

/// The Terraform verb of an argv like `terraform -chdir=<dir> <verb> ...`.
pub(crate) fn verb(argv: &[String]) -> Option<&str> {
    argv.get(2).map(String::as_str)
}

/// The output name of `terraform -chdir=<dir> output -raw <name>`.
pub(crate) fn output_name(argv: &[String]) -> Option<&str> {
    if verb(argv) == Some("output") {
        return argv.get(4).map(String::as_str);
    }
    None
}
