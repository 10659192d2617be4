//! External command execution with an echoed audit line.
//!
//! Every command is printed as `$ <argv>` on stdout before it runs. Sensitive
//! arguments can be masked in that line; the argv handed to the child process
//! is never rewritten.
use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};

pub const REDACTED: &str = "***";

/// Program plus arguments, kept as plain strings for display and replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argv with the program at index 0.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Number of argv entries, counting the program.
    pub fn argc(&self) -> usize {
        self.args.len() + 1
    }

    pub fn display(&self) -> String {
        self.display_redacted(&[])
    }

    /// Render argv for logs, masking the given argv positions.
    ///
    /// Positions index the full argv (0 is the program); out-of-range
    /// positions are ignored.
    pub fn display_redacted(&self, positions: &[usize]) -> String {
        let shown: Vec<&str> = self
            .argv()
            .into_iter()
            .enumerate()
            .map(|(index, arg)| {
                if positions.contains(&index) {
                    REDACTED
                } else {
                    arg
                }
            })
            .collect();
        shell_words::join(shown)
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// A child process that exited unsuccessfully.
///
/// `command` is the display form of the argv, already redacted when the
/// command was run through [`CommandRunner::run_sensitive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailed {
    pub command: String,
    pub code: Option<i32>,
}

impl CommandFailed {
    fn from_status(command: String, status: ExitStatus) -> Self {
        Self {
            command,
            code: status.code(),
        }
    }
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with status {code}", self.command),
            None => write!(f, "`{}` was terminated by a signal", self.command),
        }
    }
}

impl std::error::Error for CommandFailed {}

/// Exit status and combined text of a command whose output was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub text: String,
}

pub trait CommandRunner {
    /// Run with inherited stdio; fail with [`CommandFailed`] on nonzero exit.
    fn run(&self, cmd: &CommandLine) -> Result<()>;

    /// Run and return trimmed stdout; stderr stays attached to the terminal.
    fn run_capture(&self, cmd: &CommandLine) -> Result<String>;

    /// Like [`CommandRunner::run`] but masks `redacted` argv positions in the
    /// echoed line and in any failure message.
    fn run_sensitive(&self, cmd: &CommandLine, redacted: &[usize]) -> Result<()>;

    /// Run with stdout and stderr captured, replay both, and return the exit
    /// status with the combined text. A nonzero exit is not an error here.
    fn run_combined(&self, cmd: &CommandLine) -> Result<CombinedOutput>;
}

/// Runs commands as blocking foreground children.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

fn echo(line: &str) {
    println!("\n$ {line}");
}

impl ProcessRunner {
    fn run_displayed(&self, cmd: &CommandLine, shown: String) -> Result<()> {
        echo(&shown);
        let status = cmd
            .to_command()
            .status()
            .with_context(|| format!("spawn {}", cmd.program()))?;
        if !status.success() {
            return Err(CommandFailed::from_status(shown, status).into());
        }
        Ok(())
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, cmd: &CommandLine) -> Result<()> {
        self.run_displayed(cmd, cmd.display())
    }

    fn run_capture(&self, cmd: &CommandLine) -> Result<String> {
        let shown = cmd.display();
        echo(&shown);
        let output = cmd
            .to_command()
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("spawn {}", cmd.program()))?;
        if !output.status.success() {
            return Err(CommandFailed::from_status(shown, output.status).into());
        }
        let stdout = String::from_utf8(output.stdout)
            .with_context(|| format!("decode stdout of {shown} as UTF-8"))?;
        Ok(stdout.trim().to_string())
    }

    fn run_sensitive(&self, cmd: &CommandLine, redacted: &[usize]) -> Result<()> {
        self.run_displayed(cmd, cmd.display_redacted(redacted))
    }

    fn run_combined(&self, cmd: &CommandLine) -> Result<CombinedOutput> {
        echo(&cmd.display());
        let output = cmd
            .to_command()
            .stdin(Stdio::inherit())
            .output()
            .with_context(|| format!("spawn {}", cmd.program()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        print!("{stdout}");
        let _ = std::io::stdout().flush();
        eprint!("{stderr}");
        tracing::debug!(
            code = output.status.code(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "captured command output"
        );
        Ok(CombinedOutput {
            success: output.status.success(),
            code: output.status.code(),
            text: format!("{stdout}{stderr}"),
        })
    }
}

/// Process exit code for a top-level error.
///
/// Uses the code of the first [`CommandFailed`] in the chain; anything else,
/// including signal termination or codes outside `1..=255`, maps to 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CommandFailed>())
        .and_then(|failed| failed.code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}
