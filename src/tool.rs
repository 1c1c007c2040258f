//! External tool invocation
//!
//! Adapters build a [`ToolCommand`] (program plus argument vector, no shell)
//! and hand it to a [`ToolRunner`]. The production [`SubprocessRunner`]
//! spawns the process with inherited stdio and blocks until it exits; there
//! is no timeout and no retry.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::layout::LayoutError;

/// Tool invocation error types
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{program} failed: {status}")]
    Failed { program: String, status: String },

    #[error("Empty command")]
    EmptyCommand,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Run-level adapter errors
///
/// Per-book failures are collected in [`AdapterReport`] instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("No books found in {0}")]
    NoBooks(PathBuf),

    #[error("Kraken model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    /// Create a command for a program
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Create a command run through a prefix such as `conda run -n env`
    ///
    /// With an empty prefix this is the same as [`ToolCommand::new`].
    pub fn with_prefix(prefix: &[String], program: impl Into<OsString>) -> Self {
        match prefix.split_first() {
            Some((first, rest)) => {
                let mut command = Self::new(first);
                command.args.extend(rest.iter().map(OsString::from));
                command.args.push(program.into());
                command
            }
            None => Self::new(program),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments as lossy strings, mainly for assertions and logging
    pub fn argument_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Build a `std::process::Command`
    pub fn to_command(&self) -> Result<Command> {
        if self.program.is_empty() {
            return Err(ToolError::EmptyCommand);
        }
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        Ok(command)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes tool commands
pub trait ToolRunner: Send + Sync {
    /// Run to completion; a non-zero exit is an error
    fn run(&self, command: &ToolCommand) -> Result<()>;
}

/// Subprocess-based runner with inherited stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

impl ToolRunner for SubprocessRunner {
    fn run(&self, command: &ToolCommand) -> Result<()> {
        let program = command.program().to_string_lossy().into_owned();
        log::debug!("Running: {}", command);

        let status = command.to_command()?.status().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(program.clone())
            } else {
                ToolError::IoError(e)
            }
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program,
                status: status.to_string(),
            })
        }
    }
}

/// Check whether an executable can be resolved from PATH
pub fn is_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// First line of `<program> <arg>` output, if the program runs
pub fn version_line(program: &str, arg: &str) -> Option<String> {
    let output = Command::new(program).arg(arg).output().ok()?;
    // pdftoppm prints its version on stderr
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Outcome of one adapter run
#[derive(Debug, Default)]
pub struct AdapterReport {
    /// Units (books or batches) that ran successfully
    pub processed: Vec<String>,
    /// Units skipped with a reason
    pub skipped: Vec<(String, String)>,
    /// Units that failed with an error message
    pub failed: Vec<(String, String)>,
    /// Files renamed by the post-invocation pass
    pub renamed: usize,
    pub duration: Duration,
}

impl AdapterReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
