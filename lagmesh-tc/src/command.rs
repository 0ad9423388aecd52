//! Utilities for [`std::process::Command`].

use std::{ffi::OsStr, fmt, io, process};

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No program was given.
    #[error("empty command provided")]
    Empty,
    /// The program could not be spawned or waited on.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The program ran and exited unsuccessfully.
    #[error("non-zero exit status: {0}")]
    NonZero(Output),
}

/// The captured result of a finished command.
#[derive(Debug, Clone)]
pub struct Output {
    /// Exit status.
    pub status: process::ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            status: value.status,
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {stderr}", self.status)
        }
    }
}

/// Result of running a command.
pub type Result<T> = std::result::Result<T, Error>;

/// Runs external programs, capturing their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

impl Runner {
    /// Runs `program` with `args`, failing on a non-zero exit status.
    pub fn run<I, S>(program: &str, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if program.is_empty() {
            return Err(Error::Empty);
        }

        let mut cmd = process::Command::new(program);
        cmd.args(args).stderr(process::Stdio::piped()).stdout(process::Stdio::piped());

        tracing::debug!(?cmd, "running command");

        let output: Output = cmd.spawn()?.wait_with_output()?.into();

        if !output.status.success() {
            tracing::debug!(?output.stderr, ?output.status, ?cmd, "command returned non-zero status");
            return Err(Error::NonZero(output));
        }

        Ok(output)
    }
}
