//! Running commands inside the instance
//!
//! [`CommandRunner`] keeps three things apart: what the command printed
//! (stdout, stderr), whether it succeeded (exit code), and whatever the caller
//! later does with the output (parsing happens elsewhere). There are no
//! retries and no timeout: a command that hangs inside the container hangs
//! the caller.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runtime::{ContainerRuntime, RuntimeError};

/// Errors from running a command in the container
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("refusing to execute an empty command")]
    EmptyCommand,

    #[error("failed to execute `{}`: {source}", .argv.join(" "))]
    Runtime {
        argv: Vec<String>,
        #[source]
        source: RuntimeError,
    },

    #[error("command `{}` exited with code {exit_code}: {}", .argv.join(" "), .stderr.trim())]
    NonZeroExit {
        argv: Vec<String>,
        exit_code: i64,
        stdout: String,
        stderr: String,
    },
}

impl ExecError {
    /// Captured stderr, when the command got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecError::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Captured stdout of a command that exited non-zero.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ExecError::NonZeroExit { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i64> {
        match self {
            ExecError::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Captured streams of a command that exited with status 0.
///
/// Any other status comes back as [`ExecError::NonZeroExit`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes argument vectors inside one container
#[derive(Clone)]
pub struct CommandRunner {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
    hostname: String,
}

impl CommandRunner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container_id: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
            hostname: hostname.into(),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Run `argv` and wait for it to exit.
    ///
    /// A non-zero exit is an error carrying both captured streams.
    pub async fn execute<S: AsRef<str>>(&self, argv: &[S]) -> Result<CommandOutput, ExecError> {
        let output = self.run(argv).await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`execute`](Self::execute) but returns stdout untouched, for
    /// output that is not necessarily UTF-8.
    pub async fn execute_raw<S: AsRef<str>>(&self, argv: &[S]) -> Result<Vec<u8>, ExecError> {
        Ok(self.run(argv).await?.stdout)
    }

    async fn run<S: AsRef<str>>(&self, argv: &[S]) -> Result<crate::runtime::ExecOutput, ExecError> {
        let argv: Vec<String> = argv.iter().map(|arg| arg.as_ref().to_string()).collect();
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        info!(hostname = %self.hostname, command = ?argv, "Running command");

        let output = self
            .runtime
            .exec(&self.container_id, &argv)
            .await
            .map_err(|source| ExecError::Runtime {
                argv: argv.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.exit_code != 0 {
            warn!(
                hostname = %self.hostname,
                exit_code = output.exit_code,
                "command stderr: {}",
                stderr.trim_end()
            );
            return Err(ExecError::NonZeroExit {
                argv,
                exit_code: output.exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: stderr.into_owned(),
            });
        }

        if !stderr.is_empty() {
            debug!(hostname = %self.hostname, "command stderr: {}", stderr.trim_end());
        }
        if !output.stdout.is_empty() {
            debug!(hostname = %self.hostname, bytes = output.stdout.len(), "command stdout captured");
        }

        Ok(output)
    }
}
