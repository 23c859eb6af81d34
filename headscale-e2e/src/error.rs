//! Error types for the harness
//!
//! Every stage that can fail has its own variant so a failing test points at
//! the step that broke (archive, mkdir, upload, exec, JSON parsing, ...).

use std::path::PathBuf;
use thiserror::Error;

use crate::exec::ExecError;
use crate::inject::InjectError;
use crate::readiness::ReadinessError;
use crate::runtime::RuntimeError;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors surfaced by [`crate::HeadscaleInContainer`]
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to remove stale container {name}: {source}")]
    StaleContainer {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to build headscale image from {}: {source}", .context.display())]
    ImageBuild {
        context: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error("could not start headscale container {name}: {source}")]
    ContainerStart {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to encode headscale config as YAML: {0}")]
    ConfigEncode(#[source] serde_yaml::Error),

    #[error("failed to marshal ACL policy to JSON: {0}")]
    PolicyEncode(#[source] serde_json::Error),

    #[error("failed to write {what} to container {hostname}: {source}")]
    InitialWrite {
        what: &'static str,
        hostname: String,
        #[source]
        source: InjectError,
    },

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to unmarshal {what}: {source}")]
    Parse {
        what: &'static str,
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("failed to purge container {hostname}: {source}")]
    Teardown {
        hostname: String,
        #[source]
        source: RuntimeError,
    },

    #[error("invalid option {name}: {message}")]
    InvalidOption { name: &'static str, message: String },
}

impl HarnessError {
    /// Name of a container a failed `create` may have left behind.
    ///
    /// Creation never rolls back a started container; callers use this to
    /// remove the leftover by name, which is a no-op when nothing is left.
    pub fn leftover_container(&self) -> Option<&str> {
        match self {
            HarnessError::InitialWrite { hostname, .. } => Some(hostname),
            HarnessError::ContainerStart { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True when the error came from a command exiting non-zero or failing
    /// to run, as opposed to its output failing to parse.
    pub fn is_exec(&self) -> bool {
        matches!(self, HarnessError::Exec(_))
    }

    /// True when a command ran fine but its output did not match the
    /// expected JSON shape.
    pub fn is_parse(&self) -> bool {
        matches!(self, HarnessError::Parse { .. })
    }
}
