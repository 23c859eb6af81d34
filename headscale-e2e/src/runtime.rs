//! Container runtime capability consumed by the harness
//!
//! The harness never talks to a daemon directly; it goes through
//! [`ContainerRuntime`]. [`docker::DockerRuntime`] is the production
//! implementation, tests plug in an in-memory fake.

pub mod docker;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a container runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("docker api error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("no such container: {0}")]
    NoSuchContainer(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("failed to package build context {}: {source}", .path.display())]
    BuildContext {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime rejected request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

/// A network shared between the instances of one test.
///
/// Instances hold a copy of this reference but never remove the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub id: String,
    pub name: String,
}

/// Where and how to build the server image
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Directory sent to the daemon as build context
    pub context_dir: PathBuf,
    /// Dockerfile path relative to the context
    pub dockerfile: String,
    /// Tag given to the resulting image
    pub tag: String,
}

/// Restart behaviour requested for the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure,
}

/// Everything needed to create and start one container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name, also used as hostname
    pub name: String,
    pub image: String,
    /// Ports exposed and published on random host ports, e.g. `8080/tcp`
    pub exposed_ports: Vec<String>,
    pub network: NetworkRef,
    pub entrypoint: Vec<String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    pub restart_policy: RestartPolicy,
    /// Extra kernel capabilities, e.g. `NET_ADMIN`
    pub cap_add: Vec<String>,
    pub sysctls: HashMap<String, String>,
}

/// Snapshot of a started container, taken right after start
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Network name -> IP address inside that network
    pub ip_addresses: HashMap<String, String>,
    /// Container port (`8080/tcp`) -> host port
    pub host_ports: HashMap<String, String>,
}

impl ContainerInfo {
    /// IP address in `network`, empty if the container is not attached.
    pub fn ip_in_network(&self, network: &NetworkRef) -> &str {
        self.ip_addresses
            .get(&network.name)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Host port bound to `port_proto`, empty if not published.
    pub fn host_port(&self, port_proto: &str) -> &str {
        self.host_ports
            .get(port_proto)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Raw result of running a command inside a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

/// Operations the harness needs from a container runtime.
///
/// Implementations must be safe to share between concurrently created
/// instances; the harness adds no locking of its own. `remove_container_by_name`,
/// `exec` and `purge` may be retried by callers, `build_image` and
/// `run_container` are not assumed idempotent.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from `spec.context_dir`, returning the image reference.
    async fn build_image(&self, spec: &BuildSpec) -> Result<String, RuntimeError>;

    /// Force-remove a container by name. A missing container is not an error.
    async fn remove_container_by_name(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create and start a container, returning its addresses and port bindings.
    ///
    /// A container that was created but failed to start is removed again.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError>;

    /// Run `argv` inside a running container and wait for it to exit.
    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError>;

    /// Extract `archive` into the existing directory `dest_dir`.
    ///
    /// Existing files with the same name are overwritten; replacing a
    /// directory with a file is refused.
    async fn upload_archive(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), RuntimeError>;

    /// Force-remove the container together with its anonymous volumes.
    async fn purge(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Create a user-defined network for a test.
    async fn create_network(&self, name: &str) -> Result<NetworkRef, RuntimeError>;

    async fn remove_network(&self, network: &NetworkRef) -> Result<(), RuntimeError>;
}
