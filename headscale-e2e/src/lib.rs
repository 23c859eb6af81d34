//! Harness for running headscale inside throwaway containers
//!
//! A test creates a network, then one or more [`HeadscaleInContainer`]s on it:
//!
//! ```no_run
//! use std::sync::Arc;
//! use headscale_e2e::{DockerRuntime, ContainerRuntime, HeadscaleInContainer, InstanceOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
//! let network = runtime.create_network("headscale-test").await?;
//!
//! let headscale = HeadscaleInContainer::create(runtime.clone(), &network, InstanceOptions::from_env()?).await?;
//! headscale.wait_for_ready().await?;
//! headscale.create_namespace("user1").await?;
//! let key = headscale.create_auth_key("user1").await?;
//! assert!(key.reusable);
//!
//! headscale.shutdown().await?;
//! runtime.remove_network(&network).await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod archive;
pub mod config;
pub mod duration;
pub mod error;
pub mod exec;
pub mod hostname;
pub mod inject;
pub mod instance;
pub mod logging;
pub mod options;
pub mod policy;
pub mod readiness;
pub mod runtime;

pub use admin::{AuthKeyOptions, Namespace, Node, PreAuthKey};
pub use archive::{ArchiveError, single_file_archive};
pub use config::ServerConfig;
pub use error::{HarnessError, HarnessResult};
pub use exec::{CommandOutput, CommandRunner, ExecError};
pub use inject::{FileInjector, InjectError};
pub use instance::HeadscaleInContainer;
pub use options::{InstanceOptions, LaunchPlan};
pub use policy::{AclPolicy, AclRule};
pub use readiness::{ReadinessError, ReadinessPoller, RetryPolicy};
pub use runtime::docker::DockerRuntime;
pub use runtime::{
    BuildSpec, ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput, NetworkRef,
    RestartPolicy, RuntimeError,
};
