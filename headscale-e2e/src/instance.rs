//! One headscale server running in a container
//!
//! [`HeadscaleInContainer::create`] builds the image, starts the container and
//! writes the initial files. The instance is then driven through exec and file
//! injection until [`HeadscaleInContainer::shutdown`] purges it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::exec::{CommandOutput, CommandRunner};
use crate::hostname::generate_hostname;
use crate::inject::{FileInjector, InjectError};
use crate::options::{InstanceOptions, LaunchPlan};
use crate::readiness::{HEALTH_PATH, ReadinessPoller, RetryPolicy};
use crate::runtime::{ContainerInfo, ContainerRuntime, NetworkRef};

/// A running headscale instance under test
pub struct HeadscaleInContainer {
    hostname: String,
    port: u16,
    network: NetworkRef,
    container: ContainerInfo,
    runner: CommandRunner,
    retry: RetryPolicy,
    released: bool,
}

impl HeadscaleInContainer {
    /// Build, start and configure a new instance attached to `network`.
    ///
    /// Nothing is rolled back on failure. Once the container has started, an
    /// error names it through [`HarnessError::leftover_container`].
    pub async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        network: &NetworkRef,
        options: InstanceOptions,
    ) -> HarnessResult<Self> {
        let hostname = generate_hostname();
        let plan = options.plan(&hostname, network)?;

        runtime
            .remove_container_by_name(&hostname)
            .await
            .map_err(|source| HarnessError::StaleContainer {
                name: hostname.clone(),
                source,
            })?;

        info!(
            hostname = %hostname,
            context = %plan.build.context_dir.display(),
            dockerfile = %plan.build.dockerfile,
            "Building headscale image"
        );
        let image = runtime
            .build_image(&plan.build)
            .await
            .map_err(|source| HarnessError::ImageBuild {
                context: plan.build.context_dir.clone(),
                source,
            })?;

        let mut container_spec = plan.container.clone();
        container_spec.image = image;

        let container = runtime
            .run_container(&container_spec)
            .await
            .map_err(|source| HarnessError::ContainerStart {
                name: hostname.clone(),
                source,
            })?;
        info!(hostname = %hostname, id = %container.id, "Created headscale container");

        let runner = CommandRunner::new(runtime, container.id.clone(), hostname.clone());
        let instance = Self {
            hostname,
            port: options.port,
            network: network.clone(),
            container,
            runner,
            retry: options.retry,
            released: false,
        };

        if let Err((what, source)) = write_initial_files(&instance.runner, &plan).await {
            return Err(instance.abandon(what, source));
        }

        Ok(instance)
    }

    /// Give up on a half-configured instance, leaving the container for the caller.
    fn abandon(mut self, what: &'static str, source: InjectError) -> HarnessError {
        self.released = true;
        HarnessError::InitialWrite {
            what,
            hostname: std::mem::take(&mut self.hostname),
            source,
        }
    }

    /// Remove the container and its anonymous volumes.
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        self.released = true;
        info!(hostname = %self.hostname, "Shutting down headscale container");
        self.runner
            .runtime()
            .purge(&self.container.id)
            .await
            .map_err(|source| HarnessError::Teardown {
                hostname: self.hostname.clone(),
                source,
            })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// IP address inside the shared network.
    pub fn address(&self) -> &str {
        self.container.ip_in_network(&self.network)
    }

    /// Container port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host port the container port is published on.
    pub fn resolved_port(&self) -> &str {
        self.container.host_port(&format!("{}/tcp", self.port))
    }

    /// Base URL reachable from the shared network, e.g. `http://172.18.0.2:8080`.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.address(), self.port)
    }

    pub fn health_endpoint(&self) -> String {
        format!("{}{}", self.endpoint(), HEALTH_PATH)
    }

    pub fn container_id(&self) -> &str {
        &self.container.id
    }

    pub fn network(&self) -> &NetworkRef {
        &self.network
    }

    /// Run `argv` inside the container.
    ///
    /// There is no timeout; a command that never exits blocks the caller.
    pub async fn execute<S: AsRef<str>>(&self, argv: &[S]) -> HarnessResult<CommandOutput> {
        Ok(self.runner.execute(argv).await?)
    }

    /// Write `data` to the absolute `path`, creating parent directories.
    ///
    /// Not atomic: if the upload fails the directory may already exist.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> HarnessResult<()> {
        Ok(FileInjector::new(&self.runner).write_file(path, data).await?)
    }

    pub async fn read_file(&self, path: &str) -> HarnessResult<Vec<u8>> {
        Ok(FileInjector::new(&self.runner).read_file(path).await?)
    }

    /// Poll the health endpoint under the instance's retry policy.
    pub async fn wait_for_ready(&self) -> HarnessResult<()> {
        let poller = ReadinessPoller::new(self.retry.clone())?;
        poller.wait_ready(&self.health_endpoint()).await?;
        Ok(())
    }

    pub(crate) fn runner(&self) -> &CommandRunner {
        &self.runner
    }
}

impl Drop for HeadscaleInContainer {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                hostname = %self.hostname,
                id = %self.container.id,
                "headscale container dropped without shutdown; it is still running"
            );
        }
    }
}

async fn write_initial_files(
    runner: &CommandRunner,
    plan: &LaunchPlan,
) -> Result<(), (&'static str, InjectError)> {
    let injector = FileInjector::new(runner);
    for (what, path, data) in plan.files() {
        injector
            .write_file(path, data)
            .await
            .map_err(|source| (what, source))?;
    }
    Ok(())
}
