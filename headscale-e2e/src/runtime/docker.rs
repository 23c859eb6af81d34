//! Docker Engine implementation of [`ContainerRuntime`]

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, RestartPolicyNameEnum};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::{
    BuildSpec, ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput, NetworkRef,
    RestartPolicy, RuntimeError,
};

/// [`ContainerRuntime`] backed by a local Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Wrap an already configured client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let settings = inspect.network_settings.unwrap_or_default();

        let ip_addresses = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(network, endpoint)| {
                endpoint
                    .ip_address
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| (network, ip))
            })
            .collect();

        let host_ports = settings
            .ports
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(port, bindings)| {
                bindings
                    .and_then(|bindings| bindings.into_iter().find_map(|b| b.host_port))
                    .map(|host_port| (port, host_port))
            })
            .collect();

        Ok(ContainerInfo {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            ip_addresses,
            host_ports,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build_image(&self, spec: &BuildSpec) -> Result<String, RuntimeError> {
        let context = pack_build_context(&spec.context_dir)?;
        info!(
            tag = %spec.tag,
            dockerfile = %spec.dockerfile,
            context_bytes = context.len(),
            "Building image"
        );

        let options = BuildImageOptions {
            dockerfile: spec.dockerfile.clone(),
            t: spec.tag.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Build(error));
            }
            if let Some(line) = info.stream.as_deref().map(str::trim)
                && !line.is_empty()
            {
                debug!(tag = %spec.tag, "{}", line);
            }
        }

        Ok(spec.tag.clone())
    }

    async fn remove_container_by_name(&self, name: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => {
                debug!(container = %name, "Removed stale container");
                Ok(())
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            network_mode: Some(spec.network.name.clone()),
            publish_all_ports: Some(true),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(restart_policy_name(spec.restart_policy)),
                maximum_retry_count: None,
            }),
            cap_add: (!spec.cap_add.is_empty()).then(|| spec.cap_add.clone()),
            sysctls: (!spec.sysctls.is_empty()).then(|| spec.sysctls.clone()),
            ..Default::default()
        };

        let config = Config {
            hostname: Some(spec.name.clone()),
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            entrypoint: Some(spec.entrypoint.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        for warning in &created.warnings {
            warn!(container = %spec.name, "{}", warning);
        }

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            let options = RemoveContainerOptions {
                force: true,
                v: true,
                ..Default::default()
            };
            match self.docker.remove_container(&created.id, Some(options)).await {
                Ok(()) => debug!(container = %spec.name, "Removed container that failed to start"),
                Err(cleanup) => warn!(
                    container = %spec.name,
                    error = %cleanup,
                    "Failed to remove container that failed to start"
                ),
            }
            return Err(e.into());
        }

        self.inspect(&created.id).await
    }

    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        let created = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions::<String> {
                    cmd: Some(argv.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = ExecOutput::default();
        match self.docker.start_exec(&created.id, None).await? {
            StartExecResults::Attached { output: mut frames, .. } => {
                while let Some(frame) = frames.next().await {
                    match frame? {
                        LogOutput::StdOut { message } => output.stdout.extend_from_slice(&message),
                        LogOutput::StdErr { message } => output.stderr.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(RuntimeError::Rejected(
                    "exec started detached, output unavailable".to_string(),
                ));
            }
        }

        output.exit_code = self
            .docker
            .inspect_exec(&created.id)
            .await?
            .exit_code
            .unwrap_or(-1);

        Ok(output)
    }

    async fn upload_archive(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            no_overwrite_dir_non_dir: "true".to_string(),
        };
        self.docker
            .upload_to_container(container_id, Some(options), archive.into())
            .await?;
        Ok(())
    }

    async fn purge(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(RuntimeError::NoSuchContainer(container_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_network(&self, name: &str) -> Result<NetworkRef, RuntimeError> {
        self.docker
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                check_duplicate: true,
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await?;

        let network = self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await?;
        info!(network = %name, "Created network");

        Ok(NetworkRef {
            id: network.id.unwrap_or_default(),
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, network: &NetworkRef) -> Result<(), RuntimeError> {
        self.docker.remove_network(&network.id).await?;
        Ok(())
    }
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    }
}

/// Tar the build context directory in memory.
fn pack_build_context(dir: &Path) -> Result<Vec<u8>, RuntimeError> {
    let to_err = |source| RuntimeError::BuildContext {
        path: dir.to_path_buf(),
        source,
    };

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir).map_err(to_err)?;
    builder.into_inner().map_err(to_err)
}
