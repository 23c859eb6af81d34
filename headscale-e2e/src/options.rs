//! Launch options for a headscale instance
//!
//! [`InstanceOptions`] is what callers configure. Before anything touches the
//! runtime, [`InstanceOptions::plan`] turns it into a [`LaunchPlan`]: the
//! serialized files, the container spec and the build spec. Encoding errors
//! therefore surface before a container exists.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CONFIG_PATH, ServerConfig};
use crate::duration::{format_sleep_seconds, parse_duration};
use crate::error::{HarnessError, HarnessResult};
use crate::policy::{ACL_POLICY_ENV, ACL_POLICY_PATH, AclPolicy};
use crate::readiness::RetryPolicy;
use crate::runtime::{BuildSpec, ContainerSpec, NetworkRef, RestartPolicy};

/// Port headscale listens on inside the container
pub const DEFAULT_PORT: u16 = 8080;

/// Build context, relative to the directory the tests run from
pub const DEFAULT_BUILD_CONTEXT: &str = "..";

/// Dockerfile path, relative to the build context
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile.debug";

/// Time the entrypoint sleeps before starting the server.
///
/// The initial config is written while the container runs but before the
/// server reads it; this delay is the window for that write.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(3);

/// Binary invoked for the server and for admin commands
pub const SERVER_BINARY: &str = "headscale";

pub const ENV_BUILD_CONTEXT: &str = "HEADSCALE_E2E_CONTEXT";
pub const ENV_DOCKERFILE: &str = "HEADSCALE_E2E_DOCKERFILE";
pub const ENV_STARTUP_DELAY: &str = "HEADSCALE_E2E_STARTUP_DELAY";

/// Caller-facing configuration of one instance
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    /// Port the server listens on inside the container
    pub port: u16,
    pub build_context: PathBuf,
    pub dockerfile: String,
    pub startup_delay: Duration,
    /// Uploaded to [`ACL_POLICY_PATH`] when set
    pub acl_policy: Option<AclPolicy>,
    /// Extra `KEY=VALUE` environment for the server
    pub config_env: BTreeMap<String, String>,
    /// Replaces the default config derived from `port`
    pub server_config: Option<ServerConfig>,
    pub retry: RetryPolicy,
    pub restart_policy: RestartPolicy,
    pub cap_add: Vec<String>,
    pub sysctls: HashMap<String, String>,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            build_context: PathBuf::from(DEFAULT_BUILD_CONTEXT),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            startup_delay: DEFAULT_STARTUP_DELAY,
            acl_policy: None,
            config_env: BTreeMap::new(),
            server_config: None,
            retry: RetryPolicy::default(),
            restart_policy: RestartPolicy::UnlessStopped,
            cap_add: vec!["NET_ADMIN".to_string()],
            sysctls: HashMap::from([(
                "net.ipv6.conf.all.disable_ipv6".to_string(),
                "0".to_string(),
            )]),
        }
    }
}

impl InstanceOptions {
    /// Defaults overlaid with `HEADSCALE_E2E_*` environment variables.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed like [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(context) = lookup(ENV_BUILD_CONTEXT).filter(|v| !v.is_empty()) {
            options.build_context = PathBuf::from(context);
        }
        if let Some(dockerfile) = lookup(ENV_DOCKERFILE).filter(|v| !v.is_empty()) {
            options.dockerfile = dockerfile;
        }
        if let Some(delay) = lookup(ENV_STARTUP_DELAY).filter(|v| !v.is_empty()) {
            options.startup_delay =
                parse_duration(&delay).map_err(|message| HarnessError::InvalidOption {
                    name: ENV_STARTUP_DELAY,
                    message,
                })?;
        }

        Ok(options)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_acl_policy(mut self, policy: AclPolicy) -> Self {
        self.acl_policy = Some(policy);
        self
    }

    pub fn with_config_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.config_env.extend(env);
        self
    }

    pub fn with_env_var(mut self, key: &str, value: &str) -> Self {
        self.config_env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = Some(config);
        self
    }

    pub fn with_build_context(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_context = dir.into();
        self
    }

    pub fn with_dockerfile(mut self, dockerfile: &str) -> Self {
        self.dockerfile = dockerfile.to_string();
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `<port>/tcp`, the key used for port bindings.
    pub fn port_proto(&self) -> String {
        format!("{}/tcp", self.port)
    }

    /// Environment entries handed to the container, sorted by key.
    pub fn environment(&self) -> Vec<String> {
        let mut env: BTreeMap<&str, &str> = self
            .config_env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if self.acl_policy.is_some() {
            env.insert(ACL_POLICY_ENV, ACL_POLICY_PATH);
        }
        env.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Entrypoint: sleep for the startup delay, then serve.
    pub fn entrypoint(&self) -> Vec<String> {
        vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!(
                "/bin/sleep {} ; {} serve",
                format_sleep_seconds(&self.startup_delay),
                SERVER_BINARY
            ),
        ]
    }

    /// Serialize payloads and assemble the specs for a container named `hostname`.
    pub fn plan(&self, hostname: &str, network: &NetworkRef) -> HarnessResult<LaunchPlan> {
        let config = match &self.server_config {
            Some(config) => config.clone(),
            None => ServerConfig::for_port(self.port),
        };
        let config_yaml = config.to_yaml().map_err(HarnessError::ConfigEncode)?;

        let policy_json = self
            .acl_policy
            .as_ref()
            .map(AclPolicy::to_json)
            .transpose()
            .map_err(HarnessError::PolicyEncode)?;

        let container = ContainerSpec {
            name: hostname.to_string(),
            image: hostname.to_string(),
            exposed_ports: vec![self.port_proto()],
            network: network.clone(),
            entrypoint: self.entrypoint(),
            env: self.environment(),
            restart_policy: self.restart_policy,
            cap_add: self.cap_add.clone(),
            sysctls: self.sysctls.clone(),
        };

        let build = BuildSpec {
            context_dir: self.build_context.clone(),
            dockerfile: self.dockerfile.clone(),
            tag: hostname.to_string(),
        };

        Ok(LaunchPlan {
            hostname: hostname.to_string(),
            build,
            container,
            config_yaml: config_yaml.into_bytes(),
            policy_json,
        })
    }
}

/// Fully resolved launch of one instance, computed before any side effect
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub hostname: String,
    pub build: BuildSpec,
    pub container: ContainerSpec,
    /// Written to [`CONFIG_PATH`]
    pub config_yaml: Vec<u8>,
    /// Written to [`ACL_POLICY_PATH`] when present
    pub policy_json: Option<Vec<u8>>,
}

impl LaunchPlan {
    /// Files to inject after start, in write order.
    pub fn files(&self) -> Vec<(&'static str, &'static str, &[u8])> {
        let mut files = vec![("config", CONFIG_PATH, self.config_yaml.as_slice())];
        if let Some(policy) = &self.policy_json {
            files.push(("acl policy", ACL_POLICY_PATH, policy.as_slice()));
        }
        files
    }
}

#[cfg(test)]
mod tests;
