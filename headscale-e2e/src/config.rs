//! Configuration file written into every instance
//!
//! The harness does not interpret these settings; it only renders a sane
//! default for integration tests. Callers can hand in their own
//! [`ServerConfig`] through [`crate::InstanceOptions`].

use serde::{Deserialize, Serialize};

/// Path of the config file inside the container
pub const CONFIG_PATH: &str = "/etc/headscale/config.yaml";

/// Top-level headscale configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub log: LogConfig,
    pub acl_policy_path: String,
    pub db_type: String,
    pub db_path: String,
    pub ephemeral_node_inactivity_timeout: String,
    pub node_update_check_interval: String,
    pub ip_prefixes: Vec<String>,
    pub dns_config: DnsConfig,
    pub private_key_path: String,
    pub noise: NoiseConfig,
    pub listen_addr: String,
    pub metrics_listen_addr: String,
    pub server_url: String,
    pub derp: DerpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    pub base_domain: String,
    pub magic_dns: bool,
    pub domains: Vec<String>,
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub private_key_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerpConfig {
    pub urls: Vec<String>,
    pub auto_update_enabled: bool,
    pub update_frequency: String,
}

impl ServerConfig {
    /// Integration test defaults for a server listening on `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            log: LogConfig {
                level: "trace".to_string(),
            },
            acl_policy_path: String::new(),
            db_type: "sqlite3".to_string(),
            db_path: "/tmp/integration_test_db.sqlite3".to_string(),
            ephemeral_node_inactivity_timeout: "30m".to_string(),
            node_update_check_interval: "10s".to_string(),
            ip_prefixes: vec!["fd7a:115c:a1e0::/48".to_string(), "100.64.0.0/10".to_string()],
            dns_config: DnsConfig {
                base_domain: "headscale.net".to_string(),
                magic_dns: true,
                domains: Vec::new(),
                nameservers: vec!["127.0.0.11".to_string(), "1.1.1.1".to_string()],
            },
            private_key_path: "/tmp/private.key".to_string(),
            noise: NoiseConfig {
                private_key_path: "/tmp/noise_private.key".to_string(),
            },
            listen_addr: format!("0.0.0.0:{}", port),
            metrics_listen_addr: "127.0.0.1:9090".to_string(),
            server_url: format!("http://headscale:{}", port),
            derp: DerpConfig {
                urls: vec!["https://controlplane.tailscale.com/derpmap/default".to_string()],
                auto_update_enabled: false,
                update_frequency: "1m".to_string(),
            },
        }
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::for_port(crate::options::DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_yaml_round_trips() {
        let config = ServerConfig::default();
        let yaml = config.to_yaml().unwrap();

        assert!(yaml.contains("listen_addr: 0.0.0.0:8080"), "{}", yaml);
        assert!(yaml.contains("db_type: sqlite3"), "{}", yaml);

        let parsed: ServerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_port_flows_into_listen_and_server_url() {
        let config = ServerConfig::for_port(18080);
        assert_eq!(config.listen_addr, "0.0.0.0:18080");
        assert_eq!(config.server_url, "http://headscale:18080");
    }
}
