//! Access-control policy document uploaded next to the config
//!
//! Only the JSON shape matters to the harness; rules are evaluated by the
//! server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Path of the policy file inside the container
pub const ACL_POLICY_PATH: &str = "/etc/headscale/acl.hujson";

/// Environment variable telling the server where the policy lives
pub const ACL_POLICY_ENV: &str = "HEADSCALE_ACL_POLICY_PATH";

/// headscale ACL policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclPolicy {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, String>,

    #[serde(rename = "tagOwners", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag_owners: BTreeMap<String, Vec<String>>,

    #[serde(rename = "acls", default)]
    pub acls: Vec<AclRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<AclTest>,
}

/// One `accept` rule: sources and `host:port` destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclRule {
    pub action: String,
    pub users: Vec<String>,
    pub ports: Vec<String>,
}

impl AclRule {
    pub fn accept(users: &[&str], ports: &[&str]) -> Self {
        Self {
            action: "accept".to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Policy self-test evaluated by the server when loading the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclTest {
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

impl AclPolicy {
    /// Policy that lets every node reach every port.
    pub fn allow_all() -> Self {
        Self {
            acls: vec![AclRule::accept(&["*"], &["*:*"])],
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
