//! Administrative commands run through the headscale CLI
//!
//! Each operation runs `headscale ... --output json` inside the container and
//! decodes the result. A command that fails surfaces as
//! [`HarnessError::Exec`]; output that does not decode surfaces as
//! [`HarnessError::Parse`] together with the raw text.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::duration::format_duration;
use crate::error::{HarnessError, HarnessResult};
use crate::instance::HeadscaleInContainer;
use crate::options::SERVER_BINARY;

/// Default lifetime of keys made by [`HeadscaleInContainer::create_auth_key`]
pub const DEFAULT_KEY_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

/// A namespace (user) as printed by the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A pre-authentication key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreAuthKey {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub namespace: String,
    pub key: String,
    pub reusable: bool,
    pub ephemeral: bool,
    pub used: bool,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PreAuthKey {
    /// Time left until expiry, measured from `now`. `None` for keys without expiry.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expiration.map(|expiration| expiration - now)
    }
}

/// A registered node
///
/// Fields printed as `null` decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub machine_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub node_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub disco_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ip_addresses: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub given_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub namespace: Namespace,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub forced_tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub valid_tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub invalid_tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub online: bool,
}

/// Flags for `preauthkeys create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthKeyOptions {
    pub reusable: bool,
    pub ephemeral: bool,
    pub expiration: Duration,
}

impl Default for AuthKeyOptions {
    fn default() -> Self {
        Self {
            reusable: true,
            ephemeral: false,
            expiration: DEFAULT_KEY_EXPIRATION,
        }
    }
}

/// `headscale namespaces create <name>`
pub fn create_namespace_command(name: &str) -> Vec<String> {
    vec![
        SERVER_BINARY.to_string(),
        "namespaces".to_string(),
        "create".to_string(),
        name.to_string(),
    ]
}

/// `headscale --namespace <ns> preauthkeys create [flags] --output json`
pub fn create_auth_key_command(namespace: &str, options: &AuthKeyOptions) -> Vec<String> {
    let mut argv = vec![
        SERVER_BINARY.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "preauthkeys".to_string(),
        "create".to_string(),
    ];
    if options.reusable {
        argv.push("--reusable".to_string());
    }
    if options.ephemeral {
        argv.push("--ephemeral".to_string());
    }
    argv.push("--expiration".to_string());
    argv.push(format_duration(&options.expiration));
    argv.push("--output".to_string());
    argv.push("json".to_string());
    argv
}

/// `headscale --namespace <ns> nodes list --output json`
pub fn list_nodes_command(namespace: &str) -> Vec<String> {
    vec![
        SERVER_BINARY.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "nodes".to_string(),
        "list".to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn parse_output<T: DeserializeOwned>(what: &'static str, output: &str) -> HarnessResult<T> {
    serde_json::from_str(output).map_err(|source| HarnessError::Parse {
        what,
        output: output.to_string(),
        source,
    })
}

/// Decode `preauthkeys create --output json`.
pub fn parse_pre_auth_key(output: &str) -> HarnessResult<PreAuthKey> {
    parse_output("auth key", output)
}

/// Decode `nodes list --output json`. A `null` list is treated as empty.
pub fn parse_nodes(output: &str) -> HarnessResult<Vec<Node>> {
    let nodes: Option<Vec<Node>> = parse_output("node list", output)?;
    Ok(nodes.unwrap_or_default())
}

impl HeadscaleInContainer {
    /// Create a namespace. Output is not parsed.
    pub async fn create_namespace(&self, name: &str) -> HarnessResult<()> {
        info!(hostname = %self.hostname(), namespace = name, "Creating namespace");
        self.runner().execute(&create_namespace_command(name)).await?;
        Ok(())
    }

    /// Create a reusable, non-ephemeral key valid for 24 hours.
    pub async fn create_auth_key(&self, namespace: &str) -> HarnessResult<PreAuthKey> {
        self.create_auth_key_with(namespace, &AuthKeyOptions::default())
            .await
    }

    pub async fn create_auth_key_with(
        &self,
        namespace: &str,
        options: &AuthKeyOptions,
    ) -> HarnessResult<PreAuthKey> {
        let output = self
            .runner()
            .execute(&create_auth_key_command(namespace, options))
            .await?;
        parse_pre_auth_key(&output.stdout)
    }

    pub async fn list_nodes(&self, namespace: &str) -> HarnessResult<Vec<Node>> {
        let output = self
            .runner()
            .execute(&list_nodes_command(namespace))
            .await?;
        parse_nodes(&output.stdout)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn flexible_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawId::Number(id)) => Ok(id),
        Some(RawId::Text(text)) if text.is_empty() => Ok(0),
        Some(RawId::Text(text)) => text
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid id: {:?}", text))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Parts {
        #[serde(default)]
        seconds: i64,
        #[serde(default)]
        nanos: u32,
    },
}

fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Text(text)) if text.is_empty() => Ok(None),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", text, e))),
        Some(RawTimestamp::Parts { seconds, nanos }) => Utc
            .timestamp_opt(seconds, nanos)
            .single()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}s", seconds))),
    }
}

#[cfg(test)]
mod tests;
