//! Scripted stand-in for the headscale CLI
//!
//! Understands the subset of commands the harness issues and prints JSON in
//! the same shape the real binary does, including `{seconds, nanos}`
//! timestamps.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use headscale_e2e::ExecOutput;
use headscale_e2e::duration::parse_duration;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::fake_runtime::FakeRuntime;

#[derive(Default)]
struct Registry {
    namespaces: BTreeMap<String, u64>,
    keys: Vec<Value>,
    nodes: BTreeMap<String, Vec<Value>>,
    next_node_id: u64,
    garbled: bool,
}

/// Stateful fake of the `headscale` binary
#[derive(Clone, Default)]
pub struct FakeHeadscale {
    registry: Arc<Mutex<Registry>>,
}

fn timestamp(t: DateTime<Utc>) -> Value {
    json!({ "seconds": t.timestamp(), "nanos": t.timestamp_subsec_nanos() })
}

fn ok(stdout: String) -> ExecOutput {
    ExecOutput {
        stdout: stdout.into_bytes(),
        stderr: Vec::new(),
        exit_code: 0,
    }
}

fn error(message: &str) -> ExecOutput {
    ExecOutput {
        stdout: Vec::new(),
        stderr: format!("Error: {}\n", message).into_bytes(),
        exit_code: 1,
    }
}

impl FakeHeadscale {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register as the `headscale` program of `runtime`.
    pub fn install(&self, runtime: &FakeRuntime) {
        let fake = self.clone();
        runtime.register_handler("headscale", move |argv| fake.handle(argv));
    }

    /// Make every JSON-printing command emit non-JSON text with exit 0.
    pub fn set_garbled(&self, garbled: bool) {
        self.registry.lock().garbled = garbled;
    }

    /// Register a node in `namespace`, as if a client had logged in.
    pub fn add_node(&self, namespace: &str, name: &str) {
        let mut registry = self.registry.lock();
        registry.next_node_id += 1;
        let id = registry.next_node_id;
        let namespace_id = registry.namespaces.get(namespace).copied().unwrap_or_default();
        let now = Utc::now();
        registry
            .nodes
            .entry(namespace.to_string())
            .or_default()
            .push(json!({
                "id": id,
                "machine_key": format!("mkey:{:064x}", id),
                "node_key": format!("nodekey:{:064x}", id),
                "disco_key": format!("discokey:{:064x}", id),
                "ip_addresses": [format!("100.64.0.{}", id), format!("fd7a:115c:a1e0::{}", id)],
                "name": name,
                "given_name": name,
                "namespace": {
                    "id": namespace_id.to_string(),
                    "name": namespace,
                    "created_at": timestamp(now),
                },
                "last_seen": timestamp(now),
                "created_at": timestamp(now),
                "online": true,
            }));
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.registry.lock().namespaces.keys().cloned().collect()
    }

    pub fn handle(&self, argv: &[String]) -> ExecOutput {
        let mut namespace = None;
        let mut output = None;
        let mut words = Vec::new();

        let mut args = argv.iter().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--namespace" | "-n" => namespace = args.next().cloned(),
                "--output" | "-o" => output = args.next().cloned(),
                _ => words.push(arg.clone()),
            }
        }

        let json = output.as_deref() == Some("json");
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["namespaces", "create", name] => self.create_namespace(name),
            ["preauthkeys", "create", flags @ ..] => match namespace {
                Some(ns) => self.create_key(&ns, flags, json),
                None => error("namespace is required"),
            },
            ["nodes", "list"] => match namespace {
                Some(ns) => self.list_nodes(&ns, json),
                None => error("namespace is required"),
            },
            _ => error(&format!("unknown command {:?}", words)),
        }
    }

    fn create_namespace(&self, name: &str) -> ExecOutput {
        let mut registry = self.registry.lock();
        if registry.namespaces.contains_key(name) {
            return error("Namespace already exists");
        }
        let id = registry.namespaces.len() as u64 + 1;
        registry.namespaces.insert(name.to_string(), id);
        ok("Namespace created\n".to_string())
    }

    fn create_key(&self, namespace: &str, flags: &[&str], json: bool) -> ExecOutput {
        let mut reusable = false;
        let mut ephemeral = false;
        let mut expiration = std::time::Duration::from_secs(60 * 60);

        let mut flags = flags.iter();
        while let Some(flag) = flags.next() {
            match *flag {
                "--reusable" => reusable = true,
                "--ephemeral" => ephemeral = true,
                "--expiration" | "-e" => match flags.next().map(|v| parse_duration(v)) {
                    Some(Ok(d)) => expiration = d,
                    _ => return error("invalid expiration"),
                },
                other => return error(&format!("unknown flag {}", other)),
            }
        }

        let mut registry = self.registry.lock();
        if !registry.namespaces.contains_key(namespace) {
            return error("Namespace not found");
        }
        if registry.garbled {
            return ok("Key created, but this is not JSON\n".to_string());
        }

        let id = registry.keys.len() as u64 + 1;
        let now = Utc::now();
        let expires = now
            + chrono::Duration::from_std(expiration).unwrap_or_else(|_| chrono::Duration::zero());
        let key = json!({
            "id": id.to_string(),
            "namespace": namespace,
            "key": format!("{:048x}", id * 0x9e37_79b9),
            "reusable": reusable,
            "ephemeral": ephemeral,
            "expiration": timestamp(expires),
            "created_at": timestamp(now),
        });
        registry.keys.push(key.clone());

        if json {
            ok(key.to_string())
        } else {
            ok(format!("{}\n", key["key"].as_str().unwrap_or_default()))
        }
    }

    fn list_nodes(&self, namespace: &str, json: bool) -> ExecOutput {
        let registry = self.registry.lock();
        if !registry.namespaces.contains_key(namespace) {
            return error("Namespace not found");
        }
        if registry.garbled {
            return ok("ID | Hostname | Name\n".to_string());
        }

        let nodes = registry.nodes.get(namespace).cloned().unwrap_or_default();
        if json {
            ok(Value::Array(nodes).to_string())
        } else {
            ok(format!("{} nodes\n", nodes.len()))
        }
    }
}
