//! In-memory container runtime
//!
//! Containers are maps of paths to bytes. `mkdir` and `cat` are built in;
//! any other program is answered by a handler registered under its name.
//! Every call is recorded so tests can assert on ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use headscale_e2e::{
    BuildSpec, ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput, NetworkRef,
    RuntimeError,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Answers `exec` for one program name
pub type ExecHandler = Arc<dyn Fn(&[String]) -> ExecOutput + Send + Sync>;

/// A runtime call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RemoveByName(String),
    Build(String),
    Run(String),
    Exec(String, Vec<String>),
    Upload(String, String),
    Purge(String),
    CreateNetwork(String),
    RemoveNetwork(String),
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    RemoveByName,
    Build,
    Run,
    Exec,
    Upload,
    Purge,
}

#[derive(Debug)]
struct FakeContainer {
    name: String,
    spec: Option<ContainerSpec>,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl FakeContainer {
    fn new(name: &str, spec: Option<ContainerSpec>) -> Self {
        let dirs = ["/", "/bin", "/etc", "/tmp", "/var"]
            .iter()
            .map(|d| d.to_string())
            .collect();
        Self {
            name: name.to_string(),
            spec,
            dirs,
            files: BTreeMap::new(),
        }
    }

    fn mkdir_p(&mut self, dir: &str) -> ExecOutput {
        let mut current = String::new();
        for component in dir.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            if self.files.contains_key(&current) {
                return failed(1, &format!("mkdir: cannot create directory '{}': File exists\n", dir));
            }
            self.dirs.insert(current.clone());
        }
        ExecOutput::default()
    }

    fn cat(&self, path: &str) -> ExecOutput {
        if let Some(data) = self.files.get(path) {
            return ExecOutput {
                stdout: data.clone(),
                ..ExecOutput::default()
            };
        }
        if self.dirs.contains(path) {
            return failed(1, &format!("cat: {}: Is a directory\n", path));
        }
        failed(1, &format!("cat: {}: No such file or directory\n", path))
    }
}

#[derive(Default)]
struct State {
    containers: HashMap<String, FakeContainer>,
    networks: HashMap<String, NetworkRef>,
    calls: Vec<Call>,
    faults: HashSet<Fault>,
    next_id: u32,
    stale_on_remove: bool,
    stale_removed: usize,
}

impl State {
    fn check(&self, fault: Fault) -> Result<(), RuntimeError> {
        if self.faults.contains(&fault) {
            return Err(RuntimeError::Other(format!("injected {:?} fault", fault)));
        }
        Ok(())
    }

    fn container_mut(&mut self, id: &str) -> Result<&mut FakeContainer, RuntimeError> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NoSuchContainer(id.to_string()))
    }

    fn id_by_name(&self, name: &str) -> Option<String> {
        self.containers
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id.clone())
    }
}

/// In-memory [`ContainerRuntime`]
pub struct FakeRuntime {
    state: Mutex<State>,
    handlers: RwLock<HashMap<String, ExecHandler>>,
    address: String,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            handlers: RwLock::new(HashMap::new()),
            address: String::new(),
        }
    }

    /// Give every container the same IP, e.g. `127.0.0.1` to reach a local responder.
    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Pretend a same-named container exists whenever removal by name is requested.
    pub fn with_stale_containers(self) -> Self {
        self.state.lock().stale_on_remove = true;
        self
    }

    pub fn register_handler<F>(&self, program: &str, handler: F)
    where
        F: Fn(&[String]) -> ExecOutput + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(program.to_string(), Arc::new(handler));
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.state.lock().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state.lock().faults.remove(&fault);
    }

    /// Add a container that was not started through [`ContainerRuntime::run_container`].
    pub fn seed_container(&self, name: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("fake-{:04}", state.next_id);
        state
            .containers
            .insert(id.clone(), FakeContainer::new(name, None));
        id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of pretend stale containers removed.
    pub fn stale_removed(&self) -> usize {
        self.state.lock().stale_removed
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.state.lock().containers.contains_key(id)
    }

    pub fn container_named(&self, name: &str) -> Option<String> {
        self.state.lock().id_by_name(name)
    }

    pub fn container_spec(&self, id: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .containers
            .get(id)
            .and_then(|c| c.spec.clone())
    }

    pub fn file(&self, id: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .containers
            .get(id)
            .and_then(|c| c.files.get(path).cloned())
    }

    pub fn has_dir(&self, id: &str, path: &str) -> bool {
        self.state
            .lock()
            .containers
            .get(id)
            .is_some_and(|c| c.dirs.contains(path))
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Build(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }
}

fn failed(exit_code: i64, stderr: &str) -> ExecOutput {
    ExecOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        exit_code,
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Unpack `archive` into `(name, bytes)` pairs.
fn unpack(archive: &[u8]) -> Result<Vec<(String, Vec<u8>)>, RuntimeError> {
    let bad = |e: std::io::Error| RuntimeError::Rejected(format!("invalid archive: {}", e));

    let mut entries = Vec::new();
    let mut reader = tar::Archive::new(archive);
    for entry in reader.entries().map_err(bad)? {
        let mut entry = entry.map_err(bad)?;
        let name = entry
            .path()
            .map_err(bad)?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(bad)?;
        entries.push((name, data));
    }
    Ok(entries)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(&self, spec: &BuildSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Build(spec.tag.clone()));
        state.check(Fault::Build)?;
        Ok(spec.tag.clone())
    }

    async fn remove_container_by_name(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::RemoveByName(name.to_string()));
        state.check(Fault::RemoveByName)?;

        if let Some(id) = state.id_by_name(name) {
            state.containers.remove(&id);
        } else if state.stale_on_remove {
            state.stale_removed += 1;
        }
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Run(spec.name.clone()));
        state.check(Fault::Run)?;

        if state.id_by_name(&spec.name).is_some() {
            return Err(RuntimeError::Rejected(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.networks.contains_key(&spec.network.name) {
            return Err(RuntimeError::Rejected(format!(
                "network {} not found",
                spec.network.name
            )));
        }

        state.next_id += 1;
        let n = state.next_id;
        let id = format!("fake-{:04}", n);
        let ip = if self.address.is_empty() {
            format!("172.18.0.{}", n % 250 + 2)
        } else {
            self.address.clone()
        };
        let host_ports = spec
            .exposed_ports
            .iter()
            .enumerate()
            .map(|(i, port)| (port.clone(), (32768 + n * 10 + i as u32).to_string()))
            .collect();

        state
            .containers
            .insert(id.clone(), FakeContainer::new(&spec.name, Some(spec.clone())));
        debug!(id = %id, name = %spec.name, "fake container started");

        Ok(ContainerInfo {
            id,
            name: spec.name.clone(),
            ip_addresses: HashMap::from([(spec.network.name.clone(), ip)]),
            host_ports,
        })
    }

    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        {
            let mut state = self.state.lock();
            state
                .calls
                .push(Call::Exec(container_id.to_string(), argv.to_vec()));
            state.check(Fault::Exec)?;

            let container = state.container_mut(container_id)?;
            match argv.first().map(String::as_str) {
                Some("mkdir") => {
                    return match argv.get(1..) {
                        Some([flag, dir]) if flag == "-p" => Ok(container.mkdir_p(dir)),
                        _ => Ok(failed(1, "mkdir: only `mkdir -p <dir>` is supported\n")),
                    };
                }
                Some("cat") => {
                    return match argv.get(1..) {
                        Some([path]) => Ok(container.cat(path)),
                        _ => Ok(failed(1, "cat: expected exactly one path\n")),
                    };
                }
                _ => {}
            }
        }

        let program = argv.first().cloned().unwrap_or_default();
        let handler = self.handlers.read().get(&program).cloned();
        match handler {
            Some(handler) => Ok(handler(argv)),
            None => Ok(failed(127, &format!("{}: command not found\n", program))),
        }
    }

    async fn upload_archive(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(Call::Upload(container_id.to_string(), dest_dir.to_string()));
        state.check(Fault::Upload)?;

        let entries = unpack(&archive)?;
        let container = state.container_mut(container_id)?;
        if !container.dirs.contains(dest_dir) {
            return Err(RuntimeError::Rejected(format!(
                "Could not find the file {} in container {}",
                dest_dir, container_id
            )));
        }

        for (name, data) in entries {
            let path = join(dest_dir, &name);
            if container.dirs.contains(&path) {
                return Err(RuntimeError::Rejected(format!(
                    "cannot overwrite directory \"{}\" with non-directory",
                    path
                )));
            }
            container.files.insert(path, data);
        }
        Ok(())
    }

    async fn purge(&self, container_id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Purge(container_id.to_string()));
        state.check(Fault::Purge)?;

        state
            .containers
            .remove(container_id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NoSuchContainer(container_id.to_string()))
    }

    async fn create_network(&self, name: &str) -> Result<NetworkRef, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreateNetwork(name.to_string()));

        if state.networks.contains_key(name) {
            return Err(RuntimeError::Rejected(format!(
                "network with name {} already exists",
                name
            )));
        }
        let network = NetworkRef {
            id: format!("net-{}", state.networks.len() + 1),
            name: name.to_string(),
        };
        state.networks.insert(name.to_string(), network.clone());
        Ok(network)
    }

    async fn remove_network(&self, network: &NetworkRef) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::RemoveNetwork(network.name.clone()));
        state
            .networks
            .remove(&network.name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::Rejected(format!("network {} not found", network.name)))
    }
}
