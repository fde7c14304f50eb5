//! Port record storage.
//!
//! Every operation is keyed by the normalized (trimmed, uppercase) city name,
//! which is the only identity a [`PortRecord`] has. Each call takes the store
//! lock once; there are no transactions spanning several calls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use thiserror::Error;

use crate::port::{AgentPatch, AgentRecord, PortRecord, normalize_city};
use crate::saving;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document store holding one [`PortRecord`] per city.
pub trait PortStore: Send + Sync {
    /// All records ordered by city
    fn list(&self) -> StoreResult<Vec<PortRecord>>;

    fn find_by_city(&self, city: &str) -> StoreResult<Option<PortRecord>>;

    /// Create an empty record, or return the existing one untouched.
    fn create_city(&self, city: &str) -> StoreResult<PortRecord>;

    /// Returns `false` when the city or agent does not exist.
    fn remove_agent(&self, city: &str, agent_name: &str) -> StoreResult<bool>;

    /// Returns `false` when the city does not exist.
    fn append_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool>;

    /// Remove any agent with the same name and append `agent`, as one step.
    ///
    /// Returns `false` when the city does not exist.
    fn replace_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool>;

    /// Create or wholesale-replace a city's agent list
    fn upsert_city(&self, city: &str, agents: Vec<AgentRecord>) -> StoreResult<PortRecord>;

    /// Patch one agent in place.
    ///
    /// Returns `None` when the city or agent does not exist.
    fn update_agent(
        &self,
        city: &str,
        agent_name: &str,
        patch: &AgentPatch,
    ) -> StoreResult<Option<PortRecord>>;

    fn delete_city(&self, city: &str) -> StoreResult<bool>;
}

type PortMap = BTreeMap<String, PortRecord>;

// Mutations shared by both stores. Each returns its result and whether the
// map changed.

fn create_city_in(ports: &mut PortMap, city: &str) -> (PortRecord, bool) {
    let key = normalize_city(city);
    if let Some(existing) = ports.get(&key) {
        return (existing.clone(), false);
    }
    debug!("Creating port record for {}", city.trim());
    let record = PortRecord::new(city);
    ports.insert(key, record.clone());
    (record, true)
}

fn remove_agent_in(ports: &mut PortMap, city: &str, agent_name: &str) -> (bool, bool) {
    let removed = ports
        .get_mut(&normalize_city(city))
        .is_some_and(|port| port.remove_agent(agent_name));
    (removed, removed)
}

fn append_agent_in(ports: &mut PortMap, city: &str, agent: AgentRecord) -> (bool, bool) {
    let found = match ports.get_mut(&normalize_city(city)) {
        Some(port) => {
            port.agents.push(agent);
            port.touch();
            true
        }
        None => false,
    };
    (found, found)
}

fn replace_agent_in(ports: &mut PortMap, city: &str, agent: AgentRecord) -> (bool, bool) {
    let found = match ports.get_mut(&normalize_city(city)) {
        Some(port) => {
            port.replace_agent(agent);
            true
        }
        None => false,
    };
    (found, found)
}

fn upsert_city_in(ports: &mut PortMap, city: &str, agents: Vec<AgentRecord>) -> (PortRecord, bool) {
    let record = ports
        .entry(normalize_city(city))
        .or_insert_with(|| PortRecord::new(city));
    record.set_agents(agents);
    (record.clone(), true)
}

fn update_agent_in(
    ports: &mut PortMap,
    city: &str,
    agent_name: &str,
    patch: &AgentPatch,
) -> (Option<PortRecord>, bool) {
    let updated = ports.get_mut(&normalize_city(city)).and_then(|port| {
        let agent = port.agents.iter_mut().find(|a| a.name == agent_name)?;
        patch.apply(agent);
        port.touch();
        Some(port.clone())
    });
    let changed = updated.is_some();
    (updated, changed)
}

fn delete_city_in(ports: &mut PortMap, city: &str) -> (bool, bool) {
    let removed = ports.remove(&normalize_city(city)).is_some();
    (removed, removed)
}

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    ports: RwLock<PortMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PortRecord>) -> Self {
        let ports = records
            .into_iter()
            .map(|mut r| {
                r.city = normalize_city(&r.city);
                (r.city.clone(), r)
            })
            .collect();
        MemoryStore {
            ports: RwLock::new(ports),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, PortMap>> {
        self.ports.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, PortMap>> {
        self.ports.write().map_err(|_| StoreError::Poisoned)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut PortMap) -> (T, bool)) -> StoreResult<T> {
        let mut ports = self.write()?;
        Ok(f(&mut *ports).0)
    }
}

impl PortStore for MemoryStore {
    fn list(&self) -> StoreResult<Vec<PortRecord>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn find_by_city(&self, city: &str) -> StoreResult<Option<PortRecord>> {
        Ok(self.read()?.get(&normalize_city(city)).cloned())
    }

    fn create_city(&self, city: &str) -> StoreResult<PortRecord> {
        self.mutate(|ports| create_city_in(ports, city))
    }

    fn remove_agent(&self, city: &str, agent_name: &str) -> StoreResult<bool> {
        self.mutate(|ports| remove_agent_in(ports, city, agent_name))
    }

    fn append_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
        self.mutate(|ports| append_agent_in(ports, city, agent))
    }

    fn replace_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
        self.mutate(|ports| replace_agent_in(ports, city, agent))
    }

    fn upsert_city(&self, city: &str, agents: Vec<AgentRecord>) -> StoreResult<PortRecord> {
        self.mutate(|ports| upsert_city_in(ports, city, agents))
    }

    fn update_agent(
        &self,
        city: &str,
        agent_name: &str,
        patch: &AgentPatch,
    ) -> StoreResult<Option<PortRecord>> {
        self.mutate(|ports| update_agent_in(ports, city, agent_name, patch))
    }

    fn delete_city(&self, city: &str) -> StoreResult<bool> {
        self.mutate(|ports| delete_city_in(ports, city))
    }
}

/// Memory store persisted to a snapshot file after every mutation.
///
/// A mutation is applied to a copy of the records, the copy is written to
/// disk, and only then does it replace the in-memory state. A failed write
/// leaves both the snapshot and the served records as they were.
#[derive(Debug)]
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty when the file is missing
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let records = if path.exists() {
            saving::load_ports(&path)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Vec::new()
        };
        info!(
            "Loaded {} port records from {}",
            records.len(),
            path.display()
        );
        Ok(FileStore {
            inner: MemoryStore::from_records(records),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // The write guard is held across the save, which serializes snapshot
    // writes to the shared temporary file.
    fn commit<T>(&self, f: impl FnOnce(&mut PortMap) -> (T, bool)) -> StoreResult<T> {
        let mut ports = self.inner.write()?;
        let mut next = PortMap::clone(&ports);
        let (result, changed) = f(&mut next);
        if changed {
            let records: Vec<PortRecord> = next.values().cloned().collect();
            saving::save_ports(&records, &self.path)?;
            *ports = next;
        }
        Ok(result)
    }
}

impl PortStore for FileStore {
    fn list(&self) -> StoreResult<Vec<PortRecord>> {
        self.inner.list()
    }

    fn find_by_city(&self, city: &str) -> StoreResult<Option<PortRecord>> {
        self.inner.find_by_city(city)
    }

    fn create_city(&self, city: &str) -> StoreResult<PortRecord> {
        if let Some(existing) = self.inner.find_by_city(city)? {
            return Ok(existing);
        }
        self.commit(|ports| create_city_in(ports, city))
    }

    fn remove_agent(&self, city: &str, agent_name: &str) -> StoreResult<bool> {
        self.commit(|ports| remove_agent_in(ports, city, agent_name))
    }

    fn append_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
        self.commit(|ports| append_agent_in(ports, city, agent))
    }

    fn replace_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
        self.commit(|ports| replace_agent_in(ports, city, agent))
    }

    fn upsert_city(&self, city: &str, agents: Vec<AgentRecord>) -> StoreResult<PortRecord> {
        self.commit(|ports| upsert_city_in(ports, city, agents))
    }

    fn update_agent(
        &self,
        city: &str,
        agent_name: &str,
        patch: &AgentPatch,
    ) -> StoreResult<Option<PortRecord>> {
        self.commit(|ports| update_agent_in(ports, city, agent_name, patch))
    }

    fn delete_city(&self, city: &str) -> StoreResult<bool> {
        self.commit(|ports| delete_city_in(ports, city))
    }
}
