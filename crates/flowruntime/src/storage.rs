use crate::{FlowDefinition, FlowFilter, FlowId, FlowUpdate, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Persistence collaborator for flow definitions.
///
/// Implementations must be safe for concurrent use; the manager places no
/// lock around these calls.
#[async_trait]
pub trait FlowStorage: Send + Sync {
    /// Store a new definition and return its id. Names are unique.
    async fn save(&self, flow: FlowDefinition) -> Result<FlowId, StorageError>;

    async fn find_by_id(&self, id: FlowId) -> Result<Option<FlowDefinition>, StorageError>;

    async fn find_all(&self, filter: &FlowFilter) -> Result<Vec<FlowDefinition>, StorageError>;

    /// Apply a partial update and return the stored result.
    async fn update(&self, id: FlowId, update: FlowUpdate) -> Result<FlowDefinition, StorageError>;

    async fn delete(&self, id: FlowId) -> Result<(), StorageError>;
}

/// Definitions in insertion order, shared by the storage implementations.
#[derive(Debug, Default)]
struct FlowSet {
    flows: Vec<FlowDefinition>,
}

impl FlowSet {
    fn insert(&mut self, flow: FlowDefinition) -> Result<FlowId, StorageError> {
        if self.flows.iter().any(|f| f.name == flow.name) {
            return Err(StorageError::DuplicateName(flow.name));
        }
        let id = flow.id;
        self.flows.push(flow);
        Ok(id)
    }

    fn get(&self, id: FlowId) -> Option<&FlowDefinition> {
        self.flows.iter().find(|f| f.id == id)
    }

    fn select(&self, filter: &FlowFilter) -> Vec<FlowDefinition> {
        self.flows
            .iter()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect()
    }

    fn update(&mut self, id: FlowId, update: FlowUpdate) -> Result<FlowDefinition, StorageError> {
        if let Some(name) = &update.name {
            if self.flows.iter().any(|f| f.id != id && &f.name == name) {
                return Err(StorageError::DuplicateName(name.clone()));
            }
        }
        let flow = self
            .flows
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StorageError::NotFound(id))?;
        flow.apply(update);
        Ok(flow.clone())
    }

    fn remove(&mut self, id: FlowId) -> Result<(), StorageError> {
        let index = self
            .flows
            .iter()
            .position(|f| f.id == id)
            .ok_or(StorageError::NotFound(id))?;
        self.flows.remove(index);
        Ok(())
    }
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryFlowStorage {
    set: RwLock<FlowSet>,
}

impl InMemoryFlowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with definitions, in order.
    pub fn with_flows(flows: impl IntoIterator<Item = FlowDefinition>) -> Self {
        Self {
            set: RwLock::new(FlowSet {
                flows: flows.into_iter().collect(),
            }),
        }
    }
}

#[async_trait]
impl FlowStorage for InMemoryFlowStorage {
    async fn save(&self, flow: FlowDefinition) -> Result<FlowId, StorageError> {
        self.set.write().await.insert(flow)
    }

    async fn find_by_id(&self, id: FlowId) -> Result<Option<FlowDefinition>, StorageError> {
        Ok(self.set.read().await.get(id).cloned())
    }

    async fn find_all(&self, filter: &FlowFilter) -> Result<Vec<FlowDefinition>, StorageError> {
        Ok(self.set.read().await.select(filter))
    }

    async fn update(&self, id: FlowId, update: FlowUpdate) -> Result<FlowDefinition, StorageError> {
        self.set.write().await.update(id, update)
    }

    async fn delete(&self, id: FlowId) -> Result<(), StorageError> {
        self.set.write().await.remove(id)
    }
}

/// Storage persisted as a pretty-printed JSON array, rewritten after every
/// mutation.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    set: RwLock<FlowSet>,
}

impl JsonFileStorage {
    /// Open the store at `path`, loading it if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let flows = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Loaded {} flows from {}", flows.len(), path.display());

        Ok(Self {
            path,
            set: RwLock::new(FlowSet { flows }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, set: &FlowSet) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&set.flows)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl FlowStorage for JsonFileStorage {
    async fn save(&self, flow: FlowDefinition) -> Result<FlowId, StorageError> {
        let mut set = self.set.write().await;
        let id = set.insert(flow)?;
        self.persist(&set).await?;
        Ok(id)
    }

    async fn find_by_id(&self, id: FlowId) -> Result<Option<FlowDefinition>, StorageError> {
        Ok(self.set.read().await.get(id).cloned())
    }

    async fn find_all(&self, filter: &FlowFilter) -> Result<Vec<FlowDefinition>, StorageError> {
        Ok(self.set.read().await.select(filter))
    }

    async fn update(&self, id: FlowId, update: FlowUpdate) -> Result<FlowDefinition, StorageError> {
        let mut set = self.set.write().await;
        let flow = set.update(id, update)?;
        self.persist(&set).await?;
        Ok(flow)
    }

    async fn delete(&self, id: FlowId) -> Result<(), StorageError> {
        let mut set = self.set.write().await;
        set.remove(id)?;
        self.persist(&set).await?;
        Ok(())
    }
}
