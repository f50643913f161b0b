//! Persistence collaborator.
//!
//! The registry treats storage as best-effort: it writes after every
//! mutation and logs failures, but the in-memory record set stays
//! authoritative.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::AgentRecord;

/// A record store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts or replaces a record.
    async fn save(&self, record: &AgentRecord) -> Result<(), StorageError>;

    /// Loads one record.
    async fn load(&self, agent_id: &str) -> Result<Option<AgentRecord>, StorageError>;

    /// Loads every record.
    async fn load_all(&self) -> Result<Vec<AgentRecord>, StorageError>;

    /// Deletes a record. Deleting a missing record is not an error.
    async fn delete(&self, agent_id: &str) -> Result<(), StorageError>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, AgentRecord>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, record: &AgentRecord) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<Option<AgentRecord>, StorageError> {
        Ok(self.records.read().await.get(agent_id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<AgentRecord>, StorageError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn delete(&self, agent_id: &str) -> Result<(), StorageError> {
        self.records.write().await.remove(agent_id);
        Ok(())
    }
}
