use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::{ports::ChatStore, ChatRecord, DomainError, NewChatRecord};

/// Process-local history, used in tests and when running without a database.
pub struct InMemoryChatStore {
    records: RwLock<Vec<ChatRecord>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn insert(&self, record: NewChatRecord) -> Result<ChatRecord, DomainError> {
        let mut store = self
            .records
            .write()
            .map_err(|e| DomainError::storage(e.to_string()))?;

        let id = store.last().map_or(1, |r| r.id + 1);
        let record = record.into_record(id);
        store.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<ChatRecord>, DomainError> {
        let store = self
            .records
            .read()
            .map_err(|e| DomainError::storage(e.to_string()))?;
        Ok(store.clone())
    }

    async fn get(&self, id: i64) -> Result<Option<ChatRecord>, DomainError> {
        let store = self
            .records
            .read()
            .map_err(|e| DomainError::storage(e.to_string()))?;
        Ok(store.iter().find(|r| r.id == id).cloned())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
