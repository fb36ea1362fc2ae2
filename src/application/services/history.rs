use std::sync::Arc;
use tracing::instrument;

use crate::domain::{ports::ChatStore, ChatRecord, DomainError};

pub struct HistoryService {
    store: Arc<dyn ChatStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Every record, oldest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ChatRecord>, DomainError> {
        self.store.list().await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<ChatRecord, DomainError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat history {id} not found")))
    }

    pub async fn ping(&self) -> Result<(), DomainError> {
        self.store.ping().await
    }
}
