use async_trait::async_trait;

use crate::domain::{errors::DomainError, ChatRecord, NewChatRecord};

/// Append-only chat history.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persists one record and returns it with its assigned id.
    async fn insert(&self, record: NewChatRecord) -> Result<ChatRecord, DomainError>;
    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<ChatRecord>, DomainError>;
    async fn get(&self, id: i64) -> Result<Option<ChatRecord>, DomainError>;
    async fn ping(&self) -> Result<(), DomainError>;
}
