use async_trait::async_trait;

use crate::domain::{errors::DomainError, ContextChunk};

/// Similarity search over the external embedding service.
#[async_trait]
pub trait ContextService: Send + Sync {
    /// Returns at most `limit` chunks, highest relevance first. `filter`
    /// restricts the search to one document; `None` searches everything.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ContextChunk>, DomainError>;
}
