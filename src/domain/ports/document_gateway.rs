use async_trait::async_trait;

use crate::domain::{errors::DomainError, DocumentUpload, UploadOutcome};

/// Document management owned by the embedding service.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<serde_json::Value>, DomainError>;
    async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, DomainError>;
}
