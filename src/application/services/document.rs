use std::sync::Arc;
use tracing::instrument;

use super::query::{MAX_CONTEXT_LIMIT, MIN_CONTEXT_LIMIT};
use crate::domain::{
    ports::{ContextService, DocumentGateway},
    ContextChunk, DocumentScope, DocumentUpload, DomainError, UploadOutcome,
};

/// Pass-through to the embedding service, which owns document storage.
pub struct DocumentService {
    gateway: Arc<dyn DocumentGateway>,
    context: Arc<dyn ContextService>,
}

impl DocumentService {
    pub fn new(gateway: Arc<dyn DocumentGateway>, context: Arc<dyn ContextService>) -> Self {
        Self { gateway, context }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<serde_json::Value>, DomainError> {
        self.gateway.list_documents().await
    }

    #[instrument(skip(self, upload), fields(filename = %upload.filename))]
    pub async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, DomainError> {
        if upload.filename.trim().is_empty() {
            return Err(DomainError::invalid("uploaded file has no name"));
        }
        if upload.bytes.is_empty() {
            return Err(DomainError::invalid("uploaded file is empty"));
        }
        self.gateway.upload(upload).await
    }

    #[instrument(skip(self, query))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<ContextChunk>, DomainError> {
        if query.trim().is_empty() {
            return Err(DomainError::invalid("query must not be empty"));
        }
        if !(MIN_CONTEXT_LIMIT..=MAX_CONTEXT_LIMIT).contains(&limit) {
            return Err(DomainError::invalid(format!(
                "limit must be between {MIN_CONTEXT_LIMIT} and {MAX_CONTEXT_LIMIT}"
            )));
        }
        let mut chunks = self.context.search(query, limit, scope.filter()).await?;
        chunks.truncate(limit);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentGateway for RecordingBackend {
        async fn list_documents(&self) -> Result<Vec<serde_json::Value>, DomainError> {
            Ok(vec![serde_json::json!({"file_id": "f1"})])
        }

        async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, DomainError> {
            self.uploads.lock().unwrap().push(upload.filename);
            Ok(UploadOutcome::indexed("f2"))
        }
    }

    #[async_trait]
    impl ContextService for RecordingBackend {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            filter: Option<&str>,
        ) -> Result<Vec<ContextChunk>, DomainError> {
            let id = filter.unwrap_or("any");
            Ok((0..5).map(|i| ContextChunk::new(format!("{id}-{i}"), 0.5, "text")).collect())
        }
    }

    fn service() -> (DocumentService, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        (DocumentService::new(backend.clone(), backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_upload_forwards_named_files_only() {
        let (service, backend) = service();

        let outcome = service
            .upload(DocumentUpload::new("notes.md", b"# hi".to_vec()))
            .await
            .unwrap();
        assert_eq!(outcome.file_id, "f2");

        let err = service
            .upload(DocumentUpload::new("empty.md", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));
        assert_eq!(*backend.uploads.lock().unwrap(), vec!["notes.md".to_string()]);
    }

    #[tokio::test]
    async fn test_search_scopes_and_caps_results() {
        let (service, _) = service();
        let chunks = service
            .search("q", 2, &DocumentScope::parse("doc-1"))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "doc-1-0");

        let err = service.search("q", 0, &DocumentScope::All).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_list_passes_through() {
        let (service, _) = service();
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
