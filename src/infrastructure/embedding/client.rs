use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::domain::{
    ports::{ContextService, DocumentGateway},
    ContextChunk, DocumentUpload, DomainError, UploadOutcome,
};
use crate::infrastructure::config::EmbeddingConfig;

const EMBED_FAILED_WARNING: &str =
    "File uploaded but embedding failed. File may not be searchable.";

/// Client for the external embedding service that owns documents, chunks
/// and similarity search.
pub struct EmbeddingApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EmbeddingApiClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DomainError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> Result<T, DomainError> {
        let response = builder.send().await.map_err(|e| {
            DomainError::context_unavailable(format!("request to {path} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::context_unavailable(format!(
                "{path} returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            DomainError::context_unavailable(format!("unreadable response from {path}: {e}"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ContextChunk>,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UploadBatchResponse {
    #[serde(default)]
    successful: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    file_id: String,
}

#[async_trait]
impl ContextService for EmbeddingApiClient {
    #[instrument(skip(self, query))]
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ContextChunk>, DomainError> {
        let mut filter_metadata = json!({ "active": true });
        if let Some(file_id) = filter {
            filter_metadata["file_id"] = json!(file_id);
        }
        let payload = json!({
            "query": query,
            "limit": limit,
            "filter_metadata": filter_metadata,
        });

        let path = "/api/v1/search";
        let response: SearchResponse = self
            .send(self.request(Method::POST, path).json(&payload), path)
            .await?;
        Ok(response.results)
    }
}

#[async_trait]
impl DocumentGateway for EmbeddingApiClient {
    async fn list_documents(&self) -> Result<Vec<serde_json::Value>, DomainError> {
        let path = "/api/v1/documents";
        let response: DocumentsResponse = self.send(self.request(Method::GET, path), path).await?;
        Ok(response.documents)
    }

    #[instrument(skip(self, upload), fields(filename = %upload.filename, bytes = upload.bytes.len()))]
    async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, DomainError> {
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.content_type)
            .map_err(|e| DomainError::invalid(format!("invalid content type: {e}")))?;
        let form = multipart::Form::new().part("files", part);

        let path = "/api/v1/upload/batch";
        let uploaded: UploadBatchResponse = self
            .send(self.request(Method::POST, path).multipart(form), path)
            .await?;

        let file_id = uploaded
            .successful
            .into_iter()
            .next()
            .map(|f| f.file_id)
            .ok_or_else(|| DomainError::invalid("upload failed or no files were processed"))?;

        let path = "/api/v1/embedding/batch";
        let embed = self
            .send::<serde_json::Value>(
                self.request(Method::POST, path)
                    .json(&json!({ "file_ids": [file_id.clone()] })),
                path,
            )
            .await;

        Ok(match embed {
            Ok(_) => UploadOutcome::indexed(file_id),
            Err(e) => {
                warn!(error = %e, file_id = %file_id, "embedding trigger failed");
                UploadOutcome::indexed(file_id).with_warning(EMBED_FAILED_WARNING)
            }
        })
    }
}
