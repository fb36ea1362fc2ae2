use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::{DocumentScope, DocumentUpload, DomainError, UploadOutcome};

#[derive(Debug, Deserialize)]
pub struct SearchDocumentsRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub document_id: Option<String>,
}

pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let documents = state.document_service.list().await?;
    Ok(Json(json!({ "documents": documents })))
}

/// Forwards the first file part of the form.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, ApiError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        DomainError::invalid(format!("malformed multipart body: {e}"))
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let Some(filename) = field.file_name().map(String::from) else {
            continue;
        };
        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.map_err(invalid)?;

        let mut upload = DocumentUpload::new(filename, bytes.to_vec());
        if let Some(content_type) = content_type {
            upload = upload.with_content_type(content_type);
        }
        return Ok(Json(state.document_service.upload(upload).await?));
    }

    Err(DomainError::invalid("no file found in upload").into())
}

pub async fn search_documents(
    State(state): State<AppState>,
    Json(request): Json<SearchDocumentsRequest>,
) -> Result<Json<Value>, ApiError> {
    let limit = request
        .limit
        .unwrap_or(state.query_service.settings().default_context_limit);
    let scope = request
        .document_id
        .as_deref()
        .map(DocumentScope::parse)
        .unwrap_or_default();

    let results = state
        .document_service
        .search(&request.query, limit, &scope)
        .await?;
    Ok(Json(json!({ "results": results })))
}
