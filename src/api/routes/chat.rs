use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

use crate::api::{error::ApiError, state::AppState, ErrorBody};
use crate::application::{QueryEvent, QueryRequest};
use crate::domain::{ChatRecord, DocumentScope, ProviderKind};

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub query: String,
    pub context_limit: Option<usize>,
    #[serde(default = "all_documents")]
    pub document_id: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub debug_mode: bool,
    pub timeout_secs: Option<u64>,
}

fn all_documents() -> String {
    "all".to_string()
}

impl QueryBody {
    fn into_request(self, default_limit: usize) -> QueryRequest {
        let mut request = QueryRequest::new(self.query)
            .with_context_limit(self.context_limit.unwrap_or(default_limit))
            .with_scope(DocumentScope::parse(&self.document_id))
            .with_provider(self.provider)
            .streaming(self.stream)
            .with_debug(self.debug_mode);
        if let Some(secs) = self.timeout_secs {
            request = request.with_timeout(Duration::from_secs(secs));
        }
        request
    }
}

/// Buffered by default; `"stream": true` switches to the SSE response.
pub async fn submit_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Response, ApiError> {
    let request = body.into_request(state.query_service.settings().default_context_limit);
    if request.stream {
        return Ok(stream_query(&state, request).await?.into_response());
    }

    let record = state.query_service.submit(request).await?;
    Ok(Json(record).into_response())
}

pub async fn submit_query_stream(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Response, ApiError> {
    let request = body
        .into_request(state.query_service.settings().default_context_limit)
        .streaming(true);
    Ok(stream_query(&state, request).await?.into_response())
}

async fn stream_query(
    state: &AppState,
    request: QueryRequest,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state.query_service.submit_stream(request).await?;
    let sse = events.map(|event| Ok::<_, Infallible>(to_sse(event)));
    Ok(Sse::new(sse).keep_alive(KeepAlive::default()))
}

fn to_sse(event: QueryEvent) -> Event {
    let (name, data) = match event {
        QueryEvent::Started { sources } => ("started", json!({ "sources": sources })),
        QueryEvent::Fragment(text) => ("fragment", json!({ "text": text })),
        QueryEvent::Completed(record) => ("complete", json!(record)),
        QueryEvent::Failed(err) => ("error", json!(ErrorBody::from(&err))),
    };
    Event::default().event(name).data(data.to_string())
}

pub async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    Ok(Json(state.history_service.list().await?))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChatRecord>, ApiError> {
    Ok(Json(state.history_service.get(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults() {
        let body: QueryBody = serde_json::from_str(r#"{"query": "What is X?"}"#).unwrap();
        let request = body.into_request(3);

        assert_eq!(request.query, "What is X?");
        assert_eq!(request.context_limit, 3);
        assert_eq!(request.scope, DocumentScope::All);
        assert_eq!(request.provider, ProviderKind::DigitalOcean);
        assert!(!request.stream);
        assert!(request.timeout.is_none());
    }

    #[test]
    fn test_body_overrides() {
        let body: QueryBody = serde_json::from_str(
            r#"{"query": "q", "context_limit": 5, "document_id": "f1",
                "provider": "Ollama", "debug_mode": true, "timeout_secs": 9}"#,
        )
        .unwrap();
        let request = body.into_request(3);

        assert_eq!(request.context_limit, 5);
        assert_eq!(request.scope, DocumentScope::Document("f1".into()));
        assert_eq!(request.provider, ProviderKind::Ollama);
        assert!(request.debug);
        assert_eq!(request.timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_unknown_provider_is_rejected_at_parse() {
        let parsed = serde_json::from_str::<QueryBody>(r#"{"query": "q", "provider": "gpt"}"#);
        assert!(parsed.is_err());
    }
}
