use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::transport::{ensure_success, lines, read_json, transport_error};
use crate::domain::{
    ports::LlmProvider, DomainError, FragmentStream, Generation, GenerationRequest,
    PromptTemplate, ProviderKind, TokenUsage,
};
use crate::infrastructure::config::DigitalOceanConfig;

const COMPLETIONS_PATH: &str = "/api/v1/chat/completions";

/// Cloud-hosted GenAI agent speaking the OpenAI chat-completions dialect.
pub struct DigitalOceanAgent {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    max_input_chars: usize,
    template: PromptTemplate,
}

impl DigitalOceanAgent {
    pub fn new(config: &DigitalOceanConfig, template: PromptTemplate) -> Result<Self, DomainError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| DomainError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.api_url.trim_end_matches('/'), COMPLETIONS_PATH),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            template,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.prompt.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt.user }));

        json!({
            "messages": messages,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<Response, DomainError> {
        let payload = self.payload(request, stream);
        if request.debug {
            debug!(endpoint = %self.endpoint, payload = %payload, "sending agent request");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        if request.debug {
            debug!(status = %response.status(), "agent responded");
        }
        ensure_success(response).await
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ChoiceContent>,
    delta: Option<ChoiceContent>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<CompletionUsage> for TokenUsage {
    fn from(usage: CompletionUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// One decoded line of the agent's event stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Fragment(String),
    Done,
}

fn parse_sse_line(line: &str) -> Result<SseLine, DomainError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseLine::Skip);
    }
    // Only data lines carry payload; `event:`/`id:`/`retry:` are framing.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: Completion = serde_json::from_str(data)
        .map_err(|e| DomainError::protocol(format!("malformed stream event: {e}")))?;
    let content = chunk.choices.into_iter().next().and_then(|choice| {
        choice
            .delta
            .and_then(|d| d.content)
            .or(choice.text)
    });

    Ok(match content {
        Some(text) if !text.is_empty() => SseLine::Fragment(text),
        _ => SseLine::Skip,
    })
}

#[async_trait]
impl LlmProvider for DigitalOceanAgent {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    fn template(&self) -> &PromptTemplate {
        &self.template
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, DomainError> {
        let response = self.send(request, false).await?;
        let completion: Completion = read_json(response).await?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.and_then(|m| m.content).or(choice.text))
            .ok_or_else(|| DomainError::protocol("response has no message content"))?;

        let generation = Generation::new(text);
        Ok(match completion.usage {
            Some(usage) => generation.with_usage(usage.into()),
            None => generation,
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, DomainError> {
        let response = self.send(request, true).await?;
        let mut body_lines = Box::pin(lines(response.bytes_stream()));

        let stream: FragmentStream = Box::pin(async_stream::try_stream! {
            let mut finished = false;
            while let Some(line) = body_lines.next().await {
                match parse_sse_line(&line?)? {
                    SseLine::Skip => continue,
                    SseLine::Done => {
                        finished = true;
                        break;
                    }
                    SseLine::Fragment(text) => {
                        yield text;
                    }
                }
            }
            // EOF without `data: [DONE]` means the answer was truncated.
            if !finished {
                Err::<(), _>(DomainError::protocol("stream ended before completion"))?;
            }
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RenderedPrompt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent(base_url: &str) -> DigitalOceanAgent {
        let config = DigitalOceanConfig {
            api_url: base_url.to_string(),
            api_key: "do-key".to_string(),
            ..DigitalOceanConfig::default()
        };
        DigitalOceanAgent::new(&config, PromptTemplate::new("{context}\n{query}")).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(RenderedPrompt::user("What is X?"))
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            agent("https://agent.example/").endpoint(),
            "https://agent.example/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            SseLine::Fragment("Hi".into())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"text":"legacy"}]}"#).unwrap(),
            SseLine::Fragment("legacy".into())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(DomainError::UpstreamProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_parses_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer do-key"))
            .and(body_partial_json(json!({
                "stream": false,
                "messages": [{"role": "user", "content": "What is X?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "X is ..."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generation = agent(&server.uri()).generate(&request()).await.unwrap();
        assert_eq!(generation.text, "X is ...");
        assert_eq!(generation.usage, Some(TokenUsage::new(12, 3)));
    }

    #[tokio::test]
    async fn test_generate_non_success_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = agent(&server.uri()).generate(&request()).await.unwrap_err();
        assert_eq!(err, DomainError::upstream(401, "bad key"));
    }

    #[tokio::test]
    async fn test_generate_garbage_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = agent(&server.uri()).generate(&request()).await.unwrap_err();
        assert!(matches!(err, DomainError::UpstreamProtocol(_)));
    }

    #[tokio::test]
    async fn test_generate_without_choices_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = agent(&server.uri()).generate(&request()).await.unwrap_err();
        assert!(matches!(err, DomainError::UpstreamProtocol(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        // Nothing listens on port 9 locally.
        let err = agent("http://127.0.0.1:9").generate(&request()).await.unwrap_err();
        assert!(matches!(err, DomainError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order() {
        let server = MockServer::start().await;
        let body = concat!(
            ": ping\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"X \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"...\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = agent(&server.uri())
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(fragments, vec!["X ", "is ", "..."]);
    }

    #[tokio::test]
    async fn test_stream_malformed_event_terminates_with_error() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: {broken\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let stream = agent(&server.uri())
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let items: Vec<Result<String, DomainError>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "ok");
        assert!(matches!(items[1], Err(DomainError::UpstreamProtocol(_))));
    }

    #[tokio::test]
    async fn test_stream_without_done_marker_is_protocol_error() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"X \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = agent(&server.uri())
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let items: Vec<Result<String, DomainError>> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "X ");
        assert_eq!(items[1].as_deref().unwrap(), "is");
        assert_eq!(
            items[2],
            Err(DomainError::protocol("stream ended before completion"))
        );
    }

    #[tokio::test]
    async fn test_stream_rejected_before_first_byte() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = match agent(&server.uri())
            .generate_stream(&request().streaming(true))
            .await
        {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert_eq!(err, DomainError::upstream(503, "overloaded"));
    }
}
