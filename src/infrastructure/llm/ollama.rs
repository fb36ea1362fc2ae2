use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::transport::{ensure_success, lines, read_json, transport_error};
use crate::domain::{
    ports::LlmProvider, DomainError, FragmentStream, Generation, GenerationRequest,
    PromptTemplate, ProviderKind, TokenUsage,
};
use crate::infrastructure::config::OllamaConfig;

/// Locally-hosted model server using Ollama's `/api/generate` endpoint.
pub struct OllamaProvider {
    client: Client,
    api_url: String,
    model: String,
    max_input_chars: usize,
    template: PromptTemplate,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig, template: PromptTemplate) -> Result<Self, DomainError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| DomainError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_input_chars: config.max_input_chars,
            template,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn payload(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt.user,
            "stream": stream,
        });
        if let Some(system) = &request.prompt.system {
            payload["system"] = json!(system);
        }
        payload
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<Response, DomainError> {
        let payload = self.payload(request, stream);
        if request.debug {
            debug!(url = %self.api_url, payload = %payload, "sending ollama request");
        }

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        if request.debug {
            debug!(status = %response.status(), "ollama responded");
        }
        ensure_success(response).await
    }
}

/// Both the buffered body and every streamed line share this shape.
#[derive(Debug, Default, Deserialize)]
struct GenerateChunk {
    response: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

impl GenerateChunk {
    fn usage(&self) -> Option<TokenUsage> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(TokenUsage::new(
                prompt.unwrap_or(0),
                completion.unwrap_or(0),
            )),
        }
    }
}

fn parse_line(line: &str) -> Result<Option<GenerateChunk>, DomainError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| DomainError::protocol(format!("malformed stream line: {e}")))?;
    if let Some(error) = &chunk.error {
        return Err(DomainError::protocol(format!("ollama reported: {error}")));
    }
    Ok(Some(chunk))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn template(&self) -> &PromptTemplate {
        &self.template
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, DomainError> {
        let response = self.send(request, false).await?;
        let chunk: GenerateChunk = read_json(response).await?;
        if let Some(error) = &chunk.error {
            return Err(DomainError::protocol(format!("ollama reported: {error}")));
        }

        let usage = chunk.usage();
        let text = chunk
            .response
            .ok_or_else(|| DomainError::protocol("response field missing"))?;

        let generation = Generation::new(text);
        Ok(match usage {
            Some(usage) => generation.with_usage(usage),
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
                let Some(chunk) = parse_line(&line?)? else {
                    continue;
                };
                if let Some(text) = chunk.response.filter(|t| !t.is_empty()) {
                    yield text;
                }
                if chunk.done {
                    finished = true;
                    break;
                }
            }
            // A body that closes without `"done": true` was cut off.
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
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OllamaProvider {
        let config = OllamaConfig {
            api_url: format!("{}/api/generate", server.uri()),
            model: "llama3.2".to_string(),
            ..OllamaConfig::default()
        };
        OllamaProvider::new(&config, PromptTemplate::new("{query}")).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(RenderedPrompt {
            system: Some("Answer from documents only.".into()),
            user: "Documents:\nalpha\n\nUser Question: What is X?".into(),
        })
    }

    #[tokio::test]
    async fn test_generate_sends_model_prompt_and_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3.2",
                "system": "Answer from documents only.",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "X is ...",
                "done": true,
                "prompt_eval_count": 40,
                "eval_count": 4
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generation = provider(&server).generate(&request()).await.unwrap();
        assert_eq!(generation.text, "X is ...");
        assert_eq!(generation.usage, Some(TokenUsage::new(40, 4)));
    }

    #[tokio::test]
    async fn test_generate_missing_model_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"model not found"}"#),
            )
            .mount(&server)
            .await;

        let err = provider(&server).generate(&request()).await.unwrap_err();
        assert_eq!(err, DomainError::upstream(404, r#"{"error":"model not found"}"#));
    }

    #[tokio::test]
    async fn test_generate_without_response_field_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let err = provider(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, DomainError::UpstreamProtocol(_)));
    }

    #[tokio::test]
    async fn test_stream_reads_ndjson_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"X\",\"done\":false}\n",
            "{\"response\":\" is\",\"done\":false}\n",
            "\n",
            "{\"response\":\" ...\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":3}\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(fragments, vec!["X", " is", " ..."]);
    }

    #[tokio::test]
    async fn test_stream_error_line_terminates_stream() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"partial\",\"done\":false}\n{\"error\":\"out of memory\"}\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let items: Vec<Result<String, DomainError>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        assert!(matches!(items[1], Err(DomainError::UpstreamProtocol(_))));
    }

    #[tokio::test]
    async fn test_stream_cut_off_before_done_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"response\":\"partial \",\"done\":false}\n"),
            )
            .mount(&server)
            .await;

        let stream = provider(&server)
            .generate_stream(&request().streaming(true))
            .await
            .unwrap();
        let items: Vec<Result<String, DomainError>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial ");
        assert_eq!(
            items[1],
            Err(DomainError::protocol("stream ended before completion"))
        );
    }

    #[test]
    fn test_parse_line_skips_blank() {
        assert!(parse_line("   ").unwrap().is_none());
    }
}
