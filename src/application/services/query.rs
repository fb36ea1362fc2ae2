use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use super::prompt::PromptAssembler;
use crate::application::ProviderRegistry;
use crate::domain::{
    fill_placeholders,
    ports::{ChatStore, ContextService, LlmProvider},
    title_from_query, ChatRecord, ContextChunk, DocumentScope, DomainError, GenerationRequest,
    NewChatRecord, ProviderKind, RenderedPrompt, TitleMode,
};

pub const MIN_CONTEXT_LIMIT: usize = 1;
pub const MAX_CONTEXT_LIMIT: usize = 10;

/// Characters of the answer shown to the provider when it writes a title.
const TITLE_RESPONSE_CHARS: usize = 500;

/// Stands in for "no deadline" when a budget does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One chat query as submitted by a client.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub context_limit: usize,
    pub scope: DocumentScope,
    pub provider: ProviderKind,
    pub stream: bool,
    pub debug: bool,
    /// One budget for the whole query, context retrieval included. Replaces
    /// the configured timeouts.
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context_limit: 3,
            scope: DocumentScope::All,
            provider: ProviderKind::default(),
            stream: false,
            debug: false,
            timeout: None,
        }
    }

    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<DocumentScope>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.query.trim().is_empty() {
            return Err(DomainError::invalid("query must not be empty"));
        }
        if !(MIN_CONTEXT_LIMIT..=MAX_CONTEXT_LIMIT).contains(&self.context_limit) {
            return Err(DomainError::invalid(format!(
                "context_limit must be between {MIN_CONTEXT_LIMIT} and {MAX_CONTEXT_LIMIT}, got {}",
                self.context_limit
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(DomainError::invalid("timeout must be positive"));
        }
        Ok(())
    }
}

/// What a streamed query reports, in order: `Started`, any number of
/// `Fragment`s, then exactly one of `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    Started { sources: Vec<ContextChunk> },
    Fragment(String),
    Completed(ChatRecord),
    Failed(DomainError),
}

pub type QueryEventStream = Pin<Box<dyn Stream<Item = QueryEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_context_limit: usize,
    pub context_timeout: Duration,
    pub generation_timeout: Duration,
    pub continue_without_context: bool,
    pub title_mode: TitleMode,
    pub title_max_chars: usize,
    /// `{query}` and `{response}` are substituted.
    pub title_prompt: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_context_limit: 3,
            context_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(120),
            continue_without_context: false,
            title_mode: TitleMode::Query,
            title_max_chars: 60,
            title_prompt: "Title for: {query}\n{response}".to_string(),
        }
    }
}

/// Everything generation needs once validation and retrieval succeeded.
struct Prepared {
    provider: Arc<dyn LlmProvider>,
    sources: Vec<ContextChunk>,
    request: GenerationRequest,
    /// Generation and the optional title call must finish by this instant.
    deadline: Instant,
    budget: Duration,
}

/// `start + budget`, or a far-future instant when that overflows.
fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Runs a query end to end: context retrieval, prompt assembly, generation
/// and persistence of the final answer.
#[derive(Clone)]
pub struct QueryService {
    providers: ProviderRegistry,
    context: Arc<dyn ContextService>,
    store: Arc<dyn ChatStore>,
    settings: Arc<QuerySettings>,
}

impl QueryService {
    pub fn new(
        providers: ProviderRegistry,
        context: Arc<dyn ContextService>,
        store: Arc<dyn ChatStore>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            providers,
            context,
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Buffered query: resolves once the answer is persisted.
    #[instrument(skip(self, request), fields(provider = %request.provider, context_limit = request.context_limit))]
    pub async fn submit(&self, request: QueryRequest) -> Result<ChatRecord, DomainError> {
        let prepared = self.prepare(&request).await?;
        let budget = prepared.budget;

        let generation = timeout_at(prepared.deadline, prepared.provider.generate(&prepared.request))
            .await
            .map_err(|_| DomainError::timeout(format!("generation exceeded {budget:?}")))??;

        if let Some(usage) = generation.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "generation finished"
            );
        }

        self.persist(
            &prepared.provider,
            &request.query,
            prepared.sources,
            generation.text,
            prepared.deadline,
        )
        .await
    }

    /// Streamed query. Errors before the provider starts answering are
    /// returned directly; later ones arrive as `QueryEvent::Failed`.
    ///
    /// A record is written only after the provider stream ends cleanly.
    /// Dropping the returned stream closes the upstream and writes nothing.
    #[instrument(skip(self, request), fields(provider = %request.provider, context_limit = request.context_limit))]
    pub async fn submit_stream(&self, request: QueryRequest) -> Result<QueryEventStream, DomainError> {
        let prepared = self.prepare(&request).await?;
        let (deadline, budget) = (prepared.deadline, prepared.budget);

        let mut fragments = timeout_at(
            deadline,
            prepared.provider.generate_stream(&prepared.request.clone().streaming(true)),
        )
        .await
        .map_err(|_| DomainError::timeout(format!("generation exceeded {budget:?}")))??;

        let service = self.clone();
        let Prepared {
            provider, sources, ..
        } = prepared;
        let query = request.query;

        let events = async_stream::stream! {
            yield QueryEvent::Started { sources: sources.clone() };

            let mut response = String::new();
            let mut count = 0usize;
            let mut failure = None;
            loop {
                match timeout_at(deadline, fragments.next()).await {
                    Err(_) => {
                        failure = Some(DomainError::timeout(format!("generation exceeded {budget:?}")));
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        failure = Some(e);
                        break;
                    }
                    Ok(Some(Ok(fragment))) => {
                        count += 1;
                        response.push_str(&fragment);
                        yield QueryEvent::Fragment(fragment);
                    }
                }
            }
            // Release the upstream before touching the store.
            drop(fragments);

            if failure.is_none() {
                info!(fragments = count, "stream finished");
            }
            match failure {
                Some(error) => {
                    warn!(
                        error = %error,
                        fragments = count,
                        partial_chars = response.chars().count(),
                        "stream failed, discarding partial answer"
                    );
                    yield QueryEvent::Failed(error);
                }
                None => match service.persist(&provider, &query, sources, response, deadline).await {
                    Ok(record) => {
                        yield QueryEvent::Completed(record);
                    }
                    Err(error) => {
                        yield QueryEvent::Failed(error);
                    }
                },
            }
        };
        Ok(Box::pin(events))
    }

    async fn prepare(&self, request: &QueryRequest) -> Result<Prepared, DomainError> {
        request.validate()?;
        let provider = self.providers.get(request.provider)?;

        // A caller budget spans retrieval and generation; the configured
        // timeouts apply to each stage on its own.
        let overall = request.timeout.map(|t| (deadline_after(Instant::now(), t), t));
        let (context_deadline, context_budget) = overall.unwrap_or_else(|| {
            let t = self.settings.context_timeout;
            (deadline_after(Instant::now(), t), t)
        });
        let sources = self
            .retrieve_context(request, context_deadline, context_budget)
            .await?;
        let (deadline, budget) = overall.unwrap_or_else(|| {
            let t = self.settings.generation_timeout;
            (deadline_after(Instant::now(), t), t)
        });

        let assembled = PromptAssembler::new(provider.template(), provider.max_input_chars())
            .assemble(&request.query, &sources)?;
        if assembled.used.len() < sources.len() {
            info!(
                kept = assembled.used.len(),
                returned = sources.len(),
                "context trimmed to fit provider input limit"
            );
        }

        let generation = GenerationRequest::new(assembled.prompt)
            .with_context(assembled.used)
            .streaming(request.stream)
            .with_debug(request.debug);

        Ok(Prepared {
            provider,
            sources,
            request: generation,
            deadline,
            budget,
        })
    }

    async fn retrieve_context(
        &self,
        request: &QueryRequest,
        deadline: Instant,
        budget: Duration,
    ) -> Result<Vec<ContextChunk>, DomainError> {
        let limit = request.context_limit;
        let search = self
            .context
            .search(&request.query, limit, request.scope.filter());

        let result = match timeout_at(deadline, search).await {
            Ok(Ok(chunks)) => Ok(chunks),
            Ok(Err(e @ DomainError::ContextServiceUnavailable(_))) | Ok(Err(e @ DomainError::Timeout(_))) => Err(e),
            Ok(Err(e)) => Err(DomainError::context_unavailable(e.to_string())),
            Err(_) => Err(DomainError::timeout(format!("context retrieval exceeded {budget:?}"))),
        };

        match result {
            Ok(mut chunks) => {
                chunks.truncate(limit);
                info!(chunks = chunks.len(), "context retrieved");
                Ok(chunks)
            }
            Err(error) if self.settings.continue_without_context => {
                warn!(error = %error, "context unavailable, answering without documents");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }

    async fn persist(
        &self,
        provider: &Arc<dyn LlmProvider>,
        query: &str,
        sources: Vec<ContextChunk>,
        response: String,
        deadline: Instant,
    ) -> Result<ChatRecord, DomainError> {
        let title = self.title(provider, query, &response, deadline).await;
        let record = self
            .store
            .insert(NewChatRecord::new(query, response, sources, title))
            .await?;
        info!(chat_id = record.id, "chat persisted");
        Ok(record)
    }

    async fn title(
        &self,
        provider: &Arc<dyn LlmProvider>,
        query: &str,
        response: &str,
        deadline: Instant,
    ) -> String {
        let max_chars = self.settings.title_max_chars;
        let fallback = title_from_query(query, max_chars);
        if self.settings.title_mode == TitleMode::Query {
            return fallback;
        }

        let excerpt: String = response.chars().take(TITLE_RESPONSE_CHARS).collect();
        let prompt = fill_placeholders(
            &self.settings.title_prompt,
            &[("query", query), ("response", &excerpt)],
        );
        let request = GenerationRequest::new(RenderedPrompt::user(prompt));

        match timeout_at(deadline, provider.generate(&request)).await {
            Ok(Ok(generation)) => {
                let line = generation.text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                let cleaned = line.trim().trim_matches(|c: char| c == '"' || c == '*' || c == '#').trim();
                if cleaned.is_empty() {
                    fallback
                } else {
                    title_from_query(cleaned, max_chars)
                }
            }
            Ok(Err(error)) => {
                warn!(error = %error, "title generation failed, using query");
                fallback
            }
            Err(_) => {
                warn!("title generation timed out, using query");
                fallback
            }
        }
    }
}
