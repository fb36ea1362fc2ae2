use async_trait::async_trait;

use crate::domain::{
    errors::DomainError, FragmentStream, Generation, GenerationRequest, PromptTemplate,
    ProviderKind,
};

/// One concrete LLM backend.
///
/// Implementations differ only in transport: endpoint, auth, payload shape and
/// response parsing. They hold no per-call state and are shared across
/// requests. Nothing is retried here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Layout the orchestrator renders context and query into.
    fn template(&self) -> &PromptTemplate;

    /// Upper bound on the rendered prompt, in characters.
    fn max_input_chars(&self) -> usize;

    /// Single request/response call; resolves once the full answer is known.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, DomainError>;

    /// Opens the upstream connection and yields fragments as they arrive.
    ///
    /// Errors raised before the first byte (connect failure, non-success
    /// status) are returned directly; later ones arrive as stream items.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, DomainError>;
}
