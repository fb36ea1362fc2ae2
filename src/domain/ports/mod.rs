mod chat_store;
mod context;
mod document_gateway;
mod llm;

pub use chat_store::ChatStore;
pub use context::ContextService;
pub use document_gateway::DocumentGateway;
pub use llm::LlmProvider;
