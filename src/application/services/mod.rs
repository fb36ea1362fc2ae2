mod document;
mod history;
mod prompt;
mod query;

pub use document::DocumentService;
pub use history::HistoryService;
pub use prompt::{AssembledPrompt, PromptAssembler, NO_CONTEXT};
pub use query::{
    QueryEvent, QueryEventStream, QueryRequest, QueryService, QuerySettings, MAX_CONTEXT_LIMIT,
    MIN_CONTEXT_LIMIT,
};
