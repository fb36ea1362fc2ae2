mod chat;
mod context;
mod document;
mod generation;

pub use chat::{title_from_query, ChatRecord, NewChatRecord, TitleMode, UNTITLED_CHAT};
pub use context::{ContextChunk, DocumentScope, Source};
pub use document::{DocumentUpload, UploadOutcome};
pub use generation::{
    fill_placeholders, FragmentStream, Generation, GenerationRequest, PromptTemplate, ProviderKind,
    RenderedPrompt, TokenUsage,
};
