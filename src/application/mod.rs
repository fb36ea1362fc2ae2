//! Application layer - Use cases and orchestration.
//!
//! Services depend on domain ports (traits) rather than concrete
//! implementations; adapters are injected at startup.

mod registry;
pub mod services;

pub use registry::ProviderRegistry;
pub use services::{
    DocumentService, HistoryService, PromptAssembler, QueryEvent, QueryEventStream, QueryRequest,
    QueryService, QuerySettings,
};
