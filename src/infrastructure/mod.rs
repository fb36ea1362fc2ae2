pub mod chat_store;
pub mod config;
pub mod embedding;
pub mod llm;

pub use chat_store::{InMemoryChatStore, SqliteChatStore};
pub use config::{AppConfig, Config, PromptsConfig};
pub use embedding::EmbeddingApiClient;
pub use llm::{build_registry, DigitalOceanAgent, OllamaProvider};
