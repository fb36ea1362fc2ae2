mod in_memory;
mod sqlite;

pub use in_memory::InMemoryChatStore;
pub use sqlite::SqliteChatStore;
