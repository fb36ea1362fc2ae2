use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Source;

pub const UNTITLED_CHAT: &str = "Untitled Chat";

/// How a new record gets its title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMode {
    /// Leading words of the query.
    #[default]
    Query,
    /// Ask the provider for a short summary title.
    Llm,
}

/// One persisted query/answer exchange. Records are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub query: String,
    pub response: String,
    pub sources: Vec<Source>,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything about a record except the identifier the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatRecord {
    pub query: String,
    pub response: String,
    pub sources: Vec<Source>,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

impl NewChatRecord {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        sources: Vec<Source>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            sources,
            title: title.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn into_record(self, id: i64) -> ChatRecord {
        ChatRecord {
            id,
            query: self.query,
            response: self.response,
            sources: self.sources,
            title: self.title,
            timestamp: self.timestamp,
        }
    }
}

/// Derives a title from the query: the leading words that fit in `max_chars`.
///
/// A single word longer than `max_chars` is cut at a char boundary.
pub fn title_from_query(query: &str, max_chars: usize) -> String {
    let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() || max_chars == 0 {
        return UNTITLED_CHAT.to_string();
    }
    if query.chars().count() <= max_chars {
        return query;
    }

    let mut title = String::new();
    for word in query.split(' ') {
        let needed = if title.is_empty() { 0 } else { 1 } + word.chars().count();
        if title.chars().count() + needed > max_chars {
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }

    if title.is_empty() {
        title = query.chars().take(max_chars).collect();
    }
    title
}
