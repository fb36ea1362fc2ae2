use serde::{Deserialize, Deserializer, Serialize};

/// A scored snippet of document text returned by the embedding service.
///
/// Chunks double as the citations stored on a chat record, so the wire shape
/// is shared between the search API, the history API and the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub score: f64,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub text: String,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::json!({})
}

/// Source ids are opaque; some embedding backends hand them out as integers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A chunk as cited on a persisted record.
pub type Source = ContextChunk;

impl ContextChunk {
    pub fn new(id: impl Into<String>, score: f64, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: empty_metadata(),
            text: text.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Which documents a search may draw from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DocumentScope {
    #[default]
    All,
    Document(String),
}

impl DocumentScope {
    /// `"all"` (any case) or a blank value selects every document; anything
    /// else is taken as an opaque document identifier.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Document(trimmed.to_string())
        }
    }

    /// The filter handed to the context service: `None` means unfiltered.
    pub fn filter(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Document(id) => Some(id.as_str()),
        }
    }
}

impl From<&str> for DocumentScope {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
