use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use futures::Stream;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ContextChunk;
use crate::domain::errors::{DomainError, Result};

/// Lazy, finite, non-restartable sequence of answer fragments.
///
/// The stream ends after the last fragment; an `Err` item terminates it early.
/// Dropping the stream releases the upstream connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Selects a concrete LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    /// Cloud-hosted chat agent (DigitalOcean GenAI agent API).
    #[default]
    DigitalOcean,
    /// Locally-hosted model server (Ollama).
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [Self::DigitalOcean, Self::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DigitalOcean => "Digital Ocean",
            Self::Ollama => "Ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "digital ocean" | "digitalocean" | "cloud hosted" | "cloud" => Ok(Self::DigitalOcean),
            "ollama" | "local hosted" | "local" => Ok(Self::Ollama),
            _ => Err(DomainError::invalid(format!("unknown provider '{s}'"))),
        }
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Provider-specific prompt layout with `{context}` and `{query}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system: Option<String>,
    pub user: String,
}

impl PromptTemplate {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn render(&self, context: &str, query: &str) -> RenderedPrompt {
        let values = [("context", context), ("query", query)];
        RenderedPrompt {
            system: self.system.as_deref().map(|t| fill_placeholders(t, &values)),
            user: fill_placeholders(&self.user, &values),
        }
    }
}

/// Replaces `{name}` placeholders in one pass over `template`. Inserted
/// values are never rescanned, so braces inside them stay literal.
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = values.iter().find_map(|(name, value)| {
            tail.strip_prefix(name)
                .and_then(|after| after.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

impl RenderedPrompt {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    /// Input size in characters, the unit provider limits are expressed in.
    pub fn char_len(&self) -> usize {
        self.system.as_deref().map_or(0, |s| s.chars().count()) + self.user.chars().count()
    }
}

/// What the orchestrator hands to a provider. Never persisted.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: RenderedPrompt,
    pub context: Vec<ContextChunk>,
    pub stream: bool,
    pub debug: bool,
}

impl GenerationRequest {
    pub fn new(prompt: RenderedPrompt) -> Self {
        Self {
            prompt,
            context: Vec::new(),
            stream: false,
            debug: false,
        }
    }

    pub fn with_context(mut self, context: Vec<ContextChunk>) -> Self {
        self.context = context;
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
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete, buffered answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}
