use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::application::QuerySettings;
use crate::domain::{PromptTemplate, ProviderKind, TitleMode};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Settings plus prompt templates, built once at startup and shared by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Loads `config.yaml` and `prompts.yaml` from `dir` when present, then
    /// applies environment overrides. Missing files fall back to defaults.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let mut config: Config = read_yaml(&dir.join("config.yaml"))?.unwrap_or_default();
        let prompts: PromptsConfig = read_yaml(&dir.join("prompts.yaml"))?.unwrap_or_default();

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(Self { config, prompts })
    }

    pub fn template_for(&self, kind: ProviderKind) -> &PromptTemplate {
        match kind {
            ProviderKind::DigitalOcean => &self.prompts.digital_ocean,
            ProviderKind::Ollama => &self.prompts.ollama,
        }
    }

    pub fn query_settings(&self) -> QuerySettings {
        let query = &self.config.query;
        QuerySettings {
            default_context_limit: query.default_context_limit,
            context_timeout: Duration::from_secs(self.config.embedding.timeout_seconds),
            generation_timeout: Duration::from_secs(query.generation_timeout_seconds),
            continue_without_context: query.continue_without_context,
            title_mode: query.title_mode,
            title_max_chars: query.title_max_chars,
            title_prompt: self.prompts.title.clone(),
        }
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Yaml {
            path: display,
            source,
        })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub query: QueryConfig,
    pub cors: CorsConfig,
}

impl Config {
    /// Environment variables win over file values. `lookup` is injected so the
    /// override rules can be tested without touching process state.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server.port = v.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "SERVER_PORT",
                value: v,
            })?;
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get("API_URL") {
            self.embedding.api_url = v;
        }
        if let Some(v) = get("EMBEDDING_API_KEY").or_else(|| get("API_KEY")) {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("DO_API_URL") {
            self.llm.digital_ocean.api_url = v;
        }
        if let Some(v) = get("DO_API_KEY") {
            self.llm.digital_ocean.api_key = v;
        }
        if let Some(v) = get("OLLAMA_API_URL") {
            self.llm.ollama.api_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.llm.ollama.model = v;
        }
        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("CONTINUE_WITHOUT_CONTEXT") {
            self.query.continue_without_context =
                v.parse().map_err(|_| ConfigError::InvalidEnv {
                    key: "CONTINUE_WITHOUT_CONTEXT",
                    value: v,
                })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://chat_history.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8001".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub digital_ocean: DigitalOceanConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigitalOceanConfig {
    /// Agent base URL; the chat completions path is appended.
    pub api_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub max_input_chars: usize,
    pub connect_timeout_seconds: u64,
}

impl Default for DigitalOceanConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1000,
            max_input_chars: 24_000,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Full generate endpoint, e.g. `http://localhost:11434/api/generate`.
    pub api_url: String,
    pub model: String,
    pub max_input_chars: usize,
    pub connect_timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/generate".to_string(),
            model: "deepseek-r1".to_string(),
            max_input_chars: 16_000,
            connect_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_context_limit: usize,
    pub generation_timeout_seconds: u64,
    /// Answer without context when the embedding service is down instead of
    /// failing the query.
    pub continue_without_context: bool,
    pub title_mode: TitleMode,
    pub title_max_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_context_limit: 3,
            generation_timeout_seconds: 120,
            continue_without_context: false,
            title_mode: TitleMode::Query,
            title_max_chars: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

const ANSWER_SECTIONS: &str = "\
Please provide a structured response with the following sections:
1. **Documents Referenced**: List the documents used, or state that none are relevant.
2. **User Question**: Restate the user's question.
3. **Answer**: Give a comprehensive answer based solely on the documents. If the documents do not contain the answer, say so clearly and explain what is missing.
4. **Conclusion**: Summarize the key points of your answer concisely.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub digital_ocean: PromptTemplate,
    pub ollama: PromptTemplate,
    /// Title prompt; `{query}` and `{response}` are substituted.
    pub title: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            digital_ocean: PromptTemplate::new(format!(
                "Based on the following documents:\n{{context}}\n\nUser question: {{query}}\n\n{ANSWER_SECTIONS}"
            )),
            ollama: PromptTemplate::new("Documents:\n{context}\n\nUser Question: {query}")
                .with_system(format!(
                    "You are an assistant that answers strictly from the provided documents. \
                     Do not invent information.\n\n{ANSWER_SECTIONS}"
                )),
            title: "Generate a concise title (5-10 words) that summarizes this conversation.\n\n\
                    **User Question**: {query}\n**AI Response**: {response}\n\n\
                    Return only the title."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8002);
        assert_eq!(config.query.default_context_limit, 3);
        assert_eq!(config.llm.ollama.model, "deepseek-r1");
        assert!(!config.query.continue_without_context);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SERVER_PORT", "9000"),
                ("DO_API_URL", "https://agent.example"),
                ("API_KEY", "secret"),
                ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test"),
                ("CONTINUE_WITHOUT_CONTEXT", "true"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.digital_ocean.api_url, "https://agent.example");
        assert_eq!(config.embedding.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(config.query.continue_without_context);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "SERVER_PORT", .. }));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "llm:\n  ollama:\n    model: llama3.2\nquery:\n  title_mode: llm\n",
        )
        .unwrap();
        assert_eq!(config.llm.ollama.model, "llama3.2");
        assert_eq!(config.llm.ollama.max_input_chars, 16_000);
        assert_eq!(config.query.title_mode, TitleMode::Llm);
        assert_eq!(config.server.port, 8002);
    }

    #[test]
    fn test_default_templates_have_placeholders() {
        let prompts = PromptsConfig::default();
        for template in [&prompts.digital_ocean, &prompts.ollama] {
            assert!(template.user.contains("{context}"));
            assert!(template.user.contains("{query}"));
        }
        assert!(prompts.title.contains("{response}"));
    }

    #[test]
    fn test_shipped_config_files_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let config: Config = read_yaml(&dir.join("config.yaml")).unwrap().unwrap();
        let prompts: PromptsConfig = read_yaml(&dir.join("prompts.yaml")).unwrap().unwrap();

        assert_eq!(config.query.title_mode, TitleMode::Query);
        assert!(prompts.ollama.system.is_some());
        assert!(prompts.digital_ocean.user.contains("{context}"));
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let missing: Option<Config> = read_yaml(Path::new("/nonexistent/config.yaml")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_query_settings_follow_config() {
        let mut app = AppConfig::default();
        app.config.embedding.timeout_seconds = 7;
        app.config.query.generation_timeout_seconds = 45;
        app.config.query.title_mode = TitleMode::Llm;

        let settings = app.query_settings();
        assert_eq!(settings.context_timeout, Duration::from_secs(7));
        assert_eq!(settings.generation_timeout, Duration::from_secs(45));
        assert_eq!(settings.title_mode, TitleMode::Llm);
        assert_eq!(settings.title_prompt, app.prompts.title);
    }
}
