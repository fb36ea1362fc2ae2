use std::sync::Arc;
use tracing::{info, warn};

use super::{DigitalOceanAgent, OllamaProvider};
use crate::application::ProviderRegistry;
use crate::domain::{DomainError, ProviderKind};
use crate::infrastructure::config::AppConfig;

/// Registers every provider whose endpoint is configured.
pub fn build_registry(config: &AppConfig) -> Result<ProviderRegistry, DomainError> {
    let llm = &config.config.llm;
    let mut registry = ProviderRegistry::new();

    if llm.digital_ocean.api_url.trim().is_empty() {
        warn!("DO_API_URL not set, cloud-hosted provider disabled");
    } else {
        let template = config.template_for(ProviderKind::DigitalOcean).clone();
        registry.register(Arc::new(DigitalOceanAgent::new(&llm.digital_ocean, template)?));
    }

    if llm.ollama.api_url.trim().is_empty() {
        warn!("OLLAMA_API_URL not set, local provider disabled");
    } else {
        let template = config.template_for(ProviderKind::Ollama).clone();
        registry.register(Arc::new(OllamaProvider::new(&llm.ollama, template)?));
    }

    info!(providers = ?registry.kinds(), "providers registered");
    Ok(registry)
}
