use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ports::LlmProvider, DomainError, ProviderKind};

/// Maps a provider selector to its adapter. Adding a backend means
/// registering another `LlmProvider`, nothing here changes.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>, DomainError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| DomainError::invalid(format!("provider '{kind}' is not configured")))
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
