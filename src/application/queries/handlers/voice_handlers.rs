//! Voice Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::VoiceInfo;
use crate::application::queries::ListVoices;
use crate::application::services::ProviderRegistry;
use crate::domain::job::ValidationError;

/// ListVoices Handler
///
/// 直接透传各 provider 的音色目录
pub struct ListVoicesHandler {
    registry: Arc<ProviderRegistry>,
}

impl ListVoicesHandler {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: ListVoices) -> Result<Vec<VoiceInfo>, ApplicationError> {
        if let Some(name) = query.provider {
            let provider = self
                .registry
                .get(&name)
                .ok_or_else(|| ValidationError::UnknownProvider(name.clone()))?;
            if !provider.descriptor.network_reachable {
                return Ok(Vec::new());
            }
            return Ok(provider.client.voices().await?);
        }

        let mut voices = Vec::new();
        for descriptor in self.registry.descriptors() {
            if !descriptor.network_reachable {
                continue;
            }
            let Some(provider) = self.registry.get(&descriptor.name) else {
                continue;
            };
            match provider.client.voices().await {
                Ok(mut list) => voices.append(&mut list),
                Err(e) => {
                    tracing::warn!(provider = %descriptor.name, error = %e, "Failed to list voices");
                }
            }
        }
        Ok(voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{CircuitBreakerConfig, CircuitBreakerStore, ProviderDescriptor, ProviderKind};
    use crate::test_support::ScriptedProvider;

    fn registry() -> Arc<ProviderRegistry> {
        let breakers = Arc::new(CircuitBreakerStore::new(CircuitBreakerConfig::default()));
        Arc::new(
            ProviderRegistry::new(breakers)
                .register(
                    ProviderDescriptor::new("a", ProviderKind::Http),
                    Arc::new(ScriptedProvider::always_ok().with_voices("a", &["v1", "v2"])),
                )
                .register(
                    ProviderDescriptor::new("b", ProviderKind::Http),
                    Arc::new(ScriptedProvider::always_ok().with_voices("b", &["v3"])),
                ),
        )
    }

    #[tokio::test]
    async fn test_lists_all_providers() {
        let handler = ListVoicesHandler::new(registry());
        let voices = handler.handle(ListVoices::default()).await.unwrap();
        assert_eq!(voices.len(), 3);
    }

    #[tokio::test]
    async fn test_filters_by_provider() {
        let handler = ListVoicesHandler::new(registry());
        let voices = handler
            .handle(ListVoices {
                provider: Some("b".into()),
            })
            .await
            .unwrap();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].provider, "b");

        let unknown = handler
            .handle(ListVoices {
                provider: Some("zzz".into()),
            })
            .await;
        assert!(matches!(unknown, Err(ApplicationError::Validation(_))));
    }
}
