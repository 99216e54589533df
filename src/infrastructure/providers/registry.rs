//! Channel-to-provider routing with per-service overrides

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::auth::ServiceRecord;
use crate::domain::notification::NotificationChannel;
use crate::domain::provider::{NotificationProvider, SelectionError};

/// Registry mapping provider ids to implementations and channels to their
/// default provider. Stateless at selection time: new providers are added by
/// registration, never by branching in the pipeline.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn NotificationProvider>>,
    defaults: HashMap<NotificationChannel, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(
        mut self,
        id: impl Into<String>,
        provider: Arc<dyn NotificationProvider>,
    ) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    pub fn with_default(mut self, channel: NotificationChannel, id: impl Into<String>) -> Self {
        self.defaults.insert(channel, id.into());
        self
    }

    /// Selects the provider for `channel`: a service-pinned provider when
    /// configured, otherwise the channel default.
    pub fn select(
        &self,
        channel: NotificationChannel,
        service: Option<&ServiceRecord>,
    ) -> Result<Arc<dyn NotificationProvider>, SelectionError> {
        let provider_id = service
            .and_then(|service| service.provider_override(channel))
            .or_else(|| self.defaults.get(&channel).map(String::as_str))
            .ok_or(SelectionError::NoProviderForChannel(channel))?;

        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| SelectionError::UnknownProvider(provider_id.to_string()))?;

        if !provider.supports(channel) {
            return Err(SelectionError::NoProviderForChannel(channel));
        }

        Ok(provider.clone())
    }
}
