//! In-memory dispatch recorder.
//!
//! Production deployments hand results to the external persistence layer;
//! this implementation backs tests, local development, and the legacy read
//! endpoint.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::notification::{DispatchRecorder, RecordedDispatch};
use crate::domain::DomainError;

#[derive(Debug, Default)]
pub struct InMemoryDispatchRecorder {
    entries: RwLock<HashMap<Uuid, RecordedDispatch>>,
}

impl InMemoryDispatchRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchRecorder for InMemoryDispatchRecorder {
    async fn record(&self, entry: RecordedDispatch) -> Result<(), DomainError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::internal("recorder lock poisoned"))?;

        entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RecordedDispatch>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("recorder lock poisoned"))?;

        Ok(entries.get(&id).cloned())
    }
}
