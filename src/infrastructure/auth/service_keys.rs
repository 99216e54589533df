//! Service key resolution backends: the legacy relational schema in
//! production, an in-memory map for tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::auth::{ApiKeyRecord, ServiceId, ServiceKeyResolver, ServiceRecord};
use crate::domain::DomainError;

/// Resolver over the legacy `services` / `api_keys` tables
#[derive(Debug, Clone)]
pub struct PostgresServiceKeyRepository {
    pool: PgPool,
}

impl PostgresServiceKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DomainError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| DomainError::store(format!("failed to connect to PostgreSQL: {}", e)))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ServiceKeyResolver for PostgresServiceKeyRepository {
    async fn resolve(&self, issuer: &str) -> Result<Option<ServiceRecord>, DomainError> {
        // Issuers that are not service ids cannot match a row
        let Some(service_id) = ServiceId::parse(issuer) else {
            return Ok(None);
        };

        let service_row = sqlx::query(
            "SELECT id, name, active, sms_provider, email_provider FROM services WHERE id = $1",
        )
        .bind(service_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::store(format!("service lookup failed: {}", e)))?;

        let Some(service_row) = service_row else {
            return Ok(None);
        };

        let key_rows = sqlx::query(
            "SELECT id, secret, revoked, expiry_date FROM api_keys WHERE service_id = $1",
        )
        .bind(service_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::store(format!("api key lookup failed: {}", e)))?;

        let api_keys = key_rows
            .into_iter()
            .map(|row| {
                Ok(ApiKeyRecord {
                    id: row.try_get::<Uuid, _>("id")?,
                    secret: row.try_get::<String, _>("secret")?,
                    revoked: row.try_get::<bool, _>("revoked")?,
                    expiry_date: row.try_get::<Option<DateTime<Utc>>, _>("expiry_date")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| DomainError::store(format!("api key row decode failed: {}", e)))?;

        let record = ServiceRecord {
            id: service_id,
            name: service_row
                .try_get::<String, _>("name")
                .map_err(|e| DomainError::store(format!("service row decode failed: {}", e)))?,
            active: service_row
                .try_get::<bool, _>("active")
                .map_err(|e| DomainError::store(format!("service row decode failed: {}", e)))?,
            api_keys,
            sms_provider: service_row
                .try_get::<Option<String>, _>("sms_provider")
                .map_err(|e| DomainError::store(format!("service row decode failed: {}", e)))?,
            email_provider: service_row
                .try_get::<Option<String>, _>("email_provider")
                .map_err(|e| DomainError::store(format!("service row decode failed: {}", e)))?,
        };

        Ok(Some(record))
    }
}

/// In-memory resolver for tests and local development
#[derive(Debug, Default)]
pub struct InMemoryServiceKeyRepository {
    services: RwLock<HashMap<String, ServiceRecord>>,
}

impl InMemoryServiceKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: Vec<ServiceRecord>) -> Self {
        let services = services
            .into_iter()
            .map(|service| (service.id.to_string(), service))
            .collect();

        Self {
            services: RwLock::new(services),
        }
    }

    pub fn insert(&self, service: ServiceRecord) {
        if let Ok(mut services) = self.services.write() {
            services.insert(service.id.to_string(), service);
        }
    }
}

#[async_trait]
impl ServiceKeyResolver for InMemoryServiceKeyRepository {
    async fn resolve(&self, issuer: &str) -> Result<Option<ServiceRecord>, DomainError> {
        let services = self
            .services
            .read()
            .map_err(|_| DomainError::internal("service map lock poisoned"))?;

        Ok(services.get(issuer).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_resolve() {
        let service_id = ServiceId::new(Uuid::new_v4());
        let service = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(Uuid::new_v4(), "secret"));

        let repository = InMemoryServiceKeyRepository::with_services(vec![service]);

        let resolved = repository.resolve(&service_id.to_string()).await.unwrap();
        assert_eq!(resolved.unwrap().name, "test-service");
    }

    #[tokio::test]
    async fn test_in_memory_unknown_issuer() {
        let repository = InMemoryServiceKeyRepository::new();

        let resolved = repository.resolve(&Uuid::new_v4().to_string()).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_insert() {
        let repository = InMemoryServiceKeyRepository::new();
        let service_id = ServiceId::new(Uuid::new_v4());
        repository.insert(ServiceRecord::new(service_id, "late-arrival"));

        let resolved = repository.resolve(&service_id.to_string()).await.unwrap();
        assert!(resolved.is_some());
    }
}
