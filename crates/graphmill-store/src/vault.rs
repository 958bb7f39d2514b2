//! Sensitive-value vault implementations.
//!
//! Pointers are the lowercase hex SHA-512 of `property_name ++ source_internal_id`,
//! so the same pair always lands on the same entry and the first stored value
//! is kept.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha512};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use graphmill_core::{DataType, Error, Result, SensitiveVault, TypedPayload};

/// Pointer for a sensitive property of a source object.
pub fn sensitive_pointer(source_internal_id: &str, property_name: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(property_name.as_bytes());
    hasher.update(source_internal_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn not_found(pointer: &str) -> Error {
    Error::StorageTier(format!("no sensitive value stored at pointer {}", pointer))
}

/// Process-local vault.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    entries: RwLock<HashMap<String, TypedPayload>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SensitiveVault for InMemoryVault {
    async fn store(
        &self,
        source_internal_id: &str,
        property_name: &str,
        value: &TypedPayload,
    ) -> Result<String> {
        let pointer = sensitive_pointer(source_internal_id, property_name);
        self.entries
            .write()
            .await
            .entry(pointer.clone())
            .or_insert_with(|| value.clone());
        Ok(pointer)
    }

    async fn retrieve(&self, pointer: &str) -> Result<TypedPayload> {
        self.entries
            .read()
            .await
            .get(pointer)
            .cloned()
            .ok_or_else(|| not_found(pointer))
    }
}

/// Vault backed by the `sensitive_vault` table.
pub struct PgSensitiveVault {
    pool: PgPool,
}

impl PgSensitiveVault {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SensitiveVault for PgSensitiveVault {
    async fn store(
        &self,
        source_internal_id: &str,
        property_name: &str,
        value: &TypedPayload,
    ) -> Result<String> {
        let pointer = sensitive_pointer(source_internal_id, property_name);
        let result = sqlx::query(
            r#"
            INSERT INTO sensitive_vault (pointer, property_name, data_type, property_value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pointer) DO NOTHING
            "#,
        )
        .bind(&pointer)
        .bind(property_name)
        .bind(value.data_type.code())
        .bind(&value.property_value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(property = property_name, "Sensitive value already stored");
        } else {
            trace!(property = property_name, "Stored sensitive value");
        }
        Ok(pointer)
    }

    async fn retrieve(&self, pointer: &str) -> Result<TypedPayload> {
        let row = sqlx::query(
            "SELECT data_type, property_value FROM sensitive_vault WHERE pointer = $1",
        )
        .bind(pointer)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(pointer))?;

        let code: String = row.try_get("data_type")?;
        let data_type = DataType::from_code(&code).ok_or_else(|| {
            Error::StorageTier(format!("unknown data type code {} at {}", code, pointer))
        })?;
        Ok(TypedPayload {
            data_type,
            property_value: row.try_get("property_value")?,
        })
    }
}
