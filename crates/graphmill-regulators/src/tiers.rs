//! Storage-tier partitioning.
//!
//! Each schema-declared property lands in exactly one bucket: local values
//! inline, sensitive values behind a vault pointer, stored values behind a
//! blob locator. Missing values land nowhere and are recorded as missing.

use std::sync::Arc;

use graphmill_core::{
    BlobLocation, BlobStore, GraphObject, LocalProperty, NormalizedProperties, NormalizedValue,
    PropertySchema, PropertySlot, PropertyTier, ResolverConfig, Result,
    SensitiveProperty, SensitiveVault, StoredProperty, TypedPayload,
};
use tracing::trace;

/// The three property buckets plus the names of missing properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    pub local: Vec<LocalProperty>,
    pub sensitive: Vec<SensitiveProperty>,
    pub stored: Vec<StoredProperty>,
    pub missing: Vec<String>,
}

/// Access to the sensitive vault and oversized-value store.
#[derive(Clone)]
pub struct StorageTiers {
    vault: Arc<dyn SensitiveVault>,
    blobs: Arc<dyn BlobStore>,
    config: Arc<ResolverConfig>,
}

impl StorageTiers {
    pub fn new(
        vault: Arc<dyn SensitiveVault>,
        blobs: Arc<dyn BlobStore>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        Self {
            vault,
            blobs,
            config,
        }
    }

    /// Place every declared property into its tier.
    ///
    /// `source_internal_id` keys the vault entry and the blob location.
    pub async fn partition(
        &self,
        source_internal_id: &str,
        schemas: &[&PropertySchema],
        properties: &NormalizedProperties,
    ) -> Result<Buckets> {
        let mut buckets = Buckets::default();
        for schema in schemas {
            let value = properties
                .get(&schema.name)
                .unwrap_or(&NormalizedValue::Missing);
            let payload = match TypedPayload::from_normalized(schema.data_type, value) {
                Some(payload) => payload,
                None => {
                    buckets.missing.push(schema.name.clone());
                    continue;
                }
            };
            match &schema.tier {
                PropertyTier::Local => buckets.local.push(LocalProperty {
                    name: schema.name.clone(),
                    data_type: schema.data_type,
                    value: value.as_value().cloned(),
                }),
                PropertyTier::Sensitive => {
                    let pointer = self
                        .vault
                        .store(source_internal_id, &schema.name, &payload)
                        .await?;
                    trace!(property = %schema.name, "Stored sensitive property");
                    buckets.sensitive.push(SensitiveProperty {
                        name: schema.name.clone(),
                        data_type: schema.data_type,
                        pointer,
                    });
                }
                PropertyTier::Stored(spec) => {
                    let bucket = self.config.resolve_bucket(spec)?;
                    let location = BlobLocation::for_property(
                        &spec.storage_class,
                        &bucket,
                        &schema.name,
                        source_internal_id,
                    );
                    let locator = self.blobs.store(&location, &payload).await?;
                    trace!(property = %schema.name, %locator, "Stored oversized property");
                    buckets.stored.push(StoredProperty {
                        name: schema.name.clone(),
                        data_type: schema.data_type,
                        storage_class: spec.storage_class.clone(),
                        locator,
                    });
                }
            }
        }
        Ok(buckets)
    }

    /// Value of a named field held by a graph object: an identity field, or a
    /// property fetched back from whichever tier holds it.
    pub async fn held_value(&self, object: &GraphObject, name: &str) -> Result<NormalizedValue> {
        if let Some(value) = object.identity_field(name) {
            return Ok(value);
        }
        match object.property(name) {
            PropertySlot::Local(Some(value)) => Ok(NormalizedValue::Value(value.clone())),
            PropertySlot::Local(None) => Ok(NormalizedValue::Null),
            PropertySlot::Sensitive(p) => self.vault.retrieve(&p.pointer).await?.normalize(name),
            PropertySlot::Stored(p) => self.blobs.retrieve(&p.locator).await?.normalize(name),
            PropertySlot::Missing => Ok(NormalizedValue::Missing),
        }
    }
}

impl Buckets {
    /// Move the buckets into a graph object.
    pub fn fill(self, object: &mut GraphObject) {
        object.local_properties = self.local;
        object.sensitive_properties = self.sensitive;
        object.stored_properties = self.stored;
        object.missing_properties = self.missing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmill_core::{DataType, PropertyValue, StorageLocation, StorageSpec};
    use graphmill_store::{InMemoryBlobStore, InMemoryVault};

    fn schema(name: &str, tier: PropertyTier) -> PropertySchema {
        PropertySchema {
            name: name.to_string(),
            data_type: DataType::String,
            tier,
        }
    }

    fn tiers() -> (StorageTiers, Arc<InMemoryVault>, Arc<InMemoryBlobStore>) {
        let vault = Arc::new(InMemoryVault::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let config = Arc::new(ResolverConfig::new().with_storage_location("notes", "notes-bucket"));
        (
            StorageTiers::new(vault.clone(), blobs.clone(), config),
            vault,
            blobs,
        )
    }

    fn s(v: &str) -> NormalizedValue {
        NormalizedValue::Value(PropertyValue::String(v.to_string()))
    }

    #[tokio::test]
    async fn test_each_property_lands_in_one_tier() {
        let (tiers, vault, blobs) = tiers();
        let local = schema("name", PropertyTier::Local);
        let sensitive = schema("ssn", PropertyTier::Sensitive);
        let stored = schema(
            "notes",
            PropertyTier::Stored(StorageSpec {
                storage_class: "s3".to_string(),
                location: StorageLocation::Config {
                    location_name: "notes".to_string(),
                },
            }),
        );
        let absent = schema("nickname", PropertyTier::Local);

        let mut props = NormalizedProperties::new();
        props.insert("name".into(), s("Ann"));
        props.insert("ssn".into(), s("123-45-6789"));
        props.insert("notes".into(), s("long text"));
        props.insert("nickname".into(), NormalizedValue::Missing);

        let buckets = tiers
            .partition("abc", &[&local, &sensitive, &stored, &absent], &props)
            .await
            .unwrap();

        assert_eq!(buckets.local.len(), 1);
        assert_eq!(buckets.local[0].name, "name");
        assert_eq!(buckets.sensitive.len(), 1);
        assert_eq!(buckets.sensitive[0].name, "ssn");
        assert_eq!(buckets.stored.len(), 1);
        assert_eq!(
            buckets.stored[0].locator,
            "s3://notes-bucket/notes/abc_notes.json"
        );
        assert_eq!(buckets.missing, vec!["nickname".to_string()]);
        assert_eq!(vault.len().await, 1);
        assert_eq!(blobs.len().await, 1);

        let mut object: GraphObject = serde_json::from_value(serde_json::json!({
            "object_type": "Patient",
            "internal_id": "abc",
            "identifier_stem": "#vertex#Patient#",
            "id_value": "patient_id"
        }))
        .unwrap();
        buckets.fill(&mut object);
        assert_eq!(tiers.held_value(&object, "ssn").await.unwrap(), s("123-45-6789"));
        assert_eq!(tiers.held_value(&object, "notes").await.unwrap(), s("long text"));
        assert_eq!(tiers.held_value(&object, "name").await.unwrap(), s("Ann"));
        assert_eq!(
            tiers.held_value(&object, "nickname").await.unwrap(),
            NormalizedValue::Missing
        );
        assert_eq!(tiers.held_value(&object, "internal_id").await.unwrap(), s("abc"));
    }

    #[tokio::test]
    async fn test_null_sensitive_value_is_stored() {
        let (tiers, vault, _) = tiers();
        let sensitive = schema("ssn", PropertyTier::Sensitive);
        let mut props = NormalizedProperties::new();
        props.insert("ssn".into(), NormalizedValue::Null);
        let buckets = tiers.partition("abc", &[&sensitive], &props).await.unwrap();
        assert_eq!(buckets.sensitive.len(), 1);
        assert!(buckets.missing.is_empty());
        assert_eq!(vault.len().await, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_location_fails() {
        let (tiers, _, _) = tiers();
        let stored = schema(
            "scan",
            PropertyTier::Stored(StorageSpec {
                storage_class: "s3".to_string(),
                location: StorageLocation::Config {
                    location_name: "imaging".to_string(),
                },
            }),
        );
        let mut props = NormalizedProperties::new();
        props.insert("scan".into(), s("bytes"));
        assert!(tiers.partition("abc", &[&stored], &props).await.is_err());
    }
}
