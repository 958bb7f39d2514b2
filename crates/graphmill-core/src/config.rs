//! Resolver configuration.
//!
//! Built once per job and handed to the regulators; nothing inside the
//! regulators reads the process environment.

use std::collections::HashMap;

use crate::defaults;
use crate::error::{Error, Result};
use crate::schema::{StorageLocation, StorageSpec};

/// Settings consumed by the regulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverConfig {
    /// Named storage locations (`location name -> bucket`) for stored-tier
    /// properties declared with `{"source": "config"}`.
    pub storage_locations: HashMap<String, String>,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// Every `GRAPHMILL_STORAGE_<NAME>=<bucket>` variable defines the storage
    /// location `<name>` (lowercased).
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`ResolverConfig::from_env`] over an explicit variable list.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let storage_locations = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(defaults::STORAGE_LOCATION_ENV_PREFIX)
                    .filter(|name| !name.is_empty() && !value.is_empty())
                    .map(|name| (name.to_lowercase(), value))
            })
            .collect();
        Self { storage_locations }
    }

    /// Add a named storage location.
    pub fn with_storage_location(mut self, name: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.storage_locations.insert(name.into(), bucket.into());
        self
    }

    /// Bucket for a stored-tier property.
    pub fn resolve_bucket(&self, spec: &StorageSpec) -> Result<String> {
        match &spec.location {
            StorageLocation::Static { bucket_name } => Ok(bucket_name.clone()),
            StorageLocation::Config { location_name } => self
                .storage_locations
                .get(location_name)
                .or_else(|| self.storage_locations.get(&location_name.to_lowercase()))
                .cloned()
                .ok_or_else(|| {
                    Error::Config(format!(
                        "storage location {} is not configured (set {}{})",
                        location_name,
                        defaults::STORAGE_LOCATION_ENV_PREFIX,
                        location_name.to_uppercase()
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(location: StorageLocation) -> StorageSpec {
        StorageSpec {
            storage_class: "s3".to_string(),
            location,
        }
    }

    #[test]
    fn test_default_has_no_locations() {
        assert!(ResolverConfig::default().storage_locations.is_empty());
    }

    #[test]
    fn test_from_vars() {
        let config = ResolverConfig::from_vars(vec![
            ("GRAPHMILL_STORAGE_CLINICAL_NOTES".to_string(), "notes-bucket".to_string()),
            ("GRAPHMILL_STORAGE_".to_string(), "ignored".to_string()),
            ("GRAPHMILL_STORAGE_EMPTY".to_string(), String::new()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        assert_eq!(config.storage_locations.len(), 1);
        assert_eq!(
            config.storage_locations.get("clinical_notes").map(String::as_str),
            Some("notes-bucket")
        );
    }

    #[test]
    fn test_resolve_static_bucket() {
        let config = ResolverConfig::new();
        let bucket = config
            .resolve_bucket(&spec(StorageLocation::Static {
                bucket_name: "fixed".to_string(),
            }))
            .unwrap();
        assert_eq!(bucket, "fixed");
    }

    #[test]
    fn test_resolve_configured_bucket() {
        let config = ResolverConfig::new().with_storage_location("clinical_notes", "notes-bucket");
        let bucket = config
            .resolve_bucket(&spec(StorageLocation::Config {
                location_name: "CLINICAL_NOTES".to_string(),
            }))
            .unwrap();
        assert_eq!(bucket, "notes-bucket");
    }

    #[test]
    fn test_resolve_unconfigured_bucket() {
        let err = ResolverConfig::new()
            .resolve_bucket(&spec(StorageLocation::Config {
                location_name: "archive".to_string(),
            }))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("GRAPHMILL_STORAGE_ARCHIVE"));
    }
}
