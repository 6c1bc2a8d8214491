//! Provider catalog.
//!
//! The catalog is validated once, when it is built, and is immutable after
//! that. It is passed explicitly to the binding resolver so tests can swap in
//! a reduced catalog without touching process-wide state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{DiscoverySource, ProviderId, PROVIDER_SPECS};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub label: String,
    pub discovery: DiscoverySource,
    pub supports_custom_endpoint: bool,
    pub default_endpoint: String,
}

/// Untyped descriptor as it arrives from a file or another service.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProviderRecord {
    pub id: Option<String>,
    pub label: Option<String>,
    pub discovery: Option<String>,
    pub supports_custom_endpoint: Option<bool>,
    pub default_endpoint: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("provider record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("provider record {index} has unknown canonical id `{value}`")]
    UnknownProvider { index: usize, value: String },
    #[error("provider record {index} has invalid discovery source `{value}`")]
    InvalidDiscoverySource { index: usize, value: String },
    #[error("provider `{0}` is registered more than once")]
    DuplicateProvider(ProviderId),
}

#[derive(Clone, Debug)]
pub struct ProviderCatalog {
    descriptors: Vec<ProviderDescriptor>,
}

impl ProviderCatalog {
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Result<Self, CatalogError> {
        let mut registered: Vec<ProviderDescriptor> = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            if descriptor.label.trim().is_empty() {
                return Err(CatalogError::MissingField { index, field: "label" });
            }
            if descriptor.default_endpoint.trim().is_empty() {
                return Err(CatalogError::MissingField { index, field: "default_endpoint" });
            }
            if registered.iter().any(|existing| existing.id == descriptor.id) {
                return Err(CatalogError::DuplicateProvider(descriptor.id));
            }
            registered.push(descriptor);
        }

        Ok(Self { descriptors: registered })
    }

    pub fn from_records(records: Vec<ProviderRecord>) -> Result<Self, CatalogError> {
        let descriptors = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| descriptor_from_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(descriptors)
    }

    /// Catalog built from the static provider table.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(
            PROVIDER_SPECS
                .iter()
                .map(|spec| ProviderDescriptor {
                    id: spec.id,
                    label: spec.label.to_string(),
                    discovery: spec.discovery,
                    supports_custom_endpoint: spec.supports_custom_endpoint,
                    default_endpoint: spec.default_endpoint.to_string(),
                })
                .collect(),
        )
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.id == id)
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.get(id).is_some()
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn descriptor_from_record(
    index: usize,
    record: ProviderRecord,
) -> Result<ProviderDescriptor, CatalogError> {
    let raw_id = required(index, "id", record.id)?;
    let id = ProviderId::parse(&raw_id)
        .ok_or(CatalogError::UnknownProvider { index, value: raw_id.clone() })?;
    let label = required(index, "label", record.label)?;
    let raw_discovery = required(index, "discovery", record.discovery)?;
    let discovery = DiscoverySource::parse(&raw_discovery)
        .ok_or(CatalogError::InvalidDiscoverySource { index, value: raw_discovery.clone() })?;
    let supports_custom_endpoint = record
        .supports_custom_endpoint
        .ok_or(CatalogError::MissingField { index, field: "supports_custom_endpoint" })?;
    let default_endpoint = required(index, "default_endpoint", record.default_endpoint)?;

    Ok(ProviderDescriptor { id, label, discovery, supports_custom_endpoint, default_endpoint })
}

fn required(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, CatalogError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(CatalogError::MissingField { index, field })
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, ProviderCatalog, ProviderDescriptor, ProviderRecord};
    use crate::provider::{DiscoverySource, ProviderId};

    fn record(id: &str) -> ProviderRecord {
        ProviderRecord {
            id: Some(id.to_string()),
            label: Some("Label".to_string()),
            discovery: Some("catalog".to_string()),
            supports_custom_endpoint: Some(false),
            default_endpoint: Some("https://example.test/v1".to_string()),
        }
    }

    #[test]
    fn builtin_catalog_registers_every_provider() {
        let catalog = ProviderCatalog::builtin().expect("builtin catalog should validate");
        assert_eq!(catalog.len(), ProviderId::ALL.len());
        for id in ProviderId::ALL {
            assert!(catalog.contains(id), "{id} missing from builtin catalog");
        }
    }

    #[test]
    fn duplicate_registration_is_fatal() {
        let descriptor = ProviderDescriptor {
            id: ProviderId::Groq,
            label: "Groq".to_string(),
            discovery: DiscoverySource::ProviderApi,
            supports_custom_endpoint: true,
            default_endpoint: "https://api.groq.com/openai/v1".to_string(),
        };

        let error = ProviderCatalog::new(vec![descriptor.clone(), descriptor])
            .expect_err("duplicate id must be rejected");
        assert_eq!(error, CatalogError::DuplicateProvider(ProviderId::Groq));
    }

    #[test]
    fn records_with_missing_fields_are_rejected() {
        let mut missing_label = record("openai");
        missing_label.label = Some("   ".to_string());
        assert_eq!(
            ProviderCatalog::from_records(vec![missing_label]).expect_err("blank label"),
            CatalogError::MissingField { index: 0, field: "label" }
        );

        let mut missing_flag = record("openai");
        missing_flag.supports_custom_endpoint = None;
        assert_eq!(
            ProviderCatalog::from_records(vec![record("groq"), missing_flag]).expect_err("flag"),
            CatalogError::MissingField { index: 1, field: "supports_custom_endpoint" }
        );

        let mut missing_endpoint = record("openai");
        missing_endpoint.default_endpoint = None;
        assert!(matches!(
            ProviderCatalog::from_records(vec![missing_endpoint]),
            Err(CatalogError::MissingField { field: "default_endpoint", .. })
        ));
    }

    #[test]
    fn records_outside_closed_sets_are_rejected() {
        assert!(matches!(
            ProviderCatalog::from_records(vec![record("cohere")]),
            Err(CatalogError::UnknownProvider { index: 0, .. })
        ));

        let mut bad_discovery = record("openai");
        bad_discovery.discovery = Some("crawler".to_string());
        assert!(matches!(
            ProviderCatalog::from_records(vec![bad_discovery]),
            Err(CatalogError::InvalidDiscoverySource { index: 0, .. })
        ));
    }

    #[test]
    fn valid_records_build_an_ordered_catalog() {
        let mut api = record("groq");
        api.discovery = Some("provider-api".to_string());
        let catalog = ProviderCatalog::from_records(vec![record("openai"), api])
            .expect("records should validate");

        let ids: Vec<_> = catalog.iter().map(|descriptor| descriptor.id).collect();
        assert_eq!(ids, vec![ProviderId::OpenAi, ProviderId::Groq]);
        assert_eq!(
            catalog.get(ProviderId::Groq).map(|descriptor| descriptor.discovery),
            Some(DiscoverySource::ProviderApi)
        );
        assert!(!catalog.contains(ProviderId::Anthropic));
    }
}
