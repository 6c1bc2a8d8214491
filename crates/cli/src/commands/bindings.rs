use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use relay_core::bindings::{
    resolve_bindings, strip_secret, BindingRequest, CredentialProfile, EnvironmentKeys, PublicBinding,
};
use relay_core::catalog::ProviderCatalog;
use relay_core::config::{AppConfig, LoadOptions};
use relay_core::errors::ApplicationError;
use relay_core::normalize::detect_provider;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CommandResult, EXIT_CATALOG, EXIT_CONFIG, EXIT_INVALID_INPUT, EXIT_NO_BINDING};

/// Resolves bindings from the environment, the configured legacy key, and an
/// optional profile file. Output never contains secret material. An empty
/// resolution is an error carrying a correlation id.
pub fn run(profiles_path: Option<&Path>, provider: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("bindings", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    let catalog = match ProviderCatalog::builtin() {
        Ok(catalog) => catalog,
        Err(error) => return CommandResult::failure("bindings", "catalog", error.to_string(), EXIT_CATALOG),
    };
    let profiles = match profiles_path.map(load_profiles).transpose() {
        Ok(profiles) => profiles.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("bindings", "invalid_input", format!("{error:#}"), EXIT_INVALID_INPUT)
        }
    };

    let target = provider.map(|token| detect_provider(token, Some(config.runtime.default_provider)));
    let environment = EnvironmentKeys::from_env(&catalog);
    let request = BindingRequest::new(&profiles, &environment, Utc::now())
        .with_legacy_key(config.runtime.legacy_api_key.as_ref())
        .with_default_provider(config.runtime.default_provider)
        .for_provider(target);

    let bindings: Vec<PublicBinding> = resolve_bindings(&catalog, &request).iter().map(strip_secret).collect();
    info!(
        event_name = "cli.bindings.resolved",
        profile_count = profiles.len(),
        binding_count = bindings.len(),
        "bindings resolved for inspection"
    );

    if bindings.is_empty() {
        let correlation_id = Uuid::new_v4().to_string();
        let error = ApplicationError::NoCredentialBinding {
            provider: target.map(|id| id.as_str()).unwrap_or("any").to_string(),
        };
        warn!(event_name = "cli.bindings.none", correlation_id = %correlation_id, error = %error, "no usable binding");
        return CommandResult::interface_failure("bindings", &error.into_interface(correlation_id), EXIT_NO_BINDING);
    }

    CommandResult::report("bindings", "bindings", &bindings)
}

pub(crate) fn load_profiles(path: &Path) -> Result<Vec<CredentialProfile>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read profiles file `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("could not parse profiles file `{}`", path.display()))
}
