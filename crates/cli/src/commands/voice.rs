use std::path::Path;
use std::sync::Arc;

use relay_core::audit::{AuditContext, TracingAuditSink};
use relay_core::catalog::ProviderCatalog;
use relay_core::config::{AppConfig, LoadOptions};
use relay_voice::{VoiceGateway, VoiceProviderHealth, VoiceProviderId};
use serde::Serialize;
use tracing::info;

use super::bindings::load_profiles;
use super::{CommandResult, EXIT_CATALOG, EXIT_CONFIG, EXIT_INVALID_INPUT, EXIT_RUNTIME};

#[derive(Debug, Serialize)]
struct VoiceReport {
    requested: VoiceProviderId,
    active: VoiceProviderId,
    correlation_id: String,
    health: VoiceProviderHealth,
}

/// Resolves the voice backend once, probing remote health, and reports which
/// adapter a call would use. Fallbacks land in the audit log.
pub fn run(profiles_path: Option<&Path>, provider: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("voice", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    let catalog = match ProviderCatalog::builtin() {
        Ok(catalog) => catalog,
        Err(error) => return CommandResult::failure("voice", "catalog", error.to_string(), EXIT_CATALOG),
    };
    let profiles = match profiles_path.map(load_profiles).transpose() {
        Ok(profiles) => profiles.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("voice", "invalid_input", format!("{error:#}"), EXIT_INVALID_INPUT)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "voice",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let gateway = match VoiceGateway::from_config(&config, &catalog, &profiles, Arc::new(TracingAuditSink)) {
        Ok(gateway) => gateway,
        Err(error) => return CommandResult::failure("voice", "voice_client", error.to_string(), EXIT_RUNTIME),
    };
    let context = AuditContext::for_session("cli-voice", "operator");
    let resolution = runtime.block_on(gateway.resolve(&context, provider));

    info!(
        event_name = "cli.voice.resolved",
        correlation_id = %context.correlation_id,
        requested_provider = %resolution.requested,
        active_provider = %resolution.provider(),
        health_status = resolution.health.status.as_str(),
        "voice backend resolved for inspection"
    );

    let report = VoiceReport {
        requested: resolution.requested,
        active: resolution.provider(),
        correlation_id: context.correlation_id.clone(),
        health: resolution.health,
    };
    CommandResult::report("voice", "voice", &report)
}
