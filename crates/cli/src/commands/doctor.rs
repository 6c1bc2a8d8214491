use chrono::Utc;
use relay_core::bindings::{resolve_first_binding, BindingRequest, EnvironmentKeys};
use relay_core::catalog::ProviderCatalog;
use relay_core::config::{AppConfig, LoadOptions};
use relay_voice::{VoiceCredentialSource, VoiceProviderId};
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            None
        }
    };

    let catalog = match ProviderCatalog::builtin() {
        Ok(catalog) => {
            checks.push(DoctorCheck {
                name: "provider_catalog",
                status: CheckStatus::Pass,
                details: format!("{} providers registered", catalog.len()),
            });
            Some(catalog)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "provider_catalog",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            None
        }
    };

    match (&config, &catalog) {
        (Some(config), Some(catalog)) => {
            checks.push(check_credentials(config, catalog));
            checks.push(check_voice(config, catalog));
        }
        _ => {
            for name in ["credential_readiness", "voice_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration or catalog did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_credentials(config: &AppConfig, catalog: &ProviderCatalog) -> DoctorCheck {
    let environment = EnvironmentKeys::from_env(catalog);
    let mut sources: Vec<String> = catalog
        .iter()
        .filter_map(|descriptor| environment.credential(descriptor.id))
        .map(|(var, _)| format!("env:{var}"))
        .collect();
    if config.runtime.legacy_api_key.is_some() {
        sources.push(format!("legacy:{}", config.runtime.default_provider));
    }

    if sources.is_empty() {
        return DoctorCheck {
            name: "credential_readiness",
            status: CheckStatus::Fail,
            details: "no provider credential found; set RELAY_RUNTIME_LEGACY_API_KEY or a provider key such as OPENAI_API_KEY".to_string(),
        };
    }

    DoctorCheck {
        name: "credential_readiness",
        status: CheckStatus::Pass,
        details: format!("credentials available from {}", sources.join(", ")),
    }
}

fn check_voice(config: &AppConfig, catalog: &ProviderCatalog) -> DoctorCheck {
    let requested = config.voice.default_provider.as_str();
    let Some(provider) = VoiceProviderId::lookup(requested) else {
        return DoctorCheck {
            name: "voice_readiness",
            status: CheckStatus::Fail,
            details: format!("unknown voice provider `{requested}`; calls will use the browser adapter"),
        };
    };

    let Some(spec) = provider.remote_spec() else {
        return DoctorCheck {
            name: "voice_readiness",
            status: CheckStatus::Pass,
            details: "browser adapter needs no credential".to_string(),
        };
    };

    let (source, present) = match spec.credential {
        VoiceCredentialSource::Env(key) => {
            let present = std::env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false);
            (key.to_string(), present)
        }
        VoiceCredentialSource::Binding(chat_provider) => {
            let environment = EnvironmentKeys::from_env(catalog);
            let request = BindingRequest::new(&[], &environment, Utc::now())
                .with_legacy_key(config.runtime.legacy_api_key.as_ref())
                .with_default_provider(config.runtime.default_provider)
                .for_provider(Some(chat_provider));
            (format!("{chat_provider} binding"), resolve_first_binding(catalog, &request).is_some())
        }
    };

    if present {
        DoctorCheck {
            name: "voice_readiness",
            status: CheckStatus::Pass,
            details: format!("{source} present; {provider} health is probed on every call"),
        }
    } else {
        DoctorCheck {
            name: "voice_readiness",
            status: CheckStatus::Fail,
            details: format!("{source} missing; {provider} calls will fall back to the browser adapter"),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
