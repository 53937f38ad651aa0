//! Bridge from `tessera_config::Config` to domain types.

use std::sync::Arc;

use anyhow::{Context, Result};
use tessera_config::{Config, RemisionSection};
use tessera_ledger::{FileLedgerStorage, LedgerStorage};
use tessera_remision::{
    CircuitBreaker, FlowControl, HttpTransport, RemisionService, RemoteSubmissionClient,
    RetryPolicy, SoftwareInfo, Transport,
};
use tessera_telemetry::{LogConfig, LogFormat};
use tracing::warn;

/// Convert config to [`LogConfig`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = match cfg.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        "full" => LogFormat::Full,
        _ => LogFormat::Compact,
    };

    LogConfig::new(&cfg.logging.level)
        .with_format(format)
        .with_directives(cfg.logging.directives.iter().cloned())
}

/// Convert config to [`RetryPolicy`].
pub(crate) fn to_retry_policy(section: &RemisionSection) -> RetryPolicy {
    RetryPolicy::new(
        section.max_attempts,
        section.backoff_base(),
        section.backoff_max(),
    )
    .with_jitter(section.backoff_jitter)
}

/// Software identification sent with every batch.
pub(crate) fn to_software_info(section: &RemisionSection) -> SoftwareInfo {
    SoftwareInfo {
        id: section.software_id.clone(),
        version: section
            .software_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    }
}

/// Open the file ledger under `ledger.data_dir`.
pub(crate) fn open_storage(cfg: &Config) -> Result<Arc<FileLedgerStorage>> {
    let home = tessera_config::loader::home_directory()?;
    let data_dir = cfg.ledger.resolve_data_dir(&home);
    let storage = FileLedgerStorage::open(&data_dir)
        .with_context(|| format!("failed to open ledger at {}", data_dir.display()))?;
    Ok(Arc::new(storage))
}

/// Build the submission service for the configured HTTPS endpoint.
///
/// The bearer token is read from the variable named by
/// `remision.api_token_env`.
pub(crate) fn build_service(
    cfg: &Config,
    storage: Arc<dyn LedgerStorage>,
) -> Result<RemisionService> {
    let section = &cfg.remision;
    let endpoint = section.endpoint.as_deref().context(
        "remision.endpoint is not configured (set it in config.toml or TESSERA_ENDPOINT)",
    )?;

    let token = std::env::var(&section.api_token_env)
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        warn!(
            var = %section.api_token_env,
            "No API token in environment, submitting unauthenticated"
        );
    }

    let transport = HttpTransport::new(endpoint, token, section.request_timeout())?;
    Ok(service_with_transport(cfg, storage, Arc::new(transport)))
}

/// Build the submission service over an arbitrary transport.
pub(crate) fn service_with_transport(
    cfg: &Config,
    storage: Arc<dyn LedgerStorage>,
    transport: Arc<dyn Transport>,
) -> RemisionService {
    let section = &cfg.remision;
    let client =
        RemoteSubmissionClient::new(transport, to_retry_policy(section), section.request_timeout())
            .with_software(to_software_info(section));

    RemisionService::new(storage, client)
        .with_max_batch_size(section.max_batch_size)
        .with_circuit_breaker(CircuitBreaker::new(
            section.circuit_breaker_threshold,
            section.circuit_breaker_pause(),
        ))
        .with_flow_control(FlowControl::new(section.flow_control()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_config_from_defaults() {
        let mut cfg = Config::default();
        cfg.logging.format = "json".to_owned();
        cfg.logging.directives = vec!["tessera_remision=debug".to_owned()];

        let log = to_log_config(&cfg);
        assert_eq!(log.level, "info");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["tessera_remision=debug"]);
    }

    #[test]
    fn test_retry_policy_from_section() {
        let section = RemisionSection {
            max_attempts: 3,
            backoff_jitter: false,
            ..RemisionSection::default()
        };

        let policy = to_retry_policy(&section);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(30));
        assert_eq!(policy.max_delay, Duration::from_secs(480));
        assert!(!policy.jitter);
    }

    #[test]
    fn test_software_version_falls_back_to_crate_version() {
        let section = RemisionSection::default();
        assert_eq!(
            to_software_info(&section).version,
            env!("CARGO_PKG_VERSION")
        );
        let section = RemisionSection {
            software_version: Some("2.1.0".to_owned()),
            ..section
        };
        assert_eq!(to_software_info(&section).version, "2.1.0");
        assert_eq!(to_software_info(&section).id, "tessera");
    }

    #[test]
    fn test_service_requires_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn LedgerStorage> =
            Arc::new(FileLedgerStorage::open(dir.path()).unwrap());
        let err = build_service(&Config::default(), storage).unwrap_err();
        assert!(err.to_string().contains("remision.endpoint"));
    }

    #[test]
    fn test_open_storage_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.ledger.data_dir = dir.path().join("ledger").display().to_string();

        let storage = open_storage(&cfg).unwrap();
        assert_eq!(storage.root(), dir.path().join("ledger"));
    }
}
