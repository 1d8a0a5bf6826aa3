//! Wiring from [`AppConfig`] to a running [`Orchestrator`], and the
//! wait-for-result loop behind the `scan` command.

use std::sync::Arc;

use postpulse_cache::Cache;
use postpulse_core::{AppConfig, EventBus, Provider, Scan, ScanOptions};
use postpulse_engine::{EngineConfig, Orchestrator};
use postpulse_providers::{build_source, ClientSettings, CredentialProvider, StaticCredentialProvider};
use postpulse_resilience::{RateLimiter, RateLimiterOptions};
use tokio::sync::broadcast::error::RecvError;

const CACHE_NAMESPACE: &str = "postpulse";

/// Builds one rate-limited client per provider and the orchestrator over
/// them. Providers without an access token are still registered; scans that
/// request them fail per fetch with an auth error.
///
/// # Errors
///
/// Returns an error if a provider client cannot be constructed (for example
/// an unparseable base URL).
pub(crate) fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let settings = ClientSettings::from_app_config(config);
    let static_credentials = StaticCredentialProvider::from_config(config);
    for provider in Provider::ALL {
        if !static_credentials.has_token(provider) {
            tracing::warn!(provider = %provider, "no access token configured");
        }
    }
    let credentials: Arc<dyn CredentialProvider> = Arc::new(static_credentials);

    let mut sources = Vec::with_capacity(Provider::ALL.len());
    for provider in Provider::ALL {
        let provider_settings = config.provider(provider);
        let limiter = RateLimiter::new(
            provider.as_str(),
            RateLimiterOptions {
                requests_per_minute: provider_settings.requests_per_minute,
                burst_capacity: config.rate_limit_burst,
            },
        );
        let source = build_source(
            provider,
            &provider_settings.base_url,
            &settings,
            Arc::clone(&credentials),
            limiter,
        )
        .map_err(|e| anyhow::anyhow!("failed to build {provider} client: {e}"))?;
        sources.push(source);
    }

    let events = EventBus::new();
    Ok(Orchestrator::new(
        EngineConfig::from_app_config(config),
        Cache::with_events(CACHE_NAMESPACE, events.clone()),
        events,
        sources,
    ))
}

/// Starts a scan and waits for its completion or failure event.
///
/// # Errors
///
/// Returns an error if the options are rejected or the event bus closes
/// before the scan finishes.
pub(crate) async fn run_scan(
    orchestrator: &Orchestrator,
    user_id: &str,
    options: ScanOptions,
) -> anyhow::Result<Scan> {
    let mut completed = orchestrator.events().subscribe_completed();
    let mut failed = orchestrator.events().subscribe_failed();

    let scan_id = orchestrator.start_scan(user_id, options).await?;
    tracing::info!(scan_id = %scan_id, user_id, "scan started, waiting for result");

    loop {
        tokio::select! {
            event = completed.recv() => match event {
                Ok(scan) if scan.id == scan_id => return Ok(scan),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "completion events lagged");
                    if let Some(scan) = finished(orchestrator, &scan_id) {
                        return Ok(scan);
                    }
                }
                Err(RecvError::Closed) => anyhow::bail!("event bus closed before scan {scan_id} finished"),
            },
            event = failed.recv() => match event {
                Ok(event) if event.scan.id == scan_id => return Ok(event.scan),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "failure events lagged");
                    if let Some(scan) = finished(orchestrator, &scan_id) {
                        return Ok(scan);
                    }
                }
                Err(RecvError::Closed) => anyhow::bail!("event bus closed before scan {scan_id} finished"),
            },
        }
    }
}

fn finished(orchestrator: &Orchestrator, scan_id: &str) -> Option<Scan> {
    orchestrator
        .get_scan_result(scan_id)
        .filter(|scan| scan.status.is_terminal())
}
