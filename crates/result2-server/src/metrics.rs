//! Prometheus exporter for the cache metrics recorded in `result2-cache`.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

// The recorder is process-global, so every app built in this process
// shares one handle.
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle for rendering `/metrics`, or `None` when metrics are disabled.
pub fn install(cfg: &MetricsConfig) -> Option<PrometheusHandle> {
    if !cfg.enabled {
        return None;
    }
    if let Some(handle) = RECORDER.get() {
        return Some(handle.clone());
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Some(RECORDER.get_or_init(|| handle).clone())
        }
        Err(e) => {
            // Lost a race with another install, or a foreign recorder is set.
            let existing = RECORDER.get().cloned();
            if existing.is_none() {
                tracing::warn!(error = %e, "Metrics disabled: recorder install failed");
            }
            existing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_install_nothing() {
        assert!(install(&MetricsConfig { enabled: false }).is_none());
    }
}
