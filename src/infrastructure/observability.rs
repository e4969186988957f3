//! Prometheus metrics infrastructure

use std::sync::Arc;

use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle to the installed Prometheus recorder
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Render all recorded metrics in the text exposition format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder
///
/// Returns `None` when metrics are disabled or a recorder is already
/// installed.
pub fn init_metrics(enabled: bool) -> Option<PrometheusMetrics> {
    if !enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("netquery_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::debug!("Prometheus recorder installed");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}
