use std::{sync::Arc, time::Duration};

use {
    concierge_auto_reply::Pipeline,
    concierge_config::WhatsAppConfig,
    tokio_util::task::TaskTracker,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use concierge_metrics::MetricsHandle;

/// Process-wide state shared by all request handlers.
pub struct GatewayState {
    pub pipeline: Arc<Pipeline>,
    /// Expected `hub.verify_token` for subscription checks.
    pub verify_token: String,
    /// Only webhook changes for this phone number id are processed.
    pub phone_number_id: String,
    pub version: String,
    /// Message-processing tasks spawned after the webhook was acknowledged.
    pub tasks: TaskTracker,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(pipeline: Arc<Pipeline>, whatsapp: &WhatsAppConfig) -> Self {
        Self {
            pipeline,
            verify_token: whatsapp.verify_token.clone(),
            phone_number_id: whatsapp.phone_number_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tasks: TaskTracker::new(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Number of sender sessions held in memory.
    pub fn session_count(&self) -> usize {
        self.pipeline.sessions().len()
    }

    /// Wait up to `timeout` for in-flight message tasks. Returns `false` if
    /// some were still running when the timeout hit.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(pending = self.tasks.len(), "waiting for in-flight messages");
        }
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok() {
            return true;
        }
        warn!(
            pending = self.tasks.len(),
            "shutdown drain timed out, replies in flight are lost"
        );
        false
    }
}
