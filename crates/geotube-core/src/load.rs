use std::sync::Arc;

use tracing::{debug, error};

use crate::clock::Clock;
use crate::model::{LoadMetric, UserId};
use crate::store::RemoteStore;

/// Effective connection class as reported by the platform (`4g`, `3g`, ...).
pub trait NetworkInfo: Send + Sync {
    fn effective_type(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticNetworkInfo(pub Option<String>);

impl NetworkInfo for StaticNetworkInfo {
    fn effective_type(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Clone)]
pub struct LoadMetricsRecorder {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    network: Arc<dyn NetworkInfo>,
}

impl LoadMetricsRecorder {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        network: Arc<dyn NetworkInfo>,
    ) -> Self {
        Self {
            store,
            clock,
            network,
        }
    }

    pub async fn record_load(
        &self,
        user: &UserId,
        video_id: &str,
        duration_ms: u64,
        success: bool,
        error_message: Option<&str>,
    ) {
        let metric = LoadMetric {
            user_id: user.clone(),
            video_id: video_id.to_string(),
            load_duration_ms: duration_ms,
            success,
            error_message: error_message.map(str::to_string),
            connection_type: self
                .network
                .effective_type()
                .unwrap_or_else(|| "unknown".to_string()),
            load_end_time: self.clock.now(),
        };

        match self.store.insert_load_metric(&metric).await {
            Ok(()) => debug!(video_id, duration_ms, success, "load metric recorded"),
            Err(err) => error!(op = "record_load", video_id, error = %err, "error tracking video load"),
        }
    }
}
