use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::clock::{elapsed_secs, Clock};
use crate::config::TrackerConfig;
use crate::model::{NewWatchSession, SessionClose, SessionId, UserId, VideoRef};
use crate::store::RemoteStore;

/// A watch session the backend accepted, with the local instant watching began.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSession {
    pub id: SessionId,
    pub watch_started_at: DateTime<Utc>,
}

impl OpenSession {
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        elapsed_secs(self.watch_started_at, now)
    }
}

#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    default_title: String,
    default_channel: String,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, config: &TrackerConfig) -> Self {
        Self {
            store,
            clock,
            default_title: config.default_title.clone(),
            default_channel: config.default_channel.clone(),
        }
    }

    pub async fn start_session(&self, user: &UserId, video: &VideoRef) -> Option<OpenSession> {
        let record = NewWatchSession {
            user_id: user.clone(),
            video_id: video.id.clone(),
            video_title: video
                .title
                .clone()
                .unwrap_or_else(|| self.default_title.clone()),
            channel_name: video
                .channel
                .clone()
                .unwrap_or_else(|| self.default_channel.clone()),
            latitude: video.geo.map(|g| g.latitude),
            longitude: video.geo.map(|g| g.longitude),
            started_at: self.clock.now(),
        };

        match self.store.insert_session(&record).await {
            Ok(id) => {
                let session = OpenSession {
                    id,
                    watch_started_at: self.clock.now(),
                };
                info!(session_id = %session.id, video_id = %video.id, "watch session opened");
                Some(session)
            }
            Err(err) => {
                error!(op = "start_session", video_id = %video.id, error = %err, "error tracking video start");
                None
            }
        }
    }

    pub async fn end_session(&self, session: &SessionId, watch_duration_secs: u64, completed: bool) {
        let close = SessionClose {
            ended_at: self.clock.now(),
            watch_duration_seconds: watch_duration_secs,
            completed,
        };

        match self.store.close_session(session, &close).await {
            Ok(()) => {
                info!(session_id = %session, watch_duration_secs, completed, "watch session closed")
            }
            Err(err) => {
                error!(op = "end_session", session_id = %session, error = %err, "error tracking video end")
            }
        }
    }

    /// Consumes the session so it can only be closed once.
    pub async fn close(&self, session: OpenSession, completed: bool) {
        let duration = session.elapsed_secs(self.clock.now());
        self.end_session(&session.id, duration, completed).await;
    }
}
