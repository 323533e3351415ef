use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{elapsed_ms, Clock};
use crate::config::TrackerConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::events::{EventBus, PlatformEvent, Subscription};
use crate::identity::IdentityResolver;
use crate::load::{LoadMetricsRecorder, NetworkInfo};
use crate::model::{IssueId, IssueType, SessionId, UserId, VideoRef};
use crate::session::{OpenSession, SessionTracker};
use crate::store::RemoteStore;

/// Everything a tracked player needs from the page. Constructed once, cloned per player.
#[derive(Clone)]
pub struct TrackerDeps {
    pub store: Arc<dyn RemoteStore>,
    pub identity: Arc<IdentityResolver>,
    pub clock: Arc<dyn Clock>,
    pub network: Arc<dyn NetworkInfo>,
    pub events: EventBus,
    pub config: TrackerConfig,
}

/// Tracking attached to one mounted player surface.
pub struct TrackedPlayer {
    video_id: String,
    user: Option<UserId>,
    session: Option<OpenSession>,
    tracker: SessionTracker,
    shutdown: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
    close_rx: watch::Receiver<bool>,
}

impl TrackedPlayer {
    pub async fn mount(deps: &TrackerDeps, video: VideoRef) -> Self {
        let mounted_at = deps.clock.now();
        // Subscribe before any await so no signal raised during setup is missed.
        let subscription = deps.events.subscribe();
        let tracker = SessionTracker::new(deps.store.clone(), deps.clock.clone(), &deps.config);

        let user = deps.identity.resolve_user(deps.store.as_ref()).await;
        let session = match &user {
            Some(user) => tracker.start_session(user, &video).await,
            None => {
                warn!(video_id = %video.id, "tracking unavailable for this player");
                None
            }
        };

        let tracking = user.as_ref().map(|user| Tracking {
            user: user.clone(),
            video_id: video.id.clone(),
            mounted_at,
            load_recorded: false,
            clock: deps.clock.clone(),
            recorder: LoadMetricsRecorder::new(
                deps.store.clone(),
                deps.clock.clone(),
                deps.network.clone(),
            ),
            monitor: ConnectivityMonitor::new(
                deps.store.clone(),
                deps.clock.clone(),
                user.clone(),
                Some(video.id.clone()),
                deps.config.single_open_issue,
            ),
            config: deps.config.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (close_tx, close_rx) = watch::channel(false);
        let listener = tokio::spawn(listen(
            subscription,
            tracking,
            deps.config.close_key.clone(),
            close_tx,
            shutdown_rx,
        ));

        Self {
            video_id: video.id,
            user,
            session,
            tracker,
            shutdown: Some(shutdown_tx),
            listener: Some(listener),
            close_rx,
        }
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }

    /// Resolves once the close key is pressed, or right away if the listener is gone.
    pub async fn close_requested(&mut self) {
        let _ = self.close_rx.wait_for(|requested| *requested).await;
    }

    /// Detaches listeners and closes the watch session. Safe to call more than once.
    pub async fn unmount(&mut self, completed: bool) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(listener) = self.listener.take() {
            if let Err(err) = listener.await {
                warn!(error = %err, "player listener ended abnormally");
            }
            debug!(video_id = %self.video_id, "player listeners detached");
        }

        if let Some(session) = self.session.take() {
            self.tracker.close(session, completed).await;
        }
    }
}

struct Tracking {
    user: UserId,
    video_id: String,
    mounted_at: DateTime<Utc>,
    load_recorded: bool,
    clock: Arc<dyn Clock>,
    recorder: LoadMetricsRecorder,
    monitor: ConnectivityMonitor,
    config: TrackerConfig,
}

impl Tracking {
    fn handle(&mut self, event: &PlatformEvent) {
        match event {
            PlatformEvent::MediaLoaded => self.record_load(true),
            PlatformEvent::MediaFailed => {
                self.record_load(false);
                let message = self.config.load_issue_message.clone();
                self.monitor.report_fault(IssueType::LoadFailure, &message);
            }
            PlatformEvent::Offline => {
                let message = self.config.connection_lost_message.clone();
                self.monitor.report_fault(IssueType::ConnectionLost, &message);
            }
            PlatformEvent::Online => self.monitor.connection_restored(),
            PlatformEvent::KeyDown(_) => {}
        }
    }

    // Only the first load signal of a mount is measured.
    fn record_load(&mut self, success: bool) {
        if self.load_recorded {
            return;
        }
        self.load_recorded = true;

        let duration_ms = elapsed_ms(self.mounted_at, self.clock.now());
        let recorder = self.recorder.clone();
        let user = self.user.clone();
        let video_id = self.video_id.clone();
        let error_message = (!success).then(|| self.config.load_error_message.clone());

        tokio::spawn(async move {
            recorder
                .record_load(&user, &video_id, duration_ms, success, error_message.as_deref())
                .await;
        });
    }
}

async fn next_opened(tracking: &mut Option<Tracking>) -> Option<Option<IssueId>> {
    match tracking {
        Some(tracking) => tracking.monitor.next_opened().await,
        None => None,
    }
}

async fn listen(
    mut subscription: Subscription,
    mut tracking: Option<Tracking>,
    close_key: String,
    close_tx: watch::Sender<bool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        // Finished inserts first, then queued signals; shutdown only once both are idle.
        tokio::select! {
            biased;
            Some(opened) = next_opened(&mut tracking) => {
                if let Some(tracking) = tracking.as_mut() {
                    tracking.monitor.apply_opened(opened);
                }
            }
            event = subscription.next() => {
                let Some(event) = event else { break };
                if matches!(&event, PlatformEvent::KeyDown(key) if *key == close_key) {
                    info!("close requested");
                    close_tx.send_replace(true);
                }
                if let Some(tracking) = tracking.as_mut() {
                    tracking.handle(&event);
                }
            }
            _ = &mut shutdown => break,
        }
    }
}
