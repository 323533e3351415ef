use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    MediaLoaded,
    MediaFailed,
    Online,
    Offline,
    KeyDown(String),
}

/// Source of platform signals. The shell emits, tracking components subscribe.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many listeners saw the event.
    pub fn emit(&self, event: PlatformEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Dropping the subscription detaches the listener.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<PlatformEvent>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<PlatformEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "listener lagged, platform events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
