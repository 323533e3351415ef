pub mod clock;
pub mod config;
pub mod connectivity;
pub mod events;
pub mod identity;
pub mod load;
pub mod model;
pub mod player;
pub mod rest;
pub mod session;
pub mod store;

#[cfg(test)]
mod connectivity_tests;
#[cfg(test)]
mod identity_tests;
#[cfg(test)]
mod session_tests;

pub use clock::{Clock, MonotonicClock};
pub use config::{RestStoreConfig, TrackerConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use events::{EventBus, PlatformEvent, Subscription};
pub use identity::{
    classify_device, FileTokenStorage, IdentityResolver, MemoryTokenStorage, TokenStorage,
    TokenStorageError,
};
pub use load::{LoadMetricsRecorder, NetworkInfo, StaticNetworkInfo};
pub use model::{
    ConnectivityIssue, DeviceInfo, GeoPoint, IssueId, IssueType, LoadMetric, SessionId, User,
    UserId, VideoRef, WatchSession,
};
pub use player::{TrackedPlayer, TrackerDeps};
pub use rest::RestStore;
pub use session::{OpenSession, SessionTracker};
pub use store::{MemoryStore, RemoteStore, StoreError, StoreOp, StoreSnapshot};
