use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(UserId);
record_id!(SessionId);
record_id!(IssueId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub session_id: String,
    #[serde(flatten)]
    pub device: DeviceInfo,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub session_id: String,
    #[serde(flatten)]
    pub device: DeviceInfo,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// What the player is showing; title and channel fall back to configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRef {
    pub id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub geo: Option<GeoPoint>,
}

impl VideoRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            channel: None,
            geo: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub video_id: String,
    pub video_title: String,
    pub channel_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub watch_duration_seconds: Option<u64>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWatchSession {
    pub user_id: UserId,
    pub video_id: String,
    pub video_title: String,
    pub channel_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClose {
    pub ended_at: DateTime<Utc>,
    pub watch_duration_seconds: u64,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMetric {
    pub user_id: UserId,
    pub video_id: String,
    pub load_duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub connection_type: String,
    pub load_end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[serde(rename = "load_error")]
    LoadFailure,
    ConnectionLost,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::LoadFailure => "load_error",
            IssueType::ConnectionLost => "connection_lost",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityIssue {
    pub id: IssueId,
    pub user_id: UserId,
    pub video_id: Option<String>,
    pub issue_type: IssueType,
    pub error_message: String,
    pub occurred_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnectivityIssue {
    pub user_id: UserId,
    pub video_id: Option<String>,
    pub issue_type: IssueType,
    pub error_message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResolution {
    pub resolved: bool,
    pub resolution_time: DateTime<Utc>,
}
