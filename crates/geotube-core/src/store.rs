use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    ConnectivityIssue, IssueId, IssueResolution, LoadMetric, NewConnectivityIssue, NewUser,
    NewWatchSession, SessionClose, SessionId, User, UserId, WatchSession,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("http error: {0}")]
    Http(String),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Request/response access to the backend tables. Every call may fail; none are retried.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn find_user(&self, session_token: &str) -> Result<Option<UserId>, StoreError>;
    async fn touch_user(&self, id: &UserId, last_seen: DateTime<Utc>) -> Result<(), StoreError>;
    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError>;
    async fn insert_session(&self, session: &NewWatchSession) -> Result<SessionId, StoreError>;
    async fn close_session(&self, id: &SessionId, close: &SessionClose) -> Result<(), StoreError>;
    async fn insert_load_metric(&self, metric: &LoadMetric) -> Result<(), StoreError>;
    async fn insert_issue(&self, issue: &NewConnectivityIssue) -> Result<IssueId, StoreError>;
    async fn resolve_issue(
        &self,
        id: &IssueId,
        resolution: &IssueResolution,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    FindUser,
    TouchUser,
    CreateUser,
    InsertSession,
    CloseSession,
    InsertLoadMetric,
    InsertIssue,
    ResolveIssue,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSnapshot {
    pub users: Vec<User>,
    pub sessions: Vec<WatchSession>,
    pub load_metrics: Vec<LoadMetric>,
    pub issues: Vec<ConnectivityIssue>,
}

#[derive(Debug, Default)]
struct MemoryTables {
    data: StoreSnapshot,
    failing: Vec<StoreOp>,
    calls: BTreeMap<StoreOp, u64>,
    latency: Option<Duration>,
}

/// In-process store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail with `StoreError::Unavailable`.
    pub fn fail(&self, op: StoreOp) {
        let mut tables = self.lock();
        if !tables.failing.contains(&op) {
            tables.failing.push(op);
        }
    }

    pub fn recover(&self, op: StoreOp) {
        self.lock().failing.retain(|o| *o != op);
    }

    /// Delay applied to every call before it touches the tables.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn calls(&self, op: StoreOp) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().data.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTables> {
        // A poisoned lock only means a test panicked mid-write; the tables are still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        let latency = {
            let mut tables = self.lock();
            *tables.calls.entry(op).or_insert(0) += 1;
            tables.latency
        };

        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        if self.lock().failing.contains(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} rejected")));
        }
        Ok(())
    }

    fn next_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn find_user(&self, session_token: &str) -> Result<Option<UserId>, StoreError> {
        self.enter(StoreOp::FindUser).await?;
        Ok(self
            .lock()
            .data
            .users
            .iter()
            .find(|u| u.session_id == session_token)
            .map(|u| u.id.clone()))
    }

    async fn touch_user(&self, id: &UserId, last_seen: DateTime<Utc>) -> Result<(), StoreError> {
        self.enter(StoreOp::TouchUser).await?;
        let mut tables = self.lock();
        let user = tables
            .data
            .users
            .iter_mut()
            .find(|u| &u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.last_seen = last_seen;
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        self.enter(StoreOp::CreateUser).await?;
        let id = UserId(Self::next_id());
        self.lock().data.users.push(User {
            id: id.clone(),
            session_id: user.session_id.clone(),
            device: user.device.clone(),
            last_seen: user.last_seen,
        });
        Ok(id)
    }

    async fn insert_session(&self, session: &NewWatchSession) -> Result<SessionId, StoreError> {
        self.enter(StoreOp::InsertSession).await?;
        let id = SessionId(Self::next_id());
        self.lock().data.sessions.push(WatchSession {
            id: id.clone(),
            user_id: session.user_id.clone(),
            video_id: session.video_id.clone(),
            video_title: session.video_title.clone(),
            channel_name: session.channel_name.clone(),
            latitude: session.latitude,
            longitude: session.longitude,
            started_at: session.started_at,
            ended_at: None,
            watch_duration_seconds: None,
            completed: false,
        });
        Ok(id)
    }

    async fn close_session(&self, id: &SessionId, close: &SessionClose) -> Result<(), StoreError> {
        self.enter(StoreOp::CloseSession).await?;
        let mut tables = self.lock();
        let session = tables
            .data
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or(StoreError::NotFound)?;
        session.ended_at = Some(close.ended_at);
        session.watch_duration_seconds = Some(close.watch_duration_seconds);
        session.completed = close.completed;
        Ok(())
    }

    async fn insert_load_metric(&self, metric: &LoadMetric) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertLoadMetric).await?;
        self.lock().data.load_metrics.push(metric.clone());
        Ok(())
    }

    async fn insert_issue(&self, issue: &NewConnectivityIssue) -> Result<IssueId, StoreError> {
        self.enter(StoreOp::InsertIssue).await?;
        let id = IssueId(Self::next_id());
        self.lock().data.issues.push(ConnectivityIssue {
            id: id.clone(),
            user_id: issue.user_id.clone(),
            video_id: issue.video_id.clone(),
            issue_type: issue.issue_type,
            error_message: issue.error_message.clone(),
            occurred_at: issue.occurred_at,
            resolved: false,
            resolution_time: None,
        });
        Ok(id)
    }

    async fn resolve_issue(
        &self,
        id: &IssueId,
        resolution: &IssueResolution,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::ResolveIssue).await?;
        let mut tables = self.lock();
        let issue = tables
            .data
            .issues
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or(StoreError::NotFound)?;
        issue.resolved = resolution.resolved;
        issue.resolution_time = Some(resolution.resolution_time);
        Ok(())
    }
}
