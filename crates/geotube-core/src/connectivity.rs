use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::model::{IssueId, IssueResolution, IssueType, NewConnectivityIssue, UserId};
use crate::store::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityState {
    Clear,
    IssueOpen(IssueId),
}

/// Tracks at most one held connectivity issue for a player instance.
///
/// Faults do not check for an already open issue unless `single_open_issue` is set:
/// every fault inserts a new record and the last insert to complete becomes the held
/// issue, so earlier ones stay unresolved.
pub struct ConnectivityMonitor {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    user: UserId,
    video_id: Option<String>,
    single_open_issue: bool,
    state: ConnectivityState,
    opening: JoinSet<Option<IssueId>>,
}

impl ConnectivityMonitor {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        user: UserId,
        video_id: Option<String>,
        single_open_issue: bool,
    ) -> Self {
        Self {
            store,
            clock,
            user,
            video_id,
            single_open_issue,
            state: ConnectivityState::Clear,
            opening: JoinSet::new(),
        }
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    pub fn in_flight(&self) -> usize {
        self.opening.len()
    }

    pub fn report_fault(&mut self, issue_type: IssueType, message: &str) {
        if self.single_open_issue
            && (self.state != ConnectivityState::Clear || !self.opening.is_empty())
        {
            debug!(issue_type = issue_type.as_str(), "issue already open, fault folded into it");
            return;
        }

        let issue = NewConnectivityIssue {
            user_id: self.user.clone(),
            video_id: self.video_id.clone(),
            issue_type,
            error_message: message.to_string(),
            occurred_at: self.clock.now(),
        };
        let store = Arc::clone(&self.store);

        self.opening.spawn(async move {
            match store.insert_issue(&issue).await {
                Ok(id) => Some(id),
                Err(err) => {
                    error!(
                        op = "open_issue",
                        issue_type = issue.issue_type.as_str(),
                        error = %err,
                        "error tracking connection issue"
                    );
                    None
                }
            }
        });
    }

    /// Waits for the next in-flight issue insert. `None` when nothing is in flight.
    pub async fn next_opened(&mut self) -> Option<Option<IssueId>> {
        let joined = self.opening.join_next().await?;
        Some(joined.unwrap_or_else(|err| {
            warn!(error = %err, "issue insert task did not finish");
            None
        }))
    }

    pub fn apply_opened(&mut self, opened: Option<IssueId>) {
        if let Some(id) = opened {
            info!(issue_id = %id, "connectivity issue opened");
            self.state = ConnectivityState::IssueOpen(id);
        }
    }

    fn apply_finished(&mut self) {
        while let Some(joined) = self.opening.try_join_next() {
            match joined {
                Ok(opened) => self.apply_opened(opened),
                Err(err) => warn!(error = %err, "issue insert task did not finish"),
            }
        }
    }

    pub fn connection_restored(&mut self) {
        // An insert that already finished counts as held, even if nobody joined it yet.
        self.apply_finished();

        let ConnectivityState::IssueOpen(id) =
            std::mem::replace(&mut self.state, ConnectivityState::Clear)
        else {
            return;
        };

        let resolution = IssueResolution {
            resolved: true,
            resolution_time: self.clock.now(),
        };
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            match store.resolve_issue(&id, &resolution).await {
                Ok(()) => info!(issue_id = %id, "connectivity issue resolved"),
                Err(err) => {
                    error!(op = "resolve_issue", issue_id = %id, error = %err, "error resolving connection issue")
                }
            }
        });
    }
}

impl Drop for ConnectivityMonitor {
    // In-flight inserts finish on their own; their ids are never applied.
    fn drop(&mut self) {
        self.opening.detach_all();
    }
}
