use std::time::Duration;

use clap::Args;
use geotube_core::{PlatformEvent, SessionId, TrackedPlayer, TrackerDeps, UserId, VideoRef};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

// Fire-and-forget writes get this long to land before results are reported.
const SETTLE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Args)]
pub struct ScriptArgs {
    #[arg(long, default_value_t = 400)]
    pub load_after_ms: u64,

    #[arg(long)]
    pub load_fails: bool,

    #[arg(long)]
    pub offline_at_ms: Option<u64>,

    #[arg(long)]
    pub online_at_ms: Option<u64>,

    #[arg(long, default_value_t = 10_000)]
    pub close_after_ms: u64,

    #[arg(long)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
}

impl Outcome {
    pub fn from_player(player: &TrackedPlayer) -> Self {
        Self {
            user_id: player.user().cloned(),
            session_id: player.session().cloned(),
        }
    }
}

/// Events ordered by offset from mount, ending with `close_key`. Anything scheduled
/// after the close is dropped.
pub fn timeline(script: &ScriptArgs, close_key: &str) -> Vec<(Duration, PlatformEvent)> {
    let load_event = if script.load_fails {
        PlatformEvent::MediaFailed
    } else {
        PlatformEvent::MediaLoaded
    };

    let mut events = vec![(script.load_after_ms, load_event)];
    if let Some(at) = script.offline_at_ms {
        events.push((at, PlatformEvent::Offline));
    }
    if let Some(at) = script.online_at_ms {
        events.push((at, PlatformEvent::Online));
    }
    events.retain(|(at, _)| *at <= script.close_after_ms);
    events.push((
        script.close_after_ms,
        PlatformEvent::KeyDown(close_key.to_string()),
    ));
    events.sort_by_key(|(at, _)| *at);

    events
        .into_iter()
        .map(|(at, event)| (Duration::from_millis(at), event))
        .collect()
}

pub async fn run_scenario(deps: &TrackerDeps, video: VideoRef, script: &ScriptArgs) -> Outcome {
    let mut player = TrackedPlayer::mount(deps, video).await;
    let outcome = Outcome::from_player(&player);
    let mounted = Instant::now();

    for (at, event) in timeline(script, &deps.config.close_key) {
        sleep_until(mounted + at).await;
        debug!(?event, at_ms = at.as_millis() as u64, "emitting scripted event");
        deps.events.emit(event);
    }

    player.close_requested().await;
    player.unmount(script.completed).await;
    settle().await;
    outcome
}

pub async fn settle() {
    sleep(SETTLE_GRACE).await;
}
