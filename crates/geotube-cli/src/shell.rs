use geotube_core::{EventBus, PlatformEvent, TrackedPlayer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub fn parse_event(line: &str) -> Option<PlatformEvent> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));

    match word.to_ascii_lowercase().as_str() {
        "load" | "loaded" => Some(PlatformEvent::MediaLoaded),
        "error" | "fail" => Some(PlatformEvent::MediaFailed),
        "offline" => Some(PlatformEvent::Offline),
        "online" => Some(PlatformEvent::Online),
        "escape" | "esc" => Some(PlatformEvent::KeyDown("Escape".to_string())),
        "key" if !rest.is_empty() => Some(PlatformEvent::KeyDown(rest.to_string())),
        _ => None,
    }
}

/// Feeds stdin lines to the player until close is requested, stdin ends, or ctrl-c.
pub async fn run_shell(player: &mut TrackedPlayer, events: &EventBus) {
    feed_lines(player, events, BufReader::new(tokio::io::stdin())).await;
}

/// Never fails: the caller must always get to unmount the player afterwards.
pub async fn feed_lines<R: AsyncBufRead + Unpin>(
    player: &mut TrackedPlayer,
    events: &EventBus,
    input: R,
) {
    let mut lines = input.lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, closing player");
                break;
            }
            _ = player.close_requested() => {
                info!("close requested, unmounting");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, unmounting");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin unreadable, unmounting");
                        break;
                    }
                };
                match parse_event(&line) {
                    Some(event) => {
                        events.emit(event);
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line.trim(), "unrecognized event"),
                }
            }
        }
    }
}
