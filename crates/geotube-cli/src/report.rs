use anyhow::Result;
use geotube_core::{MemoryStore, StoreSnapshot};
use serde_json::json;

use crate::scenario::Outcome;
use crate::OutputFormat;

pub fn print_outcome(
    outcome: &Outcome,
    memory: Option<&MemoryStore>,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = memory.map(MemoryStore::snapshot);

    match format {
        OutputFormat::Json => {
            let out = json!({
                "user_id": outcome.user_id,
                "session_id": outcome.session_id,
                "records": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Ndjson => {
            for line in ndjson_lines(outcome, snapshot.as_ref())? {
                println!("{line}");
            }
        }
        OutputFormat::Human => print_human(outcome, snapshot.as_ref()),
    }

    Ok(())
}

pub fn ndjson_lines(outcome: &Outcome, snapshot: Option<&StoreSnapshot>) -> Result<Vec<String>> {
    let mut lines = vec![serde_json::to_string(&json!({
        "kind": "outcome",
        "user_id": outcome.user_id,
        "session_id": outcome.session_id,
    }))?];

    let Some(snapshot) = snapshot else {
        return Ok(lines);
    };

    for user in &snapshot.users {
        lines.push(serde_json::to_string(&json!({"kind": "user", "record": user}))?);
    }
    for session in &snapshot.sessions {
        lines.push(serde_json::to_string(&json!({"kind": "watch_session", "record": session}))?);
    }
    for metric in &snapshot.load_metrics {
        lines.push(serde_json::to_string(&json!({"kind": "load_metric", "record": metric}))?);
    }
    for issue in &snapshot.issues {
        lines.push(serde_json::to_string(&json!({"kind": "connectivity_issue", "record": issue}))?);
    }

    Ok(lines)
}

fn print_human(outcome: &Outcome, snapshot: Option<&StoreSnapshot>) {
    println!("=== GeoTube Tracking ===");
    println!(
        "User:       {}",
        outcome
            .user_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unavailable (tracking disabled)".to_string())
    );
    println!(
        "Session:    {}",
        outcome
            .session_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string())
    );

    let Some(snapshot) = snapshot else {
        println!("Records:    kept by the remote store");
        return;
    };

    println!("Sessions:");
    for s in &snapshot.sessions {
        println!(
            "  {} video={} \"{}\" ({}) duration={} completed={}",
            s.id,
            s.video_id,
            s.video_title,
            s.channel_name,
            s.watch_duration_seconds
                .map(|d| format!("{d}s"))
                .unwrap_or_else(|| "open".to_string()),
            s.completed
        );
    }

    println!("Load metrics:");
    for m in &snapshot.load_metrics {
        println!(
            "  video={} success={} load_ms={} connection={}{}",
            m.video_id,
            m.success,
            m.load_duration_ms,
            m.connection_type,
            m.error_message
                .as_deref()
                .map(|e| format!(" error=\"{e}\""))
                .unwrap_or_default()
        );
    }

    println!("Connectivity issues:");
    for i in &snapshot.issues {
        println!(
            "  {} type={} \"{}\" occurred={} resolved={}{}",
            i.id,
            i.issue_type.as_str(),
            i.error_message,
            i.occurred_at.to_rfc3339(),
            i.resolved,
            i.resolution_time
                .map(|t| format!(" at {}", t.to_rfc3339()))
                .unwrap_or_default()
        );
    }
}
