use clap::Subcommand;

use fex_core::types::{ActivityResult, MediaId};
use fex_engine::completion::FinalizeResult;
use fex_engine::reconcile::SyncStatus;

use crate::client;

#[derive(Debug, Subcommand)]
pub enum VisitCommand {
    /// Show the active visit's activities and the current unlockable one
    Status {
        /// Stop sequence number
        stop: u32,
        route: Option<String>,
    },
    /// Complete the current activity
    Complete {
        stop: u32,
        /// Activity name
        activity: String,
        /// Result payload as JSON (typed when recognized, opaque otherwise)
        #[arg(long)]
        data: Option<String>,
        route: Option<String>,
    },
    /// Skip the current, non-mandatory activity
    Skip {
        stop: u32,
        activity: String,
        route: Option<String>,
    },
    /// Overwrite a completed activity's captured data
    Amend {
        stop: u32,
        activity: String,
        #[arg(long)]
        data: String,
        route: Option<String>,
    },
    /// Record a captured media reference against the visit
    Attach {
        stop: u32,
        /// Media reference (md-…)
        media: String,
        route: Option<String>,
    },
    /// Finalize the visit — the irreversible terminal transition
    Finalize {
        stop: u32,
        route: Option<String>,
    },
    /// Abandon the visit (only while no progress has been made)
    Abandon {
        stop: u32,
        #[arg(short, long)]
        reason: String,
        route: Option<String>,
    },
}

pub async fn run(cmd: &VisitCommand) -> anyhow::Result<()> {
    match cmd {
        VisitCommand::Status { stop, route } => handle_status(*stop, route).await,
        VisitCommand::Complete { stop, activity, data, route } => {
            let mut session = prepared(route).await?;
            let mut vs = session.activate_visit(*stop).await?;
            let result = data.as_deref().map(parse_result).transpose()?;
            let sync = vs.complete_activity(activity, result).await?;
            println!("Activity '{activity}' completed");
            warn_if_local_only(&sync);
            if let Some(next) = vs.current_activity() {
                println!("Next: {}", next.name);
            }
            Ok(())
        }
        VisitCommand::Skip { stop, activity, route } => {
            let mut session = prepared(route).await?;
            let mut vs = session.activate_visit(*stop).await?;
            let sync = vs.skip_activity(activity).await?;
            println!("Activity '{activity}' skipped");
            warn_if_local_only(&sync);
            Ok(())
        }
        VisitCommand::Amend { stop, activity, data, route } => {
            let mut session = prepared(route).await?;
            let mut vs = session.activate_visit(*stop).await?;
            let sync = vs.amend_activity(activity, Some(parse_result(data)?)).await?;
            println!("Activity '{activity}' amended");
            warn_if_local_only(&sync);
            Ok(())
        }
        VisitCommand::Attach { stop, media, route } => {
            let mut session = prepared(route).await?;
            let mut vs = session.activate_visit(*stop).await?;
            vs.capture_media(MediaId(media.clone()))?;
            println!("Media {media} recorded");
            Ok(())
        }
        VisitCommand::Finalize { stop, route } => {
            let mut session = prepared(route).await?;
            let mut vs = session.activate_visit(*stop).await?;
            match session.finalize_visit(&mut vs).await? {
                FinalizeResult::Committed => {
                    println!("Visit finalized; stop {stop} completed");
                }
                FinalizeResult::Blocked(warnings) => {
                    println!("Finalize blocked — visit remains in progress:");
                    for warning in warnings {
                        println!("  - {warning}");
                    }
                }
                FinalizeResult::RetryNeeded(msg) => {
                    println!("Finalize did not complete ({msg}); nothing changed, retry when connected");
                }
            }
            Ok(())
        }
        VisitCommand::Abandon { stop, reason, route } => {
            let mut session = prepared(route).await?;
            let vs = session.activate_visit(*stop).await?;
            session.skip_visit(&vs, reason).await?;
            println!("Visit abandoned; stop {stop} skipped");
            Ok(())
        }
    }
}

async fn prepared(route: &Option<String>) -> anyhow::Result<fex_engine::session::Session> {
    let mut session = client::open_session(None, None)?;
    let id = client::resolve_route(route)?;
    session.load_route(&id).await?;
    Ok(session)
}

/// Accept either the tagged wire shape or any JSON object, which is
/// carried opaquely.
fn parse_result(data: &str) -> anyhow::Result<ActivityResult> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    Ok(serde_json::from_value::<ActivityResult>(value.clone())
        .unwrap_or(ActivityResult::Opaque { data: value }))
}

fn warn_if_local_only(sync: &SyncStatus) {
    if let SyncStatus::LocalOnly(msg) = sync {
        println!("  (saved locally; server sync failed: {msg})");
    }
}

async fn handle_status(stop: u32, route: &Option<String>) -> anyhow::Result<()> {
    let mut session = prepared(route).await?;
    let vs = session.activate_visit(stop).await?;

    println!(
        "Visit {} [{}]{}",
        vs.visit_id(),
        client::word(&vs.visit().status),
        if vs.is_read_only() { " (read-only)" } else { "" }
    );
    println!("{:<5} {:<16} {:<12} {:<10} {:<8}", "SEQ", "ACTIVITY", "TYPE", "STATUS", "GATE");
    println!("{}", "-".repeat(54));

    for activity in &vs.visit().activities {
        let gate = if vs.gate().is_unlockable(&activity.name) {
            "current"
        } else if vs.is_read_only() {
            "view"
        } else {
            "locked"
        };
        println!(
            "{:<5} {:<16} {:<12} {:<10} {:<8}",
            activity.seq,
            activity.name,
            client::word(&activity.activity_type),
            client::word(&activity.status),
            gate
        );
    }
    if !vs.record().media.is_empty() {
        println!("media: {}", vs.record().media.len());
    }
    Ok(())
}
