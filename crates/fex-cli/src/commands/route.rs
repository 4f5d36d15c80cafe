use clap::Subcommand;

use fex_core::types::{StopDescriptor, StopKind};
use fex_engine::sequencer::{classify_stops, StopGate};

use crate::client;

#[derive(Debug, Subcommand)]
pub enum RouteCommand {
    /// Show the route with per-stop gates
    Show {
        /// Route ID (defaults to FEX_ROUTE)
        route: Option<String>,
    },
    /// Start (or resume) the day's route
    Start {
        route: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
    },
    /// Check into an eligible stop
    Checkin {
        /// Stop sequence number
        stop: u32,
        route: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
    },
    /// Complete an active break stop
    Break {
        stop: u32,
        route: Option<String>,
    },
    /// Skip a stop without visiting it
    Skip {
        stop: u32,
        /// Why the stop is being skipped
        #[arg(short, long)]
        reason: String,
        route: Option<String>,
    },
    /// Append an unplanned stop at the end of the sequence
    Add {
        /// Customer or location label
        customer: String,
        /// Stop kind: visit, delivery, transfer, pickup, break
        #[arg(short, long, default_value = "visit")]
        kind: String,
        route: Option<String>,
    },
    /// End the day's route
    End {
        route: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
    },
}

pub async fn run(cmd: &RouteCommand) -> anyhow::Result<()> {
    match cmd {
        RouteCommand::Show { route } => handle_show(route).await,
        RouteCommand::Start { route, lat, lng } => {
            let mut session = client::open_session(*lat, *lng)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            let r = session.start_route(&id).await?;
            println!("Route {} started ({} stops)", id, r.total_stops());
            Ok(())
        }
        RouteCommand::Checkin { stop, route, lat, lng } => {
            let mut session = client::open_session(*lat, *lng)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            session.check_in(*stop).await?;
            println!("Checked into stop {stop}");
            Ok(())
        }
        RouteCommand::Break { stop, route } => {
            let mut session = client::open_session(None, None)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            session.complete_break(*stop).await?;
            println!("Break stop {stop} completed");
            Ok(())
        }
        RouteCommand::Skip { stop, reason, route } => {
            let mut session = client::open_session(None, None)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            session.skip_stop(*stop, reason).await?;
            println!("Stop {stop} skipped");
            Ok(())
        }
        RouteCommand::Add { customer, kind, route } => {
            let mut session = client::open_session(None, None)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            let descriptor = StopDescriptor {
                kind: parse_kind(kind)?,
                customer: customer.clone(),
            };
            let r = session.add_unplanned_stop(&descriptor).await?;
            println!(
                "Unplanned stop {} added for {customer}",
                r.stops.last().map(|s| s.seq).unwrap_or_default()
            );
            Ok(())
        }
        RouteCommand::End { route, lat, lng } => {
            let mut session = client::open_session(*lat, *lng)?;
            let id = client::resolve_route(route)?;
            session.load_route(&id).await?;
            session.end_route(&id).await?;
            println!("Route {id} ended");
            Ok(())
        }
    }
}

fn parse_kind(kind: &str) -> anyhow::Result<StopKind> {
    match kind {
        "visit" => Ok(StopKind::Visit),
        "delivery" => Ok(StopKind::Delivery),
        "transfer" => Ok(StopKind::Transfer),
        "pickup" => Ok(StopKind::Pickup),
        "break" => Ok(StopKind::Break),
        other => anyhow::bail!("unknown stop kind: {other}"),
    }
}

async fn handle_show(route: &Option<String>) -> anyhow::Result<()> {
    let mut session = client::open_session(None, None)?;
    let id = client::resolve_route(route)?;
    let r = session.load_route(&id).await?;

    println!(
        "Route {} — {} [{}], {}/{} done, {} skipped",
        r.id,
        r.date,
        client::word(&r.status),
        r.completed_stops(),
        r.total_stops(),
        r.skipped_stops()
    );
    println!("{:<5} {:<10} {:<12} {:<10} {:<24}", "SEQ", "KIND", "STATUS", "GATE", "CUSTOMER");
    println!("{}", "-".repeat(64));

    for (stop, gate) in r.stops.iter().zip(classify_stops(r)) {
        let gate = match gate {
            StopGate::Active => "active",
            StopGate::Eligible => "eligible",
            StopGate::Locked => "locked",
        };
        println!(
            "{:<5} {:<10} {:<12} {:<10} {:<24}",
            stop.seq,
            client::word(&stop.kind),
            client::word(&stop.status),
            gate,
            stop.customer
        );
    }
    Ok(())
}
