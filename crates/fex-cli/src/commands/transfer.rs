use clap::Subcommand;

use fex_core::types::{MediaId, TransferId};

use crate::client;

#[derive(Debug, Subcommand)]
pub enum TransferCommand {
    /// Show the transfer with its item checks
    Show {
        /// Transfer ID (tr-…)
        transfer: String,
    },
    /// Start the loading check (pending → loading)
    Load { transfer: String },
    /// Verify every pending item at its expected quantity
    Verify { transfer: String },
    /// Depart: complete loading (requires all item checks terminal)
    Depart { transfer: String },
    /// Arrive at the destination (location is best effort)
    Arrive {
        transfer: String,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
    },
    /// Hand the goods off to a named receiver
    Handoff {
        transfer: String,
        /// Who took delivery
        #[arg(short, long)]
        receiver: String,
        /// Handoff photo reference, uploaded before the status call
        #[arg(long)]
        photo: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Return the goods to origin (irreversible)
    Return {
        transfer: String,
        #[arg(short, long)]
        reason: String,
    },
}

pub async fn run(cmd: &TransferCommand) -> anyhow::Result<()> {
    match cmd {
        TransferCommand::Show { transfer } => handle_show(transfer).await,
        TransferCommand::Load { transfer } => {
            let mut ts = open(transfer, None, None).await?;
            ts.start_loading().await?;
            println!("Loading check started ({} items)", ts.transfer().items.len());
            Ok(())
        }
        TransferCommand::Verify { transfer } => {
            let mut ts = open(transfer, None, None).await?;
            ts.verify_all().await?;
            println!("All items verified");
            Ok(())
        }
        TransferCommand::Depart { transfer } => {
            let mut ts = open(transfer, None, None).await?;
            ts.depart().await?;
            println!("Transfer in transit");
            Ok(())
        }
        TransferCommand::Arrive { transfer, lat, lng } => {
            let mut ts = open(transfer, *lat, *lng).await?;
            ts.arrive().await?;
            println!("Arrival recorded");
            Ok(())
        }
        TransferCommand::Handoff { transfer, receiver, photo, notes } => {
            let mut ts = open(transfer, None, None).await?;
            let photo = photo.clone().map(MediaId);
            if let Some(photo) = &photo {
                ts.capture_handoff_photo(photo.clone())?;
            }
            ts.handoff(receiver, photo, notes.as_deref()).await?;
            println!("Handoff to {receiver} complete");
            Ok(())
        }
        TransferCommand::Return { transfer, reason } => {
            let mut ts = open(transfer, None, None).await?;
            ts.return_transfer(reason).await?;
            println!("Transfer returned");
            Ok(())
        }
    }
}

async fn open(
    transfer: &str,
    lat: Option<f64>,
    lng: Option<f64>,
) -> anyhow::Result<fex_engine::transfer::TransferSession> {
    let mut session = client::open_session(lat, lng)?;
    session.open_transfer(&TransferId(transfer.to_string())).await
}

async fn handle_show(transfer: &str) -> anyhow::Result<()> {
    let ts = open(transfer, None, None).await?;
    let t = ts.transfer();

    println!(
        "Transfer {} [{}] {} → {} ({})",
        t.id,
        client::word(&t.status),
        t.origin,
        t.destination,
        client::word(&t.transfer_type)
    );
    println!(
        "{:<16} {:<9} {:<9} {:<8} {:<8} {:<10}",
        "PRODUCT", "EXPECTED", "VERIFIED", "DAMAGED", "MISSING", "STATUS"
    );
    println!("{}", "-".repeat(63));
    for item in &t.items {
        println!(
            "{:<16} {:<9} {:<9} {:<8} {:<8} {:<10}",
            item.product,
            item.expected,
            item.verified,
            item.damaged,
            item.missing,
            client::word(&item.status)
        );
    }
    if t.pending_checks() > 0 {
        println!("{} item check(s) still pending", t.pending_checks());
    }
    if let Some(received_by) = &t.received_by {
        println!("received by: {received_by}");
    }
    if let Some(reason) = &t.return_reason {
        println!("returned: {reason}");
    }
    Ok(())
}
