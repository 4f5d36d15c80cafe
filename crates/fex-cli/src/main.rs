mod client;
mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

/// fex — field execution CLI
#[derive(Debug, Parser)]
#[command(name = "fex", version, about, long_about = "\
fex — field execution CLI

Quick reference:
  fex route show              Show today's route and per-stop gates
  fex route start             Start the day's route
  fex route checkin <SEQ>     Check into an eligible stop
  fex route skip <SEQ> -r …   Skip a stop without visiting it
  fex visit status <SEQ>      Show the visit's activities and gate
  fex visit complete <SEQ> <ACTIVITY>   Complete the current activity
  fex visit finalize <SEQ>    Finalize the visit (irreversible)
  fex transfer show <ID>      Show a transfer and its item checks
  fex transfer depart <ID>    Complete loading, go in transit

Environment variables:
  FEX_ROUTE   Default route ID for route and visit commands
  FEX_HOME    Data directory (default: ~/.fex)
  RUST_LOG    Log filter (default: info)
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route lifecycle — show, start, check in, skip, add, end
    #[command(subcommand)]
    Route(commands::route::RouteCommand),

    /// Visit execution — activities, media, finalize, abandon
    #[command(subcommand)]
    Visit(commands::visit::VisitCommand),

    /// Goods movement — loading check, transit, handoff, return
    #[command(subcommand)]
    Transfer(commands::transfer::TransferCommand),

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Route(cmd) => commands::route::run(cmd).await,
        Command::Visit(cmd) => commands::visit::run(cmd).await,
        Command::Transfer(cmd) => commands::transfer::run(cmd).await,
        Command::Version => {
            println!(
                "fex {} ({})",
                env!("CARGO_PKG_VERSION"),
                env!("GIT_VERSION")
            );
            println!("Built: {}", env!("BUILD_DATE"));
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "fex",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
