use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use goldfolio::core::asset::AssetType;
use goldfolio::core::log::init_logging;
use goldfolio::core::price::PriceSourcePreference;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Record a new lot
    Add {
        asset: AssetType,
        amount: f64,
        /// Unit price paid, in the local currency
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Set the total held of an asset; decreases consume the newest lots first
    Set {
        asset: AssetType,
        total: f64,
        /// Unit price paid, used when the total goes up
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete one lot by id
    Remove { lot_id: String },
    /// Delete all lots and history
    Reset,
    /// Show recent changes
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show current market prices
    Prices,
    /// Display holdings, value and cost basis
    Summary {
        /// Asset to value the holdings in
        #[arg(long)]
        currency: Option<AssetType>,
    },
    /// Show or choose which price source to use
    Source { preference: Option<PriceSourcePreference> },
}

impl From<Commands> for goldfolio::AppCommand {
    fn from(cmd: Commands) -> goldfolio::AppCommand {
        match cmd {
            Commands::Add {
                asset,
                amount,
                price,
                note,
            } => goldfolio::AppCommand::Add {
                asset,
                amount,
                price,
                note,
            },
            Commands::Set {
                asset,
                total,
                price,
                note,
            } => goldfolio::AppCommand::Set {
                asset,
                total,
                price,
                note,
            },
            Commands::Remove { lot_id } => goldfolio::AppCommand::Remove { lot_id },
            Commands::Reset => goldfolio::AppCommand::Reset,
            Commands::History { limit } => goldfolio::AppCommand::History { limit },
            Commands::Prices => goldfolio::AppCommand::Prices,
            Commands::Summary { currency } => goldfolio::AppCommand::Summary { currency },
            Commands::Source { preference } => goldfolio::AppCommand::Source { preference },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => goldfolio::cli::setup::setup_at_path(path),
            None => goldfolio::cli::setup::setup(),
        },
        Some(cmd) => goldfolio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
