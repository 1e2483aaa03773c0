pub mod cli;
pub mod core;
pub mod pipeline;
pub mod providers;
pub mod store;
pub mod tracker;

use crate::core::asset::AssetType;
use crate::core::config::AppConfig;
use crate::core::notice::Notice;
use crate::core::price::{PriceProvider, PriceSnapshot, PriceSourcePreference};
use crate::pipeline::PriceAcquisition;
use crate::providers::{HttpConnectivity, MarketApiProvider, MarketPageProvider};
use crate::store::KeyValueStore;
use crate::store::backup::PriceBackupStore;
use crate::store::ledger_repo::LedgerRepository;
use crate::store::preferences::Preferences;
use crate::tracker::Tracker;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Add {
        asset: AssetType,
        amount: f64,
        price: Option<f64>,
        note: Option<String>,
    },
    Set {
        asset: AssetType,
        total: f64,
        price: Option<f64>,
        note: Option<String>,
    },
    Remove {
        lot_id: String,
    },
    Reset,
    History {
        limit: usize,
    },
    Prices,
    Summary {
        currency: Option<AssetType>,
    },
    /// Shows the price source preference, or sets it when given.
    Source {
        preference: Option<PriceSourcePreference>,
    },
}

/// Builds the tracker over `store` with the providers from `config`.
pub async fn open_tracker(config: &AppConfig, store: &KeyValueStore) -> Result<Tracker> {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(MarketApiProvider::new(&config.providers.api)?),
        Arc::new(MarketPageProvider::new(&config.providers.page)?),
    ];
    let mut pipeline = PriceAcquisition::new(
        providers,
        PriceBackupStore::new(store)?,
        Preferences::new(store)?,
    );
    if let Some(url) = &config.connectivity_url {
        pipeline = pipeline.with_probe(Arc::new(HttpConnectivity::new(url)?));
    }
    Tracker::open(LedgerRepository::new(store)?, pipeline, config.history_limit).await
}

/// Refreshes prices behind a spinner. Failures become notices; the ledger keeps
/// its last known prices.
async fn refresh(tracker: &Tracker) -> (Option<PriceSnapshot>, Vec<Notice>) {
    let pb = cli::ui::new_spinner("Fetching prices...");
    let result = tracker.refresh_prices().await;
    pb.finish_and_clear();
    match result {
        Ok(report) => (Some(report.snapshot), report.notices),
        Err(e) if e.is_cancelled() => (None, Vec::new()),
        Err(e) => (
            None,
            vec![Notice::FetchFailed {
                reason: e.to_string(),
            }],
        ),
    }
}

fn print_notices(notices: &[Notice]) {
    if !notices.is_empty() {
        println!("{}\n", cli::ui::format_notices(notices));
    }
}

async fn dispatch(command: AppCommand, tracker: &Tracker, config: &AppConfig) -> Result<()> {
    match command {
        AppCommand::Add {
            asset,
            amount,
            price,
            note,
        } => {
            let outcome = tracker.append(asset, amount, note, price);
            println!("{}", cli::ledger::describe_outcome(&outcome));
        }
        AppCommand::Set {
            asset,
            total,
            price,
            note,
        } => {
            let outcome = tracker.set_total(asset, total, note, price);
            println!("{}", cli::ledger::describe_outcome(&outcome));
        }
        AppCommand::Remove { lot_id } => {
            let outcome = tracker.remove_lot(&lot_id);
            println!("{}", cli::ledger::describe_outcome(&outcome));
        }
        AppCommand::Reset => {
            let outcome = tracker.reset();
            println!("{}", cli::ledger::describe_outcome(&outcome));
        }
        AppCommand::History { limit } => {
            println!("{}", cli::history::display_history(&tracker.state(), limit));
        }
        AppCommand::Prices => {
            let (snapshot, notices) = refresh(tracker).await;
            print_notices(&notices);
            match snapshot {
                Some(snapshot) => println!("{}", cli::prices::display_snapshot(&snapshot)),
                None => println!(
                    "{}",
                    cli::prices::display_known_prices(&tracker.state().prices)
                ),
            }
        }
        AppCommand::Summary { currency } => {
            let (_, notices) = refresh(tracker).await;
            print_notices(&notices);
            let target = currency.unwrap_or(config.currency);
            println!(
                "{}",
                cli::summary::display_summary(&tracker.state(), target)
            );
        }
        AppCommand::Source { preference } => {
            let preferences = tracker.pipeline().preferences();
            if let Some(preference) = preference {
                preferences.set_price_source(preference).await?;
            }
            println!("Price source: {}", preferences.price_source().await);
        }
    }
    Ok(())
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Goldfolio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = KeyValueStore::open(&config.data_path()?)?;
    let tracker = open_tracker(&config, &store).await?;
    let result = dispatch(command, &tracker, &config).await;
    tracker.shutdown().await;
    result
}
