//! The portfolio service: in-memory ledger, background persistence and price
//! refresh, composed behind one handle.
//!
//! Mutations apply synchronously and are then handed to a single writer task.
//! The operation permit travels with the write, so a second request of the same
//! kind for the same asset is dropped until the first one has settled on disk.

use crate::core::analytics::{self, Valuation};
use crate::core::asset::AssetType;
use crate::core::error::PriceError;
use crate::core::guard::{OperationKey, OperationKind, OperationLocks, OperationPermit};
use crate::core::cancel::RequestSlot;
use crate::core::ledger::{IgnoreReason, Ledger, LedgerChange, Outcome, PortfolioState};
use crate::core::notice::Notice;
use crate::core::price::{PriceSnapshot, PriceTable};
use crate::pipeline::{Acquisition, PriceAcquisition};
use crate::store::ledger_repo::LedgerRepository;
use anyhow::{Context, Result};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub snapshot: PriceSnapshot,
    pub notices: Vec<Notice>,
}

enum Write {
    Ledger(LedgerChange),
    Prices(PriceTable),
}

enum Job {
    Write {
        write: Write,
        permit: Option<OperationPermit>,
    },
    Flush(oneshot::Sender<()>),
}

pub struct Tracker {
    ledger: Mutex<Ledger>,
    locks: OperationLocks,
    pipeline: PriceAcquisition,
    refresh: RequestSlot,
    last_snapshot: Mutex<Option<PriceSnapshot>>,
    writer: mpsc::UnboundedSender<Job>,
    writer_task: JoinHandle<()>,
}

impl Tracker {
    /// Loads the persisted state and starts the writer task. Needs a Tokio runtime.
    pub async fn open(
        repo: LedgerRepository,
        pipeline: PriceAcquisition,
        history_limit: usize,
    ) -> Result<Self> {
        let state = repo
            .load_state()
            .await
            .context("Failed to load portfolio")?;
        let (writer, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(run_writer(repo, rx));
        Ok(Self {
            ledger: Mutex::new(Ledger::new(state, history_limit)),
            locks: OperationLocks::new(),
            pipeline,
            refresh: RequestSlot::new(),
            last_snapshot: Mutex::new(None),
            writer,
            writer_task,
        })
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, write: Write, permit: Option<OperationPermit>) {
        if self.writer.send(Job::Write { write, permit }).is_err() {
            warn!("Persistence writer is gone, change kept in memory only");
        }
    }

    /// Runs `mutate` under the lock for `key` and queues its change for writing.
    fn mutate(&self, key: OperationKey, mutate: impl FnOnce(&mut Ledger) -> Outcome) -> Outcome {
        let Some(permit) = self.locks.try_lock(key) else {
            return Outcome::Ignored(IgnoreReason::InProgress);
        };
        let outcome = mutate(&mut self.ledger());
        if let Outcome::Applied(change) = &outcome {
            self.enqueue(Write::Ledger(change.clone()), Some(permit));
        }
        outcome
    }

    pub fn append(
        &self,
        asset: AssetType,
        amount: f64,
        description: Option<String>,
        price_at_acquisition: Option<f64>,
    ) -> Outcome {
        let key = OperationKey::new(OperationKind::Append, Some(asset));
        self.mutate(key, |ledger| {
            ledger.append(asset, amount, description, price_at_acquisition)
        })
    }

    pub fn set_total(
        &self,
        asset: AssetType,
        new_total: f64,
        description: Option<String>,
        price_at_acquisition: Option<f64>,
    ) -> Outcome {
        let key = OperationKey::new(OperationKind::SetTotal, Some(asset));
        self.mutate(key, |ledger| {
            ledger.set_total(asset, new_total, description, price_at_acquisition)
        })
    }

    pub fn remove_lot(&self, lot_id: &str) -> Outcome {
        let asset = self
            .ledger()
            .state()
            .lots
            .iter()
            .find(|lot| lot.id == lot_id)
            .map(|lot| lot.asset);
        let Some(asset) = asset else {
            return Outcome::Ignored(IgnoreReason::UnknownLot);
        };
        let key = OperationKey::new(OperationKind::RemoveLot, Some(asset));
        self.mutate(key, |ledger| ledger.remove_lot(lot_id))
    }

    pub fn reset(&self) -> Outcome {
        let key = OperationKey::new(OperationKind::Reset, None);
        self.mutate(key, Ledger::reset)
    }

    /// Fetches prices and merges them into the ledger.
    ///
    /// Starting a refresh cancels the previous one. A refresh that was cancelled
    /// returns [`PriceError::Cancelled`] and leaves the price table alone.
    pub async fn refresh_prices(&self) -> Result<RefreshReport, PriceError> {
        if self.refresh.is_torn_down() {
            debug!("Tracker is shutting down, not refreshing");
            return Err(PriceError::Cancelled);
        }
        let token = self.refresh.begin();
        let result = self.pipeline.acquire(&token).await;
        if token.is_cancelled() {
            debug!("Discarding result of cancelled refresh");
            return Err(PriceError::Cancelled);
        }
        let Acquisition {
            snapshot,
            mut notices,
        } = result?;

        let missing = snapshot.sell_prices.missing();
        if !missing.is_empty() {
            notices.push(Notice::PartialUpdate { missing });
        }
        let prices = {
            let mut ledger = self.ledger();
            ledger.merge_prices(&snapshot.sell_prices);
            ledger.state().prices
        };
        self.enqueue(Write::Prices(prices), None);
        *self
            .last_snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());

        Ok(RefreshReport { snapshot, notices })
    }

    /// The owner of in-flight refreshes is going away.
    pub fn cancel_refresh(&self) {
        self.refresh.cancel_current();
    }

    pub fn state(&self) -> PortfolioState {
        self.ledger().state().clone()
    }

    pub fn last_snapshot(&self) -> Option<PriceSnapshot> {
        self.last_snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn pipeline(&self) -> &PriceAcquisition {
        &self.pipeline
    }

    pub fn valuation(&self, target: AssetType) -> Valuation {
        analytics::value_portfolio(self.ledger().state(), target)
    }

    pub fn average_cost(&self, asset: AssetType) -> Option<f64> {
        analytics::average_cost(self.ledger().state(), asset)
    }

    pub fn unrealized_gain(&self, asset: AssetType) -> Option<f64> {
        analytics::unrealized_gain(self.ledger().state(), asset)
    }

    /// Waits until every write queued so far has settled.
    pub async fn flush(&self) {
        let (done, settled) = oneshot::channel();
        if self.writer.send(Job::Flush(done)).is_ok() {
            let _ = settled.await;
        }
    }

    /// Cancels refreshes, then drains and stops the writer.
    pub async fn shutdown(self) {
        let Tracker {
            refresh,
            writer,
            writer_task,
            ..
        } = self;
        refresh.teardown();
        drop(writer);
        if let Err(e) = writer_task.await {
            warn!("Persistence writer ended abnormally: {}", e);
        }
    }
}

async fn run_writer(repo: LedgerRepository, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Write { write, permit } => {
                let result = match &write {
                    Write::Ledger(change) => repo.apply(change).await,
                    Write::Prices(prices) => repo.save_prices(prices).await,
                };
                if let Err(e) = result {
                    warn!("Failed to persist change: {:#}", e);
                }
                drop(permit);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Persistence writer stopped");
}
