//! Ordered price acquisition with backup fallback.
//!
//! Providers are tried in priority order; the first snapshot that arrives is
//! saved as the backup and returned. When every provider fails, the last saved
//! snapshot is returned instead, if it is still fresh.

use crate::core::error::{PriceError, ProviderFailures};
use crate::core::guard::FetchLock;
use crate::core::notice::Notice;
use crate::core::price::{PriceProvider, PriceSnapshot};
use crate::providers::util::ConnectivityProbe;
use crate::store::backup::PriceBackupStore;
use crate::store::preferences::Preferences;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A snapshot plus whatever the user should be told about how it was obtained.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub snapshot: PriceSnapshot,
    pub notices: Vec<Notice>,
}

pub struct PriceAcquisition {
    providers: Vec<Arc<dyn PriceProvider>>,
    backup: PriceBackupStore,
    preferences: Preferences,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    fetch_lock: FetchLock,
}

impl PriceAcquisition {
    pub fn new(
        providers: Vec<Arc<dyn PriceProvider>>,
        backup: PriceBackupStore,
        preferences: Preferences,
    ) -> Self {
        Self {
            providers,
            backup,
            preferences,
            probe: None,
            fetch_lock: FetchLock::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_lock.is_held()
    }

    /// Fetches live prices, falling back to the stored backup.
    ///
    /// Rejected with [`PriceError::FetchInProgress`] while another call runs. A
    /// cancelled call returns [`PriceError::Cancelled`] and never writes the backup.
    #[instrument(name = "PriceAcquire", skip_all)]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Acquisition, PriceError> {
        let _permit = self
            .fetch_lock
            .try_acquire()
            .ok_or(PriceError::FetchInProgress)?;

        let mut notices = Vec::new();
        if let Some(probe) = &self.probe
            && !probe.is_online().await
        {
            warn!("Connectivity check reports offline, fetching anyway");
            notices.push(Notice::NoNetwork);
        }

        let failures = match self.fetch_live(cancel).await {
            Ok(snapshot) => return Ok(Acquisition { snapshot, notices }),
            Err(PriceError::AllProvidersFailed(failures)) => failures,
            Err(e) => return Err(e),
        };

        if cancel.is_cancelled() {
            return Err(PriceError::Cancelled);
        }
        let now = Utc::now().timestamp_millis();
        match self.backup.load_checked(now).await {
            Ok(snapshot) => {
                let age_minutes = snapshot.age(now).num_minutes().max(0);
                warn!(age_minutes, "All providers failed ({}), using backup", failures);
                notices.push(Notice::BackupInUse { age_minutes });
                Ok(Acquisition { snapshot, notices })
            }
            Err(reason) => Err(PriceError::BackupUnavailable {
                failures,
                reason: reason.to_string(),
            }),
        }
    }

    async fn fetch_live(&self, cancel: &CancellationToken) -> Result<PriceSnapshot, PriceError> {
        let preference = self.preferences.price_source().await;
        let mut failures = ProviderFailures::default();

        for provider in self
            .providers
            .iter()
            .filter(|p| preference.allows(p.source()))
        {
            if cancel.is_cancelled() {
                return Err(PriceError::Cancelled);
            }
            match provider.fetch_snapshot(cancel).await {
                Ok(mut snapshot) => {
                    // A response that lands after cancellation is discarded.
                    if cancel.is_cancelled() {
                        debug!(provider = provider.name(), "Discarding snapshot of cancelled fetch");
                        return Err(PriceError::Cancelled);
                    }
                    snapshot.is_from_backup = false;
                    if let Err(e) = self.backup.save(&snapshot).await {
                        warn!("Failed to save price backup: {:#}", e);
                    }
                    info!(provider = provider.name(), "Accepted price snapshot");
                    return Ok(snapshot);
                }
                Err(e) if e.is_cancelled() => {
                    debug!(provider = provider.name(), "Price fetch cancelled");
                    return Err(e);
                }
                Err(e) => {
                    warn!(provider = provider.name(), "Price provider failed: {}", e);
                    failures.push(provider.name(), &e);
                }
            }
        }

        if failures.is_empty() {
            failures.push(
                "pipeline",
                format!("no provider enabled for price source '{preference}'"),
            );
        }
        Err(PriceError::AllProvidersFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::AssetType;
    use crate::core::cache::{KeyValueCollection, WriteOp};
    use crate::core::price::{PriceChangeTable, PriceSource, PriceSourcePreference, PriceTable};
    use crate::store::memory::MemoryCollection;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory collection that counts writes.
    #[derive(Default)]
    struct CountingCollection {
        inner: MemoryCollection,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueCollection for CountingCollection {
        async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value).await
        }
        async fn remove(&self, key: &[u8]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key).await
        }
        async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            self.inner.scan_prefix(prefix).await
        }
        async fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.apply(ops).await
        }
        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    enum Behaviour {
        Succeed(f64),
        Fail,
        /// Succeeds, but only after the caller's token was cancelled.
        SucceedAfterCancel(f64),
        WaitForCancel,
    }

    struct FakeProvider {
        name: &'static str,
        source: PriceSource,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, source: PriceSource, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                source,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn snapshot(usd: f64) -> PriceSnapshot {
        let mut sell = PriceTable::new();
        sell.set(AssetType::Usd, Some(usd));
        PriceSnapshot {
            sell_prices: sell,
            buy_prices: None,
            changes: PriceChangeTable::new(),
            fetched_at: Utc::now().timestamp_millis(),
            is_from_backup: false,
        }
    }

    #[async_trait]
    impl PriceProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn source(&self) -> PriceSource {
            self.source
        }

        async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<PriceSnapshot, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed(usd) => Ok(snapshot(usd)),
                Behaviour::Fail => Err(PriceError::http(self.name, "status 502")),
                Behaviour::SucceedAfterCancel(usd) => {
                    cancel.cancel();
                    Ok(snapshot(usd))
                }
                Behaviour::WaitForCancel => {
                    cancel.cancelled().await;
                    Err(PriceError::Cancelled)
                }
            }
        }
    }

    struct Fixture {
        backup_collection: Arc<CountingCollection>,
        prefs_collection: Arc<MemoryCollection>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backup_collection: Arc::new(CountingCollection::default()),
                prefs_collection: Arc::new(MemoryCollection::new()),
            }
        }

        fn pipeline(&self, providers: Vec<Arc<dyn PriceProvider>>) -> PriceAcquisition {
            PriceAcquisition::new(
                providers,
                PriceBackupStore::with_collection(self.backup_collection.clone()),
                Preferences::with_collection(self.prefs_collection.clone()),
            )
        }

        fn backup(&self) -> PriceBackupStore {
            PriceBackupStore::with_collection(self.backup_collection.clone())
        }

        fn writes(&self) -> usize {
            self.backup_collection.writes.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_falls_through_to_next_provider() {
        let fixture = Fixture::new();
        let a = FakeProvider::new("a", PriceSource::Primary, Behaviour::Fail);
        let b = FakeProvider::new("b", PriceSource::Secondary, Behaviour::Succeed(34.5));
        let pipeline = fixture.pipeline(vec![a.clone(), b.clone()]);

        let acquisition = pipeline.acquire(&CancellationToken::new()).await.unwrap();
        assert!(!acquisition.snapshot.is_from_backup);
        assert_eq!(acquisition.snapshot.sell_prices.get(AssetType::Usd), Some(34.5));
        assert!(acquisition.notices.is_empty());
        assert_eq!(fixture.writes(), 1);

        let saved = fixture.backup().load().await.unwrap();
        assert_eq!(saved.sell_prices, acquisition.snapshot.sell_prices);
        assert!(!pipeline.is_fetching());
    }

    #[tokio::test]
    async fn test_first_success_stops_iteration() {
        let fixture = Fixture::new();
        let a = FakeProvider::new("a", PriceSource::Primary, Behaviour::Succeed(30.0));
        let b = FakeProvider::new("b", PriceSource::Secondary, Behaviour::Succeed(31.0));
        let pipeline = fixture.pipeline(vec![a.clone(), b.clone()]);

        pipeline.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_total_failure_uses_backup() {
        let fixture = Fixture::new();
        let mut old = snapshot(33.0);
        old.fetched_at = (Utc::now() - chrono::Duration::hours(2)).timestamp_millis();
        fixture.backup().save(&old).await.unwrap();

        let pipeline = fixture.pipeline(vec![
            FakeProvider::new("a", PriceSource::Primary, Behaviour::Fail),
            FakeProvider::new("b", PriceSource::Secondary, Behaviour::Fail),
        ]);
        let acquisition = pipeline.acquire(&CancellationToken::new()).await.unwrap();
        assert!(acquisition.snapshot.is_from_backup);
        assert_eq!(acquisition.snapshot.sell_prices.get(AssetType::Usd), Some(33.0));
        assert!(matches!(
            acquisition.notices.as_slice(),
            [Notice::BackupInUse { age_minutes }] if (119..=120).contains(age_minutes)
        ));
        // Only the seed write.
        assert_eq!(fixture.writes(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_without_backup_names_every_provider() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![
            FakeProvider::new("primary-api", PriceSource::Primary, Behaviour::Fail),
            FakeProvider::new("market-page", PriceSource::Secondary, Behaviour::Fail),
        ]);

        let err = pipeline.acquire(&CancellationToken::new()).await.unwrap_err();
        let PriceError::BackupUnavailable { failures, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(failures.len(), 2);
        let message = err.to_string();
        assert!(message.contains("primary-api"));
        assert!(message.contains("market-page"));
    }

    #[tokio::test]
    async fn test_stale_backup_is_not_used() {
        let fixture = Fixture::new();
        let mut old = snapshot(33.0);
        old.fetched_at = (Utc::now() - chrono::Duration::hours(25)).timestamp_millis();
        fixture.backup().save(&old).await.unwrap();

        let pipeline = fixture.pipeline(vec![FakeProvider::new(
            "a",
            PriceSource::Primary,
            Behaviour::Fail,
        )]);
        let err = pipeline.acquire(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PriceError::BackupUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_after_response_discards_snapshot() {
        let fixture = Fixture::new();
        let b = FakeProvider::new("b", PriceSource::Secondary, Behaviour::Succeed(40.0));
        let pipeline = fixture.pipeline(vec![
            FakeProvider::new("a", PriceSource::Primary, Behaviour::SucceedAfterCancel(39.0)),
            b.clone(),
        ]);

        let err = pipeline.acquire(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fixture.writes(), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_skips_backup() {
        let fixture = Fixture::new();
        let mut old = snapshot(33.0);
        old.fetched_at = Utc::now().timestamp_millis();
        fixture.backup().save(&old).await.unwrap();

        let pipeline = Arc::new(fixture.pipeline(vec![FakeProvider::new(
            "a",
            PriceSource::Primary,
            Behaviour::WaitForCancel,
        )]));
        let cancel = CancellationToken::new();
        let task = {
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.acquire(&cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(fixture.writes(), 1);
        assert!(!pipeline.is_fetching());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_is_rejected() {
        let fixture = Fixture::new();
        let pipeline = Arc::new(fixture.pipeline(vec![FakeProvider::new(
            "a",
            PriceSource::Primary,
            Behaviour::WaitForCancel,
        )]));
        let cancel = CancellationToken::new();
        let task = {
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.acquire(&cancel).await })
        };
        while !pipeline.is_fetching() {
            tokio::task::yield_now().await;
        }

        let second = pipeline.acquire(&CancellationToken::new()).await;
        assert!(matches!(second, Err(PriceError::FetchInProgress)));

        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        assert!(!pipeline.is_fetching());
    }

    #[tokio::test]
    async fn test_preference_restricts_providers() {
        let fixture = Fixture::new();
        let a = FakeProvider::new("a", PriceSource::Primary, Behaviour::Succeed(30.0));
        let b = FakeProvider::new("b", PriceSource::Secondary, Behaviour::Succeed(31.0));
        let pipeline = fixture.pipeline(vec![a.clone(), b.clone()]);
        pipeline
            .preferences()
            .set_price_source(PriceSourcePreference::Secondary)
            .await
            .unwrap();

        let acquisition = pipeline.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(acquisition.snapshot.sell_prices.get(AssetType::Usd), Some(31.0));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    struct Offline;

    #[async_trait]
    impl ConnectivityProbe for Offline {
        async fn is_online(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_offline_probe_is_advisory() {
        let fixture = Fixture::new();
        let pipeline = fixture
            .pipeline(vec![FakeProvider::new(
                "a",
                PriceSource::Primary,
                Behaviour::Succeed(30.0),
            )])
            .with_probe(Arc::new(Offline));

        let acquisition = pipeline.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(acquisition.notices, vec![Notice::NoNetwork]);
        assert!(!acquisition.snapshot.is_from_backup);
    }
}
