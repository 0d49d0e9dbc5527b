//! The two periodic tasks that keep the snapshot fresh.
//!
//! ```text
//!  refresh task ──(interval from usable key count)──▶ 5 × SportClient ─┐
//!        ▲                                                              │ normalize
//!        └── CredentialPool usable-count watch                          ▼
//!                                                            SnapshotStore::publish
//!  timing task ──(every 30 s, no network)──▶ timing::advance ───────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::SportClient;
use super::credentials::CredentialPool;
use super::models::{Snapshot, Sport, SportsMap};
use super::normalizer::normalize;
use super::store::SnapshotStore;
use super::timing::{advance, finished_ids};

/// Persistence-side hook invoked when matches are seen finished.
#[async_trait]
pub trait FavoritesCleanup: Send + Sync {
    async fn remove_finished_favorites(&self, match_ids: &[String]) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub timing_interval: Duration,
    /// Upper bound of the random delay before each sport's fetch.
    pub max_start_stagger: Duration,
    /// Upper bound of the random delay added to each refresh interval.
    pub max_refresh_jitter: Duration,
    pub publish_quota: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            timing_interval: Duration::from_secs(30),
            max_start_stagger: Duration::from_secs(2),
            max_refresh_jitter: Duration::from_secs(10),
            publish_quota: false,
        }
    }
}

/// Pool refresh cadence for a given number of non-suspended keys.
pub fn refresh_interval(usable_keys: usize) -> Duration {
    let minutes = match usable_keys {
        0 => 30,
        1 => 15,
        2 => 10,
        _ => 5,
    };
    Duration::from_secs(minutes * 60)
}

fn random_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

pub struct RefreshScheduler {
    pool: Arc<CredentialPool>,
    client: Arc<SportClient>,
    store: Arc<SnapshotStore>,
    favorites: Option<Arc<dyn FavoritesCleanup>>,
    settings: SchedulerSettings,
    /// Both tasks publish; this keeps their read-modify-publish steps apart.
    publish_lock: Mutex<()>,
    /// Finished ids already handed to the favorites hook since the last refresh.
    cleaned: Arc<Mutex<HashSet<String>>>,
}

impl RefreshScheduler {
    pub fn new(
        client: Arc<SportClient>,
        store: Arc<SnapshotStore>,
        settings: SchedulerSettings,
    ) -> Self {
        RefreshScheduler {
            pool: Arc::clone(client.pool()),
            client,
            store,
            favorites: None,
            settings,
            publish_lock: Mutex::new(()),
            cleaned: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_favorites(mut self, favorites: Arc<dyn FavoritesCleanup>) -> Self {
        self.favorites = Some(favorites);
        self
    }

    /// Fetch every sport concurrently and publish one merged snapshot.
    ///
    /// Never fails: a sport whose fetch fails is published empty and listed
    /// as stale, without holding back the others.
    pub async fn refresh_once(&self) -> Arc<Snapshot> {
        let started = Instant::now();

        let fetches = Sport::ALL.into_iter().map(|sport| async move {
            tokio::time::sleep(random_delay(self.settings.max_start_stagger)).await;
            (sport, self.client.fetch_matches(sport).await)
        });
        let results = futures_util::future::join_all(fetches).await;

        let mut sports = SportsMap::new();
        let mut stale = Vec::new();
        for (sport, result) in results {
            match result {
                Ok(records) => {
                    let matches: Vec<_> = records
                        .iter()
                        .filter_map(|raw| normalize(raw, sport))
                        .collect();
                    if matches.len() < records.len() {
                        debug!(
                            "[{}] Dropped {} malformed record(s)",
                            sport,
                            records.len() - matches.len()
                        );
                    }
                    sports.insert(sport, matches);
                }
                Err(e) => {
                    warn!("[{}] No data this cycle: {}", sport, e);
                    stale.push(sport);
                    sports.insert(sport, Vec::new());
                }
            }
        }

        let total: usize = sports.values().map(Vec::len).sum();
        let mut snapshot = Snapshot {
            updated_at: Utc::now(),
            sports,
            quota: self
                .settings
                .publish_quota
                .then(|| self.pool.quota_report()),
            stale,
        };
        info!(
            "Refresh complete: {} match(es), {} stale sport(s), took {:?}",
            total,
            snapshot.stale.len(),
            started.elapsed()
        );

        let _publishing = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // a timing tick may have published while the fetches were in flight
        snapshot.updated_at = snapshot.updated_at.max(self.store.read().updated_at);
        self.store.publish(snapshot);
        self.cleaned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.store.read()
    }

    /// Advance match clocks on the published snapshot. Returns whether a new
    /// snapshot was published.
    pub fn timing_tick(&self, now: DateTime<Utc>) -> bool {
        let _publishing = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.store.read();
        let sports = advance(&current.sports, now);

        self.cleanup_favorites(finished_ids(&sports));

        if sports == current.sports {
            return false;
        }
        self.store.publish(Snapshot {
            updated_at: now.max(current.updated_at),
            sports,
            quota: current.quota.clone(),
            stale: current.stale.clone(),
        });
        true
    }

    /// Fire-and-forget; failures are logged and the ids retried next tick.
    fn cleanup_favorites(&self, match_ids: Vec<String>) {
        let Some(favorites) = self.favorites.clone() else {
            return;
        };
        let match_ids: Vec<String> = {
            let mut cleaned = self.cleaned.lock().unwrap_or_else(PoisonError::into_inner);
            match_ids
                .into_iter()
                .filter(|id| cleaned.insert(id.clone()))
                .collect()
        };
        if match_ids.is_empty() {
            return;
        }
        let cleaned = Arc::clone(&self.cleaned);
        tokio::spawn(async move {
            match favorites.remove_finished_favorites(&match_ids).await {
                Ok(0) => {}
                Ok(n) => info!("Removed {} favorite(s) for finished matches", n),
                Err(e) => {
                    warn!("Favorites cleanup failed: {}", e);
                    let mut cleaned = cleaned.lock().unwrap_or_else(PoisonError::into_inner);
                    for id in &match_ids {
                        cleaned.remove(id);
                    }
                }
            }
        });
    }

    /// Spawn the refresh and timing tasks.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresh = tokio::spawn(Arc::clone(&self).refresh_loop(shutdown_rx.clone()));
        let timing = tokio::spawn(self.timing_loop(shutdown_rx));
        SchedulerHandle {
            shutdown_tx,
            tasks: vec![refresh, timing],
        }
    }

    async fn refresh_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut usable_rx = self.pool.subscribe();
        let mut last_run = Instant::now();
        self.refresh_once().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            usable_rx.borrow_and_update();
            let usable = self.pool.usable_count();
            let deadline = last_run
                + refresh_interval(usable)
                + random_delay(self.settings.max_refresh_jitter);
            info!(
                "Next refresh in {:?} ({} usable key(s))",
                deadline.saturating_duration_since(Instant::now()),
                usable
            );

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    last_run = Instant::now();
                    self.refresh_once().await;
                }
                Ok(()) = usable_rx.changed() => {
                    info!("Usable key count changed, rescheduling refresh");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Refresh task stopped");
    }

    async fn timing_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.timing_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.timing_tick(Utc::now()) {
                        debug!("Timing tick published a new snapshot");
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("Timing task stopped");
    }
}

/// Running scheduler tasks; `shutdown` stops both and waits for them.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}
