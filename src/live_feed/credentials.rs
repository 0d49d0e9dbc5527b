//! API credential rotation.
//!
//! Every sport vertical keeps its own usage counters and rotation cursor over
//! the same list of keys, so one vertical can run dry while the others keep
//! going. Suspension is account-wide: once the provider reports a key's
//! account as blocked, no vertical will use it again until restart.
//!
//! Local counters cannot see limits the provider applies out-of-band, so each
//! selection confirms the candidate with a live call before handing it out.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::models::{QuotaReport, Sport};
use super::provider::{ApiTransport, ProviderError, Query};

/// Provider's daily request cap per key.
pub const DAILY_REQUEST_LIMIT: u32 = 100;

/// A key handed out by the pool for one or more calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub index: usize,
    pub secret: String,
}

impl Credential {
    pub fn masked(&self) -> String {
        mask_key(&self.secret)
    }
}

/// Operator-facing view of one key in one sport vertical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub index: usize,
    pub masked_key: String,
    pub used_today: u32,
    pub suspended: bool,
    pub available: bool,
}

#[derive(Debug, Clone)]
struct SportUsage {
    used: Vec<u32>,
    cursor: usize,
}

#[derive(Debug)]
struct PoolState {
    day: NaiveDate,
    suspended: Vec<bool>,
    usage: [SportUsage; 5],
}

impl PoolState {
    /// Usage counters reset at UTC midnight; suspensions never do.
    fn roll_day(&mut self, today: NaiveDate) {
        if today != self.day {
            info!("New UTC day {}: resetting credential usage counters", today);
            self.day = today;
            for usage in self.usage.iter_mut() {
                usage.used.iter_mut().for_each(|u| *u = 0);
            }
        }
    }

    fn is_eligible(&self, sport: Sport, index: usize) -> bool {
        !self.suspended[index] && self.usage[sport.index()].used[index] < DAILY_REQUEST_LIMIT
    }

    fn usable_count(&self) -> usize {
        self.suspended.iter().filter(|s| !**s).count()
    }
}

pub struct CredentialPool {
    secrets: Vec<String>,
    transport: Arc<dyn ApiTransport>,
    state: Mutex<PoolState>,
    /// Held across the verification call so one sport never hands the same
    /// near-exhausted key to two concurrent fetches.
    selection: [tokio::sync::Mutex<()>; 5],
    usable_tx: watch::Sender<usize>,
}

impl CredentialPool {
    pub fn new(secrets: Vec<String>, transport: Arc<dyn ApiTransport>) -> Self {
        let n = secrets.len();
        let usage = std::array::from_fn(|_| SportUsage {
            used: vec![0; n],
            cursor: 0,
        });
        let (usable_tx, _) = watch::channel(n);
        CredentialPool {
            secrets,
            transport,
            state: Mutex::new(PoolState {
                day: Utc::now().date_naive(),
                suspended: vec![false; n],
                usage,
            }),
            selection: std::array::from_fn(|_| tokio::sync::Mutex::new(())),
            usable_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.roll_day(Utc::now().date_naive());
        state
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Receiver that observes the usable (non-suspended) key count whenever a
    /// suspension changes it.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.usable_tx.subscribe()
    }

    pub fn usable_count(&self) -> usize {
        self.state().usable_count()
    }

    #[cfg(test)]
    pub fn is_suspended(&self, index: usize) -> bool {
        self.state().suspended.get(index).copied().unwrap_or(false)
    }

    #[cfg(test)]
    pub fn used_today(&self, sport: Sport, index: usize) -> u32 {
        self.state().usage[sport.index()]
            .used
            .get(index)
            .copied()
            .unwrap_or(0)
    }

    /// Pick the next usable key for `sport`, confirming it with a live call.
    ///
    /// Probes the ring from the sport's cursor. Keys reported suspended are
    /// removed for every sport; keys reported over quota are parked for this
    /// sport until midnight. A throttled key is only passed over for this
    /// selection. The cursor stays on the selected key.
    pub async fn select_credential(&self, sport: Sport) -> Option<Credential> {
        let _serialized = self.selection[sport.index()].lock().await;

        let n = self.secrets.len();
        let start = self.state().usage[sport.index()].cursor;

        for offset in 0..n {
            let index = (start + offset) % n;
            if !self.state().is_eligible(sport, index) {
                continue;
            }

            let secret = &self.secrets[index];
            self.record_usage(sport, index);
            match self.transport.get(sport, secret, Query::Live).await {
                Ok(envelope) => match envelope.provider_error() {
                    Some(ProviderError::Suspended(msg)) => {
                        warn!("[{}] Key {} suspended: {}", sport, mask_key(secret), msg);
                        self.suspend(index);
                        continue;
                    }
                    Some(ProviderError::QuotaExceeded(msg)) => {
                        warn!("[{}] Key {} over quota: {}", sport, mask_key(secret), msg);
                        self.mark_exhausted(sport, index);
                        continue;
                    }
                    Some(ProviderError::RateLimited(msg)) => {
                        info!("[{}] Key {} throttled, trying next: {}", sport, mask_key(secret), msg);
                        continue;
                    }
                    _ => {}
                },
                Err(e) if e.is_rate_limited() => {
                    info!("[{}] Key {} throttled (429), trying next", sport, mask_key(secret));
                    continue;
                }
                Err(e) => {
                    debug!(
                        "[{}] Verification of key {} inconclusive ({}), using it",
                        sport,
                        mask_key(secret),
                        e
                    );
                }
            }

            self.state().usage[sport.index()].cursor = index;
            debug!("[{}] Selected key #{} ({})", sport, index, mask_key(secret));
            return Some(Credential {
                index,
                secret: secret.clone(),
            });
        }

        warn!("[{}] No usable credential: all keys exhausted or suspended", sport);
        None
    }

    /// Count one provider call against `index` for `sport`.
    pub fn record_usage(&self, sport: Sport, index: usize) {
        if let Some(used) = self.state().usage[sport.index()].used.get_mut(index) {
            *used = used.saturating_add(1);
        }
    }

    /// Park a key for `sport` until the next UTC midnight.
    pub fn mark_exhausted(&self, sport: Sport, index: usize) {
        if let Some(used) = self.state().usage[sport.index()].used.get_mut(index) {
            *used = (*used).max(DAILY_REQUEST_LIMIT);
        }
    }

    /// Move the sport's cursor past a throttled key without parking it.
    pub fn pass_over(&self, sport: Sport, index: usize) {
        let n = self.secrets.len();
        if n == 0 {
            return;
        }
        let mut state = self.state();
        let usage = &mut state.usage[sport.index()];
        if usage.cursor == index {
            usage.cursor = (index + 1) % n;
        }
    }

    /// Remove a key from rotation for every sport, for the process lifetime.
    pub fn suspend(&self, index: usize) {
        let usable = {
            let mut state = self.state();
            match state.suspended.get_mut(index) {
                Some(flag) if !*flag => *flag = true,
                _ => return,
            }
            state.usable_count()
        };
        warn!(
            "Key #{} ({}) suspended for all sports; {} usable key(s) left",
            index,
            mask_key(&self.secrets[index]),
            usable
        );
        self.usable_tx.send_replace(usable);
    }

    pub fn status_report(&self, sport: Sport) -> Vec<CredentialStatus> {
        let state = self.state();
        let usage = &state.usage[sport.index()];
        self.secrets
            .iter()
            .enumerate()
            .map(|(index, secret)| CredentialStatus {
                index,
                masked_key: mask_key(secret),
                used_today: usage.used[index],
                suspended: state.suspended[index],
                available: state.is_eligible(sport, index),
            })
            .collect()
    }

    pub fn quota_report(&self) -> QuotaReport {
        let state = self.state();
        Sport::ALL
            .into_iter()
            .map(|sport| {
                let per_key = self
                    .secrets
                    .iter()
                    .enumerate()
                    .map(|(index, secret)| {
                        (
                            format!("#{} {}", index, mask_key(secret)),
                            state.usage[sport.index()].used[index],
                        )
                    })
                    .collect();
                (sport, per_key)
            })
            .collect()
    }

    /// Operator hook: mark one key (or every key) exhausted for `sport`.
    pub fn simulate_exhaustion(&self, sport: Sport, index: Option<usize>) -> Result<usize> {
        let targets: Vec<usize> = match index {
            Some(i) if i < self.secrets.len() => vec![i],
            Some(i) => anyhow::bail!(
                "credential index {} out of range (pool has {})",
                i,
                self.secrets.len()
            ),
            None => (0..self.secrets.len()).collect(),
        };
        for &i in &targets {
            self.mark_exhausted(sport, i);
        }
        info!("[{}] Simulated exhaustion of {} key(s)", sport, targets.len());
        Ok(targets.len())
    }

    #[cfg(test)]
    fn roll_day(&self, today: NaiveDate) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .roll_day(today);
    }
}

/// Show only the edges of a key, e.g. `abcd…wxyz`.
pub fn mask_key(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
