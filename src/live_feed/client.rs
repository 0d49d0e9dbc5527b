use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::credentials::{Credential, CredentialPool};
use super::models::Sport;
use super::normalizer::raw_is_live;
use super::provider::{ApiTransport, ProviderError, Query, TransportError};

/// Attempts per call that may be spent on transient failures.
pub const MAX_ATTEMPTS: u32 = 3;
/// Credential switches per call before giving up on the pool.
pub const MAX_CREDENTIAL_SWITCHES: u32 = 5;
/// Records kept per sport per poll.
pub const DEFAULT_MAX_RECORDS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no usable credential")]
    NoCredential,
    #[error("gave up after {0} credential switches")]
    CredentialSwitchLimit(u32),
    #[error("retries exhausted: {0}")]
    RetriesExhausted(TransportError),
    #[error(transparent)]
    Transport(TransportError),
    #[error(transparent)]
    Provider(ProviderError),
}

/// Fetches raw records for one sport, rotating keys and backing off as needed.
pub struct SportClient {
    transport: Arc<dyn ApiTransport>,
    pool: Arc<CredentialPool>,
    backoff_base: Duration,
    max_records: usize,
}

impl SportClient {
    pub fn new(transport: Arc<dyn ApiTransport>, pool: Arc<CredentialPool>) -> Self {
        SportClient {
            transport,
            pool,
            backoff_base: Duration::from_millis(500),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// One logical query against the provider.
    ///
    /// Quota, throttle and suspension responses swap the key and retry
    /// straight away without touching the attempt budget. Only a daily quota
    /// reply parks the key. 5xx and connection failures back
    /// off exponentially and do. Anything else fails the call.
    pub async fn fetch(
        &self,
        sport: Sport,
        query: Query,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let mut credential = self.next_credential(sport).await?;
        let mut attempts = 0u32;
        let mut switches = 0u32;

        loop {
            self.pool.record_usage(sport, credential.index);
            let outcome = self
                .transport
                .get(sport, &credential.secret, query)
                .await;

            let rotate = match outcome {
                Ok(envelope) => match envelope.provider_error() {
                    None => return Ok(envelope.into_records()),
                    Some(ProviderError::QuotaExceeded(msg)) => {
                        info!("[{}] Key {} hit quota mid-call: {}", sport, credential.masked(), msg);
                        self.pool.mark_exhausted(sport, credential.index);
                        true
                    }
                    Some(ProviderError::Suspended(msg)) => {
                        warn!("[{}] Key {} suspended mid-call: {}", sport, credential.masked(), msg);
                        self.pool.suspend(credential.index);
                        true
                    }
                    Some(ProviderError::RateLimited(msg)) => {
                        info!("[{}] Key {} throttled mid-call: {}", sport, credential.masked(), msg);
                        self.pool.pass_over(sport, credential.index);
                        true
                    }
                    Some(err @ ProviderError::Rejected(_)) => return Err(FetchError::Provider(err)),
                },
                Err(e) if e.is_rate_limited() => {
                    info!("[{}] Key {} throttled (429)", sport, credential.masked());
                    self.pool.pass_over(sport, credential.index);
                    true
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(FetchError::RetriesExhausted(e));
                    }
                    let delay = self.backoff_base * 2u32.pow(attempts - 1);
                    warn!(
                        "[{}] {:?} failed ({}), retry {}/{} in {:?}",
                        sport, query, e, attempts, MAX_ATTEMPTS - 1, delay
                    );
                    tokio::time::sleep(delay).await;
                    false
                }
                Err(e) => return Err(FetchError::Transport(e)),
            };

            if rotate {
                switches += 1;
                if switches > MAX_CREDENTIAL_SWITCHES {
                    return Err(FetchError::CredentialSwitchLimit(MAX_CREDENTIAL_SWITCHES));
                }
                credential = self.next_credential(sport).await?;
            }
        }
    }

    async fn next_credential(&self, sport: Sport) -> Result<Credential, FetchError> {
        self.pool
            .select_credential(sport)
            .await
            .ok_or(FetchError::NoCredential)
    }

    /// Raw records for a sport's poll, capped and in provider order.
    ///
    /// Football asks for in-play fixtures and falls back to today's list
    /// filtered to in-play statuses. The other sports ask for today's list
    /// (live and upcoming) and fall back to in-play only.
    pub async fn fetch_matches(&self, sport: Sport) -> Result<Vec<serde_json::Value>, FetchError> {
        let (primary, fallback) = match sport {
            Sport::Football => (Query::Live, Query::Today),
            _ => (Query::Today, Query::Live),
        };

        let records = match self.fetch(sport, primary).await {
            Ok(records) => records,
            Err(e) => {
                warn!("[{}] {:?} query failed ({}), falling back to {:?}", sport, primary, e, fallback);
                let records = self.fetch(sport, fallback).await?;
                if sport == Sport::Football {
                    records
                        .into_iter()
                        .filter(|r| raw_is_live(sport, r))
                        .collect()
                } else {
                    records
                }
            }
        };

        let total = records.len();
        let capped: Vec<_> = records.into_iter().take(self.max_records).collect();
        debug!("[{}] {} record(s) received, {} kept", sport, total, capped.len());
        Ok(capped)
    }
}
