use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::models::Sport;

/// Header API-Sports reads the credential from.
pub const API_KEY_HEADER: &str = "x-apisports-key";

/// Which result set to ask the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// All fixtures currently in play.
    Live,
    /// All fixtures scheduled for the current UTC date (live and upcoming).
    Today,
}

impl Query {
    fn params(&self, today: NaiveDate) -> Vec<(&'static str, String)> {
        match self {
            Query::Live => vec![("live", "all".to_string())],
            Query::Today => vec![("date", today.format("%Y-%m-%d").to_string())],
        }
    }
}

/// Failure below the provider envelope: HTTP status, network, or body decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::Status(429))
    }

    /// 5xx and dropped connections are worth a backoff-and-retry.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status(code) => *code >= 500,
            TransportError::Connection(_) => true,
            TransportError::Decode(_) => false,
        }
    }
}

/// Error reported inside a 200 envelope via its `errors` object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("account suspended: {0}")]
    Suspended(String),
    #[error("request quota exhausted: {0}")]
    QuotaExceeded(String),
    /// Short-window throttle; the daily budget is untouched.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Response envelope shared by every API-Sports endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: serde_json::Value,
    /// `[]` when the call succeeded, an object keyed by error kind otherwise.
    #[serde(default)]
    pub errors: serde_json::Value,
}

impl Envelope {
    pub fn records(records: Vec<serde_json::Value>) -> Self {
        Envelope {
            response: serde_json::Value::Array(records),
            errors: serde_json::Value::Array(vec![]),
        }
    }

    pub fn with_error(key: &str, message: &str) -> Self {
        let mut errors = serde_json::Map::new();
        errors.insert(key.to_string(), serde_json::Value::String(message.to_string()));
        Envelope {
            response: serde_json::Value::Array(vec![]),
            errors: serde_json::Value::Object(errors),
        }
    }

    pub fn provider_error(&self) -> Option<ProviderError> {
        let errors = self.errors.as_object()?;
        if errors.is_empty() {
            return None;
        }
        let message = |key: &str| {
            errors
                .get(key)
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default()
        };
        if errors.contains_key("access") {
            return Some(ProviderError::Suspended(message("access")));
        }
        if errors.contains_key("requests") {
            return Some(ProviderError::QuotaExceeded(message("requests")));
        }
        if errors.contains_key("rateLimit") {
            return Some(ProviderError::RateLimited(message("rateLimit")));
        }
        Some(ProviderError::Rejected(
            serde_json::Value::Object(errors.clone()).to_string(),
        ))
    }

    pub fn into_records(self) -> Vec<serde_json::Value> {
        match self.response {
            serde_json::Value::Array(records) => records,
            _ => Vec::new(),
        }
    }
}

/// Raw access to the provider. One call, one credential, one quota unit.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(
        &self,
        sport: Sport,
        api_key: &str,
        query: Query,
    ) -> std::result::Result<Envelope, TransportError>;
}

/// API-Sports over HTTPS, one base URL per sport.
pub struct ApiSportsHttp {
    http: Client,
    base_urls: BTreeMap<Sport, String>,
}

impl ApiSportsHttp {
    pub fn new(base_urls: BTreeMap<Sport, String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiSportsHttp { http, base_urls })
    }

    fn endpoint(&self, sport: Sport, query: Query) -> std::result::Result<Url, TransportError> {
        let base = self
            .base_urls
            .get(&sport)
            .ok_or_else(|| TransportError::Connection(format!("no base URL for {}", sport)))?;
        let path = match sport {
            Sport::Football => "fixtures",
            _ => "games",
        };
        let url = format!("{}/{}", base.trim_end_matches('/'), path);
        Url::parse_with_params(&url, query.params(Utc::now().date_naive()))
            .map_err(|e| TransportError::Connection(format!("bad URL {}: {}", url, e)))
    }
}

#[async_trait]
impl ApiTransport for ApiSportsHttp {
    async fn get(
        &self,
        sport: Sport,
        api_key: &str,
        query: Query,
    ) -> std::result::Result<Envelope, TransportError> {
        let url = self.endpoint(sport, query)?;
        debug!("[{}] GET {}", sport, url);

        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        resp.json::<Envelope>().await.map_err(|e| {
            if e.is_decode() {
                TransportError::Decode(e.to_string())
            } else {
                TransportError::Connection(e.to_string())
            }
        })
    }
}

pub fn default_base_url(sport: Sport) -> String {
    match sport {
        Sport::Football => "https://v3.football.api-sports.io".to_string(),
        other => format!("https://v1.{}.api-sports.io", other),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_has_no_error() {
        let env: Envelope =
            serde_json::from_str(r#"{"get":"fixtures","errors":[],"results":0,"response":[]}"#)
                .unwrap();
        assert_eq!(env.provider_error(), None);
        assert!(env.into_records().is_empty());
    }

    #[test]
    fn test_envelope_distinguishes_suspension_and_quota() {
        let env: Envelope = serde_json::from_str(
            r#"{"errors":{"access":"Your account is suspended"},"response":[]}"#,
        )
        .unwrap();
        assert!(matches!(env.provider_error(), Some(ProviderError::Suspended(_))));

        let env: Envelope = serde_json::from_str(
            r#"{"errors":{"requests":"You have reached the request limit for the day"},"response":[]}"#,
        )
        .unwrap();
        assert!(matches!(env.provider_error(), Some(ProviderError::QuotaExceeded(_))));

        let env: Envelope =
            serde_json::from_str(r#"{"errors":{"rateLimit":"Too many requests"},"response":[]}"#)
                .unwrap();
        assert!(matches!(env.provider_error(), Some(ProviderError::RateLimited(_))));

        let env: Envelope =
            serde_json::from_str(r#"{"errors":{"token":"Error/Missing application key"}}"#).unwrap();
        assert!(matches!(env.provider_error(), Some(ProviderError::Rejected(_))));
    }

    #[test]
    fn test_transport_error_classes() {
        assert!(TransportError::Status(429).is_rate_limited());
        assert!(TransportError::Status(503).is_transient());
        assert!(TransportError::Connection("reset".into()).is_transient());
        assert!(!TransportError::Status(404).is_transient());
        assert!(!TransportError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_endpoint_paths() {
        let urls = Sport::ALL.into_iter().map(|s| (s, default_base_url(s))).collect();
        let http = ApiSportsHttp::new(urls, Duration::from_secs(10)).unwrap();

        let football = http.endpoint(Sport::Football, Query::Live).unwrap();
        assert_eq!(football.as_str(), "https://v3.football.api-sports.io/fixtures?live=all");

        let hockey = http.endpoint(Sport::Hockey, Query::Today).unwrap();
        assert_eq!(hockey.host_str(), Some("v1.hockey.api-sports.io"));
        assert_eq!(hockey.path(), "/games");
        assert!(hockey.query().unwrap().starts_with("date="));
    }
}
