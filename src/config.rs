use clap::Parser;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::live_feed::provider::default_base_url;
use crate::live_feed::{SchedulerSettings, Sport};

/// Live sports feed ingestion service
#[derive(Parser, Debug, Clone)]
#[command(name = "livefeed", version, about)]
pub struct Config {
    /// API-Sports keys, comma separated; rotated as quotas run out
    #[arg(long, env = "API_SPORTS_KEYS", value_delimiter = ',', required = true)]
    pub api_keys: Vec<String>,

    /// Football API base URL
    #[arg(long, env = "FOOTBALL_API_URL")]
    pub football_api_url: Option<String>,

    /// Basketball API base URL
    #[arg(long, env = "BASKETBALL_API_URL")]
    pub basketball_api_url: Option<String>,

    /// Hockey API base URL
    #[arg(long, env = "HOCKEY_API_URL")]
    pub hockey_api_url: Option<String>,

    /// Volleyball API base URL
    #[arg(long, env = "VOLLEYBALL_API_URL")]
    pub volleyball_api_url: Option<String>,

    /// Baseball API base URL
    #[arg(long, env = "BASEBALL_API_URL")]
    pub baseball_api_url: Option<String>,

    /// Per-request HTTP timeout in seconds (8–15)
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,

    /// Feed API listen address
    #[arg(long, env = "FEED_ADDR", default_value = "0.0.0.0:8080")]
    pub feed_addr: String,

    /// SQLite database path (favorites)
    #[arg(long, env = "DATABASE_PATH", default_value = "livefeed.db")]
    pub database_path: String,

    /// Matches kept per sport per poll
    #[arg(long, env = "MAX_MATCHES_PER_SPORT", default_value = "9")]
    pub max_matches_per_sport: usize,

    /// Seconds between match-clock updates
    #[arg(long, env = "TIMING_INTERVAL_SECS", default_value = "30")]
    pub timing_interval_secs: u64,

    /// Include per-key usage in the published snapshot
    #[arg(long, env = "PUBLISH_QUOTA", default_value = "false")]
    pub publish_quota: bool,

    /// Mount the credential debug routes (never expose publicly)
    #[arg(long, env = "ENABLE_DEBUG_ROUTES", default_value = "false")]
    pub enable_debug_routes: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_keys().is_empty() {
            anyhow::bail!("API_SPORTS_KEYS must contain at least one key");
        }
        if !(8..=15).contains(&self.http_timeout_secs) {
            anyhow::bail!("http_timeout_secs must be between 8 and 15");
        }
        if self.max_matches_per_sport == 0 {
            anyhow::bail!("max_matches_per_sport must be positive");
        }
        if self.timing_interval_secs == 0 {
            anyhow::bail!("timing_interval_secs must be positive");
        }
        Ok(())
    }

    /// Configured keys with blanks and surrounding whitespace removed.
    pub fn api_keys(&self) -> Vec<String> {
        self.api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn base_urls(&self) -> BTreeMap<Sport, String> {
        Sport::ALL
            .into_iter()
            .map(|sport| {
                let configured = match sport {
                    Sport::Football => &self.football_api_url,
                    Sport::Basketball => &self.basketball_api_url,
                    Sport::Hockey => &self.hockey_api_url,
                    Sport::Volleyball => &self.volleyball_api_url,
                    Sport::Baseball => &self.baseball_api_url,
                };
                let url = configured
                    .clone()
                    .unwrap_or_else(|| default_base_url(sport));
                (sport, url)
            })
            .collect()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            timing_interval: Duration::from_secs(self.timing_interval_secs),
            publish_quota: self.publish_quota,
            ..SchedulerSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("livefeed").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--api-keys", "k1, k2,,k3"]);
        assert_eq!(config.api_keys(), vec!["k1", "k2", "k3"]);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.max_matches_per_sport, 9);
        assert!(!config.enable_debug_routes);
        assert!(config.validate().is_ok());

        let urls = config.base_urls();
        assert_eq!(urls[&Sport::Football], "https://v3.football.api-sports.io");
        assert_eq!(urls[&Sport::Baseball], "https://v1.baseball.api-sports.io");
    }

    #[test]
    fn test_url_override() {
        let config = parse(&["--api-keys", "k1", "--hockey-api-url", "http://localhost:9000"]);
        assert_eq!(config.base_urls()[&Sport::Hockey], "http://localhost:9000");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--api-keys", " , "]).validate().is_err());
        assert!(parse(&["--api-keys", "k1", "--http-timeout-secs", "30"]).validate().is_err());
        assert!(parse(&["--api-keys", "k1", "--max-matches-per-sport", "0"]).validate().is_err());
    }

    #[test]
    fn test_scheduler_settings() {
        let settings = parse(&["--api-keys", "k1", "--publish-quota"]).scheduler_settings();
        assert!(settings.publish_quota);
        assert_eq!(settings.timing_interval, Duration::from_secs(30));
        assert_eq!(settings.max_refresh_jitter, Duration::from_secs(10));
    }
}
