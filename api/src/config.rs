use common::models::{default_coins, CoinId};
use common::{Error, Result};
use connectors::coingecko::CoinGeckoConfig;
use engine::{PollerConfig, DEFAULT_QUEUE_CAPACITY};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub coingecko: CoinGeckoConfig,
    pub poll_interval: Duration,
    pub fallback_trending_count: usize,
    pub fallback_coin_ids: Vec<CoinId>,
    pub outbound_queue_capacity: usize,
    pub shutdown_grace: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let poller = PollerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            coingecko: CoinGeckoConfig::default(),
            poll_interval: poller.interval,
            fallback_trending_count: poller.fallback_count,
            fallback_coin_ids: default_coins().into_iter().map(|c| c.id).collect(),
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Absent or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let host = lookup("API_HOST").unwrap_or(defaults.host);
        let port = parse_or(lookup("API_PORT"), defaults.port);

        let poll_secs = parsed("POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval.as_secs());
        if poll_secs == 0 {
            return Err(Error::ConfigError(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let coingecko = CoinGeckoConfig {
            base_url: lookup("COINGECKO_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.coingecko.base_url),
            api_key: lookup("COINGECKO_API_KEY").filter(|k| !k.trim().is_empty()),
            timeout: parsed("COINGECKO_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.coingecko.timeout),
            max_ids_per_call: parse_or(
                lookup("COINGECKO_MAX_IDS_PER_CALL"),
                defaults.coingecko.max_ids_per_call,
            )
            .max(1),
        };

        let fallback_coin_ids = match lookup("FALLBACK_COIN_IDS") {
            Some(list) => list
                .split(',')
                .map(|id| id.trim().to_lowercase())
                .filter(|id| !id.is_empty())
                .collect(),
            None => defaults.fallback_coin_ids,
        };

        Ok(Self {
            host,
            port,
            coingecko,
            poll_interval: Duration::from_secs(poll_secs),
            fallback_trending_count: parse_or(
                lookup("FALLBACK_TRENDING_COUNT"),
                defaults.fallback_trending_count,
            ),
            fallback_coin_ids,
            outbound_queue_capacity: parse_or(
                lookup("OUTBOUND_QUEUE_CAPACITY"),
                defaults.outbound_queue_capacity,
            )
            .max(1),
            shutdown_grace: parsed("SHUTDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        })
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            fallback_count: self.fallback_trending_count,
            fallback_coin_ids: self.fallback_coin_ids.clone(),
            fetch_timeout: self.coingecko.timeout,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ApiConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.fallback_trending_count, 10);
        assert_eq!(config.fallback_coin_ids.len(), 5);
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.coingecko.max_ids_per_call, 250);
        assert!(config.coingecko.api_key.is_none());
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = config_from(&[("API_PORT", "http"), ("POLL_INTERVAL_SECS", "soon")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = config_from(&[("POLL_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("API_PORT", "8080"),
            ("COINGECKO_API_URL", "https://pro-api.coingecko.com/api/v3/"),
            ("COINGECKO_API_KEY", "secret"),
            ("FALLBACK_COIN_IDS", " Bitcoin, ,dogecoin"),
            ("POLL_INTERVAL_SECS", "15"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.coingecko.base_url, "https://pro-api.coingecko.com/api/v3");
        assert_eq!(config.coingecko.api_key.as_deref(), Some("secret"));
        assert_eq!(config.fallback_coin_ids, vec!["bitcoin", "dogecoin"]);
        assert_eq!(config.poller_config().interval, Duration::from_secs(15));
    }
}
