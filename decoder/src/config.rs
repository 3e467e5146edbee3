use std::{collections::HashMap, time::Duration};

use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use thiserror::Error;

/// Largest number of accounts a single `getMultipleAccounts` call accepts.
pub const MAX_ACCOUNTS_PER_CALL: usize = 100;

/// Endpoints and tuning shared by the loader and the subscription manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// JSON-RPC endpoint used for snapshot loads.
    pub rpc_url: String,
    /// Websocket endpoint, derived from `rpc_url` unless set.
    pub ws_url: String,
    /// Commitment used for loads and subscriptions.
    pub commitment: CommitmentConfig,
    /// Accounts requested per `getMultipleAccounts` call.
    pub account_chunk_size: usize,
    /// Pause between two chunks of a batched load.
    pub chunk_pause: Duration,
    /// Upper bound on the delay between two reconnect attempts.
    pub reconnect_max_backoff: Duration,
}

/// Errors raised while reading the configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    /// A variable is set to something that does not parse.
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let rpc_url = rpc_url.into();
        ClientConfig {
            ws_url: websocket_url(&rpc_url),
            rpc_url,
            commitment: CommitmentConfig::processed(),
            account_chunk_size: MAX_ACCOUNTS_PER_CALL,
            chunk_pause: Duration::ZERO,
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Read the configuration from `MANGO_RPC_URL`, `MANGO_WS_URL`,
    /// `MANGO_COMMITMENT`, `MANGO_ACCOUNT_CHUNK_SIZE`, `MANGO_CHUNK_PAUSE_MS`
    /// and `MANGO_RECONNECT_MAX_BACKOFF_MS`.
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let rpc_url = env_map
            .get("MANGO_RPC_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("MANGO_RPC_URL".to_string()))?;

        let ws_url = env_map
            .get("MANGO_WS_URL")
            .cloned()
            .unwrap_or_else(|| websocket_url(&rpc_url));

        let commitment = match env_map
            .get("MANGO_COMMITMENT")
            .map(|s| s.as_str())
            .unwrap_or("processed")
        {
            "processed" => CommitmentLevel::Processed,
            "confirmed" => CommitmentLevel::Confirmed,
            "finalized" => CommitmentLevel::Finalized,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MANGO_COMMITMENT".to_string(),
                    format!("must be processed, confirmed, or finalized, got {}", other),
                ))
            }
        };

        let account_chunk_size = env_map
            .get("MANGO_ACCOUNT_CHUNK_SIZE")
            .map(|s| s.as_str())
            .unwrap_or("100")
            .parse::<usize>()
            .ok()
            .filter(|size| (1..=MAX_ACCOUNTS_PER_CALL).contains(size))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MANGO_ACCOUNT_CHUNK_SIZE".to_string(),
                    format!("must be between 1 and {}", MAX_ACCOUNTS_PER_CALL),
                )
            })?;

        let chunk_pause = parse_millis(&env_map, "MANGO_CHUNK_PAUSE_MS", "0")?;
        let reconnect_max_backoff =
            parse_millis(&env_map, "MANGO_RECONNECT_MAX_BACKOFF_MS", "30000")?;

        Ok(ClientConfig {
            rpc_url,
            ws_url,
            commitment: CommitmentConfig { commitment },
            account_chunk_size,
            chunk_pause,
            reconnect_max_backoff,
        })
    }
}

fn parse_millis(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Duration, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                "must be a number of milliseconds".to_string(),
            )
        })
}

/// The pubsub endpoint served next to an RPC endpoint.
pub fn websocket_url(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config =
            ClientConfig::from_env_map(env(&[("MANGO_RPC_URL", "https://api.example.com")]))
                .unwrap();
        assert_eq!(config.ws_url, "wss://api.example.com");
        assert_eq!(config.commitment, CommitmentConfig::processed());
        assert_eq!(config.account_chunk_size, 100);
        assert_eq!(config.chunk_pause, Duration::ZERO);
        assert_eq!(config.reconnect_max_backoff, Duration::from_secs(30));
        assert_eq!(config, ClientConfig::new("https://api.example.com"));
    }

    #[test]
    fn overrides() {
        let config = ClientConfig::from_env_map(env(&[
            ("MANGO_RPC_URL", "http://localhost:8899"),
            ("MANGO_WS_URL", "ws://localhost:8900"),
            ("MANGO_COMMITMENT", "finalized"),
            ("MANGO_ACCOUNT_CHUNK_SIZE", "25"),
            ("MANGO_CHUNK_PAUSE_MS", "250"),
            ("MANGO_RECONNECT_MAX_BACKOFF_MS", "5000"),
        ]))
        .unwrap();
        assert_eq!(config.ws_url, "ws://localhost:8900");
        assert_eq!(config.commitment, CommitmentConfig::finalized());
        assert_eq!(config.account_chunk_size, 25);
        assert_eq!(config.chunk_pause, Duration::from_millis(250));
        assert_eq!(config.reconnect_max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn missing_rpc_url() {
        let result = ClientConfig::from_env_map(HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnv(ref key)) if key == "MANGO_RPC_URL"));
    }

    #[test]
    fn invalid_values() {
        for (key, value) in [
            ("MANGO_COMMITMENT", "recent-ish"),
            ("MANGO_ACCOUNT_CHUNK_SIZE", "0"),
            ("MANGO_ACCOUNT_CHUNK_SIZE", "101"),
            ("MANGO_CHUNK_PAUSE_MS", "-1"),
        ] {
            let result = ClientConfig::from_env_map(env(&[
                ("MANGO_RPC_URL", "http://localhost:8899"),
                (key, value),
            ]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(ref k, _)) if k == key),
                "{} = {} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn websocket_url_from_rpc_url() {
        assert_eq!(websocket_url("http://127.0.0.1:8899"), "ws://127.0.0.1:8899");
        assert_eq!(websocket_url("wss://already.ws"), "wss://already.ws");
    }
}
