use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use opcbridge_upstream::{NodeId, PollerConfig, ReconnectConfig};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is present but cannot be parsed.
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Individually valid values that contradict each other.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Upstream and poller settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: String,
    pub node_id: NodeId,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub teardown_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
    /// `0` = retry forever.
    pub max_retries: u32,
}

impl BridgeConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            endpoint: self.endpoint.clone(),
            node_id: self.node_id.clone(),
            poll_interval: self.poll_interval,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            teardown_timeout: self.teardown_timeout,
            reconnect: ReconnectConfig {
                initial_delay: self.backoff_initial,
                max_delay: self.backoff_max,
                multiplier: self.backoff_multiplier,
                max_attempts: self.max_retries,
            },
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: IpAddr,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for the poller at shutdown (default: `10`).
    pub shutdown_timeout_secs: u64,
    pub log_format: LogFormat,
    /// When set, `/api/v1/*` requires a matching `X-API-Key` header.
    pub api_key: Option<String>,
    pub bridge: BridgeConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                              |
    /// |------------------------------|--------------------------------------|
    /// | `HOST`                       | `0.0.0.0`                            |
    /// | `PORT`                       | `3000`                               |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`              |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                                 |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `10`                                 |
    /// | `LOG_FORMAT`                 | `text`                               |
    /// | `API_KEY`                    | unset                                |
    /// | `BRIDGE_ENDPOINT`            | `http://127.0.0.1:4841`              |
    /// | `BRIDGE_NODE_ID`             | `ns=2;s=Demo.Dynamic.Scalar.Double`  |
    /// | `BRIDGE_POLL_INTERVAL_MS`    | `1000`                               |
    /// | `BRIDGE_CONNECT_TIMEOUT_MS`  | `5000`                               |
    /// | `BRIDGE_READ_TIMEOUT_MS`     | `5000`                               |
    /// | `BRIDGE_BACKOFF_INITIAL_MS`  | `1000`                               |
    /// | `BRIDGE_BACKOFF_MAX_MS`      | `30000`                              |
    /// | `BRIDGE_BACKOFF_MULTIPLIER`  | `2.0`                                |
    /// | `BRIDGE_MAX_RETRIES`         | `0` (unlimited)                      |
    /// | `BRIDGE_TEARDOWN_TIMEOUT_MS` | `5000`                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let host = env.parse("HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED), "an IP address")?;
        let port = env.parse("PORT", 3000u16, "a port number (0-65535)")?;

        let cors_origins: Vec<String> = env
            .string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins
            .iter()
            .find(|o| HeaderValue::from_str(o).is_err())
        {
            return Err(ConfigError::Invalid {
                key: "CORS_ORIGINS",
                value: bad.clone(),
                expected: "a comma-separated list of origins",
            });
        }

        let request_timeout_secs = env.parse("REQUEST_TIMEOUT_SECS", 30u64, "a whole number of seconds")?;
        let shutdown_timeout_secs = env.parse("SHUTDOWN_TIMEOUT_SECS", 10u64, "a whole number of seconds")?;

        let log_format = match env.get("LOG_FORMAT") {
            None => LogFormat::Text,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: raw,
                expected: "'text' or 'json'",
            })?,
        };

        let api_key = env.get("API_KEY");

        let node_raw = env.string("BRIDGE_NODE_ID", "ns=2;s=Demo.Dynamic.Scalar.Double");
        let node_id = NodeId::parse(&node_raw).map_err(|_| ConfigError::Invalid {
            key: "BRIDGE_NODE_ID",
            value: node_raw.clone(),
            expected: "a node id such as 'ns=2;s=Name' or 'i=2258'",
        })?;

        let bridge = BridgeConfig {
            endpoint: env.string("BRIDGE_ENDPOINT", "http://127.0.0.1:4841"),
            node_id,
            poll_interval: env.millis("BRIDGE_POLL_INTERVAL_MS", 1_000)?,
            connect_timeout: env.millis("BRIDGE_CONNECT_TIMEOUT_MS", 5_000)?,
            read_timeout: env.millis("BRIDGE_READ_TIMEOUT_MS", 5_000)?,
            teardown_timeout: env.millis("BRIDGE_TEARDOWN_TIMEOUT_MS", 5_000)?,
            backoff_initial: env.millis("BRIDGE_BACKOFF_INITIAL_MS", 1_000)?,
            backoff_max: env.millis("BRIDGE_BACKOFF_MAX_MS", 30_000)?,
            backoff_multiplier: env.parse("BRIDGE_BACKOFF_MULTIPLIER", 2.0f64, "a number >= 1.0")?,
            max_retries: env.parse("BRIDGE_MAX_RETRIES", 0u32, "a whole number (0 = unlimited)")?,
        };

        if !(bridge.backoff_multiplier >= 1.0 && bridge.backoff_multiplier.is_finite()) {
            return Err(ConfigError::Invalid {
                key: "BRIDGE_BACKOFF_MULTIPLIER",
                value: bridge.backoff_multiplier.to_string(),
                expected: "a number >= 1.0",
            });
        }
        if bridge.backoff_initial > bridge.backoff_max {
            return Err(ConfigError::Inconsistent(format!(
                "BRIDGE_BACKOFF_INITIAL_MS ({} ms) exceeds BRIDGE_BACKOFF_MAX_MS ({} ms)",
                bridge.backoff_initial.as_millis(),
                bridge.backoff_max.as_millis(),
            )));
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            log_format,
            api_key,
            bridge,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Typed access to a key/value source. Blank values count as unset.
struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(
        &self,
        key: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw,
                expected,
            }),
        }
    }

    fn millis(&self, key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
        let ms = self.parse(key, default_ms, "a positive number of milliseconds")?;
        if ms == 0 {
            return Err(ConfigError::Invalid {
                key,
                value: "0".into(),
                expected: "a positive number of milliseconds",
            });
        }
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.api_key, None);

        let poller = config.bridge.poller_config();
        assert_eq!(poller.endpoint, "http://127.0.0.1:4841");
        assert_eq!(poller.node_id.as_str(), "ns=2;s=Demo.Dynamic.Scalar.Double");
        assert_eq!(poller.poll_interval, Duration::from_secs(1));
        assert_eq!(poller.reconnect, ReconnectConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PORT", "8080"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("LOG_FORMAT", "JSON"),
            ("API_KEY", "secret"),
            ("BRIDGE_NODE_ID", "i=2258"),
            ("BRIDGE_POLL_INTERVAL_MS", "250"),
            ("BRIDGE_BACKOFF_MULTIPLIER", "1.5"),
            ("BRIDGE_MAX_RETRIES", "5"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.api_key.as_deref(), Some("secret"));

        let poller = config.bridge.poller_config();
        assert_eq!(poller.node_id.as_str(), "i=2258");
        assert_eq!(poller.poll_interval, Duration::from_millis(250));
        assert_eq!(poller.reconnect.multiplier, 1.5);
        assert_eq!(poller.reconnect.max_attempts, 5);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("PORT", "  "), ("API_KEY", "")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert_matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        );
    }

    #[test]
    fn host_must_be_an_ip_address() {
        assert_matches!(
            load(&[("HOST", "localhost:3000")]),
            Err(ConfigError::Invalid { key: "HOST", .. })
        );

        let config = load(&[("HOST", "::1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.bind_addr().to_string(), "[::1]:8080");
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_matches!(
            load(&[("BRIDGE_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid { key: "BRIDGE_POLL_INTERVAL_MS", .. })
        );
    }

    #[test]
    fn malformed_node_id_is_rejected() {
        assert_matches!(
            load(&[("BRIDGE_NODE_ID", "ns=x;s=Foo")]),
            Err(ConfigError::Invalid { key: "BRIDGE_NODE_ID", .. })
        );
    }

    #[test]
    fn multiplier_below_one_is_rejected() {
        assert_matches!(
            load(&[("BRIDGE_BACKOFF_MULTIPLIER", "0.5")]),
            Err(ConfigError::Invalid { key: "BRIDGE_BACKOFF_MULTIPLIER", .. })
        );
    }

    #[test]
    fn initial_backoff_above_max_is_inconsistent() {
        assert_matches!(
            load(&[
                ("BRIDGE_BACKOFF_INITIAL_MS", "60000"),
                ("BRIDGE_BACKOFF_MAX_MS", "30000"),
            ]),
            Err(ConfigError::Inconsistent(_))
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = load(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert_eq!(err.to_string(), "LOG_FORMAT must be 'text' or 'json', got 'xml'");
    }
}
