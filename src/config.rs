use std::path::PathBuf;
use std::time::Duration;

/// Process settings, read once from `FLEETD_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub request_timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "fleetd".into(),
            max_connections: 256,
            compact_threshold: 1000,
            request_timeout: Duration::from_secs(5),
            metrics_port: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring {key}={raw}: not a valid value");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            bind: lookup("FLEETD_BIND").unwrap_or(d.bind),
            port: parsed(&lookup, "FLEETD_PORT").unwrap_or(d.port),
            data_dir: lookup("FLEETD_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            password: lookup("FLEETD_PASSWORD").unwrap_or(d.password),
            max_connections: parsed(&lookup, "FLEETD_MAX_CONNECTIONS").unwrap_or(d.max_connections),
            compact_threshold: parsed(&lookup, "FLEETD_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            request_timeout: parsed(&lookup, "FLEETD_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.request_timeout),
            metrics_port: parsed(&lookup, "FLEETD_METRICS_PORT"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("fleetd.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5433");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("FLEETD_PORT", "6000"),
            ("FLEETD_DATA_DIR", "/var/lib/fleetd"),
            ("FLEETD_REQUEST_TIMEOUT_MS", "250"),
            ("FLEETD_MAX_CONNECTIONS", "lots"),
            ("FLEETD_METRICS_PORT", "9100"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/fleetd/fleetd.wal"));
        assert_eq!(cfg.request_timeout, Duration::from_millis(250));
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.metrics_port, Some(9100));
    }
}
