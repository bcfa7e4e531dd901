//! Server configuration, read from environment variables.
//!
//!   DATABASE_URL                  Postgres connection string (required unless in-memory)
//!   PASSGATE_IN_MEMORY            "true" to run against the in-memory store
//!   PASSGATE_BIND_ADDR            listen address (default: 0.0.0.0:3000)
//!   PASSGATE_GROUP_USERNAME       shared group login name (required)
//!   PASSGATE_GROUP_PASSWORD       shared group login password (required)
//!   PASSGATE_CLIENT_URL           allowed CORS origin (default: any)
//!   PASSGATE_SECURE_COOKIES       mark the session cookie Secure
//!   PASSGATE_SESSION_TTL_DAYS     group session lifetime (default: 30)
//!   PASSGATE_SWEEP_INTERVAL_SECS  expiration sweep period (default: 60)
//!   PASSGATE_BOOTSTRAP_MASTER     master admin created when the roster is empty

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` in in-memory mode.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub group_username: String,
    pub group_password: String,
    pub client_url: Option<String>,
    pub secure_cookies: bool,
    pub session_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub bootstrap_master: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let in_memory = parse_flag(&get, "PASSGATE_IN_MEMORY")?;
        let database_url = match get("DATABASE_URL") {
            Some(url) => Some(url),
            None if in_memory => None,
            None => return Err(ConfigError::Missing("DATABASE_URL")),
        };

        let session_ttl_days: i64 = parse_or(&get, "PASSGATE_SESSION_TTL_DAYS", 30)?;
        let sweep_secs: u64 = parse_or(&get, "PASSGATE_SWEEP_INTERVAL_SECS", 60)?;
        if session_ttl_days < 1 {
            return Err(ConfigError::Invalid {
                var: "PASSGATE_SESSION_TTL_DAYS",
                value: session_ttl_days.to_string(),
            });
        }
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "PASSGATE_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url: if in_memory { None } else { database_url },
            bind_addr: get("PASSGATE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            group_username: get("PASSGATE_GROUP_USERNAME")
                .ok_or(ConfigError::Missing("PASSGATE_GROUP_USERNAME"))?,
            group_password: get("PASSGATE_GROUP_PASSWORD")
                .ok_or(ConfigError::Missing("PASSGATE_GROUP_PASSWORD"))?,
            client_url: get("PASSGATE_CLIENT_URL"),
            secure_cookies: parse_flag(&get, "PASSGATE_SECURE_COOKIES")?,
            session_ttl: chrono::Duration::days(session_ttl_days),
            sweep_interval: Duration::from_secs(sweep_secs),
            bootstrap_master: get("PASSGATE_BOOTSTRAP_MASTER"),
        })
    }

    pub fn in_memory(&self) -> bool {
        self.database_url.is_none()
    }
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match get(var).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDS: [(&str, &str); 2] = [
        ("PASSGATE_GROUP_USERNAME", "crew"),
        ("PASSGATE_GROUP_PASSWORD", "hunter2"),
    ];

    #[test]
    fn defaults_apply() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("DATABASE_URL", "postgresql:///passgate"));
        let cfg = ServerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert_eq!(cfg.session_ttl, chrono::Duration::days(30));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert!(!cfg.secure_cookies);
        assert!(!cfg.in_memory());
    }

    #[test]
    fn database_url_required_unless_in_memory() {
        let err = ServerConfig::from_lookup(lookup(&CREDS)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let mut pairs = CREDS.to_vec();
        pairs.push(("PASSGATE_IN_MEMORY", "true"));
        assert!(ServerConfig::from_lookup(lookup(&pairs)).unwrap().in_memory());
    }

    #[test]
    fn group_credentials_required() {
        let pairs = [("PASSGATE_IN_MEMORY", "1"), ("PASSGATE_GROUP_USERNAME", "crew")];
        let err = ServerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("PASSGATE_GROUP_PASSWORD"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("PASSGATE_IN_MEMORY", "yes"));
        pairs.push(("PASSGATE_SWEEP_INTERVAL_SECS", "soon"));
        let err = ServerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PASSGATE_SWEEP_INTERVAL_SECS", .. }));
    }
}
