use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{env, net::IpAddr, path::PathBuf, str::FromStr};

/// Which [`SessionStore`](crate::repositories::SessionStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(anyhow!("Invalid SESSION_STORE value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub session_store: StoreKind,
    pub db_max_connections: u32,
    pub db_acquire_timeout_seconds: u64,
    pub db_statement_timeout_ms: u64,
    pub time_zone: Tz,
    pub geoip_database_path: Option<PathBuf>,
    pub cors_allow_origins: Vec<String>,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(var("BIND_ADDR"), "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(var("PORT"), "PORT", 3000)?;

        let database_url = var("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost/visitrail".to_string());
        let session_store = parse_or(var("SESSION_STORE"), "SESSION_STORE", StoreKind::Postgres)?;
        let db_max_connections = parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?;
        let db_acquire_timeout_seconds = parse_or(
            var("DB_ACQUIRE_TIMEOUT_SECONDS"),
            "DB_ACQUIRE_TIMEOUT_SECONDS",
            5,
        )?;
        let db_statement_timeout_ms =
            parse_or(var("DB_STATEMENT_TIMEOUT_MS"), "DB_STATEMENT_TIMEOUT_MS", 5000)?;

        let time_zone_name = var("APP_TIMEZONE").unwrap_or_else(|| "Europe/Bucharest".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        let geoip_database_path = var("GEOIP_DATABASE_PATH").map(PathBuf::from);
        let cors_allow_origins = var("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);
        let static_dir = var("STATIC_DIR").map(PathBuf::from);

        Ok(Config {
            bind_addr,
            port,
            database_url,
            session_store,
            db_max_connections,
            db_acquire_timeout_seconds,
            db_statement_timeout_ms,
            time_zone,
            geoip_database_path,
            cors_allow_origins,
            static_dir,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_allow_origins.iter().any(|origin| origin == "*")
    }

    /// Database URL with any password replaced, safe for logs.
    pub fn redacted_database_url(&self) -> String {
        redact_url_password(&self.database_url)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

fn redact_url_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_addr, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.session_store, StoreKind::Postgres);
        assert_eq!(config.time_zone, chrono_tz::Europe::Bucharest);
        assert_eq!(config.db_statement_timeout_ms, 5000);
        assert!(config.geoip_database_path.is_none());
        assert!(config.static_dir.is_none());
        assert!(config.allows_any_origin());
    }

    #[test]
    fn explicit_values_are_parsed() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("SESSION_STORE", "Memory"),
            ("APP_TIMEZONE", "Asia/Tokyo"),
            ("DB_MAX_CONNECTIONS", "3"),
            ("GEOIP_DATABASE_PATH", "/data/GeoLite2-City.mmdb"),
            ("CORS_ALLOW_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .expect("config");

        assert_eq!(config.port, 8080);
        assert_eq!(config.session_store, StoreKind::Memory);
        assert_eq!(config.time_zone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.db_max_connections, 3);
        assert_eq!(
            config.geoip_database_path,
            Some(PathBuf::from("/data/GeoLite2-City.mmdb"))
        );
        assert_eq!(
            config.cors_allow_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(!config.allows_any_origin());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("GEOIP_DATABASE_PATH", "")]).expect("config");
        assert_eq!(config.port, 3000);
        assert!(config.geoip_database_path.is_none());
    }

    #[test]
    fn invalid_values_fail_loudly() {
        assert!(config_from(&[("APP_TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("SESSION_STORE", "mongo")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn redacts_password_in_database_url() {
        assert_eq!(
            redact_url_password("postgres://app:s3cret@db:5432/visitrail"),
            "postgres://app:***@db:5432/visitrail"
        );
        assert_eq!(
            redact_url_password("postgres://app@db/visitrail"),
            "postgres://app@db/visitrail"
        );
        assert_eq!(
            redact_url_password("postgres://localhost/visitrail"),
            "postgres://localhost/visitrail"
        );
    }
}
