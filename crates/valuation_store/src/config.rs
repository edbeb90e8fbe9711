use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use finbench_valuation_core::{DEFAULT_PAGE_SIZE, KV_MAX_BATCH, ValuationError, ValuationResult};

const DEFAULT_CONFIG_NAME: &str = "finbench.json";
pub const DEFAULT_TABLE_NAME: &str = "BenchmarkFinanceiro";
const DEFAULT_SQLITE_NAME: &str = "finbench.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyValueConfig {
    pub table_name: String,
    pub service_url: Option<String>,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            service_url: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_connections: Some(100),
            min_connections: None,
            connect_timeout_ms: None,
            acquire_timeout_ms: None,
            idle_timeout_ms: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub page_size: Option<usize>,
    pub kv_batch_size: Option<usize>,
    pub sql_batch_size: Option<usize>,
    pub request_timeout_ms: Option<u64>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE),
            kv_batch_size: Some(KV_MAX_BATCH),
            sql_batch_size: Some(500),
            request_timeout_ms: Some(30_000),
        }
    }
}

/// Resolved limits with every default applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub page_size: usize,
    pub kv_batch_size: usize,
    pub sql_batch_size: usize,
    pub request_timeout: Option<Duration>,
}

impl Limits {
    pub fn from_config(config: &ValuationConfig) -> Self {
        let defaults = LimitsConfig::with_defaults();
        let limits = config.limits.as_ref();
        let pick = |value: Option<usize>, fallback: Option<usize>| {
            value.or(fallback).unwrap_or(DEFAULT_PAGE_SIZE).max(1)
        };
        Self {
            page_size: pick(limits.and_then(|l| l.page_size), defaults.page_size),
            // The key-value backend rejects larger batches outright.
            kv_batch_size: pick(limits.and_then(|l| l.kv_batch_size), defaults.kv_batch_size)
                .min(KV_MAX_BATCH),
            sql_batch_size: pick(
                limits.and_then(|l| l.sql_batch_size),
                defaults.sql_batch_size,
            ),
            request_timeout: limits
                .and_then(|l| l.request_timeout_ms)
                .or(defaults.request_timeout_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&ValuationConfig::default())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValuationConfig {
    pub relational: Option<DatabaseConfig>,
    pub key_value: Option<KeyValueConfig>,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl ValuationConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            relational: Some(DatabaseConfig::Sqlite {
                path: Some(path.into()),
            }),
            key_value: Some(KeyValueConfig::default()),
            pool: Some(PoolConfig::with_defaults()),
            limits: Some(LimitsConfig::with_defaults()),
            failpoints: None,
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            relational: Some(DatabaseConfig::Postgres { url: url.into() }),
            ..Self::default_sqlite(DEFAULT_SQLITE_NAME)
        }
    }

    pub fn with_failpoints(mut self, failpoints: impl IntoIterator<Item = String>) -> Self {
        self.failpoints = Some(failpoints.into_iter().collect());
        self
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> ValuationResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| ValuationError::unavailable(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| ValuationError::unavailable(format!("read config: {err}")))?;
            let config: ValuationConfig = serde_json::from_str(&raw)
                .map_err(|err| ValuationError::validation(err.to_string()))?;
            return Ok(config);
        }
        let default = ValuationConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| ValuationError::request_failed(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| ValuationError::unavailable(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> ValuationResult<PathBuf> {
        match &self.relational {
            Some(DatabaseConfig::Sqlite { path }) => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SQLITE_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(ValuationError::validation("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        match self.relational {
            Some(DatabaseConfig::Sqlite { .. }) => Some("sqlite"),
            Some(DatabaseConfig::Postgres { .. }) => Some("postgres"),
            None => None,
        }
    }

    pub fn connection_url(&self, base_dir: &Path) -> ValuationResult<String> {
        match &self.relational {
            Some(DatabaseConfig::Sqlite { .. }) => {
                let path = self.sqlite_path(base_dir)?;
                Ok(format!("sqlite://{}?mode=rwc", path.display()))
            }
            Some(DatabaseConfig::Postgres { url }) => Ok(url.clone()),
            None => Err(ValuationError::validation(
                "no relational backend configured",
            )),
        }
    }

    pub fn table_name(&self) -> String {
        self.key_value
            .as_ref()
            .map(|kv| kv.table_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string())
    }

    pub fn failpoint_set(&self) -> std::collections::HashSet<String> {
        self.failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_fall_back_to_defaults() {
        let limits = Limits::default();
        assert_eq!(limits.page_size, 500);
        assert_eq!(limits.kv_batch_size, 25);
        assert_eq!(limits.sql_batch_size, 500);
        assert_eq!(limits.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn kv_batch_size_is_capped() {
        let config = ValuationConfig {
            limits: Some(LimitsConfig {
                page_size: Some(0),
                kv_batch_size: Some(100),
                sql_batch_size: None,
                request_timeout_ms: Some(0),
            }),
            ..ValuationConfig::default()
        };
        let limits = Limits::from_config(&config);
        assert_eq!(limits.page_size, 1);
        assert_eq!(limits.kv_batch_size, 25);
        assert_eq!(limits.sql_batch_size, 500);
        assert_eq!(limits.request_timeout, None);
    }

    #[test]
    fn database_config_is_tagged_by_backend() {
        let raw = r#"{"relational":{"backend":"postgres","url":"postgres://localhost/fin"}}"#;
        let config: ValuationConfig = serde_json::from_str(raw).expect("parse");
        assert_eq!(config.backend_name(), Some("postgres"));
        assert_eq!(config.table_name(), DEFAULT_TABLE_NAME);
        let url = config.connection_url(Path::new(".")).expect("url");
        assert_eq!(url, "postgres://localhost/fin");
    }
}
