use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kv::{KeyValueClient, KvValueStore};
use crate::{SqlValueStore, ValuationConfig, ValuationResult};

const DEFAULT_DB_NAME: &str = "finbench.sqlite";

pub fn load_or_init_config(base: &Path) -> ValuationResult<ValuationConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    ValuationConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_sql_store(base: &Path) -> ValuationResult<SqlValueStore> {
    let config = load_or_init_config(base)?;
    SqlValueStore::connect(&config, base).await
}

/// Binds an already-constructed service client to the configured table.
pub fn open_kv_store(
    base: &Path,
    client: Arc<dyn KeyValueClient>,
) -> ValuationResult<KvValueStore> {
    let config = load_or_init_config(base)?;
    if let Some(url) = config.key_value.as_ref().and_then(|kv| kv.service_url.as_deref()) {
        log::debug!("kv store: table {} at {url}", config.table_name());
    }
    Ok(KvValueStore::new(client, &config))
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_kv_store, open_sql_store};
    use crate::kv::MemoryKeyValueClient;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn opens_stores_with_default_config() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), Some("sqlite"));
        assert!(base.join("finbench.json").exists());
        let store = open_sql_store(base).await.expect("open store");
        assert!(default_sqlite_path(base).exists());
        let _ = store;

        let client = Arc::new(MemoryKeyValueClient::with_table("BenchmarkFinanceiro").await);
        let kv = open_kv_store(base, client).expect("kv store");
        assert_eq!(kv.table_name(), "BenchmarkFinanceiro");
    }

    #[tokio::test]
    async fn existing_config_is_reused() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        std::fs::write(
            base.join("finbench.json"),
            r#"{"key_value":{"table_name":"Custom","service_url":null},"limits":{"page_size":10,"kv_batch_size":null,"sql_batch_size":null,"request_timeout_ms":null}}"#,
        )
        .expect("write config");
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), None);
        assert_eq!(config.table_name(), "Custom");
    }
}
