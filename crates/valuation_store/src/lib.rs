pub mod config;
pub mod datastore;
mod db;
pub mod kv;
pub mod migration;
pub mod sql;

pub use config::{
    DatabaseConfig, KeyValueConfig, Limits, LimitsConfig, PoolConfig, ValuationConfig,
};
pub use datastore::{default_sqlite_path, load_or_init_config, open_kv_store, open_sql_store};
pub use finbench_valuation_core::*;
pub use kv::{KvValueStore, MemoryKeyValueClient};
pub use sql::{ReferenceEntity, ReferenceKind, SqlValueStore, ValueWithReferences};
