use std::collections::BTreeSet;

use finbench_valuation_store::migration::Migrator;
use finbench_valuation_store::{SqlValueStore, ValuationConfig};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use sea_orm_migration::MigratorTrait;
use tempfile::tempdir;

async fn names_of(store: &SqlValueStore, kind: &str) -> BTreeSet<String> {
    let rows = store
        .connection()
        .query_all_raw(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = ?",
            [kind.into()],
        ))
        .await
        .expect("sqlite_master");
    rows.iter()
        .map(|row| row.try_get::<String>("", "name").expect("name"))
        .collect()
}

#[tokio::test]
async fn migrations_create_fact_and_reference_tables() {
    let dir = tempdir().expect("tempdir");
    let config = ValuationConfig::default_sqlite("values.sqlite");
    let store = SqlValueStore::connect(&config, dir.path())
        .await
        .expect("connect sqlite");

    let tables = names_of(&store, "table").await;
    for table in [
        "valuation_family",
        "valuation_series",
        "valuation_attribute",
        "valuation_source_file",
        "valuation_value",
    ] {
        assert!(tables.contains(table), "missing table {table}: {tables:?}");
    }
    let indexes = names_of(&store, "index").await;
    for index in [
        "valuation_value_logical_key_idx",
        "valuation_value_family_date_idx",
        "valuation_value_series_family_idx",
    ] {
        assert!(indexes.contains(index), "missing index {index}: {indexes:?}");
    }
}

#[tokio::test]
async fn reconnecting_does_not_reapply_migrations() {
    let dir = tempdir().expect("tempdir");
    let config = ValuationConfig::default_sqlite("values.sqlite");
    let first = SqlValueStore::connect(&config, dir.path())
        .await
        .expect("first connect");
    drop(first);
    let second = SqlValueStore::connect(&config, dir.path())
        .await
        .expect("second connect");
    let pending = Migrator::get_pending_migrations(second.connection())
        .await
        .expect("pending");
    assert!(pending.is_empty());
}
