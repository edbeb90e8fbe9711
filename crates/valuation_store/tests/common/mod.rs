#![allow(dead_code)]

use std::sync::Arc;

use finbench_valuation_store::{
    Decimal, KvValueStore, LimitsConfig, MemoryKeyValueClient, ValuationConfig, ValueFilter,
    ValueRecord,
};
use time::macros::{date, datetime};
use time::{Date, Duration};

pub const TABLE: &str = "BenchmarkFinanceiro";
pub const FIRST_DAY: Date = date!(2024 - 01 - 01);

pub fn record(family: &str, series: &str, attribute: &str, day: i64, cents: i64) -> ValueRecord {
    let valid_from = FIRST_DAY + Duration::days(day);
    ValueRecord::new(
        family,
        series,
        attribute,
        Decimal::new(cents, 2),
        valid_from,
        valid_from + Duration::days(30),
    )
    .with_updated_at(datetime!(2024-02-01 12:00:00 UTC))
}

/// Two families, two series each, two attributes, five business days.
pub fn dataset() -> Vec<ValueRecord> {
    let mut records = Vec::new();
    for (family, series) in [
        ("JUROS", "CDI"),
        ("JUROS", "SELIC"),
        ("INDICES", "IPCA"),
        ("INDICES", "IGPM"),
    ] {
        for attribute in ["TAXA", "FATOR"] {
            for day in 0..5 {
                let mut value = record(family, series, attribute, day, 1_000 + day * 7);
                if attribute == "TAXA" {
                    value = value.with_source_file(format!("{series}_2024.csv"));
                }
                records.push(value);
            }
        }
    }
    records
}

pub fn sorted(mut records: Vec<ValueRecord>) -> Vec<ValueRecord> {
    records.sort_by_key(ValueRecord::logical_key);
    records
}

/// Filters covering every access path plus residual combinations.
pub fn filter_grid() -> Vec<ValueFilter> {
    let day = FIRST_DAY + Duration::days(2);
    vec![
        ValueFilter::new(),
        ValueFilter::new().family("JUROS"),
        ValueFilter::new().series("CDI"),
        ValueFilter::new().attribute("TAXA"),
        ValueFilter::new().valid_from(day),
        ValueFilter::new().valid_to(day + Duration::days(30)),
        ValueFilter::new().series("CDI").composite_attribute_date("TAXA#20240103"),
        ValueFilter::new().composite_attribute_date("FATOR#20240101"),
        ValueFilter::new().series("CDI").attribute("TAXA").valid_from(day),
        ValueFilter::new()
            .series("CDI")
            .attribute("TAXA")
            .valid_from(day)
            .family("INDICES"),
        ValueFilter::new().family("JUROS").valid_from(day),
        ValueFilter::new()
            .family("JUROS")
            .valid_from(day)
            .attribute("FATOR"),
        ValueFilter::new().series("IPCA").family("INDICES"),
        ValueFilter::new().series("IPCA").family("JUROS"),
        ValueFilter::new().series("SELIC").attribute("FATOR"),
        ValueFilter::new().series("SELIC").valid_from(day),
        ValueFilter::new().series("UNKNOWN").valid_from(day),
        ValueFilter::new().family("  ").series(""),
    ]
}

pub fn small_pages() -> ValuationConfig {
    ValuationConfig {
        limits: Some(LimitsConfig {
            page_size: Some(7),
            ..LimitsConfig::with_defaults()
        }),
        ..ValuationConfig::default()
    }
}

pub async fn kv_store_with(config: &ValuationConfig) -> (Arc<MemoryKeyValueClient>, KvValueStore) {
    let client = Arc::new(MemoryKeyValueClient::with_table(TABLE).await);
    let store = KvValueStore::new(client.clone(), config);
    (client, store)
}

pub async fn kv_store() -> (Arc<MemoryKeyValueClient>, KvValueStore) {
    kv_store_with(&ValuationConfig::default()).await
}
