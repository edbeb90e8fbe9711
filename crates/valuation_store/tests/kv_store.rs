mod common;

use common::*;
use finbench_valuation_store::kv::SecondaryIndex;
use finbench_valuation_store::{
    CancellationToken, Decimal, ValuationConfig, ValuationError, ValuationResult, ValueFilter,
    ValueRecord, ValueRepository, WriteSummary,
};
use time::macros::date;

#[tokio::test]
async fn exact_get_returns_inserted_record() -> ValuationResult<()> {
    let (_, store) = kv_store().await;
    let record = ValueRecord::new(
        "JUROS",
        "CDI",
        "TAXA",
        Decimal::new(105, 1),
        date!(2024 - 01 - 01),
        date!(2024 - 01 - 01),
    );
    store.insert(record.clone()).await?;
    assert_eq!(store.get_item("CDI", "TAXA#20240101").await?, record);
    assert_eq!(store.get(&record.logical_key()).await?, record);
    Ok(())
}

#[tokio::test]
async fn missing_item_is_not_found() {
    let (_, store) = kv_store().await;
    let err = store
        .get_item("CDI", "TAXA#20240101")
        .await
        .expect_err("missing");
    assert!(matches!(err, ValuationError::NotFound { .. }));
}

#[tokio::test]
async fn batch_with_duplicates_fits_one_call() -> ValuationResult<()> {
    let (client, store) = kv_store().await;
    let mut records: Vec<_> = (0..25)
        .map(|i| record("JUROS", &format!("S{i:02}"), "TAXA", 0, i))
        .collect();
    records.extend((0..5).map(|i| record("JUROS", &format!("S{i:02}"), "TAXA", 0, 900 + i)));
    let summary = store.insert_batch(records).await?;
    assert_eq!(
        summary,
        WriteSummary {
            records: 25,
            chunks: 1
        }
    );
    assert_eq!(client.stats().batch_writes, 1);
    assert_eq!(client.item_count(TABLE).await, 25);
    let latest = store.get_item("S03", "TAXA#20240101").await?;
    assert_eq!(latest.amount, Decimal::new(903, 2));
    Ok(())
}

#[tokio::test]
async fn family_filter_returns_only_that_family() -> ValuationResult<()> {
    let (client, store) = kv_store().await;
    store.insert_batch(dataset()).await?;
    client.reset_stats().await;

    let juros = store.by_family("JUROS").await?;
    assert_eq!(juros.len(), 20);
    assert!(juros.iter().all(|r| r.family == "JUROS"));
    assert_eq!(
        client.queried_indexes().await,
        vec![Some(SecondaryIndex::FamilyDate.name().to_string())]
    );

    let planned = store.find(&ValueFilter::new().family("JUROS")).await?;
    assert_eq!(sorted(planned), sorted(juros));
    Ok(())
}

#[tokio::test]
async fn named_patterns_use_their_indexes() -> ValuationResult<()> {
    let (client, store) = kv_store().await;
    store.insert_batch(dataset()).await?;
    let day = date!(2024 - 01 - 03);

    let cases: Vec<(Option<SecondaryIndex>, usize)> = vec![
        (None, store.by_series_attribute_date("CDI", "TAXA", day).await?.len()),
        (
            Some(SecondaryIndex::FamilyDate),
            store.by_family_date("INDICES", day).await?.len(),
        ),
        (
            Some(SecondaryIndex::SeriesFamily),
            store.by_series_family("SELIC", "JUROS").await?.len(),
        ),
        (
            Some(SecondaryIndex::SeriesFamily),
            store.by_series_family_date("SELIC", "JUROS", day).await?.len(),
        ),
        (
            Some(SecondaryIndex::SeriesAttribute),
            store.by_series_attribute("IPCA", "FATOR").await?.len(),
        ),
        (
            Some(SecondaryIndex::SeriesDate),
            store.by_series_date("IGPM", day).await?.len(),
        ),
        (
            Some(SecondaryIndex::SeriesDate),
            store.by_series("IGPM").await?.len(),
        ),
    ];
    let used = client.queried_indexes().await;
    let expected: Vec<Option<String>> = cases
        .iter()
        .map(|(index, _)| index.map(|i| i.name().to_string()))
        .collect();
    assert_eq!(used, expected);
    let counts: Vec<usize> = cases.iter().map(|(_, count)| *count).collect();
    assert_eq!(counts, vec![1, 4, 10, 2, 5, 2, 10]);
    assert_eq!(client.stats().scans, 0);
    Ok(())
}

#[tokio::test]
async fn every_path_matches_full_scan() -> ValuationResult<()> {
    let (_, store) = kv_store_with(&small_pages()).await;
    let data = dataset();
    store.insert_batch(data.clone()).await?;
    for filter in filter_grid() {
        let planned = sorted(store.find(&filter).await?);
        let scanned = sorted(store.scan(&filter).await?);
        let mut expected = Vec::new();
        for record in &data {
            if filter.matches(record)? {
                expected.push(record.clone());
            }
        }
        assert_eq!(planned, scanned, "{filter:?}");
        assert_eq!(planned, sorted(expected), "{filter:?}");
    }
    Ok(())
}

#[tokio::test]
async fn adding_predicates_never_widens_results() -> ValuationResult<()> {
    let (_, store) = kv_store().await;
    store.insert_batch(dataset()).await?;
    let chain = [
        ValueFilter::new(),
        ValueFilter::new().series("CDI"),
        ValueFilter::new().series("CDI").attribute("TAXA"),
        ValueFilter::new()
            .series("CDI")
            .attribute("TAXA")
            .valid_from(date!(2024 - 01 - 02)),
    ];
    let mut previous: Option<Vec<ValueRecord>> = None;
    for filter in chain {
        let current = store.find(&filter).await?;
        if let Some(previous) = &previous {
            assert!(current.iter().all(|r| previous.contains(r)), "{filter:?}");
        }
        previous = Some(current);
    }
    Ok(())
}

#[tokio::test]
async fn capture_stops_at_requested_count() -> ValuationResult<()> {
    let (client, store) = kv_store().await;
    let records: Vec<_> = (0..1_200)
        .map(|i| record("JUROS", &format!("S{i:04}"), "TAXA", 0, i))
        .collect();
    store.insert_batch(records).await?;
    client.reset_stats().await;

    let captured = store.capture(750).await?;
    assert_eq!(captured.len(), 750);
    assert_eq!(client.stats().scans, 2);

    let everything = store.capture(5_000).await?;
    assert_eq!(everything.len(), 1_200);
    Ok(())
}

#[tokio::test]
async fn scan_pages_cover_the_table_once() -> ValuationResult<()> {
    let (_, store) = kv_store().await;
    let data = dataset();
    store.insert_batch(data.clone()).await?;
    let filter = ValueFilter::new().family("INDICES");
    let mut cursor: Option<String> = None;
    let mut seen = Vec::new();
    loop {
        let page = store.scan_page(&filter, cursor.as_deref(), 6).await?;
        seen.extend(page.items);
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    let expected: Vec<_> = data.into_iter().filter(|r| r.family == "INDICES").collect();
    assert_eq!(sorted(seen), sorted(expected));

    let err = store
        .scan_page(&filter, Some("not-a-cursor"), 6)
        .await
        .expect_err("bad cursor");
    assert!(matches!(err, ValuationError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn delete_all_purges_every_item() -> ValuationResult<()> {
    let (client, store) = kv_store_with(&small_pages()).await;
    store.insert_batch(dataset()).await?;
    assert_eq!(store.delete_all().await?, 40);
    assert_eq!(client.item_count(TABLE).await, 0);
    assert_eq!(store.delete_all().await?, 0);
    Ok(())
}

#[tokio::test]
async fn failed_chunk_keeps_earlier_chunks() {
    let config = ValuationConfig::default().with_failpoints(["batch_chunk:1".to_string()]);
    let (client, store) = kv_store_with(&config).await;
    let records: Vec<_> = (0..60)
        .map(|i| record("JUROS", "CDI", "TAXA", i, i))
        .collect();
    let err = store.insert_batch(records).await.expect_err("failpoint");
    assert!(matches!(err, ValuationError::BackendRequestFailed { .. }));
    assert!(err.to_string().contains("batch chunk 2 of 3"), "{err}");
    assert_eq!(client.item_count(TABLE).await, 25);
}

#[tokio::test]
async fn invalid_records_never_reach_the_backend() {
    let (client, store) = kv_store().await;
    let mut inverted = record("JUROS", "CDI", "TAXA", 0, 1);
    inverted.valid_to = date!(2023 - 12 - 31);
    let batch = vec![record("JUROS", "SELIC", "TAXA", 0, 1), inverted];
    let err = store.insert_batch(batch).await.expect_err("validation");
    assert!(matches!(err, ValuationError::Validation { .. }));

    let separator = record("JUROS", "CDI", "TAXA#X", 0, 1);
    let err = store.insert(separator).await.expect_err("separator");
    assert!(matches!(err, ValuationError::Validation { .. }));

    let err = store
        .find(&ValueFilter::new().series("CDI").composite_attribute_date("TAXA"))
        .await
        .expect_err("malformed");
    assert!(matches!(err, ValuationError::MalformedKey { .. }));

    assert_eq!(client.stats().total(), 0);
}

#[tokio::test]
async fn cancelled_store_stops_before_calling_backend() -> ValuationResult<()> {
    let (client, store) = kv_store().await;
    store.insert_batch(dataset()).await?;
    client.reset_stats().await;

    let token = CancellationToken::new();
    let cancellable = store.with_cancellation(token.clone());
    token.cancel();
    let err = cancellable
        .scan(&ValueFilter::new())
        .await
        .expect_err("cancelled");
    assert!(matches!(err, ValuationError::Cancelled { .. }));
    let err = cancellable.delete_all().await.expect_err("cancelled");
    assert!(matches!(err, ValuationError::Cancelled { .. }));
    assert_eq!(client.stats().total(), 0);

    assert_eq!(store.scan(&ValueFilter::new()).await?.len(), 40);
    Ok(())
}

#[tokio::test]
async fn missing_table_surfaces_backend_failure() {
    let (_, store) = kv_store_with(&ValuationConfig {
        key_value: Some(finbench_valuation_store::KeyValueConfig {
            table_name: "Missing".to_string(),
            service_url: None,
        }),
        ..ValuationConfig::default()
    })
    .await;
    let err = store
        .insert(record("JUROS", "CDI", "TAXA", 0, 1))
        .await
        .expect_err("missing table");
    assert!(err.is_backend());
}
