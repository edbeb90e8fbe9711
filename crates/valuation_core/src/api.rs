use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::key::split_composite;
use crate::{LogicalKey, ValuationError, ValuationResult, ValueFilter, ValueRecord, WriteSummary};

/// One page of a caller-driven scan. `cursor` is opaque and only valid for
/// the store that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanPage {
    pub items: Vec<ValueRecord>,
    pub cursor: Option<String>,
}

pub fn encode_cursor<T: Serialize>(cursor: &T) -> ValuationResult<String> {
    let payload = serde_json::to_vec(cursor)
        .map_err(|err| ValuationError::request_failed(format!("encode cursor: {err}")))?;
    Ok(URL_SAFE_NO_PAD.encode(payload))
}

pub fn decode_cursor<T: DeserializeOwned>(cursor: &str) -> ValuationResult<T> {
    let decoded = URL_SAFE_NO_PAD
        .decode(cursor.as_bytes())
        .map_err(|_| ValuationError::validation("invalid cursor"))?;
    serde_json::from_slice(&decoded).map_err(|_| ValuationError::validation("invalid cursor"))
}

/// Access patterns exercised against every backend. Implementations hold no
/// mutable state between calls and are safe to share across tasks.
#[async_trait]
pub trait ValueRepository: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert(&self, record: ValueRecord) -> ValuationResult<()>;

    /// Deduplicates by logical key and writes in backend-sized chunks. Chunks
    /// written before a failure stay written.
    async fn insert_batch(&self, records: Vec<ValueRecord>) -> ValuationResult<WriteSummary>;

    /// Exact lookup by series and `ATTRIBUTE#YYYYMMDD` token.
    async fn get_item(&self, series: &str, attribute_date: &str) -> ValuationResult<ValueRecord>;

    async fn get(&self, key: &LogicalKey) -> ValuationResult<ValueRecord>;

    /// Planned read: the backend picks its cheapest access path.
    async fn find(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>>;

    /// Generic filtered scan over the whole store.
    async fn scan(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>>;

    async fn scan_page(
        &self,
        filter: &ValueFilter,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ValuationResult<ScanPage>;

    /// Bulk capture of up to `max_records` records.
    async fn capture(&self, max_records: usize) -> ValuationResult<Vec<ValueRecord>>;

    /// Purges every fact and returns how many were removed.
    async fn delete_all(&self) -> ValuationResult<u64>;

    async fn by_series_date(
        &self,
        series: &str,
        valid_from: Date,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().series(series).valid_from(valid_from))
            .await
    }

    async fn by_series_attribute(
        &self,
        series: &str,
        attribute: &str,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().series(series).attribute(attribute))
            .await
    }

    async fn by_series_attribute_date(
        &self,
        series: &str,
        attribute: &str,
        valid_from: Date,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(
            &ValueFilter::new()
                .series(series)
                .attribute(attribute)
                .valid_from(valid_from),
        )
        .await
    }

    async fn by_family_date(
        &self,
        family: &str,
        valid_from: Date,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().family(family).valid_from(valid_from))
            .await
    }

    async fn by_family(&self, family: &str) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().family(family)).await
    }

    async fn by_series(&self, series: &str) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().series(series)).await
    }

    async fn by_series_family_date(
        &self,
        series: &str,
        family: &str,
        valid_from: Date,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(
            &ValueFilter::new()
                .series(series)
                .family(family)
                .valid_from(valid_from),
        )
        .await
    }

    async fn by_series_family(
        &self,
        series: &str,
        family: &str,
    ) -> ValuationResult<Vec<ValueRecord>> {
        self.find(&ValueFilter::new().series(series).family(family))
            .await
    }
}

/// Parses the exact-lookup arguments shared by every backend.
pub fn item_key(series: &str, attribute_date: &str) -> ValuationResult<LogicalKey> {
    if series.trim().is_empty() {
        return Err(ValuationError::validation("series must not be blank"));
    }
    let (attribute, valid_from) = split_composite(attribute_date)?;
    Ok(LogicalKey::new(series, attribute, valid_from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn cursor_roundtrips_through_base64() {
        let key = LogicalKey::new("CDI", "TAXA", date!(2024 - 01 - 01));
        let encoded = encode_cursor(&key).expect("encode");
        let decoded: LogicalKey = decode_cursor(&encoded).expect("decode");
        assert_eq!(decoded, key);
    }

    #[test]
    fn garbage_cursor_is_a_validation_error() {
        let err = decode_cursor::<LogicalKey>("not a cursor!").expect_err("invalid");
        assert!(matches!(err, ValuationError::Validation { .. }));
    }

    #[test]
    fn item_key_requires_composite_token() {
        let key = item_key("CDI", "TAXA#20240101").expect("key");
        assert_eq!(key, LogicalKey::new("CDI", "TAXA", date!(2024 - 01 - 01)));
        let err = item_key("CDI", "TAXA").expect_err("malformed");
        assert!(matches!(err, ValuationError::MalformedKey { .. }));
    }
}
