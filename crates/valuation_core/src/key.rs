//! Physical key encoding for the key-value backend.
//!
//! A fact lives in the partition named by its series. Its sort key joins the
//! attribute and a fixed-width `YYYYMMDD` token of `valid_from` with `#`, so
//! a single partition holds every attribute/date combination of the series
//! and can be range-scanned by attribute prefix.

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{LogicalKey, ValuationError, ValuationResult, ValueRecord};

pub const KEY_SEPARATOR: char = '#';

const DATE_TOKEN_LEN: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalKey {
    pub partition: String,
    pub sort: String,
}

impl PhysicalKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

pub fn encode(record: &ValueRecord) -> ValuationResult<PhysicalKey> {
    encode_logical(&record.logical_key())
}

pub fn encode_logical(key: &LogicalKey) -> ValuationResult<PhysicalKey> {
    Ok(PhysicalKey {
        partition: key.series.clone(),
        sort: composite_sort_key(&key.attribute, key.valid_from)?,
    })
}

/// Inverse of [`encode_logical`].
pub fn decode(key: &PhysicalKey) -> ValuationResult<LogicalKey> {
    if key.partition.is_empty() {
        return Err(ValuationError::malformed_key("empty partition key"));
    }
    let (attribute, valid_from) = split_composite(&key.sort)?;
    Ok(LogicalKey {
        series: key.partition.clone(),
        attribute,
        valid_from,
    })
}

impl LogicalKey {
    pub fn from_physical(key: &PhysicalKey) -> ValuationResult<Self> {
        decode(key)
    }

    pub fn to_physical(&self) -> ValuationResult<PhysicalKey> {
        encode_logical(self)
    }
}

pub fn composite_sort_key(attribute: &str, valid_from: Date) -> ValuationResult<String> {
    if attribute.is_empty() {
        return Err(ValuationError::malformed_key("empty attribute"));
    }
    if attribute.contains(KEY_SEPARATOR) {
        return Err(ValuationError::malformed_key(format!(
            "attribute '{attribute}' contains '{KEY_SEPARATOR}'"
        )));
    }
    Ok(format!(
        "{attribute}{KEY_SEPARATOR}{}",
        date_token(valid_from)
    ))
}

/// Splits `ATTRIBUTE#YYYYMMDD` on the last separator.
pub fn split_composite(sort_key: &str) -> ValuationResult<(String, Date)> {
    let Some((attribute, token)) = sort_key.rsplit_once(KEY_SEPARATOR) else {
        return Err(ValuationError::malformed_key(format!(
            "sort key '{sort_key}' has no '{KEY_SEPARATOR}' separator"
        )));
    };
    if attribute.is_empty() {
        return Err(ValuationError::malformed_key(format!(
            "sort key '{sort_key}' has an empty attribute"
        )));
    }
    if attribute.contains(KEY_SEPARATOR) {
        return Err(ValuationError::malformed_key(format!(
            "sort key '{sort_key}' is ambiguous"
        )));
    }
    let valid_from = parse_date_token(token)?;
    Ok((attribute.to_string(), valid_from))
}

pub fn date_token(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn parse_date_token(token: &str) -> ValuationResult<Date> {
    if token.len() != DATE_TOKEN_LEN || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValuationError::malformed_key(format!(
            "date token '{token}' is not YYYYMMDD"
        )));
    }
    let invalid = || ValuationError::malformed_key(format!("date token '{token}' is not a date"));
    let year: i32 = token[0..4].parse().map_err(|_| invalid())?;
    let month: u8 = token[4..6].parse().map_err(|_| invalid())?;
    let day: u8 = token[6..8].parse().map_err(|_| invalid())?;
    let month = Month::try_from(month).map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn encodes_series_and_composite() {
        let key = encode_logical(&LogicalKey::new("CDI", "TAXA", date!(2024 - 01 - 01)))
            .expect("encode");
        assert_eq!(key, PhysicalKey::new("CDI", "TAXA#20240101"));
    }

    #[test]
    fn decode_inverts_encode() {
        for (series, attribute, valid_from) in [
            ("CDI", "TAXA", date!(2024 - 01 - 01)),
            ("IPCA", "VALOR_INDICE", date!(1999 - 12 - 31)),
            ("SELIC", "FATOR DIARIO", date!(2031 - 02 - 28)),
            ("S", "A", date!(1900 - 01 - 01)),
        ] {
            let logical = LogicalKey::new(series, attribute, valid_from);
            let physical = encode_logical(&logical).expect("encode");
            assert_eq!(decode(&physical).expect("decode"), logical);
        }
    }

    #[test]
    fn attribute_with_separator_cannot_be_encoded() {
        let err = composite_sort_key("TAXA#X", date!(2024 - 01 - 01)).expect_err("separator");
        assert!(matches!(err, ValuationError::MalformedKey { .. }));
    }

    #[test]
    fn malformed_sort_keys_are_rejected() {
        for sort in [
            "TAXA",
            "#20240101",
            "TAXA#2024011",
            "TAXA#2024-01-01",
            "TAXA#20241301",
            "A#B#20240101",
        ] {
            let err = split_composite(sort).expect_err(sort);
            assert!(matches!(err, ValuationError::MalformedKey { .. }), "{sort}");
        }
    }

    #[test]
    fn date_tokens_are_fixed_width() {
        assert_eq!(date_token(date!(2024 - 03 - 04)), "20240304");
        assert_eq!(
            parse_date_token("20240304").expect("parse"),
            date!(2024 - 03 - 04)
        );
    }
}
