use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::key::KEY_SEPARATOR;
use crate::{ValuationError, ValuationResult};

/// Years a `YYYYMMDD` date token can represent.
const KEY_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// One valuation fact: the amount a series attribute holds over a validity
/// window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub family: String,
    pub series: String,
    pub attribute: String,
    pub source_file: Option<String>,
    pub amount: Decimal,
    pub valid_from: Date,
    pub valid_to: Date,
    pub updated_at: OffsetDateTime,
}

impl ValueRecord {
    /// Builds a record stamped with the current time.
    pub fn new(
        family: impl Into<String>,
        series: impl Into<String>,
        attribute: impl Into<String>,
        amount: Decimal,
        valid_from: Date,
        valid_to: Date,
    ) -> Self {
        Self {
            family: family.into(),
            series: series.into(),
            attribute: attribute.into(),
            source_file: None,
            amount,
            valid_from,
            valid_to,
            updated_at: now_utc(),
        }
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: OffsetDateTime) -> Self {
        self.updated_at = truncate_to_seconds(updated_at);
        self
    }

    /// Re-stamps `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }

    pub fn logical_key(&self) -> LogicalKey {
        LogicalKey {
            series: self.series.clone(),
            attribute: self.attribute.clone(),
            valid_from: self.valid_from,
        }
    }

    /// Checks the write-time invariants. Runs before any backend call.
    pub fn validate(&self) -> ValuationResult<()> {
        for (field, value) in [
            ("family", &self.family),
            ("series", &self.series),
            ("attribute", &self.attribute),
        ] {
            if value.trim().is_empty() {
                return Err(ValuationError::validation(format!(
                    "{field} must not be blank"
                )));
            }
            // Keys are matched byte for byte on both backends.
            if value.trim() != value.as_str() {
                return Err(ValuationError::validation(format!(
                    "{field} '{value}' has leading or trailing whitespace"
                )));
            }
        }
        if self.attribute.contains(KEY_SEPARATOR) {
            return Err(ValuationError::validation(format!(
                "attribute '{}' contains the key separator '{KEY_SEPARATOR}'",
                self.attribute
            )));
        }
        for (field, value) in [("valid_from", self.valid_from), ("valid_to", self.valid_to)] {
            if !KEY_YEARS.contains(&value.year()) {
                return Err(ValuationError::validation(format!(
                    "{field} {value} is outside years {}..={}",
                    KEY_YEARS.start(),
                    KEY_YEARS.end()
                )));
            }
        }
        if self.valid_from > self.valid_to {
            return Err(ValuationError::validation(format!(
                "valid_from {} is after valid_to {} for {}/{}",
                self.valid_from, self.valid_to, self.series, self.attribute
            )));
        }
        Ok(())
    }
}

/// The uniqueness boundary of a fact. `family` is deliberately absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalKey {
    pub series: String,
    pub attribute: String,
    pub valid_from: Date,
}

impl LogicalKey {
    pub fn new(series: impl Into<String>, attribute: impl Into<String>, valid_from: Date) -> Self {
        Self {
            series: series.into(),
            attribute: attribute.into(),
            valid_from,
        }
    }
}

/// Current UTC time at whole-second precision, the resolution every backend
/// stores.
pub fn now_utc() -> OffsetDateTime {
    truncate_to_seconds(OffsetDateTime::now_utc())
}

fn truncate_to_seconds(value: OffsetDateTime) -> OffsetDateTime {
    value.replace_nanosecond(0).unwrap_or(value)
}
