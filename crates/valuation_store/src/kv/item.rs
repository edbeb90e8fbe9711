use std::str::FromStr;

use rust_decimal::Decimal;
use time::PrimitiveDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

use finbench_valuation_core::key::{self, date_token, parse_date_token};
use finbench_valuation_core::{PhysicalKey, ValuationError, ValuationResult, ValueRecord};

use super::client::{AttributeValue, Item};
use super::schema::*;

const UPDATED_AT_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub fn to_item(record: &ValueRecord) -> ValuationResult<Item> {
    let physical = key::encode(record)?;
    let updated_at = record
        .updated_at
        .to_offset(time::UtcOffset::UTC)
        .format(UPDATED_AT_FORMAT)
        .map_err(|err| ValuationError::validation(format!("format updated_at: {err}")))?;
    let mut item = key_item(&physical);
    item.insert(ATTR_FAMILY.to_string(), AttributeValue::S(record.family.clone()));
    item.insert(
        ATTR_ATTRIBUTE.to_string(),
        AttributeValue::S(record.attribute.clone()),
    );
    if let Some(source_file) = record.source_file.as_ref().filter(|s| !s.is_empty()) {
        item.insert(
            ATTR_SOURCE_FILE.to_string(),
            AttributeValue::S(source_file.clone()),
        );
    }
    item.insert(
        ATTR_AMOUNT.to_string(),
        AttributeValue::N(record.amount.to_string()),
    );
    item.insert(
        ATTR_VALID_FROM.to_string(),
        AttributeValue::S(date_token(record.valid_from)),
    );
    item.insert(
        ATTR_VALID_TO.to_string(),
        AttributeValue::S(date_token(record.valid_to)),
    );
    item.insert(ATTR_UPDATED_AT.to_string(), AttributeValue::S(updated_at));
    Ok(item)
}

pub fn from_item(item: &Item) -> ValuationResult<ValueRecord> {
    let logical = key::decode(&physical_key(item)?)?;
    let amount_raw = required(item, ATTR_AMOUNT)?;
    let amount = Decimal::from_str(amount_raw).map_err(|err| {
        ValuationError::request_failed(format!("{ATTR_AMOUNT} '{amount_raw}' is not a number: {err}"))
    })?;
    let updated_raw = required(item, ATTR_UPDATED_AT)?;
    let updated_at = PrimitiveDateTime::parse(updated_raw, UPDATED_AT_FORMAT)
        .map_err(|err| {
            ValuationError::request_failed(format!(
                "{ATTR_UPDATED_AT} '{updated_raw}' is not a timestamp: {err}"
            ))
        })?
        .assume_utc();
    Ok(ValueRecord {
        family: required(item, ATTR_FAMILY)?.to_string(),
        series: logical.series,
        attribute: logical.attribute,
        source_file: item.get(ATTR_SOURCE_FILE).map(|v| v.as_str().to_string()),
        amount,
        valid_from: logical.valid_from,
        valid_to: parse_date_token(required(item, ATTR_VALID_TO)?)?,
        updated_at,
    })
}

/// Primary-key attributes only, as accepted by get and delete.
pub fn key_item(key: &PhysicalKey) -> Item {
    let mut item = Item::new();
    item.insert(
        TABLE_KEY.partition.to_string(),
        AttributeValue::S(key.partition.clone()),
    );
    item.insert(
        TABLE_KEY.sort.to_string(),
        AttributeValue::S(key.sort.clone()),
    );
    item
}

pub fn physical_key(item: &Item) -> ValuationResult<PhysicalKey> {
    let partition = item
        .get(TABLE_KEY.partition)
        .ok_or_else(|| ValuationError::malformed_key(format!("item has no {}", TABLE_KEY.partition)))?;
    let sort = item
        .get(TABLE_KEY.sort)
        .ok_or_else(|| ValuationError::malformed_key(format!("item has no {}", TABLE_KEY.sort)))?;
    Ok(PhysicalKey::new(partition.as_str(), sort.as_str()))
}

fn required<'a>(item: &'a Item, name: &str) -> ValuationResult<&'a str> {
    item.get(name)
        .map(AttributeValue::as_str)
        .ok_or_else(|| ValuationError::request_failed(format!("item is missing {name}")))
}
