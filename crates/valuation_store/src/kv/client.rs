use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use finbench_valuation_core::ValuationResult;

/// Wire value of a single item attribute. Numbers travel as their decimal
/// text, the way the service encodes them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> &str {
        match self {
            AttributeValue::S(value) | AttributeValue::N(value) => value,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

/// Attribute name to value. Ordered so encoded cursors are stable.
pub type Item = BTreeMap<String, AttributeValue>;

/// Placeholder maps shared by key conditions and filter expressions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpressionAttributes {
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub attributes: ExpressionAttributes,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Clone, Debug, Default)]
pub struct ScanRequest {
    pub table_name: String,
    pub filter_expression: Option<String>,
    pub attributes: ExpressionAttributes,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

/// Items that passed the filter, plus the key of the last item evaluated
/// when the service stopped before the end of the range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// The subset of the key-value service the access layer consumes.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    async fn put_item(&self, table_name: &str, item: Item) -> ValuationResult<()>;

    async fn get_item(&self, table_name: &str, key: Item) -> ValuationResult<Option<Item>>;

    async fn delete_item(&self, table_name: &str, key: Item) -> ValuationResult<()>;

    async fn query(&self, request: QueryRequest) -> ValuationResult<ItemPage>;

    async fn scan(&self, request: ScanRequest) -> ValuationResult<ItemPage>;

    /// Writes up to 25 put requests as one call.
    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> ValuationResult<()>;
}
