use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use finbench_valuation_core::{KV_MAX_BATCH, ValuationError, ValuationResult};

use super::client::{
    AttributeValue, ExpressionAttributes, Item, ItemPage, KeyValueClient, QueryRequest,
    ScanRequest,
};
use super::schema::{KeySchema, SecondaryIndex, TABLE_KEY};

type TableKey = (String, String);

/// In-process key-value service with the same key, index, paging and batch
/// semantics as the hosted one. Tables must be created before use.
#[derive(Default)]
pub struct MemoryKeyValueClient {
    tables: RwLock<HashMap<String, BTreeMap<TableKey, Item>>>,
    stats: CallStats,
    queried_indexes: Mutex<Vec<Option<String>>>,
}

#[derive(Default)]
struct CallStats {
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    queries: AtomicUsize,
    scans: AtomicUsize,
    batch_writes: AtomicUsize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub puts: usize,
    pub gets: usize,
    pub deletes: usize,
    pub queries: usize,
    pub scans: usize,
    pub batch_writes: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.puts + self.gets + self.deletes + self.queries + self.scans + self.batch_writes
    }
}

impl MemoryKeyValueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_table(table_name: &str) -> Self {
        let client = Self::new();
        client.create_table(table_name).await;
        client
    }

    pub async fn create_table(&self, table_name: &str) {
        self.tables
            .write()
            .await
            .entry(table_name.to_string())
            .or_default();
    }

    pub async fn item_count(&self, table_name: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table_name)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CallCounts {
        CallCounts {
            puts: self.stats.puts.load(Ordering::SeqCst),
            gets: self.stats.gets.load(Ordering::SeqCst),
            deletes: self.stats.deletes.load(Ordering::SeqCst),
            queries: self.stats.queries.load(Ordering::SeqCst),
            scans: self.stats.scans.load(Ordering::SeqCst),
            batch_writes: self.stats.batch_writes.load(Ordering::SeqCst),
        }
    }

    /// Index named by each query so far, `None` for base-table queries.
    pub async fn queried_indexes(&self) -> Vec<Option<String>> {
        self.queried_indexes.lock().await.clone()
    }

    pub async fn reset_stats(&self) {
        for counter in [
            &self.stats.puts,
            &self.stats.gets,
            &self.stats.deletes,
            &self.stats.queries,
            &self.stats.scans,
            &self.stats.batch_writes,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.queried_indexes.lock().await.clear();
    }
}

#[async_trait]
impl KeyValueClient for MemoryKeyValueClient {
    async fn put_item(&self, table_name: &str, item: Item) -> ValuationResult<()> {
        self.stats.puts.fetch_add(1, Ordering::SeqCst);
        let key = table_key(&item)?;
        let mut tables = self.tables.write().await;
        table_mut(&mut tables, table_name)?.insert(key, item);
        Ok(())
    }

    async fn get_item(&self, table_name: &str, key: Item) -> ValuationResult<Option<Item>> {
        self.stats.gets.fetch_add(1, Ordering::SeqCst);
        let key = table_key(&key)?;
        let tables = self.tables.read().await;
        Ok(table(&tables, table_name)?.get(&key).cloned())
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> ValuationResult<()> {
        self.stats.deletes.fetch_add(1, Ordering::SeqCst);
        let key = table_key(&key)?;
        let mut tables = self.tables.write().await;
        table_mut(&mut tables, table_name)?.remove(&key);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> ValuationResult<ItemPage> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        self.queried_indexes
            .lock()
            .await
            .push(request.index_name.clone());
        let index = match request.index_name.as_deref() {
            Some(name) => Some(SecondaryIndex::from_name(name).ok_or_else(|| {
                ValuationError::request_failed(format!(
                    "ValidationException: table has no index {name}"
                ))
            })?),
            None => None,
        };
        let schema = index.map(SecondaryIndex::key_schema).unwrap_or(TABLE_KEY);
        let key_condition = parse_conditions(&request.key_condition_expression, &request.attributes)?;
        check_key_condition(&key_condition, schema)?;
        let filter = parse_optional(&request.filter_expression, &request.attributes)?;

        let tables = self.tables.read().await;
        let rows = table(&tables, &request.table_name)?;
        let candidates = rows
            .values()
            .filter(|item| schema.attributes().iter().all(|a| item.contains_key(*a)))
            .filter(|item| matches_all(item, &key_condition))
            .collect();
        evaluate(
            candidates,
            schema,
            index.is_some(),
            &filter,
            request.limit,
            request.exclusive_start_key.as_ref(),
        )
    }

    async fn scan(&self, request: ScanRequest) -> ValuationResult<ItemPage> {
        self.stats.scans.fetch_add(1, Ordering::SeqCst);
        let filter = parse_optional(&request.filter_expression, &request.attributes)?;
        let tables = self.tables.read().await;
        let rows = table(&tables, &request.table_name)?;
        evaluate(
            rows.values().collect(),
            TABLE_KEY,
            false,
            &filter,
            request.limit,
            request.exclusive_start_key.as_ref(),
        )
    }

    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> ValuationResult<()> {
        self.stats.batch_writes.fetch_add(1, Ordering::SeqCst);
        if items.is_empty() || items.len() > KV_MAX_BATCH {
            return Err(ValuationError::request_failed(format!(
                "ValidationException: batch write accepts 1 to {KV_MAX_BATCH} items, got {}",
                items.len()
            )));
        }
        let mut keys = HashSet::with_capacity(items.len());
        for item in &items {
            if !keys.insert(table_key(item)?) {
                return Err(ValuationError::request_failed(
                    "ValidationException: batch contains duplicate keys",
                ));
            }
        }
        let mut tables = self.tables.write().await;
        let rows = table_mut(&mut tables, table_name)?;
        for item in items {
            rows.insert(table_key(&item)?, item);
        }
        Ok(())
    }
}

fn table<'a>(
    tables: &'a HashMap<String, BTreeMap<TableKey, Item>>,
    name: &str,
) -> ValuationResult<&'a BTreeMap<TableKey, Item>> {
    tables.get(name).ok_or_else(|| missing_table(name))
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, BTreeMap<TableKey, Item>>,
    name: &str,
) -> ValuationResult<&'a mut BTreeMap<TableKey, Item>> {
    tables.get_mut(name).ok_or_else(|| missing_table(name))
}

fn missing_table(name: &str) -> ValuationError {
    ValuationError::request_failed(format!(
        "ResourceNotFoundException: table {name} does not exist"
    ))
}

fn key_part(item: &Item, attribute: &str) -> ValuationResult<String> {
    item.get(attribute)
        .map(|value| value.as_str().to_string())
        .ok_or_else(|| {
            ValuationError::request_failed(format!(
                "ValidationException: missing key attribute {attribute}"
            ))
        })
}

fn table_key(item: &Item) -> ValuationResult<TableKey> {
    Ok((
        key_part(item, TABLE_KEY.partition)?,
        key_part(item, TABLE_KEY.sort)?,
    ))
}

/// Position of an item within an index: index key first, then table key.
fn position(item: &Item, schema: KeySchema) -> ValuationResult<(TableKey, TableKey)> {
    Ok((
        (key_part(item, schema.partition)?, key_part(item, schema.sort)?),
        table_key(item)?,
    ))
}

fn evaluate(
    candidates: Vec<&Item>,
    schema: KeySchema,
    is_index: bool,
    filter: &[(String, AttributeValue)],
    limit: Option<usize>,
    exclusive_start_key: Option<&Item>,
) -> ValuationResult<ItemPage> {
    let mut ordered = candidates
        .into_iter()
        .map(|item| Ok((position(item, schema)?, item)))
        .collect::<ValuationResult<Vec<_>>>()?;
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(start) = exclusive_start_key {
        let start = position(start, schema)?;
        ordered.retain(|(pos, _)| *pos > start);
    }

    let mut items = Vec::new();
    let mut last_evaluated: Option<&Item> = None;
    let mut has_more = false;
    for (evaluated, (_, item)) in ordered.iter().enumerate() {
        if let Some(limit) = limit
            && evaluated >= limit
        {
            has_more = true;
            break;
        }
        last_evaluated = Some(*item);
        if matches_all(item, filter) {
            items.push((*item).clone());
        }
    }

    let last_evaluated_key = match last_evaluated {
        Some(item) if has_more => Some(evaluated_key(item, schema, is_index)),
        _ => None,
    };
    Ok(ItemPage {
        items,
        last_evaluated_key,
    })
}

fn evaluated_key(item: &Item, schema: KeySchema, is_index: bool) -> Item {
    let mut attributes: Vec<&str> = TABLE_KEY.attributes().to_vec();
    if is_index {
        attributes.extend(schema.attributes());
    }
    attributes
        .into_iter()
        .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

fn matches_all(item: &Item, conditions: &[(String, AttributeValue)]) -> bool {
    conditions
        .iter()
        .all(|(name, value)| item.get(name) == Some(value))
}

fn check_key_condition(
    conditions: &[(String, AttributeValue)],
    schema: KeySchema,
) -> ValuationResult<()> {
    let names: Vec<&str> = conditions.iter().map(|(name, _)| name.as_str()).collect();
    let valid = match names.as_slice() {
        [partition] => *partition == schema.partition,
        [first, second] => {
            (*first == schema.partition && *second == schema.sort)
                || (*first == schema.sort && *second == schema.partition)
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValuationError::request_failed(format!(
            "ValidationException: key condition must name {} and optionally {}",
            schema.partition, schema.sort
        )))
    }
}

fn parse_optional(
    expression: &Option<String>,
    attributes: &ExpressionAttributes,
) -> ValuationResult<Vec<(String, AttributeValue)>> {
    match expression {
        Some(expression) => parse_conditions(expression, attributes),
        None => Ok(Vec::new()),
    }
}

/// Parses `name = :value [AND name = :value ...]`, resolving `#name`
/// placeholders.
fn parse_conditions(
    expression: &str,
    attributes: &ExpressionAttributes,
) -> ValuationResult<Vec<(String, AttributeValue)>> {
    let invalid = |detail: &str| {
        ValuationError::request_failed(format!(
            "ValidationException: invalid expression '{expression}': {detail}"
        ))
    };
    let tokens: Vec<&str> = expression.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let mut conditions = Vec::new();
    let mut rest = tokens.as_slice();
    loop {
        let [name, "=", value, tail @ ..] = rest else {
            return Err(invalid("expected `name = :value`"));
        };
        let name = if name.starts_with('#') {
            attributes
                .names
                .get(*name)
                .cloned()
                .ok_or_else(|| invalid(&format!("unbound name {name}")))?
        } else {
            name.to_string()
        };
        let value = attributes
            .values
            .get(*value)
            .cloned()
            .ok_or_else(|| invalid(&format!("unbound value {value}")))?;
        conditions.push((name, value));
        match tail {
            [] => return Ok(conditions),
            [and, more @ ..] if and.eq_ignore_ascii_case("and") => rest = more,
            _ => return Err(invalid("expected AND")),
        }
    }
}
