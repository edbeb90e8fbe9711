use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{TryStreamExt, pin_mut};

use finbench_valuation_core::{
    BatchPlan, LogicalKey, Page, PageSource, Pager, Predicate, RequestGuard, ScanPage,
    ValuationError, ValuationResult, ValueFilter, ValueRecord, ValueRepository, WriteSummary,
    decode_cursor, encode_cursor, item_key, key,
};
use tokio_util::sync::CancellationToken;

use super::client::{Item, ItemPage, KeyValueClient, QueryRequest, ScanRequest};
use super::expression::{self, RenderedExpression};
use super::item;
use super::planner::{self, AccessPath, QueryPlan};
use super::schema::SecondaryIndex;
use crate::config::{Limits, ValuationConfig};

/// Valuation repository over a key-value table with four secondary indexes.
#[derive(Clone)]
pub struct KvValueStore {
    client: Arc<dyn KeyValueClient>,
    table_name: String,
    limits: Limits,
    guard: RequestGuard,
    failpoints: Arc<HashSet<String>>,
}

impl KvValueStore {
    pub fn new(client: Arc<dyn KeyValueClient>, config: &ValuationConfig) -> Self {
        let limits = Limits::from_config(config);
        Self {
            client,
            table_name: config.table_name(),
            limits,
            guard: RequestGuard::new(CancellationToken::new(), limits.request_timeout),
            failpoints: Arc::new(config.failpoint_set()),
        }
    }

    /// Same store, with every backend call tied to `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            guard: self.guard.with_token(token),
            ..self.clone()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    fn maybe_failpoint(&self, key: &str) -> ValuationResult<()> {
        if self.failpoints.contains(key) {
            Err(ValuationError::request_failed(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    fn pager(&self) -> Pager {
        Pager::new(self.limits.page_size).with_guard(self.guard.clone())
    }

    fn scan_source(&self, rendered: RenderedExpression) -> ScanSource<'_> {
        ScanSource {
            client: self.client.as_ref(),
            request: ScanRequest {
                table_name: self.table_name.clone(),
                filter_expression: rendered.filter,
                attributes: rendered.attributes,
                limit: None,
                exclusive_start_key: None,
            },
        }
    }

    async fn execute(&self, plan: QueryPlan) -> ValuationResult<Vec<ValueRecord>> {
        log::debug!(
            "kv plan: {} key={:?} residual={:?}",
            plan.path,
            plan.key.iter().map(|p| p.field).collect::<Vec<_>>(),
            plan.residual.iter().map(|p| p.field).collect::<Vec<_>>()
        );
        let rendered = expression::render(&plan.key, &plan.residual);
        match plan.path {
            AccessPath::FullScan => self.pager().collect(&self.scan_source(rendered)).await,
            AccessPath::KeyLookup => self.query_all(None, rendered).await,
            AccessPath::Index(index) => self.query_all(Some(index), rendered).await,
        }
    }

    async fn query_all(
        &self,
        index: Option<SecondaryIndex>,
        rendered: RenderedExpression,
    ) -> ValuationResult<Vec<ValueRecord>> {
        let key_condition = rendered
            .key_condition
            .ok_or_else(|| ValuationError::validation("query requires a key condition"))?;
        let source = QuerySource {
            client: self.client.as_ref(),
            request: QueryRequest {
                table_name: self.table_name.clone(),
                index_name: index.map(|index| index.name().to_string()),
                key_condition_expression: key_condition,
                filter_expression: rendered.filter,
                attributes: rendered.attributes,
                limit: None,
                exclusive_start_key: None,
            },
        };
        self.pager().collect(&source).await
    }

    async fn query_index(
        &self,
        index: SecondaryIndex,
        key: Vec<Predicate>,
    ) -> ValuationResult<Vec<ValueRecord>> {
        log::debug!("kv plan: index {} (direct)", index.name());
        self.query_all(Some(index), expression::render(&key, &[]))
            .await
    }

    async fn write_chunk(&self, index: usize, chunk: &[ValueRecord]) -> ValuationResult<()> {
        self.maybe_failpoint(&format!("batch_chunk:{index}"))?;
        let items = chunk
            .iter()
            .map(item::to_item)
            .collect::<ValuationResult<Vec<_>>>()?;
        self.guard
            .run(
                "batch write",
                self.client.batch_write(&self.table_name, items),
            )
            .await
    }
}

#[async_trait]
impl ValueRepository for KvValueStore {
    fn backend_name(&self) -> &'static str {
        "key-value"
    }

    async fn insert(&self, record: ValueRecord) -> ValuationResult<()> {
        record.validate()?;
        let item = item::to_item(&record)?;
        self.guard
            .run("put item", self.client.put_item(&self.table_name, item))
            .await
    }

    async fn insert_batch(&self, records: Vec<ValueRecord>) -> ValuationResult<WriteSummary> {
        for record in &records {
            record.validate()?;
        }
        let plan = BatchPlan::new(records, self.limits.kv_batch_size);
        let summary = plan.summary();
        for (index, chunk) in plan.chunks().iter().enumerate() {
            self.write_chunk(index, chunk).await.map_err(|err| {
                log::warn!(
                    "kv batch: chunk {} of {} failed after {} chunks written",
                    index + 1,
                    summary.chunks,
                    index
                );
                err.with_context(format!("batch chunk {} of {}", index + 1, summary.chunks))
            })?;
        }
        log::info!(
            "kv batch: wrote {} records in {} chunks",
            summary.records,
            summary.chunks
        );
        Ok(summary)
    }

    async fn get_item(&self, series: &str, attribute_date: &str) -> ValuationResult<ValueRecord> {
        let key = item_key(series, attribute_date)?;
        self.get(&key).await
    }

    async fn get(&self, key: &LogicalKey) -> ValuationResult<ValueRecord> {
        if key.series.trim().is_empty() {
            return Err(ValuationError::validation("series must not be blank"));
        }
        let physical = key.to_physical()?;
        let found = self
            .guard
            .run(
                "get item",
                self.client
                    .get_item(&self.table_name, item::key_item(&physical)),
            )
            .await?;
        match found {
            Some(found) => item::from_item(&found),
            None => Err(ValuationError::not_found(format!(
                "{} {}",
                physical.partition, physical.sort
            ))),
        }
    }

    async fn find(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>> {
        let plan = planner::plan(filter)?;
        self.execute(plan).await
    }

    async fn scan(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>> {
        let predicates = planner::canonical_predicates(filter)?;
        let source = self.scan_source(expression::render_filter(&predicates));
        self.pager().collect(&source).await
    }

    async fn scan_page(
        &self,
        filter: &ValueFilter,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ValuationResult<ScanPage> {
        let predicates = planner::canonical_predicates(filter)?;
        let start = cursor.map(decode_cursor::<Item>).transpose()?;
        let source = self.scan_source(expression::render_filter(&predicates));
        let page = self
            .guard
            .run("scan page", source.fetch_page(start, page_size.max(1)))
            .await?;
        Ok(ScanPage {
            items: page.items,
            cursor: page.next.as_ref().map(encode_cursor).transpose()?,
        })
    }

    async fn capture(&self, max_records: usize) -> ValuationResult<Vec<ValueRecord>> {
        let source = self.scan_source(RenderedExpression::default());
        self.pager().stop_at(max_records).collect(&source).await
    }

    async fn delete_all(&self) -> ValuationResult<u64> {
        let source = self.scan_source(RenderedExpression::default());
        let pager = self.pager();
        let pages = pager.stream(&source);
        pin_mut!(pages);
        let mut deleted = 0u64;
        while let Some(page) = pages.try_next().await? {
            for record in page {
                let physical = key::encode(&record)?;
                self.guard
                    .run(
                        "delete item",
                        self.client
                            .delete_item(&self.table_name, item::key_item(&physical)),
                    )
                    .await?;
                deleted += 1;
            }
        }
        log::info!("kv purge: deleted {deleted} items from {}", self.table_name);
        Ok(deleted)
    }

    async fn by_family(&self, family: &str) -> ValuationResult<Vec<ValueRecord>> {
        let filter = ValueFilter::new().family(family);
        if filter.is_empty() {
            return self.find(&filter).await;
        }
        self.query_index(SecondaryIndex::FamilyDate, filter.predicates())
            .await
    }

    async fn by_series(&self, series: &str) -> ValuationResult<Vec<ValueRecord>> {
        let filter = ValueFilter::new().series(series);
        if filter.is_empty() {
            return self.find(&filter).await;
        }
        self.query_index(SecondaryIndex::SeriesDate, filter.predicates())
            .await
    }
}

struct QuerySource<'a> {
    client: &'a dyn KeyValueClient,
    request: QueryRequest,
}

#[async_trait]
impl<'a> PageSource for QuerySource<'a> {
    type Cursor = Item;

    async fn fetch_page(
        &self,
        cursor: Option<Item>,
        page_size: usize,
    ) -> ValuationResult<Page<Item>> {
        let mut request = self.request.clone();
        request.limit = Some(page_size);
        request.exclusive_start_key = cursor;
        into_page(self.client.query(request).await?)
    }
}

struct ScanSource<'a> {
    client: &'a dyn KeyValueClient,
    request: ScanRequest,
}

#[async_trait]
impl<'a> PageSource for ScanSource<'a> {
    type Cursor = Item;

    async fn fetch_page(
        &self,
        cursor: Option<Item>,
        page_size: usize,
    ) -> ValuationResult<Page<Item>> {
        let mut request = self.request.clone();
        request.limit = Some(page_size);
        request.exclusive_start_key = cursor;
        into_page(self.client.scan(request).await?)
    }
}

fn into_page(page: ItemPage) -> ValuationResult<Page<Item>> {
    let items = page
        .items
        .iter()
        .map(item::from_item)
        .collect::<ValuationResult<Vec<_>>>()?;
    Ok(Page {
        items,
        next: page.last_evaluated_key,
    })
}
