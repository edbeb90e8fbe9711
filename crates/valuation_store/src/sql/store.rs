use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::{
    self, Alias, Condition, Expr, ExprTrait, Func, InsertStatement, OnConflict, Order,
    PostgresQueryBuilder, Query, QueryStatementWriter, SelectStatement, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use sea_orm_migration::prelude::Iden;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use finbench_valuation_core::{
    BatchPlan, FilterField, LogicalKey, Page, PageSource, Pager, RequestGuard, ScanPage,
    ValuationError, ValuationResult, ValueFilter, ValueRecord, ValueRepository, WriteSummary,
    decode_cursor, encode_cursor, item_key,
};

use super::filter::{self, column};
use super::reference::{ReferenceEntity, ReferenceKind, ValueWithReferences};
use crate::config::{Limits, PoolConfig, ValuationConfig};
use crate::db::*;
use crate::migration::Migrator;

const VALUE_COLUMNS: [ValuationValue; 8] = [
    ValuationValue::Family,
    ValuationValue::Series,
    ValuationValue::Attribute,
    ValuationValue::SourceFile,
    ValuationValue::Amount,
    ValuationValue::ValidFrom,
    ValuationValue::ValidTo,
    ValuationValue::UpdatedAt,
];

/// Valuation repository over a relational fact table plus its reference
/// tables.
#[derive(Clone)]
pub struct SqlValueStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    limits: Limits,
    guard: RequestGuard,
    failpoints: Arc<HashSet<String>>,
}

impl SqlValueStore {
    pub async fn connect(config: &ValuationConfig, base_dir: &Path) -> ValuationResult<Self> {
        let url = config.connection_url(base_dir)?;
        let mut options = ConnectOptions::new(url);
        let pool = config.pool.clone().unwrap_or_else(PoolConfig::with_defaults);
        if let Some(max) = pool.max_connections {
            options.max_connections(max);
        }
        if let Some(min) = pool.min_connections {
            options.min_connections(min);
        }
        if let Some(timeout_ms) = pool.connect_timeout_ms {
            options.connect_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.acquire_timeout_ms {
            options.acquire_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.idle_timeout_ms {
            options.idle_timeout(Duration::from_millis(timeout_ms));
        }
        let conn = Database::connect(options)
            .await
            .map_err(ValuationError::from)?;
        let backend = conn.get_database_backend();
        let limits = Limits::from_config(config);
        let store = Self {
            conn,
            backend,
            limits,
            guard: RequestGuard::new(CancellationToken::new(), limits.request_timeout),
            failpoints: Arc::new(config.failpoint_set()),
        };
        Migrator::up(&store.conn, None)
            .await
            .map_err(ValuationError::from)?;
        log::debug!("sql store connected ({:?})", store.backend);
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> ValuationResult<Self> {
        let config = ValuationConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    /// Same store, with every statement tied to `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            guard: self.guard.with_token(token),
            ..self.clone()
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    fn maybe_failpoint(&self, key: &str) -> ValuationResult<()> {
        if self.failpoints.contains(key) {
            Err(ValuationError::request_failed(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    /// Inserts the entity unless a row with the same name already exists.
    pub async fn upsert_reference(
        &self,
        kind: ReferenceKind,
        entity: ReferenceEntity,
    ) -> ValuationResult<()> {
        if entity.name.trim().is_empty() {
            return Err(ValuationError::validation("reference name must not be blank"));
        }
        let insert = reference_insert(kind, std::slice::from_ref(&entity));
        self.guard
            .run("upsert reference", exec(&self.conn, &insert))
            .await
    }

    pub async fn get_reference(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> ValuationResult<ReferenceEntity> {
        let select = reference_select(kind, name);
        let row = self
            .guard
            .run("get reference", query_one(&self.conn, &select))
            .await?;
        match row {
            Some(row) => Ok(ReferenceEntity {
                name: row.try_get("", "name")?,
                description: row.try_get("", "description")?,
                internal_code: row.try_get("", "internal_code")?,
            }),
            None => Err(ValuationError::not_found(format!("{kind:?} {name}"))),
        }
    }

    /// Facts matching the filter, joined to their reference rows.
    pub async fn find_with_references(
        &self,
        filter: &ValueFilter,
    ) -> ValuationResult<Vec<ValueWithReferences>> {
        let mut select = select_values();
        select
            .expr_as(
                Expr::col((ValuationFamily::Table, ValuationFamily::Description)),
                Alias::new("family_description"),
            )
            .expr_as(
                Expr::col((ValuationFamily::Table, ValuationFamily::InternalCode)),
                Alias::new("family_internal_code"),
            )
            .expr_as(
                Expr::col((ValuationSeries::Table, ValuationSeries::Description)),
                Alias::new("series_description"),
            )
            .expr_as(
                Expr::col((ValuationSeries::Table, ValuationSeries::InternalCode)),
                Alias::new("series_internal_code"),
            )
            .expr_as(
                Expr::col((ValuationAttribute::Table, ValuationAttribute::Description)),
                Alias::new("attribute_description"),
            )
            .expr_as(
                Expr::col((ValuationAttribute::Table, ValuationAttribute::InternalCode)),
                Alias::new("attribute_internal_code"),
            )
            .expr_as(
                Expr::col((ValuationSourceFile::Table, ValuationSourceFile::Description)),
                Alias::new("source_file_description"),
            )
            .expr_as(
                Expr::col((ValuationSourceFile::Table, ValuationSourceFile::InternalCode)),
                Alias::new("source_file_internal_code"),
            )
            .inner_join(
                ValuationFamily::Table,
                Expr::col((ValuationFamily::Table, ValuationFamily::Name))
                    .equals((ValuationValue::Table, ValuationValue::Family)),
            )
            .inner_join(
                ValuationSeries::Table,
                Expr::col((ValuationSeries::Table, ValuationSeries::Name))
                    .equals((ValuationValue::Table, ValuationValue::Series)),
            )
            .inner_join(
                ValuationAttribute::Table,
                Expr::col((ValuationAttribute::Table, ValuationAttribute::Name))
                    .equals((ValuationValue::Table, ValuationValue::Attribute)),
            )
            .left_join(
                ValuationSourceFile::Table,
                Expr::col((ValuationSourceFile::Table, ValuationSourceFile::Name))
                    .equals((ValuationValue::Table, ValuationValue::SourceFile)),
            );
        apply_filter(&mut select, filter, None)?;
        order_by_key(&mut select);
        let rows = self
            .guard
            .run("find with references", query_all(&self.conn, &select))
            .await?;
        rows.iter()
            .map(|row| {
                let record = read_record(row)?;
                let joined = |prefix: &str, name: &str| -> ValuationResult<ReferenceEntity> {
                    Ok(ReferenceEntity {
                        name: name.to_string(),
                        description: row.try_get("", &format!("{prefix}_description"))?,
                        internal_code: row.try_get("", &format!("{prefix}_internal_code"))?,
                    })
                };
                let source_file = match record.source_file.as_deref() {
                    Some(name) => {
                        let description: Option<String> =
                            row.try_get("", "source_file_description")?;
                        let internal_code: Option<String> =
                            row.try_get("", "source_file_internal_code")?;
                        description.zip(internal_code).map(|(description, internal_code)| {
                            ReferenceEntity::new(name, description, internal_code)
                        })
                    }
                    None => None,
                };
                Ok(ValueWithReferences {
                    family: joined("family", &record.family)?,
                    series: joined("series", &record.series)?,
                    attribute: joined("attribute", &record.attribute)?,
                    source_file,
                    record,
                })
            })
            .collect()
    }

    /// Up to `limit` facts in random order.
    pub async fn sample(&self, limit: u64) -> ValuationResult<Vec<ValueRecord>> {
        let mut select = select_values();
        select
            .order_by_expr(Func::random().into(), Order::Asc)
            .limit(limit);
        let rows = self
            .guard
            .run("sample", query_all(&self.conn, &select))
            .await?;
        rows.iter().map(read_record).collect()
    }

    async fn select_records(
        &self,
        operation: &str,
        filter: &ValueFilter,
    ) -> ValuationResult<Vec<ValueRecord>> {
        let mut select = select_values();
        apply_filter(&mut select, filter, None)?;
        order_by_key(&mut select);
        let rows = self
            .guard
            .run(operation, query_all(&self.conn, &select))
            .await?;
        rows.iter().map(read_record).collect()
    }

    /// One keyset page ordered by logical key, starting after `after`.
    async fn fetch_keyset(
        &self,
        filter: &ValueFilter,
        after: Option<&LogicalKey>,
        page_size: usize,
    ) -> ValuationResult<Page<LogicalKey>> {
        let mut select = select_values();
        apply_filter(&mut select, filter, after)?;
        order_by_key(&mut select);
        // One extra row signals another page. Backends take a signed limit.
        let limit = Ord::min(
            u64::try_from(page_size).unwrap_or(u64::MAX),
            i64::MAX as u64 - 1,
        );
        select.limit(limit + 1);
        let rows = query_all(&self.conn, &select).await?;
        let mut items = rows
            .iter()
            .map(read_record)
            .collect::<ValuationResult<Vec<_>>>()?;
        let next = if items.len() > page_size {
            items.truncate(page_size);
            items.last().map(ValueRecord::logical_key)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn write_chunk(&self, index: usize, chunk: &[ValueRecord]) -> ValuationResult<()> {
        self.maybe_failpoint(&format!("batch_chunk:{index}"))?;
        self.write_records(chunk).await
    }

    /// Writes references then facts in one transaction.
    async fn write_records(&self, chunk: &[ValueRecord]) -> ValuationResult<()> {
        let tx = self.conn.begin().await?;
        ensure_references(&tx, chunk).await?;
        for record in chunk {
            exec(&tx, &upsert_value(self.backend, record)).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ValueRepository for SqlValueStore {
    fn backend_name(&self) -> &'static str {
        match self.backend {
            DatabaseBackend::Postgres => "postgres",
            DatabaseBackend::Sqlite => "sqlite",
            _ => "sql",
        }
    }

    async fn insert(&self, record: ValueRecord) -> ValuationResult<()> {
        record.validate()?;
        self.guard
            .run("insert", self.write_records(std::slice::from_ref(&record)))
            .await
    }

    async fn insert_batch(&self, records: Vec<ValueRecord>) -> ValuationResult<WriteSummary> {
        for record in &records {
            record.validate()?;
        }
        let plan = BatchPlan::new(records, self.limits.sql_batch_size);
        let summary = plan.summary();
        for (index, chunk) in plan.chunks().iter().enumerate() {
            self.guard
                .run("batch chunk", self.write_chunk(index, chunk))
                .await
                .map_err(|err| {
                    log::warn!(
                        "sql batch: chunk {} of {} failed after {} chunks written",
                        index + 1,
                        summary.chunks,
                        index
                    );
                    err.with_context(format!("batch chunk {} of {}", index + 1, summary.chunks))
                })?;
        }
        log::info!(
            "sql batch: wrote {} records in {} chunks",
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
        let filter = ValueFilter::for_key(key);
        if !filter.has(FilterField::Series) || !filter.has(FilterField::Attribute)
        {
            return Err(ValuationError::validation(
                "series and attribute must not be blank",
            ));
        }
        let mut select = select_values();
        apply_filter(&mut select, &filter, None)?;
        select.limit(1);
        let row = self
            .guard
            .run("get", query_one(&self.conn, &select))
            .await?;
        match row {
            Some(row) => read_record(&row),
            None => Err(ValuationError::not_found(format!(
                "{} {} {}",
                key.series, key.attribute, key.valid_from
            ))),
        }
    }

    async fn find(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>> {
        self.select_records("find", filter).await
    }

    async fn scan(&self, filter: &ValueFilter) -> ValuationResult<Vec<ValueRecord>> {
        self.select_records("scan", filter).await
    }

    async fn scan_page(
        &self,
        filter: &ValueFilter,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ValuationResult<ScanPage> {
        let after = cursor.map(decode_cursor::<LogicalKey>).transpose()?;
        let page = self
            .guard
            .run(
                "scan page",
                self.fetch_keyset(filter, after.as_ref(), page_size.max(1)),
            )
            .await?;
        Ok(ScanPage {
            items: page.items,
            cursor: page.next.as_ref().map(encode_cursor).transpose()?,
        })
    }

    async fn capture(&self, max_records: usize) -> ValuationResult<Vec<ValueRecord>> {
        let source = KeysetSource {
            store: self,
            filter: ValueFilter::new(),
        };
        Pager::new(self.limits.page_size)
            .with_guard(self.guard.clone())
            .stop_at(max_records)
            .collect(&source)
            .await
    }

    async fn delete_all(&self) -> ValuationResult<u64> {
        let delete = Query::delete()
            .from_table(ValuationValue::Table)
            .to_owned();
        let deleted = self
            .guard
            .run("delete all", exec_count(&self.conn, &delete))
            .await?;
        log::info!("sql purge: deleted {deleted} rows");
        Ok(deleted)
    }
}

struct KeysetSource<'a> {
    store: &'a SqlValueStore,
    filter: ValueFilter,
}

#[async_trait]
impl<'a> PageSource for KeysetSource<'a> {
    type Cursor = LogicalKey;

    async fn fetch_page(
        &self,
        cursor: Option<LogicalKey>,
        page_size: usize,
    ) -> ValuationResult<Page<LogicalKey>> {
        self.store
            .fetch_keyset(&self.filter, cursor.as_ref(), page_size)
            .await
    }
}

fn select_values() -> SelectStatement {
    Query::select()
        .columns(VALUE_COLUMNS.map(|col| (ValuationValue::Table, col)))
        .from(ValuationValue::Table)
        .to_owned()
}

fn apply_filter(
    select: &mut SelectStatement,
    filter: &ValueFilter,
    after: Option<&LogicalKey>,
) -> ValuationResult<()> {
    let mut condition = filter::condition(filter)?;
    if let Some(after) = after {
        condition = condition.add(after_key(after));
    }
    if !filter.is_empty() || after.is_some() {
        select.cond_where(condition);
    }
    Ok(())
}

fn order_by_key(select: &mut SelectStatement) {
    select
        .order_by((ValuationValue::Table, ValuationValue::Series), Order::Asc)
        .order_by((ValuationValue::Table, ValuationValue::Attribute), Order::Asc)
        .order_by((ValuationValue::Table, ValuationValue::ValidFrom), Order::Asc);
}

/// Rows strictly after `key` in logical-key order.
fn after_key(key: &LogicalKey) -> Condition {
    let series = || column(ValuationValue::Series);
    let attribute = || column(ValuationValue::Attribute);
    Condition::any()
        .add(series().gt(key.series.clone()))
        .add(
            Condition::all()
                .add(series().eq(key.series.clone()))
                .add(attribute().gt(key.attribute.clone())),
        )
        .add(
            Condition::all()
                .add(series().eq(key.series.clone()))
                .add(attribute().eq(key.attribute.clone()))
                .add(column(ValuationValue::ValidFrom).gt(key.valid_from)),
        )
}

fn upsert_value(backend: DatabaseBackend, record: &ValueRecord) -> InsertStatement {
    Query::insert()
        .into_table(ValuationValue::Table)
        .columns(VALUE_COLUMNS)
        .values_panic([
            record.family.clone().into(),
            record.series.clone().into(),
            record.attribute.clone().into(),
            record.source_file.clone().into(),
            amount_value(backend, record.amount).into(),
            record.valid_from.into(),
            record.valid_to.into(),
            record.updated_at.unix_timestamp().into(),
        ])
        .on_conflict(
            OnConflict::columns([
                ValuationValue::Series,
                ValuationValue::Attribute,
                ValuationValue::ValidFrom,
            ])
            .update_columns([ValuationValue::Amount, ValuationValue::UpdatedAt])
            .to_owned(),
        )
        .to_owned()
}

async fn ensure_references<C: ConnectionTrait>(
    conn: &C,
    records: &[ValueRecord],
) -> ValuationResult<()> {
    let mut names: BTreeMap<ReferenceKind, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        for kind in ReferenceKind::ALL {
            if let Some(name) = kind.name_in(record) {
                names.entry(kind).or_default().insert(name);
            }
        }
    }
    for (kind, names) in names {
        let entities: Vec<ReferenceEntity> =
            names.into_iter().map(ReferenceEntity::named).collect();
        exec(conn, &reference_insert(kind, &entities)).await?;
    }
    Ok(())
}

fn reference_insert(kind: ReferenceKind, entities: &[ReferenceEntity]) -> InsertStatement {
    match kind {
        ReferenceKind::Family => insert_entities(
            ValuationFamily::Table,
            [
                ValuationFamily::Name,
                ValuationFamily::Description,
                ValuationFamily::InternalCode,
            ],
            entities,
        ),
        ReferenceKind::Series => insert_entities(
            ValuationSeries::Table,
            [
                ValuationSeries::Name,
                ValuationSeries::Description,
                ValuationSeries::InternalCode,
            ],
            entities,
        ),
        ReferenceKind::Attribute => insert_entities(
            ValuationAttribute::Table,
            [
                ValuationAttribute::Name,
                ValuationAttribute::Description,
                ValuationAttribute::InternalCode,
            ],
            entities,
        ),
        ReferenceKind::SourceFile => insert_entities(
            ValuationSourceFile::Table,
            [
                ValuationSourceFile::Name,
                ValuationSourceFile::Description,
                ValuationSourceFile::InternalCode,
            ],
            entities,
        ),
    }
}

fn insert_entities<T: Iden + Copy + 'static>(
    table: T,
    columns: [T; 3],
    entities: &[ReferenceEntity],
) -> InsertStatement {
    let mut insert = Query::insert();
    insert.into_table(table).columns(columns);
    for entity in entities {
        insert.values_panic([
            entity.name.clone().into(),
            entity.description.clone().into(),
            entity.internal_code.clone().into(),
        ]);
    }
    insert.on_conflict(OnConflict::column(columns[0]).do_nothing().to_owned());
    insert.to_owned()
}

fn reference_select(kind: ReferenceKind, name: &str) -> SelectStatement {
    fn select<T: Iden + Copy + 'static>(table: T, columns: [T; 3], name: &str) -> SelectStatement {
        Query::select()
            .columns(columns)
            .from(table)
            .and_where(Expr::col(columns[0]).eq(name))
            .limit(1)
            .to_owned()
    }
    match kind {
        ReferenceKind::Family => select(
            ValuationFamily::Table,
            [
                ValuationFamily::Name,
                ValuationFamily::Description,
                ValuationFamily::InternalCode,
            ],
            name,
        ),
        ReferenceKind::Series => select(
            ValuationSeries::Table,
            [
                ValuationSeries::Name,
                ValuationSeries::Description,
                ValuationSeries::InternalCode,
            ],
            name,
        ),
        ReferenceKind::Attribute => select(
            ValuationAttribute::Table,
            [
                ValuationAttribute::Name,
                ValuationAttribute::Description,
                ValuationAttribute::InternalCode,
            ],
            name,
        ),
        ReferenceKind::SourceFile => select(
            ValuationSourceFile::Table,
            [
                ValuationSourceFile::Name,
                ValuationSourceFile::Description,
                ValuationSourceFile::InternalCode,
            ],
            name,
        ),
    }
}

// SQLite stores amounts as canonical decimal text.
fn amount_value(backend: DatabaseBackend, amount: Decimal) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::from(amount),
        _ => SeaValue::from(amount.to_string()),
    }
}

fn read_amount(row: &QueryResult) -> ValuationResult<Decimal> {
    let name = col_name(ValuationValue::Amount);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Decimal::from_str(&value)
            .map_err(|err| ValuationError::request_failed(format!("amount '{value}': {err}")));
    }
    if let Ok(value) = row.try_get::<Decimal>("", &name) {
        return Ok(value.normalize());
    }
    Err(ValuationError::request_failed("unsupported amount format"))
}

fn read_record(row: &QueryResult) -> ValuationResult<ValueRecord> {
    let updated_at: i64 = row.try_get("", &col_name(ValuationValue::UpdatedAt))?;
    let updated_at = OffsetDateTime::from_unix_timestamp(updated_at)
        .map_err(|err| ValuationError::request_failed(format!("updated_at: {err}")))?;
    Ok(ValueRecord {
        family: row.try_get("", &col_name(ValuationValue::Family))?,
        series: row.try_get("", &col_name(ValuationValue::Series))?,
        attribute: row.try_get("", &col_name(ValuationValue::Attribute))?,
        source_file: row.try_get("", &col_name(ValuationValue::SourceFile))?,
        amount: read_amount(row)?,
        valid_from: row.try_get("", &col_name(ValuationValue::ValidFrom))?,
        valid_to: row.try_get("", &col_name(ValuationValue::ValidTo))?,
        updated_at,
    })
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> ValuationResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    exec_count(conn, stmt).await.map(|_| ())
}

async fn exec_count<C, S>(conn: &C, stmt: &S) -> ValuationResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> ValuationResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> ValuationResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}
