pub mod api;
pub mod batch;
pub mod error;
pub mod filter;
pub mod guard;
pub mod key;
pub mod pager;
pub mod record;

pub use api::{ScanPage, ValueRepository, decode_cursor, encode_cursor, item_key};
pub use batch::{BatchPlan, KV_MAX_BATCH, WriteSummary, dedup_by_logical_key};
pub use error::{ValuationError, ValuationResult};
pub use filter::{FilterField, FilterValue, Predicate, ValueFilter};
pub use guard::RequestGuard;
pub use key::{KEY_SEPARATOR, PhysicalKey};
pub use pager::{DEFAULT_PAGE_SIZE, Page, PageSource, Pager};
pub use record::{LogicalKey, ValueRecord, now_utc};

pub use rust_decimal::Decimal;
pub use tokio_util::sync::CancellationToken;
