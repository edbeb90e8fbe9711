//! Key-value backend: a table keyed by series and `ATTRIBUTE#YYYYMMDD`, with
//! four global secondary indexes serving the named access patterns.

pub mod client;
pub mod expression;
pub mod item;
pub mod memory;
pub mod planner;
pub mod schema;
pub mod store;

pub use client::{
    AttributeValue, ExpressionAttributes, Item, ItemPage, KeyValueClient, QueryRequest,
    ScanRequest,
};
pub use memory::{CallCounts, MemoryKeyValueClient};
pub use planner::{AccessPath, QueryPlan, plan};
pub use schema::SecondaryIndex;
pub use store::KvValueStore;
