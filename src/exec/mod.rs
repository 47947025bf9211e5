//! Query execution layer.
//!
//! Executors receive validated SQL only, never raw model output. The live
//! warehouse client and the demo synthesizer implement the same trait, so
//! the rest of the pipeline is indifferent to where rows come from; the
//! mandatory `source` field on every result keeps the two distinguishable
//! downstream.

mod demo;
mod types;
mod warehouse;

pub use demo::DemoDataProvider;
pub use types::{ColumnInfo, ExecutionResult, ResultSource, Row, Value};
pub use warehouse::WarehouseClient;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the executor boundary.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes a validated statement and returns the result set.
    async fn execute(&self, validated_sql: &str) -> Result<ExecutionResult>;
}
