//! Result-set mergers
//!
//! 샤드별 커서 N개를 받아 단일 커서로 합치는 병합기 모음입니다.
//!
//! ```text
//! shard cursors → Aggregate | GroupBy | Distinct | Sort → (Paged) → merged cursor
//! ```

mod aggregate;
mod aggregator;
mod batch;
mod column;
mod distinct;
mod factory;
mod group_by;
mod heap;
mod paged;
mod sort;

pub use aggregate::AggregateMerger;
pub use aggregator::{Aggregator, AvgAggregator, CountAggregator, MinMaxAggregator, SumAggregator, build_aggregators};
pub use batch::BatchMerger;
pub use column::{AggregateFunc, ColumnInfo, SortColumns, SortOrder};
pub use distinct::DistinctMerger;
pub use factory::{Feature, MergerFactory, Pipeline, QuerySpec};
pub use group_by::GroupByMerger;
pub use heap::{HeapNode, MergeHeap};
pub use paged::PagedMerger;
pub use sort::SortMerger;

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::rows::{BoxedRows, ColumnTypeRef};
use crate::value::Value;

/// 병합기 트레이트: consumes shard cursors, yields one merged cursor.
///
/// Ownership of `results` moves into the returned cursor, which closes each
/// of them exactly once. On failure the merger closes them itself.
pub trait Merger: Send + Sync {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows>;
}

/// How much of the input a merger buffers before emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// At most one buffered row per input cursor. Only correct when every
    /// input is already ordered by the merge key.
    #[default]
    Streaming,
    /// Drain every input before the first row is emitted.
    FullMaterialize,
}

/// Column names and types shared by every input cursor.
pub(crate) struct ShardColumns {
    pub names: Vec<String>,
    pub types: Vec<ColumnTypeRef>,
}

/// Check that every shard reports the same column names.
pub(crate) fn consistent_columns(results: &[BoxedRows]) -> ShardxResult<ShardColumns> {
    let first = results.first().ok_or(ShardxError::NoRowsToMerge)?;
    let names = first.columns()?;
    let types = first.column_types()?;
    for (shard, rows) in results.iter().enumerate().skip(1) {
        let actual = rows.columns()?;
        if actual != names {
            return Err(ShardxError::ColumnsMismatch {
                shard,
                expected: names,
                actual,
            });
        }
    }
    Ok(ShardColumns { names, types })
}

/// Position of each key column among the returned column names.
pub(crate) fn resolve_indexes(names: &[String], keys: &SortColumns) -> ShardxResult<Vec<usize>> {
    keys.iter()
        .map(|col| {
            let select_name = col.select_name();
            names
                .iter()
                .position(|n| *n == select_name)
                .ok_or(ShardxError::SortColumnNotFound(select_name))
        })
        .collect()
}

/// Project the key values out of a full row; a short row reads as NULL.
pub(crate) fn project(row: &[Value], indexes: &[usize]) -> Vec<Value> {
    indexes
        .iter()
        .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
        .collect()
}
