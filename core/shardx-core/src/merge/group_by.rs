//! Group-By Merger: 샤드별로 이미 그룹 집계된 결과를 전역 그룹으로 합침
//!
//! Streaming needs shards sorted by the heap key, which must cover exactly the
//! group columns; the heap then yields each group's rows back to back. Full
//! mode sorts everything first, so shard order does not matter. No hash table
//! is needed either way.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::aggregate::AggregateLayout;
use crate::merge::sort::{ShardHeap, prepare};
use crate::merge::{Aggregator, ColumnInfo, MergeMode, Merger, SortColumns};
use crate::rows::{BoxedRows, MergedRows, RowSource};
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GroupByMerger {
    group_by: SortColumns,
    layout: Arc<AggregateLayout>,
    mode: MergeMode,
}

impl GroupByMerger {
    /// `select` is the pushed-down SELECT list, AVG companions included.
    pub fn new(group_by: SortColumns, select: &[ColumnInfo], mode: MergeMode) -> ShardxResult<Self> {
        if group_by.is_empty() {
            return Err(ShardxError::EmptyColumns("group by columns".to_string()));
        }
        Ok(Self {
            group_by,
            layout: Arc::new(AggregateLayout::new(select)?),
            mode,
        })
    }

    pub fn group_by(&self) -> &SortColumns {
        &self.group_by
    }

    pub fn aggregators(&self) -> &[Box<dyn Aggregator>] {
        self.layout.aggregators()
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }
}

impl Merger for GroupByMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        let (columns, key_indexes) = prepare(ctx, &results, &self.group_by)?;
        tracing::debug!(
            shards = results.len(),
            mode = ?self.mode,
            keys = ?self.group_by.select_names(),
            "group by merge"
        );
        let output = self.layout.output_columns(&columns);
        let heap = ShardHeap::open(ctx, results, key_indexes, self.group_by.orders(), self.mode)?;
        let source = GroupBySource {
            heap,
            layout: Arc::clone(&self.layout),
        };
        Ok(MergedRows::new(output.names, output.types, source).boxed())
    }
}

struct GroupBySource {
    heap: ShardHeap,
    layout: Arc<AggregateLayout>,
}

impl RowSource for GroupBySource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        let Some(class) = self.heap.pop_class()? else {
            return Ok(None);
        };
        let rows: Vec<Vec<Value>> = class.into_iter().map(|node| node.values).collect();
        tracing::trace!(rows = rows.len(), "group assembled");
        self.layout.combine(&rows).map(Some)
    }

    fn close(&mut self) -> ShardxResult<()> {
        self.heap.close()
    }
}
