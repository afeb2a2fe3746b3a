//! Sort Merger: ORDER BY across shards
//!
//! Each shard already returns rows in the requested order, so a k-way merge
//! over one buffered row per shard is enough (streaming). When the input is
//! not ordered by the key (the single cursor coming out of a Group-By
//! merger, for one) every row is drained into the heap first.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::{
    HeapNode, MergeHeap, MergeMode, Merger, ShardColumns, SortColumns, SortOrder,
    consistent_columns, project, resolve_indexes,
};
use crate::rows::{BoxedRows, MergedRows, RowSource, close_all, fail_closing, read_row};
use crate::value::Value;
use std::cmp::Ordering;

/// Sort 병합기 (ORDER BY)
#[derive(Debug, Clone)]
pub struct SortMerger {
    columns: SortColumns,
    mode: MergeMode,
}

impl SortMerger {
    pub fn new(columns: SortColumns, mode: MergeMode) -> ShardxResult<Self> {
        if columns.is_empty() {
            return Err(ShardxError::EmptyColumns("sort columns".to_string()));
        }
        Ok(Self { columns, mode })
    }

    pub fn columns(&self) -> &SortColumns {
        &self.columns
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }
}

impl Merger for SortMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        let (columns, key_indexes) = prepare(ctx, &results, &self.columns)?;
        tracing::debug!(shards = results.len(), mode = ?self.mode, keys = ?self.columns.select_names(), "sort merge");
        let heap = ShardHeap::open(ctx, results, key_indexes, self.columns.orders(), self.mode)?;
        Ok(MergedRows::new(columns.names, columns.types, SortSource { heap }).boxed())
    }
}

/// Validate shard columns and resolve key positions, closing the cursors on failure.
pub(crate) fn prepare(
    ctx: &MergeContext,
    results: &[BoxedRows],
    keys: &SortColumns,
) -> ShardxResult<(ShardColumns, Vec<usize>)> {
    if results.is_empty() {
        return Err(ShardxError::NoRowsToMerge);
    }
    let checked = ctx.check().and_then(|()| {
        let columns = consistent_columns(results)?;
        let indexes = resolve_indexes(&columns.names, keys)?;
        Ok((columns, indexes))
    });
    checked.map_err(|err| fail_closing(results, err))
}

struct SortSource {
    heap: ShardHeap,
}

impl RowSource for SortSource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        Ok(self.heap.pop()?.map(|node| node.values))
    }

    fn close(&mut self) -> ShardxResult<()> {
        self.heap.close()
    }
}

/// Heap fed from a set of owned cursors, in either merge mode.
///
/// Shared by the Sort, Group-By and Distinct mergers.
pub(crate) struct ShardHeap {
    ctx: MergeContext,
    cursors: Vec<BoxedRows>,
    heap: MergeHeap,
    key_indexes: Vec<usize>,
    mode: MergeMode,
}

impl ShardHeap {
    pub(crate) fn open(
        ctx: &MergeContext,
        cursors: Vec<BoxedRows>,
        key_indexes: Vec<usize>,
        orders: Vec<SortOrder>,
        mode: MergeMode,
    ) -> ShardxResult<Self> {
        let mut shard_heap = Self {
            ctx: ctx.clone(),
            cursors,
            heap: MergeHeap::with_orders(orders),
            key_indexes,
            mode,
        };
        if let Err(err) = shard_heap.fill() {
            return Err(fail_closing(&shard_heap.cursors, err));
        }
        Ok(shard_heap)
    }

    fn fill(&mut self) -> ShardxResult<()> {
        for shard in 0..self.cursors.len() {
            self.ctx.check()?;
            match self.mode {
                MergeMode::Streaming => {
                    self.refill(shard)?;
                }
                MergeMode::FullMaterialize => {
                    while self.refill(shard)? {
                        self.ctx.check_budget(self.heap.len())?;
                        self.ctx.check()?;
                    }
                }
            }
        }
        tracing::trace!(buffered = self.heap.len(), mode = ?self.mode, "shard heap filled");
        Ok(())
    }

    /// Buffer the next row of `shard`; `false` once it is exhausted.
    fn refill(&mut self, shard: usize) -> ShardxResult<bool> {
        match read_row(&*self.cursors[shard])? {
            Some(values) => {
                let key = project(&values, &self.key_indexes);
                self.heap.push(HeapNode::new(shard, key, values));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Smallest buffered row; in streaming mode its shard is refilled.
    pub(crate) fn pop(&mut self) -> ShardxResult<Option<HeapNode>> {
        let Some(node) = self.heap.pop() else {
            return Ok(None);
        };
        if self.mode == MergeMode::Streaming {
            self.refill(node.rows_index)?;
        }
        Ok(Some(node))
    }

    pub(crate) fn peek_key(&self) -> Option<&[Value]> {
        self.heap.peek().map(|n| n.sort_values.as_slice())
    }

    pub(crate) fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        self.heap.compare(a, b)
    }

    /// Pop the next key's whole equivalence class.
    pub(crate) fn pop_class(&mut self) -> ShardxResult<Option<Vec<HeapNode>>> {
        let Some(first) = self.pop()? else {
            return Ok(None);
        };
        let mut class = vec![first];
        while let Some(key) = self.peek_key() {
            if self.compare(key, &class[0].sort_values) != Ordering::Equal {
                break;
            }
            if let Some(node) = self.pop()? {
                class.push(node);
            }
        }
        Ok(Some(class))
    }

    pub(crate) fn close(&mut self) -> ShardxResult<()> {
        close_all(&self.cursors)
    }
}
