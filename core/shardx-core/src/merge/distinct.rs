//! Distinct Merger: 샤드 간 중복 행 제거
//!
//! The dedup index is a `BTreeMap` keyed by the distinct tuple under the
//! declared order (explicit sort columns first, the remaining distinct
//! columns ascending after them).
//!
//! Without an explicit order every shard is drained into the index before
//! the first row is emitted. With one, rows are pulled one sort-key
//! equivalence class at a time and only that class is indexed.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::sort::ShardHeap;
use crate::merge::{
    ColumnInfo, MergeMode, Merger, ShardColumns, SortColumns, SortOrder, consistent_columns, project,
};
use crate::rows::{BoxedRows, MergedRows, RowSource, close_all, fail_closing, read_row};
use crate::value::{Value, compare_keys};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Distinct tuple ordered by a runtime key order.
#[derive(Debug, Clone)]
struct DistinctKey {
    values: Vec<Value>,
    orders: Arc<[SortOrder]>,
}

impl PartialEq for DistinctKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistinctKey {}

impl PartialOrd for DistinctKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistinctKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.values, &other.values, &self.orders)
    }
}

/// Ordered dedup index; a second insert of an equal key is a no-op.
#[derive(Debug)]
struct DedupIndex {
    entries: BTreeMap<DistinctKey, Vec<Value>>,
    key_indexes: Arc<[usize]>,
    orders: Arc<[SortOrder]>,
}

impl DedupIndex {
    fn new(key_indexes: Arc<[usize]>, orders: Arc<[SortOrder]>) -> Self {
        Self {
            entries: BTreeMap::new(),
            key_indexes,
            orders,
        }
    }

    fn insert(&mut self, row: Vec<Value>) {
        let key = DistinctKey {
            values: project(&row, &self.key_indexes),
            orders: Arc::clone(&self.orders),
        };
        self.entries.entry(key).or_insert(row);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn drain(&mut self) -> VecDeque<Vec<Value>> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

#[derive(Debug, Clone)]
pub struct DistinctMerger {
    distinct: SortColumns,
    sort: SortColumns,
    /// Distinct column positions, sort columns first
    key_indexes: Arc<[usize]>,
    orders: Arc<[SortOrder]>,
}

impl DistinctMerger {
    /// `sort` may be empty; when given, it must name distinct columns only.
    pub fn new(distinct: Vec<ColumnInfo>, sort: Vec<ColumnInfo>) -> ShardxResult<Self> {
        if distinct.is_empty() {
            return Err(ShardxError::EmptyColumns("distinct columns".to_string()));
        }
        let distinct = SortColumns::new(distinct)?;
        let sort = SortColumns::new(sort)?;

        let mut key_indexes = Vec::with_capacity(distinct.len());
        let mut orders = Vec::with_capacity(distinct.len());
        for col in &sort {
            let name = col.select_name();
            let position = distinct
                .position(&name)
                .ok_or(ShardxError::SortNotSubsetOfDistinct(name))?;
            key_indexes.push(position);
            orders.push(col.order);
        }
        for (position, _) in distinct.iter().enumerate() {
            if !key_indexes.contains(&position) {
                key_indexes.push(position);
                orders.push(SortOrder::Asc);
            }
        }

        Ok(Self {
            distinct,
            sort,
            key_indexes: key_indexes.into(),
            orders: orders.into(),
        })
    }

    pub fn distinct_columns(&self) -> &SortColumns {
        &self.distinct
    }

    pub fn sort_columns(&self) -> &SortColumns {
        &self.sort
    }

    /// Streaming only when an explicit order bounds each equivalence class.
    pub fn mode(&self) -> MergeMode {
        if self.sort.is_empty() {
            MergeMode::FullMaterialize
        } else {
            MergeMode::Streaming
        }
    }

    /// Order of the emitted rows: sort columns, then the remaining distinct columns.
    pub fn output_order(&self) -> SortColumns {
        let mut order = self.sort.clone();
        for col in &self.distinct {
            order.add(col.clone().with_order(SortOrder::Asc));
        }
        order
    }

    fn check_columns(&self, results: &[BoxedRows]) -> ShardxResult<ShardColumns> {
        let expected = self.distinct.select_names();
        for (shard, cursor) in results.iter().enumerate() {
            let actual = cursor.columns()?;
            if actual != expected {
                return Err(ShardxError::DistinctColumnsNotFound {
                    shard,
                    expected,
                    actual,
                });
            }
        }
        consistent_columns(results)
    }

    fn materialize(&self, ctx: &MergeContext, results: &[BoxedRows]) -> ShardxResult<DedupIndex> {
        let mut index = DedupIndex::new(Arc::clone(&self.key_indexes), Arc::clone(&self.orders));
        for cursor in results {
            ctx.check()?;
            while let Some(row) = read_row(&**cursor)? {
                index.insert(row);
                ctx.check_budget(index.len())?;
            }
        }
        Ok(index)
    }
}

impl Merger for DistinctMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        if results.is_empty() {
            return Err(ShardxError::NoRowsToMerge);
        }
        let columns = ctx
            .check()
            .and_then(|()| self.check_columns(&results))
            .map_err(|err| fail_closing(&results, err))?;
        tracing::debug!(
            shards = results.len(),
            mode = ?self.mode(),
            distinct = ?self.distinct.select_names(),
            "distinct merge"
        );

        let source = match self.mode() {
            MergeMode::FullMaterialize => {
                let mut index = self
                    .materialize(ctx, &results)
                    .map_err(|err| fail_closing(&results, err))?;
                tracing::trace!(unique = index.len(), "distinct rows materialized");
                DistinctSource {
                    pending: index.drain(),
                    index,
                    input: DistinctInput::Drained(results),
                }
            }
            MergeMode::Streaming => {
                let sort_indexes: Vec<usize> = self.key_indexes[..self.sort.len()].to_vec();
                let heap = ShardHeap::open(ctx, results, sort_indexes, self.sort.orders(), MergeMode::Streaming)?;
                DistinctSource {
                    pending: VecDeque::new(),
                    index: DedupIndex::new(Arc::clone(&self.key_indexes), Arc::clone(&self.orders)),
                    input: DistinctInput::Classes(heap),
                }
            }
        };
        Ok(MergedRows::new(columns.names, columns.types, source).boxed())
    }
}

enum DistinctInput {
    /// Every row is already in the index
    Drained(Vec<BoxedRows>),
    /// One sort-key equivalence class at a time
    Classes(ShardHeap),
}

struct DistinctSource {
    pending: VecDeque<Vec<Value>>,
    index: DedupIndex,
    input: DistinctInput,
}

impl RowSource for DistinctSource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            let DistinctInput::Classes(heap) = &mut self.input else {
                return Ok(None);
            };
            let Some(class) = heap.pop_class()? else {
                return Ok(None);
            };
            for node in class {
                self.index.insert(node.values);
            }
            self.pending = self.index.drain();
        }
    }

    fn close(&mut self) -> ShardxResult<()> {
        match &mut self.input {
            DistinctInput::Drained(cursors) => close_all(cursors),
            DistinctInput::Classes(heap) => heap.close(),
        }
    }
}
