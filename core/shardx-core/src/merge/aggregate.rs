//! Aggregate Merger: GROUP BY 없는 순수 집계 쿼리
//!
//! Every shard returns exactly one pre-aggregated row; the merger combines
//! them into a single output row.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::{AggregateFunc, Aggregator, ColumnInfo, Merger, ShardColumns, build_aggregators, consistent_columns};
use crate::rows::{BoxedRows, ColumnTypeRef, FakeColumn, MergedRows, RowSource, close_all, fail_closing, read_row};
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Aggregators of a SELECT list plus the companion columns they hide.
///
/// Shared by the Aggregate and Group-By mergers.
#[derive(Debug)]
pub(crate) struct AggregateLayout {
    aggregators: Vec<Box<dyn Aggregator>>,
    hidden: SmallVec<[usize; 4]>,
}

impl AggregateLayout {
    pub(crate) fn new(select: &[ColumnInfo]) -> ShardxResult<Self> {
        if select.is_empty() {
            return Err(ShardxError::EmptyColumns("select columns".to_string()));
        }
        let aggregators = build_aggregators(select)?;
        let mut hidden: SmallVec<[usize; 4]> = aggregators
            .iter()
            .flat_map(|agg| agg.hidden_indexes())
            .collect();
        hidden.sort_unstable();
        hidden.dedup();
        Ok(Self { aggregators, hidden })
    }

    pub(crate) fn aggregators(&self) -> &[Box<dyn Aggregator>] {
        &self.aggregators
    }

    fn is_hidden(&self, index: usize) -> bool {
        self.hidden.binary_search(&index).is_ok()
    }

    /// Client-visible columns: companions dropped, AVG re-typed as DECIMAL.
    pub(crate) fn output_columns(&self, shard: &ShardColumns) -> ShardColumns {
        let mut names = Vec::with_capacity(shard.names.len());
        let mut types: Vec<ColumnTypeRef> = Vec::with_capacity(shard.names.len());
        for (i, name) in shard.names.iter().enumerate() {
            if self.is_hidden(i) {
                continue;
            }
            let is_avg = self.aggregators.iter().any(|agg| {
                let info = agg.column_info();
                info.index == i && info.aggregate_func == Some(AggregateFunc::Avg)
            });
            names.push(name.clone());
            match shard.types.get(i) {
                Some(_) if is_avg => types.push(FakeColumn::shared(name.clone(), "DECIMAL")),
                Some(ty) => types.push(Arc::clone(ty)),
                None => types.push(FakeColumn::shared(name.clone(), "NULL")),
            }
        }
        ShardColumns { names, types }
    }

    /// Combine one batch of partial rows into an output row.
    ///
    /// Non-aggregate columns keep the first row's value.
    pub(crate) fn combine(&self, rows: &[Vec<Value>]) -> ShardxResult<Vec<Value>> {
        let Some(first) = rows.first() else {
            return Err(ShardxError::NoRowsToMerge);
        };
        let mut out = first.clone();
        for agg in &self.aggregators {
            let index = agg.column_info().index;
            let value = agg.aggregate(rows)?;
            let width = out.len();
            let slot = out
                .get_mut(index)
                .ok_or(ShardxError::InvalidAggregateColumnIndex { index, width })?;
            *slot = value;
        }
        if self.hidden.is_empty() {
            return Ok(out);
        }
        Ok(out
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !self.is_hidden(*i))
            .map(|(_, v)| v)
            .collect())
    }
}

/// 집계 병합기 (aggregate without GROUP BY)
#[derive(Debug, Clone)]
pub struct AggregateMerger {
    layout: Arc<AggregateLayout>,
}

impl AggregateMerger {
    pub fn new(select: &[ColumnInfo]) -> ShardxResult<Self> {
        Ok(Self {
            layout: Arc::new(AggregateLayout::new(select)?),
        })
    }

    pub fn aggregators(&self) -> &[Box<dyn Aggregator>] {
        self.layout.aggregators()
    }

    /// Read each shard's single partial row. `None` when every shard is empty.
    fn read_partials(ctx: &MergeContext, results: &[BoxedRows]) -> ShardxResult<Option<Vec<Vec<Value>>>> {
        let mut partials = Vec::with_capacity(results.len());
        let mut empty = Vec::new();
        for (shard, cursor) in results.iter().enumerate() {
            ctx.check()?;
            match read_row(&**cursor)? {
                Some(row) => {
                    if read_row(&**cursor)?.is_some() {
                        return Err(ShardxError::TooManyAggregateRows(shard));
                    }
                    partials.push(row);
                }
                None => empty.push(shard),
            }
        }
        if partials.is_empty() {
            return Ok(None);
        }
        if let Some(&shard) = empty.first() {
            return Err(ShardxError::EmptyShardResult(shard));
        }
        Ok(Some(partials))
    }
}

impl Merger for AggregateMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        if results.is_empty() {
            return Err(ShardxError::NoRowsToMerge);
        }
        let prepared = ctx.check().and_then(|()| {
            let columns = consistent_columns(&results)?;
            let partials = Self::read_partials(ctx, &results)?;
            Ok((columns, partials))
        });
        let (columns, partials) = prepared.map_err(|err| fail_closing(&results, err))?;

        if partials.is_none() {
            tracing::debug!(shards = results.len(), "aggregate merge over empty shards");
        } else {
            tracing::debug!(shards = results.len(), aggregators = self.layout.aggregators.len(), "aggregate merge");
        }
        let output = self.layout.output_columns(&columns);
        let source = AggregateSource {
            layout: Arc::clone(&self.layout),
            partials,
            cursors: results,
        };
        Ok(MergedRows::new(output.names, output.types, source).boxed())
    }
}

struct AggregateSource {
    layout: Arc<AggregateLayout>,
    partials: Option<Vec<Vec<Value>>>,
    cursors: Vec<BoxedRows>,
}

impl RowSource for AggregateSource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        match self.partials.take() {
            Some(rows) => self.layout.combine(&rows).map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> ShardxResult<()> {
        close_all(&self.cursors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::MemoryRows;

    const COLUMNS: [&str; 4] = ["COUNT(*)", "AVG(amount)", "SUM(amount)", "COUNT(amount)"];

    fn select() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::aggregate(0, AggregateFunc::Count, "*"),
            ColumnInfo::aggregate(1, AggregateFunc::Avg, "amount"),
            ColumnInfo::aggregate(2, AggregateFunc::Sum, "amount"),
            ColumnInfo::aggregate(3, AggregateFunc::Count, "amount"),
        ]
    }

    fn partial(count: i64, sum: i64, n: i64) -> BoxedRows {
        let avg = if n == 0 { Value::Null } else { Value::Float64(sum as f64 / n as f64) };
        Box::new(MemoryRows::new(
            COLUMNS,
            vec![vec![Value::Int64(count), avg, Value::Int64(sum), Value::Int64(n)]],
        ))
    }

    #[test]
    fn avg_recomputed_and_companions_hidden() {
        let merger = AggregateMerger::new(&select()).unwrap();
        let merged = merger
            .merge(
                &MergeContext::new(),
                vec![partial(2, 200, 2), partial(3, 150, 3), partial(1, 50, 1)],
            )
            .unwrap();

        assert_eq!(merged.columns().unwrap(), vec!["COUNT(*)", "AVG(amount)"]);
        let types = merged.column_types().unwrap();
        assert_eq!(types[1].database_type_name(), "DECIMAL");

        let rows = merged.collect_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Int64(6));
        let Value::Float64(avg) = rows[0][1] else {
            panic!("expected Float64, got {:?}", rows[0][1]);
        };
        assert!((avg - 66.666_666).abs() < 1e-3);
    }

    #[test]
    fn all_shards_empty_yields_no_rows() {
        let empty = || Box::new(MemoryRows::new(COLUMNS, vec![])) as BoxedRows;
        let merged = AggregateMerger::new(&select())
            .unwrap()
            .merge(&MergeContext::new(), vec![empty(), empty()])
            .unwrap();
        assert!(!merged.next());
        assert!(merged.err().is_none());
        assert!(merged.close().is_ok());
    }

    #[test]
    fn some_shards_empty_is_an_error() {
        let empty = MemoryRows::new(COLUMNS, vec![]);
        let counter = empty.close_counter();
        let err = AggregateMerger::new(&select())
            .unwrap()
            .merge(&MergeContext::new(), vec![partial(1, 10, 1), Box::new(empty)])
            .err()
            .unwrap();
        assert_eq!(err, ShardxError::EmptyShardResult(1));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn second_row_from_a_shard_is_rejected() {
        let two_rows = MemoryRows::new(
            ["SUM(x)"],
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        );
        let err = AggregateMerger::new(&[ColumnInfo::aggregate(0, AggregateFunc::Sum, "x")])
            .unwrap()
            .merge(&MergeContext::new(), vec![Box::new(two_rows)])
            .err()
            .unwrap();
        assert_eq!(err, ShardxError::TooManyAggregateRows(0));
    }

    #[test]
    fn unsupported_kind_becomes_sticky_error() {
        let text = MemoryRows::new(["SUM(x)"], vec![vec![Value::from("oops")]]);
        let merged = AggregateMerger::new(&[ColumnInfo::aggregate(0, AggregateFunc::Sum, "x")])
            .unwrap()
            .merge(&MergeContext::new(), vec![Box::new(text)])
            .unwrap();
        assert!(!merged.next());
        let err = merged.err().unwrap();
        assert!(matches!(err, ShardxError::AggregateFunctionNotFound { .. }));
        assert_eq!(merged.scan().unwrap_err(), err);
    }

    #[test]
    fn non_aggregate_column_takes_first_shard() {
        let shard = |name: &str, max: i64| -> BoxedRows {
            Box::new(MemoryRows::new(
                ["name", "MAX(score)"],
                vec![vec![Value::from(name), Value::Int64(max)]],
            ))
        };
        let select = [
            ColumnInfo::new(0, "name"),
            ColumnInfo::aggregate(1, AggregateFunc::Max, "score"),
        ];
        let rows = AggregateMerger::new(&select)
            .unwrap()
            .merge(&MergeContext::new(), vec![shard("a", 3), shard("b", 8)])
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(rows, vec![vec![Value::from("a"), Value::Int64(8)]]);
    }
}
