//! Aggregators: 샤드별 부분 집계값을 하나의 전역 집계값으로 합침
//!
//! Every aggregator receives one row per shard (or per shard row of a
//! group) and reads its own column out of each row. NULL partials are
//! ignored; if every partial is NULL the result is NULL.

use crate::error::{ShardxError, ShardxResult};
use crate::merge::{AggregateFunc, ColumnInfo};
use crate::value::{Number, Value, compare_values, sum_values};
use std::cmp::Ordering;
use std::fmt;

/// Combines partial aggregates into one value.
pub trait Aggregator: Send + Sync + fmt::Debug {
    /// Combine the partials found at this aggregator's column in each row.
    fn aggregate(&self, rows: &[Vec<Value>]) -> ShardxResult<Value>;

    /// The output column this aggregator fills
    fn column_info(&self) -> &ColumnInfo;

    fn name(&self) -> String {
        self.column_info().select_name()
    }

    /// Columns consumed by this aggregator that must not reach the client
    fn hidden_indexes(&self) -> Vec<usize> {
        Vec::new()
    }
}

/// Column values at `index`, one per row.
fn column_values(rows: &[Vec<Value>], index: usize) -> ShardxResult<Vec<&Value>> {
    rows.iter()
        .map(|row| {
            row.get(index).ok_or(ShardxError::InvalidAggregateColumnIndex {
                index,
                width: row.len(),
            })
        })
        .collect()
}

/// First value (NULL if there are no rows); returned when all partials are NULL.
fn representative_null(values: &[&Value]) -> Value {
    values.first().map_or(Value::Null, |v| (*v).clone())
}

// ===== MIN / MAX =====

#[derive(Debug, Clone)]
pub struct MinMaxAggregator {
    info: ColumnInfo,
    func: AggregateFunc,
}

impl MinMaxAggregator {
    pub fn min(info: ColumnInfo) -> Self {
        Self {
            info,
            func: AggregateFunc::Min,
        }
    }

    pub fn max(info: ColumnInfo) -> Self {
        Self {
            info,
            func: AggregateFunc::Max,
        }
    }

    fn wanted(&self) -> Ordering {
        if self.func == AggregateFunc::Min {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl Aggregator for MinMaxAggregator {
    fn aggregate(&self, rows: &[Vec<Value>]) -> ShardxResult<Value> {
        let values = column_values(rows, self.info.index)?;
        let mut present = values.iter().copied().filter(|v| !v.is_null());
        let Some(mut best) = present.next() else {
            return Ok(representative_null(&values));
        };
        for value in present {
            let ord = compare_values(value, best).ok_or_else(|| {
                ShardxError::AggregateFunctionNotFound {
                    func: self.func.to_string(),
                    kind: format!("{} and {}", best.kind(), value.kind()),
                }
            })?;
            if ord == self.wanted() {
                best = value;
            }
        }
        Ok(best.clone())
    }

    fn column_info(&self) -> &ColumnInfo {
        &self.info
    }
}

// ===== SUM / COUNT =====

/// Sum of per-shard SUM partials.
#[derive(Debug, Clone)]
pub struct SumAggregator {
    info: ColumnInfo,
}

impl SumAggregator {
    pub fn new(info: ColumnInfo) -> Self {
        Self { info }
    }
}

impl Aggregator for SumAggregator {
    fn aggregate(&self, rows: &[Vec<Value>]) -> ShardxResult<Value> {
        let values = column_values(rows, self.info.index)?;
        Ok(sum_values(values.iter().copied(), "SUM")?.unwrap_or_else(|| representative_null(&values)))
    }

    fn column_info(&self) -> &ColumnInfo {
        &self.info
    }
}

/// Sum of per-shard COUNT partials.
#[derive(Debug, Clone)]
pub struct CountAggregator {
    info: ColumnInfo,
}

impl CountAggregator {
    pub fn new(info: ColumnInfo) -> Self {
        Self { info }
    }
}

impl Aggregator for CountAggregator {
    fn aggregate(&self, rows: &[Vec<Value>]) -> ShardxResult<Value> {
        let values = column_values(rows, self.info.index)?;
        Ok(sum_values(values.iter().copied(), "COUNT")?
            .unwrap_or_else(|| representative_null(&values)))
    }

    fn column_info(&self) -> &ColumnInfo {
        &self.info
    }
}

// ===== AVG =====

/// AVG recomputed as total SUM / total COUNT from the companion columns.
#[derive(Debug, Clone)]
pub struct AvgAggregator {
    avg: ColumnInfo,
    sum: ColumnInfo,
    count: ColumnInfo,
}

impl AvgAggregator {
    pub fn new(avg: ColumnInfo, sum: ColumnInfo, count: ColumnInfo) -> Self {
        Self { avg, sum, count }
    }

    pub fn sum_column(&self) -> &ColumnInfo {
        &self.sum
    }

    pub fn count_column(&self) -> &ColumnInfo {
        &self.count
    }
}

impl Aggregator for AvgAggregator {
    fn aggregate(&self, rows: &[Vec<Value>]) -> ShardxResult<Value> {
        let sums = column_values(rows, self.sum.index)?;
        let counts = column_values(rows, self.count.index)?;
        let total = sum_values(sums.iter().copied(), "AVG")?.and_then(|v| v.as_number());
        let count = sum_values(counts.iter().copied(), "AVG")?.and_then(|v| v.as_number());

        match (total, count) {
            (None, None) => Ok(Value::Null),
            (_, None) => Ok(Value::Null),
            (_, Some(c)) if c.is_zero() => Ok(Value::Null),
            (total, Some(c)) => {
                let total = total.unwrap_or(Number::Int(0));
                Ok(Value::Float64(total.to_f64() / c.to_f64()))
            }
        }
    }

    fn column_info(&self) -> &ColumnInfo {
        &self.avg
    }

    fn hidden_indexes(&self) -> Vec<usize> {
        vec![self.sum.index, self.count.index]
    }
}

/// Build one aggregator per aggregate column of a SELECT list.
///
/// An AVG column must be immediately followed by the SUM and COUNT columns
/// the rewriter injected for it; all three are consumed together.
pub fn build_aggregators(select: &[ColumnInfo]) -> ShardxResult<Vec<Box<dyn Aggregator>>> {
    let mut aggregators: Vec<Box<dyn Aggregator>> = Vec::new();
    let mut i = 0;
    while i < select.len() {
        let col = &select[i];
        let Some(func) = col.aggregate_func else {
            i += 1;
            continue;
        };
        match func {
            AggregateFunc::Min => aggregators.push(Box::new(MinMaxAggregator::min(col.clone()))),
            AggregateFunc::Max => aggregators.push(Box::new(MinMaxAggregator::max(col.clone()))),
            AggregateFunc::Sum => aggregators.push(Box::new(SumAggregator::new(col.clone()))),
            AggregateFunc::Count => aggregators.push(Box::new(CountAggregator::new(col.clone()))),
            AggregateFunc::Avg => {
                let companions = (select.get(i + 1), select.get(i + 2));
                let (Some(sum), Some(count)) = companions else {
                    return Err(ShardxError::invalid_spec(format!(
                        "{} must be followed by its SUM and COUNT columns",
                        col.select_name()
                    )));
                };
                if sum.aggregate_func != Some(AggregateFunc::Sum)
                    || count.aggregate_func != Some(AggregateFunc::Count)
                {
                    return Err(ShardxError::invalid_spec(format!(
                        "{} must be followed by SUM and COUNT, found {} and {}",
                        col.select_name(),
                        sum.select_name(),
                        count.select_name()
                    )));
                }
                aggregators.push(Box::new(AvgAggregator::new(
                    col.clone(),
                    sum.clone(),
                    count.clone(),
                )));
                i += 2;
            }
        }
        i += 1;
    }
    Ok(aggregators)
}
