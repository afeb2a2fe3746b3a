//! Batch Merger: 순서 요구 없이 샤드 결과를 도착 순서대로 이어 붙임

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::{Merger, consistent_columns};
use crate::rows::{BoxedRows, MergedRows, RowSource, close_all, fail_closing, read_row};
use crate::value::Value;

/// Concatenates shard results: shard 0 fully, then shard 1, and so on.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchMerger;

impl BatchMerger {
    pub fn new() -> Self {
        Self
    }
}

impl Merger for BatchMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        if results.is_empty() {
            return Err(ShardxError::NoRowsToMerge);
        }
        let columns = match ctx.check().and_then(|()| consistent_columns(&results)) {
            Ok(columns) => columns,
            Err(err) => return Err(fail_closing(&results, err)),
        };
        tracing::debug!(shards = results.len(), "batch merge");
        let source = BatchSource {
            cursors: results,
            current: 0,
        };
        Ok(MergedRows::new(columns.names, columns.types, source).boxed())
    }
}

struct BatchSource {
    cursors: Vec<BoxedRows>,
    current: usize,
}

impl RowSource for BatchSource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        while let Some(cursor) = self.cursors.get(self.current) {
            if let Some(row) = read_row(&**cursor)? {
                return Ok(Some(row));
            }
            self.current += 1;
        }
        Ok(None)
    }

    fn close(&mut self) -> ShardxResult<()> {
        close_all(&self.cursors)
    }
}
