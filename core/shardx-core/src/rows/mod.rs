//! Row cursor contract: 샤드 커서와 병합 결과 커서가 공유하는 인터페이스
//!
//! Every shard cursor and every merged cursor implements [`Rows`]. Methods
//! take `&self` so `close` may be called from another thread while a
//! consumer is iterating; implementations guard their state with a mutex.

mod memory;
mod merged;

pub use memory::MemoryRows;
pub(crate) use merged::{MergedRows, RowSource};

use crate::error::{ShardxError, ShardxResult};
use crate::value::{FromValue, Value};
use std::sync::Arc;

/// Column metadata a cursor reports to the protocol layer.
pub trait ColumnType: Send + Sync + std::fmt::Debug {
    /// Display name of the column
    fn name(&self) -> &str;

    /// Database type name (e.g. `BIGINT`, `VARCHAR`, `DECIMAL`)
    fn database_type_name(&self) -> &str;
}

/// Shared handle to column metadata.
pub type ColumnTypeRef = Arc<dyn ColumnType>;

/// Synthesized column metadata, used when no driver metadata exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeColumn {
    name: String,
    type_name: String,
}

impl FakeColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn shared(name: impl Into<String>, type_name: impl Into<String>) -> ColumnTypeRef {
        Arc::new(Self::new(name, type_name))
    }
}

impl ColumnType for FakeColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_type_name(&self) -> &str {
        &self.type_name
    }
}

/// Row cursor: Volcano 스타일의 pull 기반 커서
pub trait Rows: Send + Sync {
    /// Column names, in row order
    fn columns(&self) -> ShardxResult<Vec<String>>;

    /// Column metadata, in row order
    fn column_types(&self) -> ShardxResult<Vec<ColumnTypeRef>>;

    /// Advance to the next row; `false` at the end or after an error
    fn next(&self) -> bool;

    /// Values of the current row
    fn scan(&self) -> ShardxResult<Vec<Value>>;

    /// Sticky error, if any
    fn err(&self) -> Option<ShardxError>;

    /// Release the cursor. Idempotent.
    fn close(&self) -> ShardxResult<()>;

    /// Sharded statements never produce more than one result set.
    fn has_next_result_set(&self) -> bool {
        false
    }

    fn next_result_set(&self) -> bool {
        false
    }
}

pub type BoxedRows = Box<dyn Rows>;

impl dyn Rows + '_ {
    /// Scan one column of the current row into a Rust type.
    pub fn scan_column<T: FromValue>(&self, index: usize) -> ShardxResult<T> {
        let row = self.scan()?;
        let value = row.get(index).ok_or(ShardxError::TypeMismatch {
            expected: format!("column {index}"),
            actual: format!("row of width {}", row.len()),
        })?;
        T::from_value(value)
    }

    /// Drain the cursor into memory and close it.
    pub fn collect_rows(&self) -> ShardxResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = read_row(self)? {
            rows.push(row);
        }
        self.close()?;
        Ok(rows)
    }
}

/// Read the next row of a cursor, surfacing its error instead of `false`.
pub(crate) fn read_row(rows: &dyn Rows) -> ShardxResult<Option<Vec<Value>>> {
    if rows.next() {
        return rows.scan().map(Some);
    }
    match rows.err() {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

/// Close every cursor exactly once, combining their errors.
pub(crate) fn close_all(cursors: &[BoxedRows]) -> ShardxResult<()> {
    let errors: Vec<ShardxError> = cursors.iter().filter_map(|c| c.close().err()).collect();
    ShardxError::combine(errors)
}

/// Close cursors after a failed merge; the original error stays first.
pub(crate) fn fail_closing(cursors: &[BoxedRows], err: ShardxError) -> ShardxError {
    match close_all(cursors) {
        Ok(()) => err,
        Err(ShardxError::Close(mut rest)) => {
            rest.insert(0, err);
            ShardxError::Close(rest)
        }
        Err(close_err) => ShardxError::Close(vec![err, close_err]),
    }
}
