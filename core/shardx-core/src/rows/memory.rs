//! In-memory cursor: 드라이버 결과를 이미 메모리에 가진 경우와 테스트용

use super::{ColumnTypeRef, FakeColumn, Rows};
use crate::error::{ShardxError, ShardxResult};
use crate::value::{Value, ValueKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`Rows`] implementation over materialized rows.
///
/// Besides serving buffered driver results, it can inject a scan error after
/// a number of rows and a close error, which is how shard failures are
/// exercised in tests.
pub struct MemoryRows {
    columns: Vec<String>,
    column_types: Vec<ColumnTypeRef>,
    close_calls: Arc<AtomicUsize>,
    state: Mutex<MemoryState>,
}

struct MemoryState {
    rows: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    served: usize,
    closed: bool,
    err: Option<ShardxError>,
    fail_after: Option<(usize, ShardxError)>,
    close_error: Option<ShardxError>,
}

impl MemoryRows {
    pub fn new<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let column_types = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .find(|v| !v.is_null())
                    .map_or(ValueKind::Null, Value::kind);
                FakeColumn::shared(name.clone(), mysql_type_name(kind))
            })
            .collect();
        Self {
            columns,
            column_types,
            close_calls: Arc::new(AtomicUsize::new(0)),
            state: Mutex::new(MemoryState {
                rows: rows.into(),
                current: None,
                served: 0,
                closed: false,
                err: None,
                fail_after: None,
                close_error: None,
            }),
        }
    }

    pub fn with_column_types(mut self, column_types: Vec<ColumnTypeRef>) -> Self {
        self.column_types = column_types;
        self
    }

    /// Fail the `n+1`-th call to `next` with `err`.
    pub fn with_error_after(self, n: usize, err: ShardxError) -> Self {
        self.state.lock().fail_after = Some((n, err));
        self
    }

    /// Return `err` from the first `close`.
    pub fn with_close_error(self, err: ShardxError) -> Self {
        self.state.lock().close_error = Some(err);
        self
    }

    /// Counter of `close` calls, shared with the cursor.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_calls)
    }
}

impl Rows for MemoryRows {
    fn columns(&self) -> ShardxResult<Vec<String>> {
        if self.state.lock().closed {
            return Err(ShardxError::RowsClosed);
        }
        Ok(self.columns.clone())
    }

    fn column_types(&self) -> ShardxResult<Vec<ColumnTypeRef>> {
        if self.state.lock().closed {
            return Err(ShardxError::RowsClosed);
        }
        Ok(self.column_types.clone())
    }

    fn next(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.err.is_some() {
            return false;
        }
        let fail_now = matches!(&state.fail_after, Some((n, _)) if state.served >= *n);
        if fail_now {
            state.err = state.fail_after.take().map(|(_, e)| e);
            state.current = None;
            return false;
        }
        state.current = state.rows.pop_front();
        if state.current.is_some() {
            state.served += 1;
            true
        } else {
            false
        }
    }

    fn scan(&self) -> ShardxResult<Vec<Value>> {
        let state = self.state.lock();
        if let Some(err) = &state.err {
            return Err(err.clone());
        }
        if state.closed {
            return Err(ShardxError::RowsClosed);
        }
        state.current.clone().ok_or(ShardxError::NoCurrentRow)
    }

    fn err(&self) -> Option<ShardxError> {
        self.state.lock().err.clone()
    }

    fn close(&self) -> ShardxResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.current = None;
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        match state.close_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// MySQL type name reported for a value kind.
pub(crate) fn mysql_type_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Null => "NULL",
        ValueKind::Bool => "TINYINT",
        ValueKind::Int8 => "TINYINT",
        ValueKind::Int16 => "SMALLINT",
        ValueKind::Int32 => "INT",
        ValueKind::Int64 => "BIGINT",
        ValueKind::UInt8 => "UNSIGNED TINYINT",
        ValueKind::UInt16 => "UNSIGNED SMALLINT",
        ValueKind::UInt32 => "UNSIGNED INT",
        ValueKind::UInt64 => "UNSIGNED BIGINT",
        ValueKind::Float32 => "FLOAT",
        ValueKind::Float64 => "DOUBLE",
        ValueKind::Text => "VARCHAR",
        ValueKind::Bytes => "BLOB",
    }
}
