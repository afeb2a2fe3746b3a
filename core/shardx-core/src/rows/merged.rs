//! Merged cursor: every merger's output shares this lifecycle
//!
//! Each merger supplies a [`RowSource`] that knows how to produce the next
//! merged row; [`MergedRows`] owns the cursor state machine around it
//! (current row, closed flag, sticky error, deferred close error).

use super::{BoxedRows, ColumnTypeRef, Rows};
use crate::error::{ShardxError, ShardxResult};
use crate::value::Value;
use parking_lot::Mutex;

/// Produces merged rows for a [`MergedRows`] cursor.
pub(crate) trait RowSource: Send {
    /// Next merged row, `None` once every input is exhausted.
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>>;

    /// Close all owned input cursors, combining their errors.
    fn close(&mut self) -> ShardxResult<()>;
}

pub(crate) struct MergedRows<S: RowSource> {
    columns: Vec<String>,
    column_types: Vec<ColumnTypeRef>,
    state: Mutex<MergedState<S>>,
}

struct MergedState<S> {
    source: S,
    current: Option<Vec<Value>>,
    closed: bool,
    err: Option<ShardxError>,
    /// Close error hit while auto-closing; handed out by the next `close`
    pending_close: Option<ShardxError>,
}

impl<S: RowSource> MergedState<S> {
    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        if let Err(err) = self.source.close() {
            self.pending_close = Some(err);
        }
    }
}

impl<S: RowSource + 'static> MergedRows<S> {
    pub(crate) fn new(columns: Vec<String>, column_types: Vec<ColumnTypeRef>, source: S) -> Self {
        Self {
            columns,
            column_types,
            state: Mutex::new(MergedState {
                source,
                current: None,
                closed: false,
                err: None,
                pending_close: None,
            }),
        }
    }

    pub(crate) fn boxed(self) -> BoxedRows {
        Box::new(self)
    }
}

impl<S: RowSource> Rows for MergedRows<S> {
    fn columns(&self) -> ShardxResult<Vec<String>> {
        let state = self.state.lock();
        match (&state.err, state.closed) {
            (Some(err), _) => Err(err.clone()),
            (None, true) => Err(ShardxError::RowsClosed),
            (None, false) => Ok(self.columns.clone()),
        }
    }

    fn column_types(&self) -> ShardxResult<Vec<ColumnTypeRef>> {
        let state = self.state.lock();
        match (&state.err, state.closed) {
            (Some(err), _) => Err(err.clone()),
            (None, true) => Err(ShardxError::RowsClosed),
            (None, false) => Ok(self.column_types.clone()),
        }
    }

    fn next(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.err.is_some() {
            return false;
        }
        match state.source.advance() {
            Ok(Some(row)) => {
                state.current = Some(row);
                true
            }
            Ok(None) => {
                state.finish();
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, "merged cursor failed, closing shard cursors");
                state.err = Some(err);
                state.finish();
                false
            }
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
            return match state.pending_close.take() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }
        state.closed = true;
        state.current = None;
        state.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        remaining: usize,
        fail: bool,
        closes: usize,
    }

    impl RowSource for Counting {
        fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
            if self.remaining == 0 {
                if self.fail {
                    return Err(ShardxError::driver("lost connection"));
                }
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(vec![Value::UInt64(self.remaining as u64)]))
        }

        fn close(&mut self) -> ShardxResult<()> {
            self.closes += 1;
            Ok(())
        }
    }

    fn cursor(remaining: usize, fail: bool) -> MergedRows<Counting> {
        MergedRows::new(
            vec!["n".to_string()],
            vec![],
            Counting {
                remaining,
                fail,
                closes: 0,
            },
        )
    }

    #[test]
    fn exhaustion_closes_once() {
        let rows = cursor(2, false);
        assert!(rows.next());
        assert!(rows.next());
        assert!(!rows.next());
        assert!(!rows.next());
        assert_eq!(rows.state.lock().source.closes, 1);
        assert!(rows.close().is_ok());
        assert_eq!(rows.state.lock().source.closes, 1);
        assert_eq!(rows.scan().unwrap_err(), ShardxError::RowsClosed);
    }

    #[test]
    fn error_is_sticky() {
        let rows = cursor(1, true);
        assert!(rows.next());
        assert!(!rows.next());
        let err = ShardxError::driver("lost connection");
        assert_eq!(rows.err(), Some(err.clone()));
        assert_eq!(rows.scan().unwrap_err(), err);
        assert_eq!(rows.columns().unwrap_err(), err);
        assert!(!rows.next());
    }

    #[test]
    fn close_then_use_reports_closed() {
        let rows = cursor(5, false);
        assert!(rows.next());
        rows.close().unwrap();
        assert!(!rows.next());
        assert_eq!(rows.columns().unwrap_err(), ShardxError::RowsClosed);
        assert!(rows.close().is_ok());
    }
}
