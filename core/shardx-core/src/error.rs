//! Error types for the shardx merge engine.
//!
//! All public APIs return `ShardxResult<T>`; no panics in library code.
//! 에러는 `Clone` 가능해야 합니다: 커서의 sticky error는 `err()`와 이후의
//! 모든 `scan()` 호출에서 그대로 재현됩니다.

use thiserror::Error;

/// Unified error type for all merge operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShardxError {
    /// Two columns share the same select name
    #[error("duplicate sort column: {0}")]
    DuplicateSortColumn(String),

    /// Column list that must not be empty was empty
    #[error("empty column list: {0}")]
    EmptyColumns(String),

    /// Merge was called without any shard cursor
    #[error("no rows to merge")]
    NoRowsToMerge,

    /// Shards returned different column sets
    #[error("inconsistent columns across shards: shard {shard} returned {actual:?}, expected {expected:?}")]
    ColumnsMismatch {
        shard: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A declared sort/group column is absent from the returned columns
    #[error("sort column '{0}' not found among returned columns")]
    SortColumnNotFound(String),

    /// Aggregator column index is outside the row
    #[error("invalid aggregate column index: {index} (row width {width})")]
    InvalidAggregateColumnIndex { index: usize, width: usize },

    /// No combinator registered for the runtime value kind
    #[error("aggregate function not found for type: {func} over {kind}")]
    AggregateFunctionNotFound { func: String, kind: String },

    /// Some, but not all, shards returned zero rows for a pure aggregate
    #[error("aggregate query has unexpectedly empty shard result (shard {0})")]
    EmptyShardResult(usize),

    /// A shard returned more than one row for a pure aggregate
    #[error("aggregate query returned more than one row from shard {0}")]
    TooManyAggregateRows(usize),

    /// Explicit DISTINCT ordering mentions a non-distinct column
    #[error("sort list not subset of distinct list: '{0}'")]
    SortNotSubsetOfDistinct(String),

    /// Returned columns do not line up with the DISTINCT projection
    #[error("distinct columns not found among returned columns: shard {shard} returned {actual:?}, expected {expected:?}")]
    DistinctColumnsNotFound {
        shard: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// LIMIT/OFFSET out of range
    #[error("invalid limit/offset: limit={limit}, offset={offset}")]
    InvalidLimit { limit: i64, offset: i64 },

    /// Query spec failed validation
    #[error("invalid query spec: {0}")]
    InvalidQuerySpec(String),

    /// Cursor was used after close
    #[error("rows closed")]
    RowsClosed,

    /// `scan` without a successful `next`
    #[error("scan called without a current row")]
    NoCurrentRow,

    /// Error reported by a shard driver
    #[error("shard driver error: {message}")]
    Driver { message: String, retryable: bool },

    /// Value could not be converted to the requested type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Request context was cancelled
    #[error("merge cancelled")]
    Cancelled,

    /// Request deadline passed
    #[error("merge deadline exceeded")]
    DeadlineExceeded,

    /// Full materialization exceeded the configured row budget
    #[error("materialized row budget exceeded: limit {limit}")]
    RowBudgetExceeded { limit: usize },

    /// One or more cursors failed to close
    #[error("close failed: {}", join_errors(.0))]
    Close(Vec<ShardxError>),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(String),
}

impl ShardxError {
    /// Shorthand for a non-retryable driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        ShardxError::Driver {
            message: message.into(),
            retryable: false,
        }
    }

    /// Shorthand for a query-spec validation failure.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        ShardxError::InvalidQuerySpec(message.into())
    }

    /// Whether the shard-dispatch layer may retry the statement.
    ///
    /// 이 계층은 재시도하지 않습니다. 드라이버가 재시도 가능하다고 표시한
    /// 에러만 `true`를 반환합니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShardxError::Driver { retryable, .. } => *retryable,
            ShardxError::Close(errors) => errors.iter().all(ShardxError::is_retryable),
            _ => false,
        }
    }

    /// Combine close errors: none → `Ok`, one → itself, more → `Close`.
    pub fn combine(mut errors: Vec<ShardxError>) -> ShardxResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ShardxError::Close(errors)),
        }
    }
}

fn join_errors(errors: &[ShardxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for all merge operations.
pub type ShardxResult<T> = Result<T, ShardxError>;

impl From<serde_json::Error> for ShardxError {
    fn from(err: serde_json::Error) -> Self {
        ShardxError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ShardxError {
    fn from(err: std::io::Error) -> Self {
        ShardxError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_duplicate_sort_column() {
        let err = ShardxError::DuplicateSortColumn("uid".to_string());
        assert_eq!(err.to_string(), "duplicate sort column: uid");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = ShardxError::TypeMismatch {
            expected: "Int64".to_string(),
            actual: "Text".to_string(),
        };
        assert_eq!(err.to_string(), "type mismatch: expected Int64, got Text");
    }

    #[test]
    fn combine_empty_is_ok() {
        assert!(ShardxError::combine(vec![]).is_ok());
    }

    #[test]
    fn combine_single_error_is_unwrapped() {
        let err = ShardxError::combine(vec![ShardxError::driver("e1")]).unwrap_err();
        assert_eq!(err, ShardxError::driver("e1"));
    }

    #[test]
    fn combine_keeps_every_error() {
        let err = ShardxError::combine(vec![ShardxError::driver("e1"), ShardxError::driver("e2")])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("e1"));
        assert!(msg.contains("e2"));
        assert!(matches!(err, ShardxError::Close(ref v) if v.len() == 2));
    }

    #[test]
    fn retryable_only_for_flagged_driver_errors() {
        let retry = ShardxError::Driver {
            message: "lock wait timeout".to_string(),
            retryable: true,
        };
        assert!(retry.is_retryable());
        assert!(!ShardxError::driver("syntax").is_retryable());
        assert!(!ShardxError::RowsClosed.is_retryable());
        assert!(!ShardxError::NoRowsToMerge.is_retryable());
    }
}
