//! Merge context: 요청 단위의 취소/타임아웃/메모리 한도
//!
//! A context is cloned into every cursor that needs to observe it. Cancelling
//! through a [`CancelHandle`] is visible to all clones.

use crate::config::MergeConfig;
use crate::error::{ShardxError, ShardxResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Per-request merge context.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    row_budget: Option<usize>,
}

/// Cancels the context it was taken from, from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl MergeContext {
    /// Context with no deadline and no row budget.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        let mut ctx = Self::new();
        if let Some(ms) = config.timeout_ms {
            ctx = ctx.with_timeout(Duration::from_millis(ms));
        }
        ctx.row_budget = config.max_materialized_rows;
        ctx
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Upper bound on rows a full-materialize merge may buffer.
    pub fn with_row_budget(mut self, rows: usize) -> Self {
        self.row_budget = Some(rows);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn row_budget(&self) -> Option<usize> {
        self.row_budget
    }

    /// Fail if the request was cancelled or its deadline passed.
    pub fn check(&self) -> ShardxResult<()> {
        if self.is_cancelled() {
            return Err(ShardxError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ShardxError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Fail once `buffered` exceeds the row budget.
    pub fn check_budget(&self, buffered: usize) -> ShardxResult<()> {
        match self.row_budget {
            Some(limit) if buffered > limit => Err(ShardxError::RowBudgetExceeded { limit }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes() {
        assert!(MergeContext::new().check().is_ok());
    }

    #[test]
    fn cancel_handle_reaches_clones() {
        let ctx = MergeContext::new();
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert_eq!(clone.check().unwrap_err(), ShardxError::Cancelled);
    }

    #[test]
    fn past_deadline_fails() {
        let ctx = MergeContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.check().unwrap_err(), ShardxError::DeadlineExceeded);
    }

    #[test]
    fn budget_allows_exact_limit() {
        let ctx = MergeContext::new().with_row_budget(2);
        assert!(ctx.check_budget(2).is_ok());
        assert_eq!(
            ctx.check_budget(3).unwrap_err(),
            ShardxError::RowBudgetExceeded { limit: 2 }
        );
    }

    #[test]
    fn from_config_copies_limits() {
        let config = MergeConfig {
            max_materialized_rows: Some(10),
            timeout_ms: Some(60_000),
        };
        let ctx = MergeContext::from_config(&config);
        assert_eq!(ctx.row_budget(), Some(10));
        assert!(ctx.check().is_ok());
    }
}
