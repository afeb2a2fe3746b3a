//! Paged Merger: LIMIT/OFFSET decorator
//!
//! Skip `offset` rows, then pass at most `limit` rows through and stop
//! pulling from the inner cursor.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::Merger;
use crate::rows::{BoxedRows, MergedRows, RowSource, read_row};
use crate::value::Value;

pub struct PagedMerger {
    inner: Box<dyn Merger>,
    limit: u64,
    offset: u64,
}

impl PagedMerger {
    pub fn new(inner: Box<dyn Merger>, limit: i64, offset: i64) -> ShardxResult<Self> {
        if limit <= 0 || offset < 0 {
            return Err(ShardxError::InvalidLimit { limit, offset });
        }
        Ok(Self {
            inner,
            limit: limit as u64,
            offset: offset as u64,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Discard the first `offset` rows; stops early when the cursor runs dry.
    fn skip(&self, ctx: &MergeContext, cursor: &BoxedRows) -> ShardxResult<u64> {
        let mut skipped = 0;
        while skipped < self.offset {
            ctx.check()?;
            if read_row(&**cursor)?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

impl std::fmt::Debug for PagedMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedMerger")
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Merger for PagedMerger {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        let cursor = self.inner.merge(ctx, results)?;
        // read metadata before the skip can exhaust (and auto-close) the cursor
        let prepared = cursor
            .columns()
            .and_then(|names| Ok((names, cursor.column_types()?)))
            .and_then(|meta| Ok((meta, self.skip(ctx, &cursor)?)));
        let ((names, types), skipped) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                return Err(match cursor.close() {
                    Ok(()) => err,
                    Err(close_err) => ShardxError::Close(vec![err, close_err]),
                });
            }
        };
        tracing::debug!(limit = self.limit, offset = self.offset, skipped, "paged merge");
        let source = PagedSource {
            ctx: ctx.clone(),
            inner: cursor,
            remaining: if skipped < self.offset { 0 } else { self.limit },
        };
        Ok(MergedRows::new(names, types, source).boxed())
    }
}

struct PagedSource {
    ctx: MergeContext,
    inner: BoxedRows,
    remaining: u64,
}

impl RowSource for PagedSource {
    fn advance(&mut self) -> ShardxResult<Option<Vec<Value>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.ctx.check()?;
        let row = read_row(&*self.inner)?;
        if row.is_some() {
            self.remaining -= 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> ShardxResult<()> {
        self.inner.close()
    }
}
