//! # shardx: Sharded Result-Set Merge Engine
//!
//! shardx는 샤딩 MySQL 프록시의 결과 병합 엔진입니다.
//! 샤드마다 재작성된 SQL이 돌려준 N개의 커서를 받아, 샤딩되지 않은 단일
//! 데이터베이스가 돌려줬을 하나의 커서로 재구성합니다.
//!
//! ## 주요 특징
//!
//! - **ORDER BY**: k-way heap merge (streaming 또는 full materialize)
//! - **집계 함수**: MIN / MAX / SUM / COUNT / AVG (AVG는 SUM/COUNT로 재계산)
//! - **GROUP BY**: 그룹 키로 정렬된 샤드 결과를 그룹별로 재집계
//! - **DISTINCT**: 정렬된 dedup 인덱스 기반 중복 제거
//! - **LIMIT/OFFSET**: 어떤 병합기 체인이든 감싸는 페이징 데코레이터
//!
//! ## 빠른 시작
//!
//! ```rust
//! use shardx_core::merge::{ColumnInfo, Feature, MergerFactory, QuerySpec};
//! use shardx_core::rows::{BoxedRows, MemoryRows};
//! use shardx_core::{MergeContext, Value};
//!
//! # fn main() -> shardx_core::ShardxResult<()> {
//! let spec = QuerySpec {
//!     features: vec![Feature::OrderBy],
//!     select: vec![ColumnInfo::new(0, "id")],
//!     order_by: vec![ColumnInfo::new(0, "id")],
//!     ..Default::default()
//! };
//! let merger = MergerFactory::create(spec.clone(), spec)?;
//!
//! let shard = |ids: &[i64]| -> BoxedRows {
//!     Box::new(MemoryRows::new(["id"], ids.iter().map(|i| vec![Value::Int64(*i)]).collect()))
//! };
//! let merged = merger.merge(&MergeContext::new(), vec![shard(&[1, 4]), shard(&[2, 3])])?;
//! while merged.next() {
//!     let id: i64 = merged.scan_column(0)?;
//!     println!("{id}");
//! }
//! merged.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 병합 파이프라인
//!
//! ```text
//! shard cursors ─▶ Aggregate | GroupBy | Distinct | Sort ─▶ (Paged) ─▶ merged cursor
//! ```
//!
//! ## 모듈 구조
//!
//! - [`merge`]: 병합기 ([`merge::SortMerger`], [`merge::GroupByMerger`], ...) 와 팩토리
//! - [`rows`]: 커서 계약 ([`rows::Rows`]) 과 인메모리 커서
//! - [`value`]: 드라이버 중립 값 모델
//! - [`context`]: 취소, 타임아웃, 행 버퍼 한도
//! - [`config`]: 환경 변수 / JSON 설정

pub mod config;
pub mod context;
pub mod error;
pub mod merge;
pub mod rows;
pub mod value;

// Logging utilities
pub mod logging;

// ===== Re-exports =====
pub use config::MergeConfig;
pub use context::{CancelHandle, MergeContext};
pub use error::{ShardxError, ShardxResult};
pub use merge::{MergeMode, Merger, MergerFactory, QuerySpec};
pub use rows::{BoxedRows, Rows};
pub use value::{FromValue, Value, ValueKind};
