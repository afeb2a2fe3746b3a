//! GROUP BY + ORDER BY + LIMIT 병합 예제
//!
//! 실행: RUST_LOG=shardx_core=debug cargo run --example group_by_report --features logging
//!
//! SELECT uid, AVG(amount) FROM orders GROUP BY uid ORDER BY AVG(amount) DESC LIMIT 2
//! is rewritten for every shard as
//! SELECT uid, AVG(amount), SUM(amount), COUNT(amount) ... GROUP BY uid ORDER BY uid

use shardx_core::merge::{AggregateFunc, ColumnInfo, Feature, MergerFactory, QuerySpec};
use shardx_core::rows::{BoxedRows, MemoryRows};
use shardx_core::{MergeConfig, MergeContext, Value};

fn shard(rows: &[(i64, i64, i64)]) -> BoxedRows {
    Box::new(MemoryRows::new(
        ["uid", "AVG(amount)", "SUM(amount)", "COUNT(amount)"],
        rows.iter()
            .map(|&(uid, sum, count)| {
                vec![
                    Value::Int64(uid),
                    Value::Float64(sum as f64 / count as f64),
                    Value::Int64(sum),
                    Value::Int64(count),
                ]
            })
            .collect(),
    ))
}

fn main() -> shardx_core::ShardxResult<()> {
    shardx_core::logging::init();

    let config = MergeConfig::load(None)?;
    let ctx = MergeContext::from_config(&config);

    let avg = ColumnInfo::aggregate(1, AggregateFunc::Avg, "amount");
    let origin = QuerySpec {
        features: vec![Feature::GroupBy, Feature::OrderBy, Feature::Limit],
        select: vec![ColumnInfo::new(0, "uid"), avg.clone()],
        group_by: vec![ColumnInfo::new(0, "uid")],
        order_by: vec![avg.clone().desc()],
        limit: 2,
        offset: 0,
    };
    let target = QuerySpec {
        select: vec![
            ColumnInfo::new(0, "uid"),
            avg,
            ColumnInfo::aggregate(2, AggregateFunc::Sum, "amount"),
            ColumnInfo::aggregate(3, AggregateFunc::Count, "amount"),
        ],
        ..origin.clone()
    };

    let merger = MergerFactory::create(origin, target)?;
    let merged = merger.merge(
        &ctx,
        vec![
            shard(&[(1, 300, 3), (2, 80, 1), (4, 10, 2)]),
            shard(&[(1, 100, 1), (3, 500, 2)]),
            shard(&[(2, 20, 4), (4, 990, 1)]),
        ],
    )?;

    println!("{:?}", merged.columns()?);
    while merged.next() {
        let uid: i64 = merged.scan_column(0)?;
        let avg: f64 = merged.scan_column(1)?;
        println!("uid={uid} avg={avg:.2}");
    }
    if let Some(err) = merged.err() {
        return Err(err);
    }
    merged.close()
}
