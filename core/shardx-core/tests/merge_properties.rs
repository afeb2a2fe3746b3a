// Merge properties: proptest 기반 불변식 검증
//
// Shard contents are generated, pre-sorted / pre-aggregated the way a shard
// would return them, merged, and compared against a direct computation over
// the union of all rows.

use proptest::prelude::*;
use shardx_core::merge::{
    AggregateFunc, AggregateMerger, BatchMerger, ColumnInfo, DistinctMerger, GroupByMerger,
    PagedMerger, SortColumns, SortMerger, SortOrder,
};
use shardx_core::rows::{BoxedRows, MemoryRows};
use shardx_core::value::compare_keys;
use shardx_core::{MergeContext, MergeMode, Merger, Value};
use std::collections::BTreeMap;

fn cursor(columns: &[&str], rows: Vec<Vec<Value>>) -> BoxedRows {
    Box::new(MemoryRows::new(columns.iter().copied(), rows))
}

fn opt(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Int64)
}

fn drain(merger: &dyn Merger, shards: Vec<BoxedRows>) -> Vec<Vec<Value>> {
    merger
        .merge(&MergeContext::new(), shards)
        .and_then(|merged| merged.collect_rows())
        .unwrap()
}

fn shards_strategy<T: std::fmt::Debug>(
    item: impl Strategy<Value = T> + Clone,
) -> impl Strategy<Value = Vec<Vec<T>>> {
    prop::collection::vec(prop::collection::vec(item, 0..12), 1..5)
}

proptest! {
    #[test]
    fn sort_merge_is_ordered_permutation(
        shards in shards_strategy((prop::option::of(-5i64..5), -5i64..5))
    ) {
        let orders = [SortOrder::Asc, SortOrder::Desc];
        let mut all = Vec::new();
        let cursors = shards
            .into_iter()
            .map(|rows| {
                let mut rows: Vec<Vec<Value>> =
                    rows.into_iter().map(|(a, b)| vec![opt(a), Value::Int64(b)]).collect();
                rows.sort_by(|x, y| compare_keys(x, y, &orders));
                all.extend(rows.iter().cloned());
                cursor(&["a", "b"], rows)
            })
            .collect();

        let merger = SortMerger::new(
            SortColumns::new([ColumnInfo::new(0, "a"), ColumnInfo::new(1, "b").desc()]).unwrap(),
            MergeMode::Streaming,
        )
        .unwrap();
        let merged = drain(&merger, cursors);

        prop_assert!(merged.windows(2).all(|w| compare_keys(&w[0], &w[1], &orders).is_le()));
        all.sort_by(|x, y| compare_keys(x, y, &orders));
        prop_assert_eq!(merged, all);
    }

    #[test]
    fn pagination_law(len in 0usize..40, limit in 1i64..20, offset in 0i64..50) {
        let rows: Vec<Vec<Value>> = (0..len as i64).map(|i| vec![Value::Int64(i)]).collect();
        let page = |limit: i64, offset: i64| {
            let merger = PagedMerger::new(Box::new(BatchMerger::new()), limit, offset).unwrap();
            drain(&merger, vec![cursor(&["id"], rows.clone())])
        };

        let got = page(limit, offset);
        let expected = (limit as usize).min(len.saturating_sub(offset as usize));
        prop_assert_eq!(got.len(), expected);

        if len >= 2 {
            let k = 1 + (offset as usize % (len - 1));
            let mut joined = page(k as i64, 0);
            joined.extend(page((len - k) as i64, k as i64));
            prop_assert_eq!(joined, rows);
        }
    }

    #[test]
    fn distinct_output_is_unique_and_idempotent(shards in shards_strategy(prop::option::of(0i64..6))) {
        let merger = DistinctMerger::new(vec![ColumnInfo::new(0, "v").with_distinct()], vec![]).unwrap();
        let cursors = shards
            .into_iter()
            .map(|rows| cursor(&["v"], rows.into_iter().map(|v| vec![opt(v)]).collect()))
            .collect();
        let once = drain(&merger, cursors);

        let asc = [SortOrder::Asc];
        prop_assert!(once.windows(2).all(|w| compare_keys(&w[0], &w[1], &asc).is_lt()));
        let twice = drain(&merger, vec![cursor(&["v"], once.clone())]);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn group_by_covers_every_key_once(
        shards in prop::collection::vec(prop::collection::btree_map(0i64..8, 0i64..100, 0..6), 1..5)
    ) {
        let mut expected: BTreeMap<i64, i64> = BTreeMap::new();
        let cursors = shards
            .into_iter()
            .map(|groups| {
                for (uid, sum) in &groups {
                    *expected.entry(*uid).or_default() += sum;
                }
                let rows = groups
                    .into_iter()
                    .map(|(uid, sum)| vec![Value::Int64(uid), Value::Int64(sum)])
                    .collect();
                cursor(&["uid", "SUM(amount)"], rows)
            })
            .collect();

        let merger = GroupByMerger::new(
            SortColumns::new([ColumnInfo::new(0, "uid")]).unwrap(),
            &[ColumnInfo::new(0, "uid"), ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount")],
            MergeMode::Streaming,
        )
        .unwrap();
        let merged = drain(&merger, cursors);
        let expected: Vec<Vec<Value>> = expected
            .into_iter()
            .map(|(uid, sum)| vec![Value::Int64(uid), Value::Int64(sum)])
            .collect();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn aggregates_match_direct_computation(
        shards in prop::collection::vec(prop::collection::vec(prop::option::of(-50i64..50), 1..8), 1..5)
    ) {
        let columns = ["MIN(x)", "MAX(x)", "SUM(x)", "COUNT(x)"];
        let partial = |values: &[Option<i64>]| {
            let present: Vec<i64> = values.iter().flatten().copied().collect();
            vec![
                opt(present.iter().min().copied()),
                opt(present.iter().max().copied()),
                opt((!present.is_empty()).then(|| present.iter().sum())),
                Value::Int64(present.len() as i64),
            ]
        };
        let cursors = shards
            .iter()
            .map(|values| cursor(&columns, vec![partial(values)]))
            .collect();
        let union: Vec<Option<i64>> = shards.iter().flatten().copied().collect();

        let merger = AggregateMerger::new(&[
            ColumnInfo::aggregate(0, AggregateFunc::Min, "x"),
            ColumnInfo::aggregate(1, AggregateFunc::Max, "x"),
            ColumnInfo::aggregate(2, AggregateFunc::Sum, "x"),
            ColumnInfo::aggregate(3, AggregateFunc::Count, "x"),
        ])
        .unwrap();
        let merged = drain(&merger, cursors);
        prop_assert_eq!(merged, vec![partial(&union)]);
    }
}
