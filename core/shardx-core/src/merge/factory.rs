//! Merger factory: (origin, target) 쿼리 명세로부터 병합기 체인 구성
//!
//! ```text
//! target.features:  AggregateFunc < GroupBy < Distinct < OrderBy < Limit
//!                        │             │          │          │        │
//!                   Aggregate      GroupBy    Distinct     Sort    Paged(wraps all)
//! ```
//!
//! The first merger sees the N shard cursors, each sorted by the pushed-down
//! ORDER BY, or by the group columns when there is none. It streams when that
//! order keeps its key classes adjacent. Every later merger sees one cursor
//! whose order is whatever the previous merger emits.
//!
//! Only first-page LIMIT is merged: `offset` must be 0.

use crate::context::MergeContext;
use crate::error::{ShardxError, ShardxResult};
use crate::merge::{
    AggregateFunc, AggregateMerger, BatchMerger, ColumnInfo, DistinctMerger, GroupByMerger,
    MergeMode, Merger, PagedMerger, SortColumns, SortMerger,
};
use crate::rows::BoxedRows;
use serde::{Deserialize, Serialize};

/// Query features, declared in ascending rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    AggregateFunc,
    GroupBy,
    Distinct,
    OrderBy,
    Limit,
}

/// Structured description of a (possibly rewritten) SELECT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub features: Vec<Feature>,
    pub select: Vec<ColumnInfo>,
    pub group_by: Vec<ColumnInfo>,
    pub order_by: Vec<ColumnInfo>,
    pub limit: i64,
    pub offset: i64,
}

impl QuerySpec {
    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Structural checks shared by origin and target, in fail-fast order.
    pub fn validate(&self) -> ShardxResult<()> {
        if let Some(pair) = self.features.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ShardxError::invalid_spec(format!(
                "features out of order: {:?} before {:?}",
                pair[0], pair[1]
            )));
        }
        if self.has(Feature::AggregateFunc) && self.has(Feature::GroupBy) {
            return Err(ShardxError::invalid_spec(
                "aggregate functions and GROUP BY cannot be merged together",
            ));
        }
        if self.has(Feature::GroupBy) && self.has(Feature::Distinct) {
            return Err(ShardxError::invalid_spec(
                "GROUP BY and DISTINCT cannot be merged together",
            ));
        }
        if self.select.is_empty() {
            return Err(ShardxError::EmptyColumns("select columns".to_string()));
        }
        if let Some(col) = self.select.iter().find(|c| has_aggregate_wrapper(&c.name)) {
            return Err(ShardxError::invalid_spec(format!(
                "column name '{}' must not carry an aggregate call",
                col.name
            )));
        }
        if self.has(Feature::GroupBy) {
            self.validate_group_by()?;
        }
        if self.has(Feature::Distinct)
            && let Some(col) = self.select.iter().find(|c| !c.distinct)
        {
            return Err(ShardxError::invalid_spec(format!(
                "DISTINCT query selects non-distinct column '{}'",
                col.select_name()
            )));
        }
        if self.has(Feature::OrderBy) {
            self.validate_order_by()?;
        }
        // only the first page is pushed down
        if self.has(Feature::Limit) && (self.limit < 1 || self.offset != 0) {
            return Err(ShardxError::InvalidLimit {
                limit: self.limit,
                offset: self.offset,
            });
        }
        Ok(())
    }

    fn in_select(&self, col: &ColumnInfo) -> bool {
        let name = col.select_name();
        self.select.iter().any(|s| s.select_name() == name)
    }

    fn validate_group_by(&self) -> ShardxResult<()> {
        if self.group_by.is_empty() {
            return Err(ShardxError::EmptyColumns("group by columns".to_string()));
        }
        for col in &self.group_by {
            if col.is_aggregate() {
                return Err(ShardxError::invalid_spec(format!(
                    "aggregate column '{}' in GROUP BY",
                    col.select_name()
                )));
            }
            if !self.in_select(col) {
                return Err(ShardxError::invalid_spec(format!(
                    "GROUP BY column '{}' is not selected",
                    col.select_name()
                )));
            }
        }
        let grouped: Vec<String> = self.group_by.iter().map(ColumnInfo::select_name).collect();
        if let Some(col) = self
            .select
            .iter()
            .find(|c| !c.is_aggregate() && !grouped.contains(&c.select_name()))
        {
            return Err(ShardxError::invalid_spec(format!(
                "selected column '{}' is neither aggregated nor grouped",
                col.select_name()
            )));
        }
        Ok(())
    }

    fn validate_order_by(&self) -> ShardxResult<()> {
        if self.order_by.is_empty() {
            return Err(ShardxError::EmptyColumns("order by columns".to_string()));
        }
        for col in &self.order_by {
            let name = col.select_name();
            let resolved = self
                .select
                .iter()
                .any(|s| s.index == col.index && s.select_name() == name);
            if !resolved {
                return Err(ShardxError::SortColumnNotFound(name));
            }
        }
        Ok(())
    }
}

/// `SUM(x)`-style text inside a bare column name.
fn has_aggregate_wrapper(name: &str) -> bool {
    let upper = name.trim().to_ascii_uppercase();
    AggregateFunc::ALL.iter().any(|func| {
        upper
            .strip_prefix(func.as_str())
            .is_some_and(|rest| rest.trim_start().starts_with('('))
    })
}

/// Order a merger's output is known to follow.
#[derive(Debug, Clone)]
enum Emitted {
    /// At most one row; any order holds
    Single,
    Ordered(SortColumns),
}

impl Emitted {
    fn satisfies(&self, wanted: &SortColumns) -> bool {
        match self {
            Emitted::Single => true,
            Emitted::Ordered(have) => {
                wanted.len() <= have.len()
                    && wanted.iter().zip(have.iter()).all(|(w, h)| {
                        w.select_name() == h.select_name() && w.order == h.order
                    })
            }
        }
    }
}

/// 병합기 팩토리
#[derive(Debug, Clone)]
pub struct MergerFactory {
    origin: QuerySpec,
    target: QuerySpec,
}

impl MergerFactory {
    /// Validate both specs and their pairing.
    pub fn new(origin: QuerySpec, target: QuerySpec) -> ShardxResult<Self> {
        origin.validate()?;
        target.validate()?;
        if origin.has(Feature::Limit)
            && (!target.has(Feature::Limit) || target.limit < origin.limit)
        {
            return Err(ShardxError::InvalidLimit {
                limit: target.limit,
                offset: target.offset,
            });
        }
        Ok(Self { origin, target })
    }

    pub fn origin(&self) -> &QuerySpec {
        &self.origin
    }

    pub fn target(&self) -> &QuerySpec {
        &self.target
    }

    /// Validate and build in one step.
    pub fn create(origin: QuerySpec, target: QuerySpec) -> ShardxResult<Box<dyn Merger>> {
        Self::new(origin, target)?.build()
    }

    /// Assemble the merger chain for `target.features`.
    pub fn build(&self) -> ShardxResult<Box<dyn Merger>> {
        let target = &self.target;
        let mut stages: Vec<Box<dyn Merger>> = Vec::new();
        let mut emitted: Option<Emitted> = None;

        for feature in &target.features {
            match feature {
                Feature::AggregateFunc => {
                    stages.push(Box::new(AggregateMerger::new(&target.select)?));
                    emitted = Some(Emitted::Single);
                }
                Feature::GroupBy => {
                    let (key, mode) = self.group_key()?;
                    let mode = match emitted.as_ref() {
                        None => mode,
                        upstream => stage_mode(upstream, &key),
                    };
                    stages.push(Box::new(GroupByMerger::new(key.clone(), &target.select, mode)?));
                    emitted = Some(Emitted::Ordered(key));
                }
                Feature::Distinct => {
                    let merger = self.distinct_merger()?;
                    emitted = Some(match emitted {
                        Some(Emitted::Single) => Emitted::Single,
                        _ => Emitted::Ordered(merger.output_order()),
                    });
                    stages.push(Box::new(merger));
                }
                Feature::OrderBy => {
                    let order_by = SortColumns::new(target.order_by.iter().cloned())?;
                    let mode = stage_mode(emitted.as_ref(), &order_by);
                    stages.push(Box::new(SortMerger::new(order_by.clone(), mode)?));
                    emitted = Some(Emitted::Ordered(order_by));
                }
                Feature::Limit => {}
            }
        }

        let chain: Box<dyn Merger> = match stages.len() {
            0 => Box::new(BatchMerger::new()),
            1 => stages.remove(0),
            _ => Box::new(Pipeline::new(stages)),
        };
        tracing::debug!(features = ?target.features, "merger chain built");

        if target.has(Feature::Limit) {
            let limit = if self.origin.has(Feature::Limit) {
                self.origin.limit
            } else {
                target.limit
            };
            return Ok(Box::new(PagedMerger::new(chain, limit, 0)?));
        }
        Ok(chain)
    }

    /// Heap key for the Group-By stage.
    ///
    /// Shards come back sorted by the pushed-down ORDER BY when there is one,
    /// otherwise ascending by the group columns. A group's rows stay adjacent
    /// only if the leading ORDER BY columns are exactly the group columns, in
    /// any order and direction; anything else needs the full pre-scan.
    fn group_key(&self) -> ShardxResult<(SortColumns, MergeMode)> {
        let target = &self.target;
        let group_by = SortColumns::new(target.group_by.iter().cloned())?;
        if !target.has(Feature::OrderBy) {
            return Ok((group_by, MergeMode::Streaming));
        }
        let grouped = group_by.select_names();
        let width = grouped.len();
        let leading = target.order_by.get(..width).unwrap_or(&[]);
        let covers = leading.len() == width
            && leading.iter().all(|o| grouped.contains(&o.select_name()));
        if covers {
            Ok((SortColumns::new(leading.iter().cloned())?, MergeMode::Streaming))
        } else {
            Ok((group_by, MergeMode::FullMaterialize))
        }
    }

    /// Distinct over every selected column; an ORDER BY within the
    /// distinct columns lets it stream.
    fn distinct_merger(&self) -> ShardxResult<DistinctMerger> {
        let target = &self.target;
        let sort = if target.has(Feature::OrderBy)
            && target
                .order_by
                .iter()
                .all(|o| target.select.iter().any(|s| s.select_name() == o.select_name()))
        {
            target.order_by.clone()
        } else {
            Vec::new()
        };
        DistinctMerger::new(target.select.clone(), sort)
    }
}

/// First stage streams over pre-sorted shards; later stages stream only
/// when the upstream order already matches their key.
fn stage_mode(upstream: Option<&Emitted>, key: &SortColumns) -> MergeMode {
    match upstream {
        None => MergeMode::Streaming,
        Some(emitted) if emitted.satisfies(key) => MergeMode::Streaming,
        Some(_) => MergeMode::FullMaterialize,
    }
}

/// Mergers chained output-to-input.
pub struct Pipeline {
    stages: Vec<Box<dyn Merger>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Merger>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Merger for Pipeline {
    fn merge(&self, ctx: &MergeContext, results: Vec<BoxedRows>) -> ShardxResult<BoxedRows> {
        let Some((first, rest)) = self.stages.split_first() else {
            return BatchMerger::new().merge(ctx, results);
        };
        let mut cursor = first.merge(ctx, results)?;
        for stage in rest {
            cursor = stage.merge(ctx, vec![cursor])?;
        }
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::SortOrder;
    use crate::rows::MemoryRows;
    use crate::value::Value;

    fn spec(features: &[Feature], select: Vec<ColumnInfo>) -> QuerySpec {
        QuerySpec {
            features: features.to_vec(),
            select,
            ..Default::default()
        }
    }

    #[test]
    fn features_must_be_ascending() {
        let q = spec(&[Feature::OrderBy, Feature::Distinct], vec![ColumnInfo::new(0, "id")]);
        assert!(matches!(q.validate(), Err(ShardxError::InvalidQuerySpec(_))));
        let q = spec(&[Feature::Limit, Feature::Limit], vec![ColumnInfo::new(0, "id")]);
        assert!(q.validate().is_err());
    }

    #[test]
    fn illegal_combinations_rejected() {
        let cols = vec![ColumnInfo::new(0, "id").with_distinct()];
        assert!(spec(&[Feature::AggregateFunc, Feature::GroupBy], cols.clone()).validate().is_err());
        assert!(spec(&[Feature::GroupBy, Feature::Distinct], cols).validate().is_err());
    }

    #[test]
    fn select_checks() {
        assert!(matches!(
            spec(&[], vec![]).validate(),
            Err(ShardxError::EmptyColumns(_))
        ));
        let q = spec(&[], vec![ColumnInfo::new(0, "sum( amount )")]);
        assert!(matches!(q.validate(), Err(ShardxError::InvalidQuerySpec(_))));
        assert!(spec(&[], vec![ColumnInfo::new(0, "summary")]).validate().is_ok());
    }

    #[test]
    fn group_by_checks() {
        let mut q = spec(
            &[Feature::GroupBy],
            vec![
                ColumnInfo::new(0, "uid"),
                ColumnInfo::new(1, "name"),
                ColumnInfo::aggregate(2, AggregateFunc::Sum, "amount"),
            ],
        );
        q.group_by = vec![ColumnInfo::new(0, "uid")];
        assert!(q.validate().is_err(), "name is neither grouped nor aggregated");
        q.group_by.push(ColumnInfo::new(1, "name"));
        assert!(q.validate().is_ok());
        q.group_by.push(ColumnInfo::new(7, "region"));
        assert!(q.validate().is_err(), "region is not selected");
    }

    #[test]
    fn distinct_requires_marked_columns() {
        let q = spec(
            &[Feature::Distinct],
            vec![ColumnInfo::new(0, "a").with_distinct(), ColumnInfo::new(1, "b")],
        );
        assert!(q.validate().is_err());
    }

    #[test]
    fn order_by_must_resolve_by_index_and_name() {
        let mut q = spec(&[Feature::OrderBy], vec![ColumnInfo::new(0, "id")]);
        q.order_by = vec![ColumnInfo::new(1, "id")];
        assert_eq!(q.validate(), Err(ShardxError::SortColumnNotFound("id".to_string())));
        q.order_by = vec![ColumnInfo::new(0, "id").desc()];
        assert!(q.validate().is_ok());
    }

    #[test]
    fn limit_pairing() {
        let select = vec![ColumnInfo::new(0, "id")];
        let mut origin = spec(&[Feature::Limit], select.clone());
        origin.limit = 10;
        let mut target = spec(&[Feature::Limit], select.clone());
        target.limit = 5;
        assert!(MergerFactory::new(origin.clone(), target.clone()).is_err());
        target.limit = 10;
        assert!(MergerFactory::new(origin.clone(), target.clone()).is_ok());
        let unlimited = spec(&[], select);
        assert!(MergerFactory::new(origin, unlimited).is_err());
    }

    #[test]
    fn limit_requires_first_page() {
        let mut q = spec(&[Feature::Limit], vec![ColumnInfo::new(0, "id")]);
        q.limit = 10;
        assert!(q.validate().is_ok());
        q.offset = 20;
        assert_eq!(
            q.validate(),
            Err(ShardxError::InvalidLimit { limit: 10, offset: 20 })
        );
        let target = QuerySpec { offset: 0, limit: 30, ..q.clone() };
        assert!(MergerFactory::new(q, target).is_err());
    }

    #[test]
    fn sort_after_group_by_materializes_unless_keys_match() {
        let group = Emitted::Ordered(SortColumns::new([ColumnInfo::new(0, "uid")]).unwrap());
        let by_uid = SortColumns::new([ColumnInfo::new(0, "uid")]).unwrap();
        let by_uid_desc = SortColumns::new([ColumnInfo::new(0, "uid").desc()]).unwrap();
        let by_sum = SortColumns::new([ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount")]).unwrap();
        assert_eq!(stage_mode(Some(&group), &by_uid), MergeMode::Streaming);
        assert_eq!(stage_mode(Some(&group), &by_uid_desc), MergeMode::FullMaterialize);
        assert_eq!(stage_mode(Some(&group), &by_sum), MergeMode::FullMaterialize);
        assert_eq!(stage_mode(Some(&Emitted::Single), &by_sum), MergeMode::Streaming);
        assert_eq!(stage_mode(None, &by_sum), MergeMode::Streaming);
    }

    #[test]
    fn no_features_is_batch() {
        let q = spec(&[], vec![ColumnInfo::new(0, "id")]);
        let merger = MergerFactory::create(q.clone(), q).unwrap();
        let shard = |ids: &[i64]| -> BoxedRows {
            Box::new(MemoryRows::new(["id"], ids.iter().map(|i| vec![Value::Int64(*i)]).collect()))
        };
        let rows = merger
            .merge(&MergeContext::new(), vec![shard(&[3, 1]), shard(&[2])])
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(3)], vec![Value::Int64(1)], vec![Value::Int64(2)]]);
    }

    #[test]
    fn group_by_then_order_by_aggregate() {
        let select = vec![
            ColumnInfo::new(0, "uid"),
            ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount"),
        ];
        let mut q = spec(&[Feature::GroupBy, Feature::OrderBy, Feature::Limit], select);
        q.group_by = vec![ColumnInfo::new(0, "uid")];
        q.order_by = vec![ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount").desc()];
        q.limit = 2;

        let shard = |rows: &[(i64, i64)]| -> BoxedRows {
            Box::new(MemoryRows::new(
                ["uid", "SUM(amount)"],
                rows.iter().map(|(u, s)| vec![Value::Int64(*u), Value::Int64(*s)]).collect(),
            ))
        };
        let rows = MergerFactory::create(q.clone(), q)
            .unwrap()
            .merge(
                &MergeContext::new(),
                vec![shard(&[(1, 10), (2, 5), (3, 1)]), shard(&[(2, 50), (3, 30)])],
            )
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int64(2), Value::Int64(55)],
                vec![Value::Int64(3), Value::Int64(31)],
            ]
        );
    }

    fn uid_sum_shard(rows: &[(i64, i64)]) -> BoxedRows {
        Box::new(MemoryRows::new(
            ["uid", "SUM(amount)"],
            rows.iter().map(|(u, s)| vec![Value::Int64(*u), Value::Int64(*s)]).collect(),
        ))
    }

    fn grouped_by_uid(order_by: Vec<ColumnInfo>) -> QuerySpec {
        let mut q = spec(
            &[Feature::GroupBy, Feature::OrderBy],
            vec![
                ColumnInfo::new(0, "uid"),
                ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount"),
            ],
        );
        q.group_by = vec![ColumnInfo::new(0, "uid")];
        q.order_by = order_by;
        q
    }

    fn merge_all(q: QuerySpec, shards: Vec<BoxedRows>) -> Vec<Vec<Value>> {
        MergerFactory::create(q.clone(), q)
            .unwrap()
            .merge(&MergeContext::new(), shards)
            .unwrap()
            .collect_rows()
            .unwrap()
    }

    fn pair(uid: i64, sum: i64) -> Vec<Value> {
        vec![Value::Int64(uid), Value::Int64(sum)]
    }

    #[test]
    fn group_by_over_shards_sorted_by_aggregate() {
        // each shard is sorted by SUM(amount) DESC, not by uid
        let q = grouped_by_uid(vec![ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount").desc()]);
        let rows = merge_all(
            q,
            vec![uid_sum_shard(&[(2, 10), (1, 5)]), uid_sum_shard(&[(1, 50), (2, 1)])],
        );
        assert_eq!(rows, vec![pair(1, 55), pair(2, 11)]);
    }

    #[test]
    fn group_by_over_shards_sorted_by_key_desc() {
        let q = grouped_by_uid(vec![ColumnInfo::new(0, "uid").desc()]);
        let rows = merge_all(
            q,
            vec![uid_sum_shard(&[(3, 1), (1, 1)]), uid_sum_shard(&[(2, 1), (1, 1)])],
        );
        assert_eq!(rows, vec![pair(3, 1), pair(2, 1), pair(1, 2)]);
    }

    #[test]
    fn group_key_follows_order_by_when_it_covers_the_group() {
        let by_uid_desc = grouped_by_uid(vec![ColumnInfo::new(0, "uid").desc()]);
        let factory = MergerFactory::new(by_uid_desc.clone(), by_uid_desc).unwrap();
        let (key, mode) = factory.group_key().unwrap();
        assert_eq!(mode, MergeMode::Streaming);
        assert_eq!(key.orders(), vec![SortOrder::Desc]);

        let by_sum = grouped_by_uid(vec![ColumnInfo::aggregate(1, AggregateFunc::Sum, "amount")]);
        let factory = MergerFactory::new(by_sum.clone(), by_sum).unwrap();
        let (key, mode) = factory.group_key().unwrap();
        assert_eq!(mode, MergeMode::FullMaterialize);
        assert_eq!(key.select_names(), vec!["uid"]);
    }
}
