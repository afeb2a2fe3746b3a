//! Column & sort metadata shared by every merger

use crate::error::{ShardxError, ShardxResult};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregate functions the merge engine can recombine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunc {
    Min,
    Max,
    Sum,
    Count,
    Avg,
}

impl AggregateFunc {
    pub const ALL: [AggregateFunc; 5] = [
        AggregateFunc::Min,
        AggregateFunc::Max,
        AggregateFunc::Sum,
        AggregateFunc::Count,
        AggregateFunc::Avg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Avg => "AVG",
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFunc {
    type Err = ShardxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateFunc::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ShardxError::invalid_spec(format!("unknown aggregate function '{s}'")))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// A projected column of a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Position in the unified SELECT list
    pub index: usize,
    /// Bare column or expression name, never wrapped in an aggregate call
    pub name: String,
    pub aggregate_func: Option<AggregateFunc>,
    pub alias: Option<String>,
    /// Only meaningful when the column is used for sorting
    pub order: SortOrder,
    pub distinct: bool,
}

impl ColumnInfo {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn aggregate(index: usize, func: AggregateFunc, name: impl Into<String>) -> Self {
        Self {
            aggregate_func: Some(func),
            ..Self::new(index, name)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn desc(self) -> Self {
        self.with_order(SortOrder::Desc)
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate_func.is_some()
    }

    /// Name a shard driver reports for this column.
    pub fn select_name(&self) -> String {
        match (&self.alias, self.aggregate_func) {
            (Some(alias), _) if !alias.is_empty() => alias.clone(),
            (_, Some(func)) => format!("{func}({})", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Ordered, duplicate-free list of columns used for comparisons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortColumns {
    columns: Vec<ColumnInfo>,
    positions: AHashMap<String, usize>,
}

impl SortColumns {
    /// Build from columns, rejecting two entries with the same select name.
    pub fn new(columns: impl IntoIterator<Item = ColumnInfo>) -> ShardxResult<Self> {
        let mut sort = SortColumns::default();
        for column in columns {
            let name = column.select_name();
            if sort.positions.contains_key(&name) {
                return Err(ShardxError::DuplicateSortColumn(name));
            }
            sort.push(name, column);
        }
        Ok(sort)
    }

    /// Append a column; a name already present is left as is.
    pub fn add(&mut self, column: ColumnInfo) {
        let name = column.select_name();
        if !self.positions.contains_key(&name) {
            self.push(name, column);
        }
    }

    fn push(&mut self, name: String, column: ColumnInfo) {
        self.positions.insert(name, self.columns.len());
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&ColumnInfo> {
        self.columns.get(i)
    }

    pub fn position(&self, select_name: &str) -> Option<usize> {
        self.positions.get(select_name).copied()
    }

    pub fn contains(&self, select_name: &str) -> bool {
        self.positions.contains_key(select_name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnInfo> {
        self.columns.iter()
    }

    pub fn as_slice(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn orders(&self) -> Vec<SortOrder> {
        self.columns.iter().map(|c| c.order).collect()
    }

    pub fn select_names(&self) -> Vec<String> {
        self.columns.iter().map(ColumnInfo::select_name).collect()
    }
}

impl<'a> IntoIterator for &'a SortColumns {
    type Item = &'a ColumnInfo;
    type IntoIter = std::slice::Iter<'a, ColumnInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
