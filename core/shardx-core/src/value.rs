//! Value model: 샤드 드라이버가 돌려준 셀 값의 표현
//!
//! Drivers hand back either a plain value or a nullable wrapper. Both are
//! normalized into [`Value`] at the row-decoding boundary, so comparison and
//! aggregation never need to know which one the driver used.

use crate::error::{ShardxError, ShardxResult};
use crate::merge::SortOrder;
use std::cmp::Ordering;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Runtime kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Text,
    Bytes,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Bool => "Bool",
            ValueKind::Int8 => "Int8",
            ValueKind::Int16 => "Int16",
            ValueKind::Int32 => "Int32",
            ValueKind::Int64 => "Int64",
            ValueKind::UInt8 => "UInt8",
            ValueKind::UInt16 => "UInt16",
            ValueKind::UInt32 => "UInt32",
            ValueKind::UInt64 => "UInt64",
            ValueKind::Float32 => "Float32",
            ValueKind::Float64 => "Float64",
            ValueKind::Text => "Text",
            ValueKind::Bytes => "Bytes",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            ValueKind::Null | ValueKind::Bool | ValueKind::Text | ValueKind::Bytes
        )
    }

    /// Cross-kind rank, used only when two values have no common comparator.
    fn rank(&self) -> u8 {
        match self {
            ValueKind::Null => 0,
            ValueKind::Bool => 1,
            k if k.is_numeric() => 2,
            ValueKind::Text | ValueKind::Bytes => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int8(_) => ValueKind::Int8,
            Value::Int16(_) => ValueKind::Int16,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt8(_) => ValueKind::UInt8,
            Value::UInt16(_) => ValueKind::UInt16,
            Value::UInt32(_) => ValueKind::UInt32,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of this value, `None` for NULL and non-numeric kinds.
    pub fn as_number(&self) -> Option<Number> {
        Number::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

// ===== Numeric combinators =====

/// Closed numeric domain used by SUM/COUNT/AVG.
///
/// Every integer width (signed or unsigned) fits in `i128`, so one integer
/// arm covers all integer pairs; any float operand promotes to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub fn from_value(value: &Value) -> Option<Self> {
        let n = match value {
            Value::Int8(v) => Number::Int(*v as i128),
            Value::Int16(v) => Number::Int(*v as i128),
            Value::Int32(v) => Number::Int(*v as i128),
            Value::Int64(v) => Number::Int(*v as i128),
            Value::UInt8(v) => Number::Int(*v as i128),
            Value::UInt16(v) => Number::Int(*v as i128),
            Value::UInt32(v) => Number::Int(*v as i128),
            Value::UInt64(v) => Number::Int(*v as i128),
            Value::Float32(v) => Number::Float(*v as f64),
            Value::Float64(v) => Number::Float(*v),
            _ => return None,
        };
        Some(n)
    }

    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(sum) => Number::Int(sum),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.to_f64() + b.to_f64()),
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(v) => v == 0,
            Number::Float(v) => v == 0.0,
        }
    }

    /// Narrow back into a driver-facing value.
    ///
    /// Integers become `Int64`, or `UInt64` when every input was unsigned
    /// (or the sum only fits unsigned); anything wider becomes `Float64`.
    pub fn into_value(self, unsigned: bool) -> Value {
        match self {
            Number::Float(v) => Value::Float64(v),
            Number::Int(v) => {
                if unsigned && let Ok(u) = u64::try_from(v) {
                    return Value::UInt64(u);
                }
                if let Ok(i) = i64::try_from(v) {
                    Value::Int64(i)
                } else if let Ok(u) = u64::try_from(v) {
                    Value::UInt64(u)
                } else {
                    Value::Float64(v as f64)
                }
            }
        }
    }
}

fn is_unsigned(kind: ValueKind) -> bool {
    matches!(
        kind,
        ValueKind::UInt8 | ValueKind::UInt16 | ValueKind::UInt32 | ValueKind::UInt64
    )
}

/// Sum non-NULL numeric values.
///
/// Returns `Ok(None)` when there is nothing informative to add. `func` only
/// labels the error for a non-numeric value.
pub fn sum_values<'a, I>(values: I, func: &str) -> ShardxResult<Option<Value>>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut acc: Option<Number> = None;
    let mut unsigned = true;
    for value in values {
        if value.is_null() {
            continue;
        }
        let n = Number::from_value(value).ok_or_else(|| ShardxError::AggregateFunctionNotFound {
            func: func.to_string(),
            kind: value.kind().to_string(),
        })?;
        unsigned &= is_unsigned(value.kind());
        acc = Some(match acc {
            Some(a) => a.add(n),
            None => n,
        });
    }
    Ok(acc.map(|n| n.into_value(unsigned)))
}

// ===== Comparison =====

/// Compare two values, `None` when their kinds share no comparator.
///
/// NULL sorts below every non-NULL value; two NULLs are equal.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Bytes(y)) => Some(x.as_bytes().cmp(y.as_slice())),
        (Value::Bytes(x), Value::Text(y)) => Some(x.as_slice().cmp(y.as_bytes())),
        _ => match (Number::from_value(a)?, Number::from_value(b)?) {
            (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
            (x, y) => Some(x.to_f64().total_cmp(&y.to_f64())),
        },
    }
}

/// Total comparison under a sort direction, used by the merge heap.
///
/// Incomparable kinds fall back to a fixed kind rank so the heap stays
/// consistent; the rewriter never produces mixed kinds in one column.
pub fn compare_with_order(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    let ord = compare_values(a, b).unwrap_or_else(|| a.kind().rank().cmp(&b.kind().rank()));
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// Lexicographic comparison of two key tuples.
pub fn compare_keys(a: &[Value], b: &[Value], orders: &[SortOrder]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(orders) {
        match compare_with_order(x, y, *order) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

// ===== Conversions =====

/// Conversion from a cell value into a Rust type, the typed half of `scan`.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> ShardxResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> ShardxError {
    ShardxError::TypeMismatch {
        expected: expected.to_string(),
        actual: value.kind().to_string(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        match Number::from_value(value) {
            Some(Number::Int(v)) => i64::try_from(v).map_err(|_| mismatch("Int64", value)),
            _ => Err(mismatch("Int64", value)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        match Number::from_value(value) {
            Some(Number::Int(v)) => u64::try_from(v).map_err(|_| mismatch("UInt64", value)),
            _ => Err(mismatch("UInt64", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        Number::from_value(value)
            .map(Number::to_f64)
            .ok_or_else(|| mismatch("Float64", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => match Number::from_value(other) {
                Some(n) => Ok(!n.is_zero()),
                None => Err(mismatch("Bool", value)),
            },
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        match value {
            Value::Null => Err(mismatch("Text", value)),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| mismatch("Text", value)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> ShardxResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

macro_rules! impl_from_native {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    Vec<u8> => Bytes,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
