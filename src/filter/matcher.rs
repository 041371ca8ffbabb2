// In-memory evaluation of the where-language, for stores that do not speak SQL.
// Semantics follow the SQL generator: implicit equality, IS NULL for null,
// empty $in matches nothing, empty $nin matches everything.

use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_where::{operator_map, FilterWhere};
use super::types::{FilterOp, FilterOrderInfo, LogicalOp, SortDirection};
use crate::database::record::Record;

pub fn matches(where_data: &Value, record: &Record) -> Result<bool, FilterError> {
    FilterWhere::validate(where_data)?;
    let Value::Object(obj) = where_data else {
        return Ok(true);
    };

    for (key, value) in obj {
        let ok = if key.starts_with('$') {
            matches_logical(LogicalOp::parse(key)?, key, value, record)?
        } else {
            matches_field(key, value, record)?
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_logical(op: LogicalOp, key: &str, value: &Value, record: &Record) -> Result<bool, FilterError> {
    match op {
        LogicalOp::And | LogicalOp::Or => {
            let arr = value
                .as_array()
                .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", key)))?;
            let mut results = Vec::with_capacity(arr.len());
            for v in arr {
                results.push(matches(v, record)?);
            }
            Ok(if op == LogicalOp::And {
                results.into_iter().all(|r| r)
            } else {
                results.into_iter().any(|r| r)
            })
        }
        LogicalOp::Not => Ok(!matches(value, record)?),
    }
}

fn matches_field(field: &str, value: &Value, record: &Record) -> Result<bool, FilterError> {
    let actual = record.get(field).unwrap_or(&Value::Null);
    match operator_map(value) {
        Some(ops) => {
            for (op_key, op_val) in ops {
                if !apply_op(FilterOp::parse(op_key)?, actual, op_val)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        None => apply_op(FilterOp::Eq, actual, value),
    }
}

fn apply_op(op: FilterOp, actual: &Value, expected: &Value) -> Result<bool, FilterError> {
    Ok(match op {
        FilterOp::Eq => loose_eq(actual, expected),
        FilterOp::Ne if expected.is_null() => !actual.is_null(),
        // SQL `<>` is never true against NULL
        FilterOp::Ne => !actual.is_null() && !loose_eq(actual, expected),
        FilterOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like => like(actual, expected, false),
        FilterOp::ILike => like(actual, expected, true),
        FilterOp::In => as_list(expected).iter().any(|v| loose_eq(actual, v)),
        FilterOp::NIn => !as_list(expected).iter().any(|v| loose_eq(actual, v)),
        FilterOp::Between => match expected {
            Value::Array(bounds) if bounds.len() == 2 => {
                matches!(compare(actual, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(actual, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
            }
            _ => {
                return Err(FilterError::InvalidOperatorData(
                    "$between requires array with 2 values".to_string(),
                ))
            }
        },
    })
}

fn as_list(value: &Value) -> &[Value] {
    match value {
        Value::Array(values) => values.as_slice(),
        single => std::slice::from_ref(single),
    }
}

/// Equality that treats a number and its decimal string as the same value,
/// matching how identifiers arrive from query strings and tokens
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => n.to_string() == *s,
        _ => a == b,
    }
}

/// Ordering for scalar values; `None` when incomparable (including null)
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::String(text), Value::String(pattern)) = (actual, pattern) else {
        return false;
    };
    if case_insensitive {
        like_match(&text.to_lowercase(), &pattern.to_lowercase())
    } else {
        like_match(text, pattern)
    }
}

/// SQL LIKE: `%` is any run, `_` is one character
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((bp, bt)) = backtrack {
            pi = bp + 1;
            ti = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '%')
}

/// Sort records by the parsed order spec; nulls sort last in either direction
pub fn sort_records(records: &mut [Record], order: &[FilterOrderInfo]) {
    if order.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for info in order {
            let av = a.get(&info.column).unwrap_or(&Value::Null);
            let bv = b.get(&info.column).unwrap_or(&Value::Null);
            let ord = match (av.is_null(), bv.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => compare(av, bv).unwrap_or(Ordering::Equal),
            };
            let ord = if info.sort == SortDirection::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
