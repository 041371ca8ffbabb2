use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{is_valid_identifier, FilterOp, LogicalOp};

/// Compiles the JSON where-language into a parameterised SQL condition
pub struct FilterWhere {
    param_values: Vec<Value>,
    starting_param_index: usize,
    max_depth: u32,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize, max_depth: u32) -> Self {
        Self {
            param_values: vec![],
            starting_param_index,
            max_depth,
        }
    }

    /// Returns the condition and its bind values; placeholders start at
    /// `$starting_param_index + 1`
    pub fn generate(
        where_data: &Value,
        starting_param_index: usize,
        max_depth: u32,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index, max_depth);
        let sql = filter_where.build_clause(where_data, 0)?;
        Ok((sql, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            Value::String(_) => Err(FilterError::InvalidWhereClause(
                "Raw SQL WHERE clauses are not supported".to_string(),
            )),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build_clause(&mut self, where_data: &Value, depth: u32) -> Result<String, FilterError> {
        if depth > self.max_depth {
            return Err(FilterError::TooDeep(self.max_depth));
        }
        Self::validate(where_data)?;

        let Value::Object(obj) = where_data else {
            return Ok("1=1".to_string());
        };

        let mut parts = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                parts.push(self.build_logical(key, value, depth)?);
            } else {
                parts.extend(self.build_field(key, value)?);
            }
        }

        Ok(if parts.is_empty() { "1=1".to_string() } else { parts.join(" AND ") })
    }

    fn build_logical(&mut self, op: &str, value: &Value, depth: u32) -> Result<String, FilterError> {
        match LogicalOp::parse(op)? {
            logical @ (LogicalOp::And | LogicalOp::Or) => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if logical == LogicalOp::And { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build_clause(v, depth + 1)?));
                }
                let joiner = if logical == LogicalOp::And { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            LogicalOp::Not => Ok(format!("NOT ({})", self.build_clause(value, depth + 1)?)),
        }
    }

    fn build_field(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        match operator_map(value) {
            Some(ops) => {
                let mut out = Vec::with_capacity(ops.len());
                for (op_key, op_val) in ops {
                    out.push(self.build_condition(field, FilterOp::parse(op_key)?, op_val)?);
                }
                Ok(out)
            }
            // Implicit equality: { field: value }
            None => Ok(vec![self.build_condition(field, FilterOp::Eq, value)?]),
        }
    }

    fn build_condition(&mut self, field: &str, op: FilterOp, data: &Value) -> Result<String, FilterError> {
        let col = format!("\"{}\"", field);
        Ok(match op {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", col),
            FilterOp::Eq => format!("{} = {}", col, self.param(data)),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", col),
            FilterOp::Ne => format!("{} <> {}", col, self.param(data)),
            FilterOp::Gt => format!("{} > {}", col, self.param(data)),
            FilterOp::Gte => format!("{} >= {}", col, self.param(data)),
            FilterOp::Lt => format!("{} < {}", col, self.param(data)),
            FilterOp::Lte => format!("{} <= {}", col, self.param(data)),
            FilterOp::Like => format!("{} LIKE {}", col, self.param(data)),
            FilterOp::ILike => format!("{} ILIKE {}", col, self.param(data)),
            FilterOp::In | FilterOp::NIn => {
                let values = match data {
                    Value::Array(values) => values.as_slice(),
                    single => std::slice::from_ref(single),
                };
                if values.is_empty() {
                    return Ok(if op == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let params: Vec<String> = values.iter().map(|v| self.param(v)).collect();
                let keyword = if op == FilterOp::In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", col, keyword, params.join(", "))
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => {
                    let low = self.param(&values[0]);
                    let high = self.param(&values[1]);
                    format!("{} BETWEEN {} AND {}", col, low, high)
                }
                _ => {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires array with 2 values".to_string(),
                    ))
                }
            },
        })
    }

    fn param(&mut self, value: &Value) -> String {
        self.param_values.push(value.clone());
        format!("${}", self.starting_param_index + self.param_values.len())
    }
}

/// `{ "$gt": 1, "$lt": 5 }` is an operator map; any other object is a literal
pub(crate) fn operator_map(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => Some(obj),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gen(v: Value) -> (String, Vec<Value>) {
        FilterWhere::generate(&v, 0, 10).unwrap()
    }

    #[test]
    fn implicit_equality_and_null() {
        assert_eq!(gen(json!({ "status": "open" })), ("\"status\" = $1".to_string(), vec![json!("open")]));
        assert_eq!(gen(json!({ "paid_date": null })).0, "\"paid_date\" IS NULL");
        assert_eq!(gen(json!({ "paid_date": { "$ne": null } })).0, "\"paid_date\" IS NOT NULL");
    }

    #[test]
    fn nested_logical_operators_number_params_consecutively() {
        let (sql, params) = gen(json!({
            "$or": [
                { "status": "open" },
                { "$and": [ { "priority": { "$gte": 3 } }, { "city": "Leeds" } ] }
            ]
        }));
        assert_eq!(sql, "((\"status\" = $1) OR (((\"priority\" >= $2) AND (\"city\" = $3))))");
        assert_eq!(params, vec![json!("open"), json!(3), json!("Leeds")]);
    }

    #[test]
    fn starting_index_offsets_placeholders() {
        let (sql, _) = FilterWhere::generate(&json!({ "a": 1, "b": 2 }), 4, 10).unwrap();
        assert_eq!(sql, "\"a\" = $5 AND \"b\" = $6");
    }

    #[test]
    fn in_and_nin() {
        assert_eq!(gen(json!({ "id": { "$in": [] } })).0, "1=0");
        assert_eq!(gen(json!({ "id": { "$nin": [] } })).0, "1=1");
        assert_eq!(gen(json!({ "id": { "$in": ["a", "b"] } })).0, "\"id\" IN ($1, $2)");
        assert_eq!(gen(json!({ "id": { "$nin": ["a"] } })).0, "\"id\" NOT IN ($1)");
    }

    #[test]
    fn between_and_not() {
        assert_eq!(
            gen(json!({ "amount": { "$between": [10, 20] } })).0,
            "\"amount\" BETWEEN $1 AND $2"
        );
        assert_eq!(gen(json!({ "$not": { "status": "void" } })).0, "NOT (\"status\" = $1)");
        assert!(FilterWhere::generate(&json!({ "amount": { "$between": [1] } }), 0, 10).is_err());
    }

    #[test]
    fn rejects_raw_sql_and_bad_columns() {
        assert!(matches!(
            FilterWhere::generate(&json!("1=1 OR 1=1"), 0, 10),
            Err(FilterError::InvalidWhereClause(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({ "name\"; --": 1 }), 0, 10),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({ "name": { "$regex": "x" } }), 0, 10),
            Err(FilterError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn enforces_max_depth() {
        let deep = json!({ "$not": { "$not": { "$not": { "a": 1 } } } });
        assert!(matches!(FilterWhere::generate(&deep, 0, 2), Err(FilterError::TooDeep(2))));
        assert!(FilterWhere::generate(&deep, 0, 3).is_ok());
    }
}
