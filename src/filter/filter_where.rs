use serde_json::Value;

use super::error::FilterError;
use super::types::{is_valid_identifier, ColumnKind, FilterOp, FilterWhereInfo, FilterWhereOptions};

/// Maximum nesting of `$and` / `$or` / `$not`
const MAX_DEPTH: usize = 6;

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<FilterWhereInfo>,
    depth: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
            depth: 0,
        }
    }

    pub fn generate(
        where_data: &Value,
        starting_param_index: usize,
        options: &FilterWhereOptions,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_data, options)
    }

    fn generate_nested(
        where_data: &Value,
        starting_param_index: usize,
        depth: usize,
    ) -> Result<(String, Vec<Value>), FilterError> {
        if depth > MAX_DEPTH {
            return Err(FilterError::InvalidWhereClause(format!(
                "Logical operators nested deeper than {}",
                MAX_DEPTH
            )));
        }
        let mut filter_where = Self::new(starting_param_index);
        filter_where.depth = depth;
        filter_where.build(where_data, &FilterWhereOptions::nested())
    }

    pub fn generate_empty(options: &FilterWhereOptions) -> (String, Vec<Value>) {
        match Self::soft_delete_condition(options) {
            Some(condition) => (condition, vec![]),
            None => ("1=1".to_string(), vec![]),
        }
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn soft_delete_condition(options: &FilterWhereOptions) -> Option<String> {
        if options.soft_delete && !options.include_deleted {
            Some("\"deleted_at\" IS NULL".to_string())
        } else {
            None
        }
    }

    fn build(&mut self, where_data: &Value, options: &FilterWhereOptions) -> Result<(String, Vec<Value>), FilterError> {
        self.param_values.clear();
        self.conditions.clear();

        self.parse_where_data(where_data)?;

        let mut sql_conditions = vec![];
        if let Some(condition) = Self::soft_delete_condition(options) {
            sql_conditions.push(condition);
        }
        let conditions_snapshot = self.conditions.clone();
        for condition in &conditions_snapshot {
            sql_conditions.push(self.build_sql_condition(condition)?);
        }
        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, self.param_values.clone()))
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        self.parse_logical_operator(key, value)?;
                    } else {
                        self.parse_field_condition(key, value)?;
                    }
                }
                Ok(())
            }
            _ => Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    // Empty $or matches nothing, empty $and matches everything
                    let sql = if op == "$or" { "1=0" } else { "1=1" };
                    self.push_raw(sql.to_string());
                    return Ok(());
                }
                let mut sql_parts = Vec::new();
                for v in arr {
                    let (sql, params) = Self::generate_nested(v, self.param_index, self.depth + 1)?;
                    self.param_index += params.len();
                    self.param_values.extend(params);
                    sql_parts.push(format!("({})", sql));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                self.push_raw(format!("({})", sql_parts.join(joiner)));
                Ok(())
            }
            "$not" => {
                let (sql, params) = Self::generate_nested(value, self.param_index, self.depth + 1)?;
                self.param_index += params.len();
                self.param_values.extend(params);
                self.push_raw(format!("NOT ({})", sql));
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn push_raw(&mut self, sql: String) {
        self.conditions.push(FilterWhereInfo { column: sql, operator: FilterOp::Raw, data: Value::Null });
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = Self::map_operator(op_key)?;
                self.conditions.push(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() });
            }
        } else {
            // Implicit equality: { field: value }
            self.conditions.push(FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() });
        }
        Ok(())
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Neq,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$nilike" => FilterOp::NILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$null" => FilterOp::Null,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        if condition.operator == FilterOp::Raw {
            return Ok(condition.column.clone());
        }

        let quoted_column = format!("\"{}\"", condition.column);
        let kind = ColumnKind::of(&condition.column);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", quoted_column)) }
                else { Ok(format!("{} = {}", quoted_column, self.typed_param(kind, data, "$eq")?)) }
            }
            FilterOp::Neq => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} <> {}", quoted_column, self.typed_param(kind, data, "$ne")?)) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.typed_param(kind, data, "$gt")?)),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.typed_param(kind, data, "$gte")?)),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.typed_param(kind, data, "$lt")?)),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.typed_param(kind, data, "$lte")?)),
            FilterOp::Like => Ok(format!("{} LIKE {}", quoted_column, self.pattern_param(kind, data, "$like")?)),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", quoted_column, self.pattern_param(kind, data, "$ilike")?)),
            FilterOp::NILike => Ok(format!("{} NOT ILIKE {}", quoted_column, self.pattern_param(kind, data, "$nilike")?)),
            FilterOp::In | FilterOp::NIn => {
                let negate = condition.operator == FilterOp::NIn;
                let values = match data {
                    Value::Array(values) => values.clone(),
                    other => vec![other.clone()],
                };
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let op = if negate { "$nin" } else { "$in" };
                let params = values
                    .iter()
                    .map(|v| self.typed_param(kind, v, op))
                    .collect::<Result<Vec<_>, _>>()?;
                let keyword = if negate { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", quoted_column, keyword, params.join(", ")))
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => {
                    let low = self.typed_param(kind, &values[0], "$between")?;
                    let high = self.typed_param(kind, &values[1], "$between")?;
                    Ok(format!("{} BETWEEN {} AND {}", quoted_column, low, high))
                }
                _ => Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
            FilterOp::Null => match data {
                Value::Bool(true) => Ok(format!("{} IS NULL", quoted_column)),
                Value::Bool(false) => Ok(format!("{} IS NOT NULL", quoted_column)),
                _ => Err(FilterError::InvalidOperatorData("$null requires a boolean".to_string())),
            },
            FilterOp::Raw => unreachable!("raw conditions handled above"),
        }
    }

    /// Scalar operand, cast to the column's type when the column name says what it is
    fn typed_param(&mut self, kind: ColumnKind, value: &Value, op: &str) -> Result<String, FilterError> {
        if matches!(value, Value::Array(_) | Value::Object(_) | Value::Null) {
            return Err(FilterError::InvalidOperatorData(format!("{} requires a scalar value", op)));
        }
        if !kind.accepts(value) {
            return Err(FilterError::InvalidOperatorData(format!("{} got {} for a {:?} column", op, value, kind)));
        }
        Ok(format!("{}{}", self.param(value.clone()), kind.cast()))
    }

    fn pattern_param(&mut self, kind: ColumnKind, value: &Value, op: &str) -> Result<String, FilterError> {
        match (kind, value) {
            (ColumnKind::Other, Value::String(_)) => Ok(self.param(value.clone())),
            (ColumnKind::Other, _) => Err(FilterError::InvalidOperatorData(format!("{} requires a string pattern", op))),
            _ => Err(FilterError::InvalidOperatorData(format!("{} only applies to text columns", op))),
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality_with_soft_delete() {
        let (sql, params) = FilterWhere::generate(&json!({"author_username": "alice"}), 0, &FilterWhereOptions::default()).unwrap();
        assert_eq!(sql, "\"deleted_at\" IS NULL AND \"author_username\" = $1");
        assert_eq!(params, vec![json!("alice")]);
    }

    #[test]
    fn nested_or_continues_parameter_numbering() {
        let where_data = json!({
            "category_slug": "c1",
            "$or": [
                {"title": {"$ilike": "%rust%"}},
                {"body": {"$ilike": "%rust%"}}
            ]
        });
        let options = FilterWhereOptions { soft_delete: false, include_deleted: false };
        let (sql, params) = FilterWhere::generate(&where_data, 0, &options).unwrap();
        // serde_json maps iterate keys in sorted order, so "$or" is parsed first
        assert!(sql.contains("((\"title\" ILIKE $1) OR (\"body\" ILIKE $2))"), "{}", sql);
        assert!(sql.contains("\"category_slug\" = $3"), "{}", sql);
        assert!(!sql.contains("deleted_at"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) = FilterWhere::generate(&json!({"id": {"$in": []}}), 0, &FilterWhereOptions::nested()).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_injected_column_names() {
        let err = FilterWhere::generate(&json!({"title\" OR 1=1 --": "x"}), 0, &FilterWhereOptions::default());
        assert!(matches!(err, Err(FilterError::InvalidColumn(_))));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = FilterWhere::generate(&json!({"title": {"$regex": "x"}}), 0, &FilterWhereOptions::default());
        assert!(matches!(err, Err(FilterError::UnsupportedOperator(_))));
    }

    #[test]
    fn not_and_null_operators() {
        let where_data = json!({"$not": {"is_pinned": true}, "parent_id": {"$null": true}});
        let (sql, params) = FilterWhere::generate(&where_data, 0, &FilterWhereOptions::nested()).unwrap();
        assert!(sql.contains("NOT (\"is_pinned\" = $1)"), "{}", sql);
        assert!(sql.contains("\"parent_id\" IS NULL"), "{}", sql);
        assert_eq!(params, vec![json!(true)]);
    }

    #[test]
    fn typed_columns_get_casts() {
        let id = "6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11";
        let where_data = json!({"author_id": id, "created_at": {"$gte": "2024-01-01"}});
        let (sql, params) = FilterWhere::generate(&where_data, 0, &FilterWhereOptions::nested()).unwrap();
        assert!(sql.contains("\"author_id\" = $1::uuid"), "{}", sql);
        assert!(sql.contains("\"created_at\" >= $2::timestamptz"), "{}", sql);
        assert_eq!(params, vec![json!(id), json!("2024-01-01")]);
    }

    #[test]
    fn uuid_looking_text_stays_text() {
        let id = "6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11";
        let (sql, _) = FilterWhere::generate(&json!({"title": id}), 0, &FilterWhereOptions::nested()).unwrap();
        assert_eq!(sql, "\"title\" = $1");
    }

    #[test]
    fn malformed_typed_operands_are_rejected() {
        let options = FilterWhereOptions::nested();
        for where_data in [
            json!({"author_id": "abc"}),
            json!({"created_at": {"$gt": "last week"}}),
            json!({"id": {"$in": ["6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11", 3]}}),
            json!({"author_id": {"$ilike": "%6f%"}}),
        ] {
            let err = FilterWhere::generate(&where_data, 0, &options);
            assert!(matches!(err, Err(FilterError::InvalidOperatorData(_))), "{}", where_data);
        }
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut where_data = json!({"title": "x"});
        for _ in 0..10 {
            where_data = json!({"$not": where_data});
        }
        assert!(FilterWhere::generate(&where_data, 0, &FilterWhereOptions::default()).is_err());
    }
}
