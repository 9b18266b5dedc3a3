use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{is_valid_identifier, FilterData, FilterOrderInfo, FilterWhereOptions, SqlResult};

impl FilterData {
    /// Whether `column` appears anywhere in the where clause (including inside
    /// `$and`/`$or`/`$not`) or the order. Select lists are not consulted.
    pub fn references(&self, column: &str) -> bool {
        let in_where = self.where_clause.as_ref().is_some_and(|w| where_references(w, column));
        let in_order = self
            .order
            .as_ref()
            .and_then(|o| FilterOrder::validate_and_parse(o).ok())
            .is_some_and(|infos| infos.iter().any(|info| info.column == column));
        in_where || in_order
    }
}

fn where_references(where_data: &Value, column: &str) -> bool {
    match where_data {
        Value::Object(obj) => obj.iter().any(|(key, value)| {
            if key.starts_with('$') {
                where_references(value, column)
            } else {
                key == column
            }
        }),
        Value::Array(items) => items.iter().any(|item| where_references(item, column)),
        _ => false,
    }
}

pub struct Filter {
    table_name: String,
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
    options: FilterWhereOptions,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(table_name));
        }
        Ok(Self {
            table_name,
            select_columns: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
            options: FilterWhereOptions::default(),
        })
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select { self.select(select)?; }
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        if let Some(limit) = data.limit { self.limit(limit, data.offset)?; }
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        for column in &columns {
            if column != "*" && !is_valid_identifier(column) {
                return Err(FilterError::InvalidColumn(column.clone()));
            }
        }
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    /// AND an extra condition onto whatever the client supplied
    pub fn and_where(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        let combined = match self.where_data.take() {
            Some(existing) if !existing.is_null() => serde_json::json!({ "$and": [existing, conditions] }),
            _ => conditions,
        };
        self.where_data = Some(combined);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 {
            return Err(FilterError::InvalidLimit(limit.to_string()));
        }
        if let Some(off) = offset.filter(|o| *o < 0) {
            return Err(FilterError::InvalidOffset(off.to_string()));
        }

        // Apply max page size from config
        let max_limit = crate::config::config().api.max_page_size;
        let applied_limit = if limit > max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            max_limit
        } else {
            limit
        };

        self.limit = Some(applied_limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn include_deleted(&mut self, include: bool) -> &mut Self {
        self.options.include_deleted = include;
        self
    }

    /// For tables without a `deleted_at` column
    pub fn without_soft_delete(&mut self) -> &mut Self {
        self.options.soft_delete = false;
        self
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let select_clause = self.build_select_clause();
        let where_result = self.to_where_sql()?;
        let order_clause = FilterOrder::generate(&self.order_data);
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT {}", select_clause),
            format!("FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_result.query),
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = if let Some(ref where_data) = self.where_data {
            FilterWhere::generate(where_data, 0, &self.options)?
        } else {
            FilterWhere::generate_empty(&self.options)
        };
        Ok(SqlResult { query: where_clause, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = format!(
            "SELECT COUNT(*) AS count FROM \"{}\" WHERE {}",
            self.table_name, where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    fn build_select_clause(&self) -> String {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            "*".to_string()
        } else {
            self.select_columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ")
        }
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_select_statement() {
        let mut filter = Filter::new("post_summaries").unwrap();
        filter
            .assign(FilterData {
                where_clause: Some(json!({"category_slug": "general"})),
                order: Some(json!("is_pinned desc, created_at desc")),
                limit: Some(20),
                offset: Some(40),
                ..Default::default()
            })
            .unwrap();
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT * FROM \"post_summaries\" WHERE \"deleted_at\" IS NULL AND \"category_slug\" = $1 \
             ORDER BY \"is_pinned\" DESC, \"created_at\" DESC LIMIT 20 OFFSET 40"
        );
        assert_eq!(sql.params, vec![json!("general")]);
    }

    #[test]
    fn limit_is_capped_by_config() {
        let mut filter = Filter::new("posts").unwrap();
        filter.limit(1_000_000, None).unwrap();
        let sql = filter.to_sql().unwrap();
        let max = crate::config::config().api.max_page_size;
        assert!(sql.query.ends_with(&format!("LIMIT {}", max)), "{}", sql.query);
    }

    #[test]
    fn and_where_combines_clauses() {
        let mut filter = Filter::new("posts").unwrap();
        filter.where_clause(json!({"title": {"$ilike": "%x%"}})).unwrap();
        filter.and_where(json!({"author_id": "6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11"})).unwrap();
        let sql = filter.to_where_sql().unwrap();
        assert_eq!(sql.query, "\"deleted_at\" IS NULL AND ((\"title\" ILIKE $1) AND (\"author_id\" = $2::uuid))");
    }

    #[test]
    fn include_deleted_drops_the_live_row_condition() {
        let mut filter = Filter::new("users").unwrap();
        filter.where_clause(json!({"username": "alice"})).unwrap();
        filter.include_deleted(true);
        let sql = filter.to_where_sql().unwrap();
        assert_eq!(sql.query, "\"username\" = $1");
    }

    #[test]
    fn references_finds_nested_and_ordered_columns() {
        let nested = FilterData {
            where_clause: Some(json!({"$or": [{"username": "a"}, {"$not": {"password_hash": {"$like": "$2b$%"}}}]})),
            ..Default::default()
        };
        assert!(nested.references("password_hash"));
        assert!(!nested.references("email"));

        let ordered = FilterData { order: Some(json!(["created_at desc", "password_hash"])), ..Default::default() };
        assert!(ordered.references("password_hash"));

        // Operator keys and values are not columns
        let values = FilterData { where_clause: Some(json!({"bio": {"$eq": "password_hash"}})), ..Default::default() };
        assert!(!values.references("password_hash"));
    }

    #[test]
    fn count_without_soft_delete() {
        let mut filter = Filter::new("roles").unwrap();
        filter.without_soft_delete();
        let sql = filter.to_count_sql().unwrap();
        assert_eq!(sql.query, "SELECT COUNT(*) AS count FROM \"roles\" WHERE 1=1");
    }

    #[test]
    fn rejects_invalid_table_and_negative_limit() {
        assert!(Filter::new("posts; drop table users").is_err());
        let mut filter = Filter::new("posts").unwrap();
        assert!(filter.limit(-1, None).is_err());
        assert!(filter.limit(10, Some(-5)).is_err());
    }
}
