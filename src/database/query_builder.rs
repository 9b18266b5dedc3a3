use std::time::{Duration, Instant};

use serde_json::Value;
use sqlx::{self, postgres::PgArguments, FromRow, PgPool, Row};

use crate::config;
use crate::database::manager::DatabaseError;
use crate::filter::types::SqlResult;
use crate::filter::{Filter, FilterData};

pub struct QueryBuilder<T> {
    filter: Filter,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> QueryBuilder<T>
where
    T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    pub fn new(table_name: impl Into<String>) -> Result<Self, DatabaseError> {
        let filter = Filter::new(table_name)?;
        Ok(Self {
            filter,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn filter(mut self, filter_data: FilterData) -> Result<Self, DatabaseError> {
        self.filter.assign(filter_data)?;
        Ok(self)
    }

    /// Direct access for callers that need to add server-side conditions
    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }

    pub async fn select_all(self, pool: &PgPool) -> Result<Vec<T>, DatabaseError> {
        let sql_result = self.filter.to_sql()?;
        tracing::debug!("select_all: {}", sql_result.query);
        let mut q = sqlx::query_as::<_, T>(&sql_result.query);
        for p in sql_result.params.iter() {
            q = bind_param_query_as(q, p);
        }
        let started = Instant::now();
        let rows = q.fetch_all(pool).await?;
        log_if_slow(&sql_result, started.elapsed());
        Ok(rows)
    }

    pub async fn count(self, pool: &PgPool) -> Result<i64, DatabaseError> {
        let sql_result = self.filter.to_count_sql()?;
        let mut q = sqlx::query(&sql_result.query);
        for p in sql_result.params.iter() {
            q = bind_param_query(q, p);
        }
        let started = Instant::now();
        let row = q.fetch_one(pool).await?;
        log_if_slow(&sql_result, started.elapsed());
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }
}

fn is_slow(elapsed: Duration, threshold_ms: u64) -> bool {
    elapsed.as_millis() >= u128::from(threshold_ms)
}

fn log_if_slow(sql_result: &SqlResult, elapsed: Duration) {
    let threshold_ms = config::config().database.slow_query_threshold_ms;
    if is_slow(elapsed, threshold_ms) {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            threshold_ms,
            params = sql_result.params.len(),
            "slow query: {}",
            sql_result.query
        );
    }
}

/// How a JSON filter value is sent to Postgres. Strings always go as text;
/// FilterWhere adds a `::uuid` or `::timestamptz` cast where the column needs one.
#[derive(Debug, PartialEq)]
pub(crate) enum BindValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'a str),
    Json(&'a Value),
}

pub(crate) fn classify(v: &Value) -> BindValue<'_> {
    match v {
        Value::Null => BindValue::Null,
        Value::Bool(b) => BindValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BindValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                BindValue::Float(f)
            } else {
                BindValue::Json(v)
            }
        }
        Value::String(s) => BindValue::Text(s),
        // Arrays are expanded by FilterWhere before binding
        Value::Array(_) | Value::Object(_) => BindValue::Json(v),
    }
}

fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match classify(v) {
        BindValue::Null => q.bind(None::<String>),
        BindValue::Bool(b) => q.bind(b),
        BindValue::Int(i) => q.bind(i),
        BindValue::Float(f) => q.bind(f),
        BindValue::Text(s) => q.bind(s),
        BindValue::Json(j) => q.bind(j),
    }
}

fn bind_param_query_as<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>,
    v: &'q Value,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match classify(v) {
        BindValue::Null => q.bind(None::<String>),
        BindValue::Bool(b) => q.bind(b),
        BindValue::Int(i) => q.bind(i),
        BindValue::Float(f) => q.bind(f),
        BindValue::Text(s) => q.bind(s),
        BindValue::Json(j) => q.bind(j),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_bind_as_text() {
        let id = json!("6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11");
        assert_eq!(classify(&id), BindValue::Text("6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11"));

        let ts = json!("2024-05-01T12:00:00Z");
        assert_eq!(classify(&ts), BindValue::Text("2024-05-01T12:00:00Z"));

        let text = json!("%rust%");
        assert_eq!(classify(&text), BindValue::Text("%rust%"));
    }

    #[test]
    fn classifies_scalars() {
        assert_eq!(classify(&json!(null)), BindValue::Null);
        assert_eq!(classify(&json!(true)), BindValue::Bool(true));
        assert_eq!(classify(&json!(42)), BindValue::Int(42));
        assert_eq!(classify(&json!(1.5)), BindValue::Float(1.5));
    }

    #[test]
    fn slow_threshold_is_inclusive() {
        assert!(is_slow(Duration::from_millis(100), 100));
        assert!(is_slow(Duration::from_millis(250), 100));
        assert!(!is_slow(Duration::from_millis(99), 100));
    }
}
