use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    NILike,
    In,
    NIn,
    Between,
    Null,
    /// Pre-rendered SQL fragment produced by logical operators
    Raw,
}

/// Client-facing filter document, e.g. `{"where": {"author_id": "..."}, "order": "created_at desc", "limit": 20}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub select: Option<Vec<String>>,
    #[serde(rename = "where", alias = "where_clause")]
    pub where_clause: Option<serde_json::Value>,
    pub order: Option<serde_json::Value>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterWhereOptions {
    /// Table has a `deleted_at` column
    pub soft_delete: bool,
    pub include_deleted: bool,
}

impl Default for FilterWhereOptions {
    fn default() -> Self {
        Self {
            soft_delete: true,
            include_deleted: false,
        }
    }
}

impl FilterWhereOptions {
    /// Options for nested clauses: soft-delete handling belongs to the outermost clause only
    pub fn nested() -> Self {
        Self {
            soft_delete: false,
            include_deleted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// Column type read off the schema's naming convention: `id` and `*_id` are
/// uuid, `*_at` and `*_until` are timestamptz. Everything else is bound as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Timestamp,
    Other,
}

impl ColumnKind {
    pub fn of(column: &str) -> Self {
        if column == "id" || column.ends_with("_id") {
            ColumnKind::Uuid
        } else if column.ends_with("_at") || column.ends_with("_until") {
            ColumnKind::Timestamp
        } else {
            ColumnKind::Other
        }
    }

    /// Placeholder cast; parameters are sent as text, Postgres converts them
    pub fn cast(self) -> &'static str {
        match self {
            ColumnKind::Uuid => "::uuid",
            ColumnKind::Timestamp => "::timestamptz",
            ColumnKind::Other => "",
        }
    }

    /// Operands are checked here so a bad value is a 400, not a failed cast in Postgres
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match (self, value) {
            (ColumnKind::Other, _) => true,
            (ColumnKind::Uuid, serde_json::Value::String(s)) => uuid::Uuid::parse_str(s).is_ok(),
            (ColumnKind::Timestamp, serde_json::Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<serde_json::Value>,
}

/// Identifiers are interpolated into SQL, so only plain snake_case names pass.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_kinds_follow_naming() {
        assert_eq!(ColumnKind::of("id"), ColumnKind::Uuid);
        assert_eq!(ColumnKind::of("author_id"), ColumnKind::Uuid);
        assert_eq!(ColumnKind::of("created_at"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::of("banned_until"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::of("title"), ColumnKind::Other);
        assert_eq!(ColumnKind::of("paid"), ColumnKind::Other);
    }

    #[test]
    fn typed_columns_check_operands() {
        assert!(ColumnKind::Uuid.accepts(&json!("6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11")));
        assert!(!ColumnKind::Uuid.accepts(&json!("abc")));
        assert!(!ColumnKind::Uuid.accepts(&json!(7)));
        assert!(ColumnKind::Timestamp.accepts(&json!("2024-05-01T12:00:00Z")));
        assert!(ColumnKind::Timestamp.accepts(&json!("2024-05-01")));
        assert!(!ColumnKind::Timestamp.accepts(&json!("yesterday")));
        assert!(ColumnKind::Other.accepts(&json!("6f1c1d0e-8f9b-4a7e-9a43-0c2b8f7f5d11")));
    }
}
