use thiserror::Error;

/// Rejections raised while turning client filter JSON into SQL.
/// Every variant reaches the client as a 400.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("'{0}' is not a listable table")]
    InvalidTableName(String),

    #[error("'{0}' is not a filterable column")]
    InvalidColumn(String),

    #[error("Malformed where clause: {0}")]
    InvalidWhereClause(String),

    #[error("Operator '{0}' is not supported")]
    UnsupportedOperator(String),

    #[error("Bad operand: {0}")]
    InvalidOperatorData(String),

    #[error("Malformed order: {0}")]
    InvalidOrder(String),

    #[error("limit must not be negative, got {0}")]
    InvalidLimit(String),

    #[error("offset must not be negative, got {0}")]
    InvalidOffset(String),
}
