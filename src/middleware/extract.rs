use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::filter::FilterData;

/// `Json<T>` whose rejections use the API error envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query<T>` whose rejections use the API error envelope
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `Path<T>` whose rejections use the API error envelope
pub struct PathParam<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Listing controls from the query string: `?limit=20&offset=40&order=created_at desc&where={"..."}`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    pub order: Option<String>,
    #[serde(rename = "where")]
    pub where_json: Option<String>,
}

/// `?include_deleted=true` on listings that can show soft-deleted rows
#[derive(Debug, Default, Deserialize)]
pub struct VisibilityQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn into_filter(self) -> Result<FilterData, ApiError> {
        let where_clause = match self.where_json.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
            Some(raw) => Some(
                serde_json::from_str::<Value>(raw)
                    .map_err(|e| ApiError::invalid_json(format!("Invalid 'where' parameter: {}", e)))?,
            ),
            None => None,
        };
        Ok(FilterData {
            where_clause,
            order: self.order.filter(|o| !o.trim().is_empty()).map(Value::String),
            limit: self.limit,
            offset: self.offset,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_builds_filter() {
        let filter = ListQuery {
            limit: Some(10),
            offset: Some(20),
            order: Some("created_at desc".to_string()),
            where_json: Some(r#"{"is_pinned": true}"#.to_string()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.offset, Some(20));
        assert_eq!(filter.order, Some(Value::String("created_at desc".to_string())));
        assert_eq!(filter.where_clause.unwrap()["is_pinned"], true);
    }

    #[test]
    fn blank_parameters_are_ignored() {
        let filter = ListQuery {
            order: Some("  ".to_string()),
            where_json: Some("".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert!(filter.order.is_none());
        assert!(filter.where_clause.is_none());
    }

    #[test]
    fn visibility_defaults_to_live_rows() {
        let Query(visible) = Query::<VisibilityQuery>::try_from_uri(&"/api/admin/users?limit=5".parse().unwrap()).unwrap();
        assert!(!visible.include_deleted);
        let Query(visible) =
            Query::<VisibilityQuery>::try_from_uri(&"/api/admin/users?include_deleted=true".parse().unwrap()).unwrap();
        assert!(visible.include_deleted);
    }

    #[test]
    fn malformed_where_is_invalid_json() {
        let err = ListQuery {
            where_json: Some("{not json".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_JSON");
    }
}
