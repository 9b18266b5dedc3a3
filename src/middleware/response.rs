use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::ApiError;

/// Success body: `{"success": true, "data": ...}`
#[derive(Serialize)]
struct Envelope<'a, T> {
    success: bool,
    data: &'a T,
}

/// Handler payload plus the status it is sent with. Errors take the other
/// arm of [`ApiResult`] and render through [`ApiError`].
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    body: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { status: StatusCode::OK, body: Some(data) }
    }

    pub fn created(data: T) -> Self {
        Self { status: StatusCode::CREATED, body: Some(data) }
    }
}

impl ApiResponse<()> {
    pub fn no_content() -> Self {
        Self { status: StatusCode::NO_CONTENT, body: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let Some(data) = self.body else {
            return self.status.into_response();
        };
        // Serialise up front so a failing payload becomes a 500 envelope, not a torn body
        match serde_json::to_value(Envelope { success: true, data: &data }) {
            Ok(body) => (self.status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "response payload failed to serialise");
                ApiError::internal_server_error("Failed to serialize response data").into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::{json, Value};

    struct Unserialisable;

    impl Serialize for Unserialisable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("nope"))
        }
    }

    async fn body_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn statuses() {
        assert_eq!(ApiResponse::created(1).into_response().status(), StatusCode::CREATED);
        assert_eq!(ApiResponse::success("ok").into_response().status(), StatusCode::OK);
        assert_eq!(ApiResponse::no_content().into_response().status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn success_is_enveloped() {
        let body = body_of(ApiResponse::created(json!({"slug": "general"})).into_response()).await;
        assert_eq!(body, json!({"success": true, "data": {"slug": "general"}}));
    }

    #[tokio::test]
    async fn serialisation_failure_is_an_error_envelope() {
        let response = ApiResponse::success(Unserialisable).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    }
}
