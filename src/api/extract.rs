//! Extractors whose rejections use the API error body.
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies. These
//! wrappers turn a malformed body, path or query string into
//! `FirmError::Validation`, so clients always get `{"code", "message"}`.

use crate::error::FirmError;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

impl From<JsonRejection> for FirmError {
    fn from(rejection: JsonRejection) -> Self {
        FirmError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for FirmError {
    fn from(rejection: PathRejection) -> Self {
        FirmError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for FirmError {
    fn from(rejection: QueryRejection) -> Self {
        FirmError::Validation(rejection.body_text())
    }
}

/// JSON request body
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FirmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Path parameters
pub struct ApiPath<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = FirmError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Query string parameters
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FirmError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Range {
        from: chrono::NaiveDate,
    }

    #[tokio::test]
    async fn test_bad_query_is_validation_error() {
        let request = axum::http::Request::builder()
            .uri("/calendar?from=yesterday")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = ApiQuery::<Range>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(FirmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{\"from\":"))
            .unwrap();

        let result = ApiJson::<Range>::from_request(request, &()).await;
        assert!(matches!(result, Err(FirmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_valid_query_passes_through() {
        let request = axum::http::Request::builder()
            .uri("/calendar?from=2026-10-01")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ApiQuery(range) = ApiQuery::<Range>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(range.from.to_string(), "2026-10-01");
    }
}
