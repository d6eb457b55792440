//! Rendering of gateway errors as HTTP responses.
//!
//! [`ApiError`] renders a body without a request id and leaves the [`Error`] in the response
//! extensions; [`attach_request_id`] then re-renders it with the id the middleware assigned.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dirgate_core::Error;
use dirgate_ldap::DistinguishedNameError;
use tower_http::request_id::RequestId;
use tracing::{debug, error};

#[derive(Clone)]
struct RenderedError(Error);

/// Handler error: one [`Error`], rendered as one status plus a JSON body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<DistinguishedNameError> for ApiError {
    fn from(err: DistinguishedNameError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.should_log() {
            error!("request failed: {err}");
        } else {
            debug!("request refused: {err}");
        }

        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(err.clone().into_error_response())).into_response();
        response.extensions_mut().insert(RenderedError(err));
        response
    }
}

/// Middleware copying the request's [`RequestId`] into error bodies.
pub async fn attach_request_id(request: Request, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_owned);

    let mut response = next.run(request).await;
    let Some(request_id) = request_id else {
        return response;
    };
    let Some(RenderedError(err)) = response.extensions_mut().remove::<RenderedError>() else {
        return response;
    };

    let (parts, _) = response.into_parts();
    (parts, Json(err.into_error_response_with_id(Some(request_id)))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_kind() {
        let cases = [
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::AttributeNotAllowed("uidNumber".into()), StatusCode::BAD_REQUEST),
            (Error::CredentialChangeForbidden("x".into()), StatusCode::FORBIDDEN),
            (Error::BindRejected("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::SearchError("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn error_body_carries_request_id() {
        use axum::body::{to_bytes, Body};
        use axum::http::HeaderValue;
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/fail",
                get(|| async { Err::<(), _>(ApiError(Error::NotFound("uid=x".into()))) }),
            )
            .layer(axum::middleware::from_fn(attach_request_id));

        let mut request = axum::http::Request::get("/fail").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(RequestId::new(HeaderValue::from_static("req-42")));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["request_id"], "req-42");
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let response = app
            .oneshot(axum::http::Request::get("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body.get("request_id").is_none());
    }

    #[test]
    fn dn_errors_are_bad_requests() {
        let response = ApiError::from(DistinguishedNameError::Empty).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
