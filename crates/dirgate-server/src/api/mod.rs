//! REST router.
//!
//! | Route                | Handler                 |
//! |----------------------|-------------------------|
//! | `GET /config/structure` | [`config::structure`] |
//! | `GET /config/baseDN` | [`config::base_dn`]     |
//! | `GET /{dn}`          | [`entry::show`]         |
//! | `PUT`/`POST /{dn}`   | [`entry::update`]       |
//! | `/ui/*`              | static UI assets        |

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request};
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info_span, Level};
use uuid::Uuid;

use crate::state::SharedState;

pub mod config;
pub mod entry;
pub mod error;

pub use error::ApiError;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Prefix under which the static UI is served.
pub const UI_PREFIX: &str = "/ui";

#[derive(Clone, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().simple().to_string();
        Some(RequestId::new(
            HeaderValue::from_str(&format!("req-{id}"))
                .unwrap_or_else(|_| HeaderValue::from_static("req-unknown")),
        ))
    }
}

/// Builds the complete application: routes, static UI and middleware.
pub fn router(state: SharedState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let ui = ServeDir::new(&state.static_dir);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), UuidRequestId))
        .layer(SetSensitiveRequestHeadersLayer::new([header::AUTHORIZATION]))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        request_id = ?request.headers().get(REQUEST_ID_HEADER),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::new(request_id));

    Router::new()
        .route("/", get(|| async { Redirect::permanent("/ui/") }))
        .route("/config/structure", get(config::structure))
        .route("/config/baseDN", get(config::base_dn))
        .route(
            "/{dn}",
            get(entry::show).put(entry::update).post(entry::update),
        )
        .nest_service(UI_PREFIX, ui)
        .layer(axum::middleware::from_fn(error::attach_request_id))
        .layer(middleware)
        .with_state(state)
}
