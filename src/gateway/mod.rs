use crate::gateway::handlers::{
    auth::{self, AuthState, require_stage1, require_stage2},
    instrument::{self, EngineProxy},
};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, field, info, info_span};
use ulid::Ulid;

pub mod handlers;
mod openapi;


pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the gateway router with every route and layer attached.
#[must_use]
pub fn router(auth_state: Arc<AuthState>, engine: Arc<EngineProxy>) -> Router {
    let postcode_gate = auth_state.config().postcode_gate();
    let instrument_routes = Router::new()
        .route("/:instrument/", get(instrument::open_case))
        .route("/:instrument/*path", any(instrument::proxy));
    let instrument_routes = if postcode_gate {
        instrument_routes.route_layer(middleware::from_fn(require_stage2))
    } else {
        instrument_routes.route_layer(middleware::from_fn(require_stage1))
    };

    let mut auth_routes = Router::new()
        .route("/", get(auth::login::login_page))
        .route(
            "/auth/login",
            get(auth::login::login_page).post(auth::login::submit_login),
        )
        .route("/auth/logout", get(auth::session::logout))
        .route("/auth/logged-in", get(auth::session::logged_in))
        .route("/auth/timed-out", get(auth::session::timed_out))
        .route("/auth/*rest", any(not_found));
    if postcode_gate {
        auth_routes = auth_routes.route(
            "/auth/login/postcode",
            get(auth::postcode::postcode_page).post(auth::postcode::submit_postcode_form),
        );
    }

    auth_routes
        .route("/:instrument/logout", get(instrument::logout))
        .merge(instrument_routes)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(middleware::from_fn(reject_trace))
                .layer(Extension(auth_state))
                .layer(Extension(engine)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, auth_state: Arc<AuthState>, engine: Arc<EngineProxy>) -> Result<()> {
    let app = router(auth_state, engine);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id,
        authed_instrument = field::Empty,
        authed_case = field::Empty,
        jti = field::Empty,
    )
}

async fn reject_trace(request: Request, next: Next) -> Response {
    if request.method() == Method::TRACE {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    next.run(request).await
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Html(handlers::auth::views::not_found_page()),
    )
}
