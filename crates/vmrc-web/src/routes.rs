use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{api, middleware, proxy, static_files};

pub fn build(state: AppState) -> Router {
    let tls_enabled = state.config.tls.cert_path.is_some();

    let pages = Router::new()
        .merge(api::router())
        .route("/static/{*path}", get(static_files::static_handler));

    // Proxied responses keep the backend's own headers
    let pages = if tls_enabled {
        pages.layer(from_fn(middleware::security_headers::security_headers_with_hsts))
    } else {
        pages.layer(from_fn(middleware::security_headers::security_headers))
    };

    Router::new()
        .merge(pages)
        .merge(proxy::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
