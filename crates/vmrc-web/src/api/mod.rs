mod pages;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::index))
        .route("/console/{resource}", get(pages::console))
        .route("/healthz", get(pages::healthz))
}
