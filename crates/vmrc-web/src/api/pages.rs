use axum::extract::{Path, State};
use axum::response::Html;
use axum::Json;

use crate::error::AppError;
use crate::render;
use crate::state::AppState;

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let consoles = state.consoles.list_consoles().await?;
    render::index_page(&consoles)
}

/// Issues a ticket for `resource` and renders a viewer bound to it.
pub async fn console(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Html<String>, AppError> {
    let ticket = state.consoles.open_console(&resource).await?;
    render::console_page(&resource, state.consoles.identity(), &ticket.id)
}

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "pending_tickets": state.tickets.len(),
    }))
}
