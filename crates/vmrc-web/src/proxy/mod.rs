//! Ticket-addressed console proxy.
//!
//! `* /ticket/{ticket}` consumes the ticket, rewrites the request for the
//! backend it was bound to, and relays it. Upgrade requests (WebSocket) are
//! then spliced byte-for-byte until either side hangs up. A consumed ticket
//! is gone for good: if the backend cannot be reached the client has to open
//! the console again.

pub mod pump;
pub mod rewrite;
pub mod transport;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{Response, StatusCode};
use axum::routing::any;
use axum::Router;
use hyper_util::rt::TokioIo;
use vmrc_core::ticket::{is_valid_ticket_id, log_prefix};
use vmrc_core::BackendAddr;

pub use transport::{BackendConnector, InsecureTlsConnector};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("backend HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ticket/{ticket}", any(ticket_handler))
}

async fn ticket_handler(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
    req: Request,
) -> Result<Response<Body>, AppError> {
    if !is_valid_ticket_id(&ticket) {
        return Err(AppError::BadRequest("Malformed ticket".to_string()));
    }

    let backend = state.tickets.take_and_remove(&ticket).map_err(|e| {
        tracing::info!("Rejected ticket {}: {e}", log_prefix(&ticket));
        AppError::NotFound("Unknown or expired ticket".to_string())
    })?;

    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    tracing::info!("Ticket {} consumed, forwarding to {backend}", log_prefix(&ticket));

    forward(
        req,
        &backend,
        client_ip,
        state.backend.as_ref(),
        state.config.proxy.flush_interval(),
    )
    .await
    .map_err(|e| {
        tracing::warn!("Console proxy to {backend} failed: {e}");
        AppError::BadGateway("Console backend unreachable; request a new console".to_string())
    })
}

/// Sends `req` to `backend` and returns the backend's response.
///
/// When both sides agree to switch protocols, a task is spawned that splices
/// the two upgraded connections once the 101 response reaches the client.
pub async fn forward(
    mut req: Request,
    backend: &BackendAddr,
    client_ip: Option<IpAddr>,
    connector: &dyn BackendConnector,
    flush_interval: Duration,
) -> Result<Response<Body>, ProxyError> {
    let client_upgrade = hyper::upgrade::on(&mut req);
    let outbound = rewrite::rewrite(req, backend, client_ip);

    let io = connector.connect(backend).await?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    let authority = outbound.authority.clone();
    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            tracing::debug!("Backend connection to {authority} ended: {e}");
        }
    });

    let mut response = sender.send_request(outbound.request).await?;

    if outbound.upgrade && response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let backend_upgrade = hyper::upgrade::on(&mut response);
        let authority = outbound.authority;
        tokio::spawn(async move {
            match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok((client, backend)) => {
                    tracing::debug!("Console stream to {authority} open");
                    let (client, backend) = (TokioIo::new(client), TokioIo::new(backend));
                    if let Err(e) = pump::splice(client, backend, flush_interval).await {
                        tracing::debug!("Console stream to {authority} failed: {e}");
                    }
                    tracing::debug!("Console stream to {authority} closed");
                }
                Err(e) => tracing::warn!("Upgrade to {authority} failed: {e}"),
            }
        });
    }

    let (mut parts, body) = response.into_parts();
    let switching = parts.status == StatusCode::SWITCHING_PROTOCOLS;
    rewrite::strip_hop_by_hop(&mut parts.headers, switching);
    Ok(Response::from_parts(parts, Body::new(body)))
}
