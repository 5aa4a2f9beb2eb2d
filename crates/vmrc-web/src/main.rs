mod api;
mod config;
mod error;
mod middleware;
mod proxy;
mod render;
mod routes;
mod state;
mod static_files;
mod vsphere;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vmrc_core::{Authenticator, ConsoleDirectory, FixedDirectory};

use crate::config::ServerConfig;
use crate::proxy::InsecureTlsConnector;
use crate::state::AppState;
use crate::vsphere::VsphereClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmrc_web=debug,vmrc_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Both rustls providers may be compiled in; pick one for the process.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ServerConfig::load()?;
    let bind_addr = config.bind_addr;
    let tls_config = config.tls.clone();
    let sweep_every = Duration::from_secs(config.tickets.sweep_interval_secs.max(1));

    let (authenticator, directory): (Arc<dyn Authenticator>, Arc<dyn ConsoleDirectory>) =
        match config.directory.url.as_deref() {
            Some(url) => {
                let client = Arc::new(VsphereClient::new(url, &config.directory)?);
                tracing::info!("Using vSphere directory at {url}");
                (client.clone() as Arc<dyn Authenticator>, client as Arc<dyn ConsoleDirectory>)
            }
            None => {
                let fixed = Arc::new(FixedDirectory::new(config.consoles.clone()));
                tracing::info!("Using {} statically configured consoles", config.consoles.len());
                (fixed.clone() as Arc<dyn Authenticator>, fixed as Arc<dyn ConsoleDirectory>)
            }
        };

    let backend = Arc::new(InsecureTlsConnector::new(config.proxy.connect_timeout())?);
    tracing::warn!("Console backend certificates are not verified");
    let state = AppState::new(config, authenticator, directory, backend);

    match state.tickets.ttl() {
        Some(ttl) => {
            tracing::info!("Unused tickets expire after {}s", ttl.as_secs());
            let tickets = state.tickets.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_every);
                loop {
                    interval.tick().await;
                    tickets.sweep_expired();
                }
            });
        }
        None => tracing::warn!("Ticket expiry disabled; unused tickets are kept until restart"),
    }

    let app = routes::build(state);

    if let (Some(cert), Some(key)) = (&tls_config.cert_path, &tls_config.key_path) {
        use axum_server::tls_rustls::RustlsConfig;
        let rustls_config = RustlsConfig::from_pem_file(cert, key).await?;
        tracing::info!("vmrc-web listening on https://{}", bind_addr);
        axum_server::bind_rustls(bind_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        tracing::info!("vmrc-web listening on http://{}", bind_addr);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
