//! Shared fixtures for router-level tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vmrc_core::{
    Authenticator, BackendAddr, ConsoleDirectory, Credentials, DirectoryError, IssuedTicket,
    SessionError, SessionToken,
};

use crate::config::ServerConfig;
use crate::proxy::tests::read_head;
use crate::proxy::BackendConnector;
use crate::state::AppState;

/// Directory with one machine whose tickets come from a fixed sequence.
pub struct ScriptedDirectory {
    pub resource: String,
    pub backend: BackendAddr,
    pub ticket_ids: std::sync::Mutex<Vec<String>>,
    pub logins: AtomicUsize,
    pub fail_requests: std::sync::atomic::AtomicBool,
}

impl ScriptedDirectory {
    pub fn new(resource: &str, backend: BackendAddr, ticket_ids: &[&str]) -> Self {
        Self {
            resource: resource.to_string(),
            backend,
            ticket_ids: std::sync::Mutex::new(ticket_ids.iter().map(|s| s.to_string()).collect()),
            logins: AtomicUsize::new(0),
            fail_requests: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Authenticator for ScriptedDirectory {
    async fn session_is_valid(&self, _token: &SessionToken) -> Result<bool, SessionError> {
        Ok(true)
    }

    async fn login(&self, _credentials: &Credentials) -> Result<SessionToken, SessionError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(SessionToken::new("session"))
    }
}

#[async_trait]
impl ConsoleDirectory for ScriptedDirectory {
    async fn list_active_consoles(
        &self,
        _session: &SessionToken,
    ) -> Result<Vec<String>, DirectoryError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(DirectoryError::Request("upstream timeout".to_string()));
        }
        Ok(vec![self.resource.clone()])
    }

    async fn issue_ticket(
        &self,
        _session: &SessionToken,
        resource: &str,
    ) -> Result<IssuedTicket, DirectoryError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(DirectoryError::Request("upstream timeout".to_string()));
        }
        if resource != self.resource {
            return Err(DirectoryError::ResourceNotFound(resource.to_string()));
        }
        let mut ids = self.ticket_ids.lock().unwrap();
        if ids.is_empty() {
            return Err(DirectoryError::Request("out of tickets".to_string()));
        }
        Ok(IssuedTicket {
            id: ids.remove(0),
            backend: self.backend.clone(),
        })
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.directory.username = "svc@vsphere.local".to_string();
    config.proxy.flush_interval_ms = 5;
    config
}

pub fn test_state(
    directory: Arc<ScriptedDirectory>,
    connector: Arc<dyn BackendConnector>,
) -> AppState {
    AppState::new(test_config(), directory.clone(), directory, connector)
}

/// Runs `app` on a loopback port the way `main` does.
pub async fn spawn_gateway(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Console backend that accepts upgrades and echoes bytes back.
///
/// `open` counts backend connections that have not seen EOF yet.
pub async fn spawn_echo_backend(open: Arc<AtomicUsize>) -> BackendAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let open = open.clone();
            open.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\n\
                          connection: upgrade\r\nupgrade: websocket\r\n\r\n",
                    )
                    .await;
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                open.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });
    BackendAddr::new("127.0.0.1", port)
}

/// Opens an upgraded stream through the gateway and returns the socket.
pub async fn open_stream(gateway: SocketAddr, ticket: &str) -> TcpStream {
    let mut stream = TcpStream::connect(gateway).await.unwrap();
    let request = format!(
        "GET /ticket/{ticket} HTTP/1.1\r\nhost: {gateway}\r\n\
         connection: Upgrade\r\nupgrade: websocket\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");
    stream
}

/// Waits until `counter` drops to zero, failing after `limit`.
pub async fn wait_for_zero(counter: &AtomicUsize, limit: Duration) {
    tokio::time::timeout(limit, async {
        while counter.load(Ordering::SeqCst) != 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("backend connections still open");
}
