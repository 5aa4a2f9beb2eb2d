use std::sync::Arc;

use vmrc_core::{Authenticator, ConsoleDirectory, ConsoleService, SessionGate, TicketStore};

use crate::config::ServerConfig;
use crate::proxy::BackendConnector;

/// Handles shared by every request handler. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub consoles: Arc<ConsoleService>,
    pub tickets: Arc<TicketStore>,
    /// Transport for the gateway-to-console hop.
    pub backend: Arc<dyn BackendConnector>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        authenticator: Arc<dyn Authenticator>,
        directory: Arc<dyn ConsoleDirectory>,
        backend: Arc<dyn BackendConnector>,
    ) -> Self {
        let tickets = Arc::new(match config.tickets.ttl() {
            Some(ttl) => TicketStore::with_ttl(ttl),
            None => TicketStore::new(),
        });
        let gate = SessionGate::new(authenticator, config.credentials());
        let consoles = Arc::new(ConsoleService::new(gate, directory, tickets.clone()));

        Self {
            config: Arc::new(config),
            consoles,
            tickets,
            backend,
        }
    }
}
