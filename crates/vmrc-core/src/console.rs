//! Console requests: the glue between session, directory and ticket store.

use std::sync::Arc;

use crate::directory::ConsoleDirectory;
use crate::error::{CoreResult, DirectoryError};
use crate::session::{SessionGate, SessionToken};
use crate::ticket::{log_prefix, IssuedTicket, TicketStore};

/// Opens console sessions on behalf of request handlers.
///
/// Every call first passes the [`SessionGate`]. When the directory rejects
/// the session mid-call the cached session is dropped so the next request
/// logs in again; the current request still fails.
pub struct ConsoleService {
    gate: SessionGate,
    directory: Arc<dyn ConsoleDirectory>,
    tickets: Arc<TicketStore>,
}

impl ConsoleService {
    pub fn new(
        gate: SessionGate,
        directory: Arc<dyn ConsoleDirectory>,
        tickets: Arc<TicketStore>,
    ) -> Self {
        Self {
            gate,
            directory,
            tickets,
        }
    }

    /// Identity the gateway uses with the directory.
    pub fn identity(&self) -> &str {
        self.gate.credentials().username()
    }

    pub async fn list_consoles(&self) -> CoreResult<Vec<String>> {
        let session = self.gate.ensure_authenticated().await?;
        let result = self.directory.list_active_consoles(&session).await;
        Ok(self.check_session(&session, result).await?)
    }

    /// Issues a ticket for `resource` and registers it for the proxy.
    pub async fn open_console(&self, resource: &str) -> CoreResult<IssuedTicket> {
        let session = self.gate.ensure_authenticated().await?;
        let result = self.directory.issue_ticket(&session, resource).await;
        let ticket = self.check_session(&session, result).await?;

        self.tickets.put(ticket.id.clone(), ticket.backend.clone())?;
        tracing::info!(
            "Console opened: resource={resource}, ticket={}, backend={}",
            log_prefix(&ticket.id),
            ticket.backend
        );
        Ok(ticket)
    }

    async fn check_session<T>(
        &self,
        session: &SessionToken,
        result: Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        if matches!(result, Err(DirectoryError::SessionRejected)) {
            self.gate.invalidate(session).await;
        }
        result
    }
}
