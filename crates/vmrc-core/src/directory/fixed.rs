//! Directory backed by a static list of consoles.
//!
//! Used when no upstream directory is configured: consoles and their
//! backends come from configuration and tickets are minted locally.

use async_trait::async_trait;
use serde::Deserialize;

use super::ConsoleDirectory;
use crate::error::{DirectoryError, SessionError};
use crate::session::{Authenticator, Credentials, SessionToken};
use crate::ticket::{generate_ticket_id, BackendAddr, IssuedTicket};

/// One statically configured console.
#[derive(Debug, Clone, Deserialize)]
pub struct FixedConsole {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl FixedConsole {
    pub fn backend(&self) -> BackendAddr {
        BackendAddr::new(self.host.clone(), self.port)
    }
}

pub struct FixedDirectory {
    consoles: Vec<FixedConsole>,
}

impl FixedDirectory {
    pub fn new(consoles: Vec<FixedConsole>) -> Self {
        Self { consoles }
    }
}

/// There is nobody to log in to; every session is valid.
#[async_trait]
impl Authenticator for FixedDirectory {
    async fn session_is_valid(&self, _token: &SessionToken) -> Result<bool, SessionError> {
        Ok(true)
    }

    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, SessionError> {
        Ok(SessionToken::new(credentials.username()))
    }
}

#[async_trait]
impl ConsoleDirectory for FixedDirectory {
    async fn list_active_consoles(
        &self,
        _session: &SessionToken,
    ) -> Result<Vec<String>, DirectoryError> {
        let mut names: Vec<String> = self.consoles.iter().map(|c| c.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn issue_ticket(
        &self,
        _session: &SessionToken,
        resource: &str,
    ) -> Result<IssuedTicket, DirectoryError> {
        let console = self
            .consoles
            .iter()
            .find(|c| c.name == resource)
            .ok_or_else(|| DirectoryError::ResourceNotFound(resource.to_string()))?;

        Ok(IssuedTicket {
            id: generate_ticket_id(),
            backend: console.backend(),
        })
    }
}
