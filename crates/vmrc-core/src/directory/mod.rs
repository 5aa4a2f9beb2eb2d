//! Console directory contract.
//!
//! A directory enumerates console-capable resources and issues one-time
//! tickets bound to the backend serving a resource's console. The gateway
//! treats the issued backend address as authoritative.

mod fixed;

use async_trait::async_trait;

pub use fixed::{FixedConsole, FixedDirectory};

use crate::error::DirectoryError;
use crate::session::SessionToken;
use crate::ticket::IssuedTicket;

#[async_trait]
pub trait ConsoleDirectory: Send + Sync {
    /// Names of resources whose console is currently reachable.
    async fn list_active_consoles(
        &self,
        session: &SessionToken,
    ) -> Result<Vec<String>, DirectoryError>;

    /// Mints a one-time ticket for the console of `resource`.
    async fn issue_ticket(
        &self,
        session: &SessionToken,
        resource: &str,
    ) -> Result<IssuedTicket, DirectoryError>;
}
