//! One-time console tickets and the addresses they unlock.
//!
//! A ticket is an opaque identifier bound to a [`BackendAddr`]. Tickets are
//! registered in a [`TicketStore`] when a console is opened and consumed
//! exactly once when the viewer connects.

mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::TicketStore;

/// Upper bound on the length of a ticket identifier accepted from a client.
pub const MAX_TICKET_ID_LEN: usize = 256;

/// Network location of the console server for one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendAddr {
    host: String,
    port: u16,
}

impl BackendAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `host:port` authority, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// A ticket freshly issued by a console directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    pub id: String,
    pub backend: BackendAddr,
}

/// Generates a new unguessable ticket identifier (122 random bits, hex).
pub fn generate_ticket_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Returns `true` if `id` is acceptable as a ticket identifier in a URL path.
///
/// Identifiers must be non-empty, at most [`MAX_TICKET_ID_LEN`] bytes, and
/// use only RFC 3986 unreserved characters.
pub fn is_valid_ticket_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TICKET_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Shortened form of a ticket identifier for log output.
pub fn log_prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
