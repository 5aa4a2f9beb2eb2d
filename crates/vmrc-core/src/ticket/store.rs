use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{log_prefix, BackendAddr};
use crate::error::TicketError;

#[derive(Debug, Clone)]
struct PendingTicket {
    backend: BackendAddr,
    registered_at: Instant,
}

impl PendingTicket {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.registered_at.elapsed() >= ttl)
    }
}

/// Pending tickets awaiting their single proxied connection.
///
/// Safe to share between any number of request handlers. Every operation is
/// a single map operation, so consuming a ticket is linearizable: of several
/// racing [`take_and_remove`](Self::take_and_remove) calls for the same
/// identifier, exactly one succeeds.
pub struct TicketStore {
    tickets: DashMap<String, PendingTicket>,
    ttl: Option<Duration>,
}

impl TicketStore {
    /// Creates a store whose tickets never expire.
    pub fn new() -> Self {
        Self {
            tickets: DashMap::new(),
            ttl: None,
        }
    }

    /// Creates a store whose tickets expire `ttl` after registration.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tickets: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Registers `ticket_id` for `backend`.
    ///
    /// A duplicate identifier is rejected with [`TicketError::Duplicate`]
    /// and the pending mapping is left untouched.
    pub fn put(
        &self,
        ticket_id: impl Into<String>,
        backend: BackendAddr,
    ) -> Result<(), TicketError> {
        let ticket_id = ticket_id.into();
        match self.tickets.entry(ticket_id) {
            Entry::Occupied(entry) => {
                tracing::warn!("Rejected duplicate ticket: id={}", log_prefix(entry.key()));
                Err(TicketError::Duplicate)
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    "Ticket registered: id={}, backend={backend}",
                    log_prefix(entry.key())
                );
                entry.insert(PendingTicket {
                    backend,
                    registered_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Removes `ticket_id` and returns its backend.
    ///
    /// The entry is gone after this call whatever the outcome, so a ticket
    /// that expired is reported once as [`TicketError::Expired`] and then as
    /// [`TicketError::NotFound`].
    pub fn take_and_remove(&self, ticket_id: &str) -> Result<BackendAddr, TicketError> {
        let (_, pending) = self.tickets.remove(ticket_id).ok_or(TicketError::NotFound)?;

        if pending.is_expired(self.ttl) {
            tracing::debug!("Ticket expired on use: id={}", log_prefix(ticket_id));
            return Err(TicketError::Expired);
        }

        Ok(pending.backend)
    }

    /// Drops every ticket older than the time-to-live. Returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut removed = 0;
        self.tickets.retain(|_, pending| {
            let keep = !pending.is_expired(self.ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!("Swept {removed} expired tickets");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new()
    }
}
