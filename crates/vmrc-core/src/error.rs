//! Error types for `vmrc-core`.
//!
//! Each component has its own error enum; [`CoreError`] unifies them for
//! callers that drive several components in one operation, such as
//! [`ConsoleService`](crate::console::ConsoleService).

/// Errors raised by the [`TicketStore`](crate::ticket::TicketStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    /// No ticket with this identifier is pending. It was never issued or
    /// has already been consumed.
    #[error("ticket not found")]
    NotFound,

    /// The ticket was pending but outlived the store's time-to-live. It has
    /// been removed.
    #[error("ticket expired")]
    Expired,

    /// A ticket with the same identifier is already pending.
    #[error("duplicate ticket identifier")]
    Duplicate,
}

/// Errors raised while establishing a session with the upstream directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The directory refused the configured credentials.
    #[error("login rejected: {0}")]
    Rejected(String),

    /// The directory could not be reached or answered unexpectedly.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`ConsoleDirectory`](crate::directory::ConsoleDirectory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// No resource with the requested name exists.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The directory no longer accepts the session used for the call.
    #[error("session rejected by directory")]
    SessionRejected,

    /// The directory answered with something that could not be interpreted.
    #[error("invalid directory response: {0}")]
    InvalidResponse(String),

    /// Transport failure or an unexpected status from the directory.
    #[error("directory request failed: {0}")]
    Request(String),
}

/// Unified error type for operations that span several components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Convenience alias used throughout `vmrc-core`.
pub type CoreResult<T> = Result<T, CoreError>;
