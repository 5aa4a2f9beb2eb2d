//! vmrc core library — ticket bookkeeping for the console gateway.
//!
//! `vmrc-core` holds the state shared by every request of the gateway and
//! the contracts of its upstream collaborators. It knows nothing about HTTP.
//!
//! # Modules
//!
//! - [`ticket`] — [`BackendAddr`], ticket identifiers and the [`TicketStore`].
//! - [`session`] — [`SessionGate`] and the [`Authenticator`] contract.
//! - [`directory`] — the [`ConsoleDirectory`] contract and a static implementation.
//! - [`console`] — [`ConsoleService`], which ties the three together.
//! - [`error`] — per-component error enums and [`CoreError`].

pub mod console;
pub mod directory;
pub mod error;
pub mod session;
pub mod ticket;

pub use console::ConsoleService;
pub use directory::{ConsoleDirectory, FixedConsole, FixedDirectory};
pub use error::{CoreError, CoreResult, DirectoryError, SessionError, TicketError};
pub use session::{Authenticator, Credentials, SessionGate, SessionToken};
pub use ticket::{BackendAddr, IssuedTicket, TicketStore};
