//! zkpp-portal
//!
//! Requesting side of the zkproofport handshake. A [`PortalClient`] opens the
//! portal with a fresh nonce, listens on a [`MessageHub`] for the reply sent
//! from exactly that context, and settles one [`Session`] with the proof
//! envelope, a cancellation, or a timeout.

pub mod client;
pub mod config;
pub mod hub;
pub mod session;

pub use client::{PortalClient, PortalLauncher};
pub use config::{PortalConfig, PortalConfigError, WindowSize};
pub use hub::{ContextId, MessageHub, PortalEvent, Subscription};
pub use session::{Session, SessionOutcome, SessionState};
