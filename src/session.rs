//! Identity source sessions: the long-lived service session, per-login sessions, and the bounded
//! retry executor every remote call goes through.

pub mod handle;
pub mod manager;
pub mod reference;
pub mod retry;
pub mod store;

pub use handle::{ServiceSlot, Session};
pub use manager::{
	DEFAULT_SERVICE_USERNAME, LogonOutcome, ServiceCredentials, ServiceState, SessionManager,
	SessionPolicy,
};
pub use reference::SessionRef;
pub use retry::RetryExecutor;
pub use store::SessionStore;

/// Numeric session identifier assigned by the remote identity source.
pub type SessionId = u64;
