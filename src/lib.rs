//! OpenID Connect identity provider core: signing keys, resilient backend sessions, dynamic
//! client registration and federated authority validation.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod authority;
pub mod backend;
pub mod keys;
pub mod metrics;
pub mod protocol;
pub mod registration;
pub mod security;
pub mod session;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::Utc;
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	authority::{AuthorityDetails, AuthorityRegistration},
	backend::{BackendUser, IdentityBackend, MemoryBackend, ServerBackend},
	error::{Error, Result},
	keys::{KeyRegistry, KeysConfig, SigningMethod},
	registration::{ClientRegistration, ClientRegistrationRequest},
	session::{SessionManager, SessionPolicy},
};
