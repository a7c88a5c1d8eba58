//! Pluggable identity backends.
//!
//! The HTTP layer only talks to [`IdentityBackend`]; each variant decides where user records live and
//! whether it keeps per-login sessions.

pub mod memory;
pub mod remote;
pub mod scopes;
pub mod server;

pub use memory::MemoryBackend;
pub use remote::{IdentityClient, RemoteResponse, RemoteStatus, RemoteUser};
pub use scopes::{ScopeDefinition, ScopesMeta};
pub use server::ServerBackend;

// std
use std::{collections::HashSet, fmt::Debug};
// crates.io
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Claims map contributed by a backend.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Base identity of an end user.
pub trait User {
	/// Stable subject identifier.
	fn subject(&self) -> &str;

	/// Primary mail address.
	fn email(&self) -> &str;

	/// Whether the mail address is verified.
	fn email_verified(&self) -> bool;

	/// Display name.
	fn name(&self) -> &str;

	/// Given name.
	fn given_name(&self) -> String;

	/// Family name.
	fn family_name(&self) -> String;

	/// Numeric user id.
	fn id(&self) -> u64;
}

/// Identity that also carries a login name.
pub trait UserWithUsername: User {
	/// Login name.
	fn username(&self) -> &str;
}

/// User record returned by a backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendUser {
	/// Stable subject identifier.
	pub subject: String,
	/// Numeric user id.
	pub id: u64,
	/// Login name.
	pub username: String,
	/// Primary mail address.
	pub email: String,
	/// Whether the mail address is verified.
	pub email_verified: bool,
	/// Display name.
	pub name: String,
	/// Structured given name, when the source provides one.
	#[serde(default)]
	pub given_name: Option<String>,
	/// Structured family name, when the source provides one.
	#[serde(default)]
	pub family_name: Option<String>,
	/// Backend specific claims.
	#[serde(default)]
	pub claims: Claims,
}
impl BackendUser {
	/// Backend specific claims.
	pub fn backend_claims(&self) -> &Claims {
		&self.claims
	}

	// Best effort: "Given Family Name" splits at the first space; a single word yields nothing.
	fn split_name(&self) -> (&str, &str) {
		self.name.split_once(' ').unwrap_or_default()
	}
}
impl User for BackendUser {
	fn subject(&self) -> &str {
		&self.subject
	}

	fn email(&self) -> &str {
		&self.email
	}

	fn email_verified(&self) -> bool {
		self.email_verified
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn given_name(&self) -> String {
		match &self.given_name {
			Some(name) => name.clone(),
			None => self.split_name().0.to_owned(),
		}
	}

	fn family_name(&self) -> String {
		match &self.family_name {
			Some(name) => name.clone(),
			None => self.split_name().1.to_owned(),
		}
	}

	fn id(&self) -> u64 {
		self.id
	}
}
impl UserWithUsername for BackendUser {
	fn username(&self) -> &str {
		&self.username
	}
}

/// Successful logon.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogonSuccess {
	/// Subject of the authenticated user.
	pub user_id: String,
	/// Session reference to hand back on later calls, if the backend tracks sessions.
	pub session_ref: Option<String>,
	/// Claims the backend wants attached to the authentication.
	pub claims: Claims,
}

/// Capability set every identity backend provides.
#[async_trait::async_trait]
pub trait IdentityBackend: Debug + Send + Sync {
	/// Start background maintenance bound to `ctx`. Returns once set up; the tasks keep running until
	/// `ctx` is cancelled.
	async fn run_with_context(&self, ctx: CancellationToken) -> Result<()>;

	/// Authenticate a user. Rejected credentials yield `Ok(None)`.
	async fn logon(
		&self,
		audience: &str,
		username: &str,
		password: &str,
	) -> Result<Option<LogonSuccess>>;

	/// Fetch a user by subject. Unknown users yield `Ok(None)`.
	async fn get_user(&self, user_id: &str, session_ref: Option<&str>) -> Result<Option<BackendUser>>;

	/// Look a user up by login name within the session behind `session_ref`. Unknown users yield
	/// `Ok(None)`.
	async fn resolve_user_by_username(
		&self,
		username: &str,
		session_ref: Option<&str>,
	) -> Result<Option<BackendUser>>;

	/// Keep the session behind `session_ref` alive.
	async fn refresh_session(
		&self,
		user_id: &str,
		session_ref: Option<&str>,
		claims: &Claims,
	) -> Result<()>;

	/// Tear down the session behind `session_ref`.
	async fn destroy_session(&self, session_ref: Option<&str>) -> Result<()>;

	/// Backend specific claims for `user_id` given the authorized scopes.
	fn user_claims(&self, user_id: &str, authorized_scopes: &HashSet<String>) -> Option<Claims>;

	/// Scopes this backend can serve.
	fn scopes_supported(&self) -> Vec<String>;

	/// Presentation metadata for backend specific scopes.
	fn scopes_meta(&self) -> Option<ScopesMeta>;

	/// Backend name.
	fn name(&self) -> &str;
}
