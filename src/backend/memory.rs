//! Static in-memory user directory.

// std
use std::collections::{HashMap, HashSet};
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	backend::{BackendUser, Claims, IdentityBackend, LogonSuccess, ScopesMeta},
	protocol::{SCOPE_EMAIL, SCOPE_ID, SCOPE_PROFILE, SCOPE_RAW_SUBJECT},
};

/// Backend serving a fixed set of users without sessions.
#[derive(Debug)]
pub struct MemoryBackend {
	name: String,
	users: HashMap<String, (String, BackendUser)>,
}
impl MemoryBackend {
	/// Create an empty directory.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), users: HashMap::new() }
	}

	/// Add a user that logs on with `password`, keyed by its username.
	pub fn with_user(mut self, password: impl Into<String>, user: BackendUser) -> Self {
		self.users.insert(user.username.clone(), (password.into(), user));

		self
	}

	fn by_subject(&self, subject: &str) -> Option<&BackendUser> {
		self.users.values().map(|(_, user)| user).find(|user| user.subject == subject)
	}
}
#[async_trait::async_trait]
impl IdentityBackend for MemoryBackend {
	async fn run_with_context(&self, _ctx: CancellationToken) -> Result<()> {
		tracing::info!(backend = %self.name, users = self.users.len(), "backend set up");

		Ok(())
	}

	async fn logon(
		&self,
		_audience: &str,
		username: &str,
		password: &str,
	) -> Result<Option<LogonSuccess>> {
		let Some((expected, user)) = self.users.get(username) else {
			return Ok(None);
		};

		if expected != password {
			tracing::debug!(backend = %self.name, username, "logon rejected");

			return Ok(None);
		}

		Ok(Some(LogonSuccess {
			user_id: user.subject.clone(),
			session_ref: None,
			claims: user.claims.clone(),
		}))
	}

	async fn get_user(&self, user_id: &str, _session_ref: Option<&str>) -> Result<Option<BackendUser>> {
		Ok(self.by_subject(user_id).cloned())
	}

	async fn resolve_user_by_username(
		&self,
		username: &str,
		_session_ref: Option<&str>,
	) -> Result<Option<BackendUser>> {
		Ok(self.users.get(username).map(|(_, user)| user.clone()))
	}

	async fn refresh_session(
		&self,
		_user_id: &str,
		_session_ref: Option<&str>,
		_claims: &Claims,
	) -> Result<()> {
		Ok(())
	}

	async fn destroy_session(&self, _session_ref: Option<&str>) -> Result<()> {
		Ok(())
	}

	fn user_claims(&self, _user_id: &str, _authorized_scopes: &HashSet<String>) -> Option<Claims> {
		None
	}

	fn scopes_supported(&self) -> Vec<String> {
		[SCOPE_PROFILE, SCOPE_EMAIL, SCOPE_ID, SCOPE_RAW_SUBJECT].map(str::to_owned).to_vec()
	}

	fn scopes_meta(&self) -> Option<ScopesMeta> {
		None
	}

	fn name(&self) -> &str {
		&self.name
	}
}
