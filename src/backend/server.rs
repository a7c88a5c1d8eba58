//! Backend served by a remote identity server through a [`SessionManager`].

// std
use std::collections::HashSet;
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	backend::{
		BackendUser, Claims, IdentityBackend, LogonSuccess, ScopesMeta,
		remote::{GetUserResponse, IdentityClient, RemoteResponse, RemoteStatus, RemoteUser},
	},
	protocol::{SCOPE_EMAIL, SCOPE_ID, SCOPE_PROFILE, SCOPE_RAW_SUBJECT},
	session::{ServiceCredentials, SessionManager, SessionPolicy},
};

/// Scope granting access to the server's global user id.
pub const SCOPE_SERVER_ID: &str = "server/gc";
/// Claim carrying the server's global user id.
pub const SERVER_ID_CLAIM: &str = "server.gc_id";

const SUPPORTED_SCOPES: [&str; 5] =
	[SCOPE_PROFILE, SCOPE_EMAIL, SCOPE_ID, SCOPE_RAW_SUBJECT, SCOPE_SERVER_ID];

/// Identity backend backed by a remote identity server.
#[derive(Debug)]
pub struct ServerBackend {
	manager: SessionManager,
	allowed_scopes: Option<HashSet<String>>,
}
impl ServerBackend {
	/// Create a backend named `name` talking to `client`.
	///
	/// With `credentials` every remote call runs in a shared service session; without them calls run
	/// in the per-login session of the user.
	pub fn new(
		name: impl Into<String>,
		client: Arc<dyn IdentityClient>,
		credentials: Option<ServiceCredentials>,
		policy: SessionPolicy,
	) -> Result<Self> {
		Ok(Self {
			manager: SessionManager::new(name, client, credentials, policy)?,
			allowed_scopes: None,
		})
	}

	/// Restrict [`scopes_supported`](IdentityBackend::scopes_supported) to `scopes`.
	pub fn with_allowed_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.allowed_scopes = Some(scopes.into_iter().map(Into::into).collect());

		self
	}

	/// Underlying session manager.
	pub fn manager(&self) -> &SessionManager {
		&self.manager
	}

	/// Stop the background tasks.
	pub async fn shutdown(&self) {
		self.manager.shutdown().await;
	}

	fn user_from_remote(user: RemoteUser) -> BackendUser {
		BackendUser {
			subject: user.user_entry_id,
			id: user.id,
			username: user.username,
			email: user.email,
			email_verified: true,
			name: user.full_name,
			given_name: user.given_name,
			family_name: user.family_name,
			claims: Claims::new(),
		}
	}
}
#[async_trait::async_trait]
impl IdentityBackend for ServerBackend {
	async fn run_with_context(&self, ctx: CancellationToken) -> Result<()> {
		self.manager.run_with_context(ctx).await?;

		tracing::info!(
			backend = self.name(),
			service_session = self.manager.uses_service_session(),
			"backend set up"
		);

		Ok(())
	}

	#[tracing::instrument(skip(self, password), fields(backend = self.name()))]
	async fn logon(
		&self,
		audience: &str,
		username: &str,
		password: &str,
	) -> Result<Option<LogonSuccess>> {
		let Some(outcome) = self.manager.logon(username, password).await? else {
			return Ok(None);
		};

		Ok(Some(LogonSuccess {
			user_id: outcome.user_entry_id,
			session_ref: Some(outcome.session_ref),
			claims: Claims::new(),
		}))
	}

	#[tracing::instrument(skip(self), fields(backend = self.name()))]
	async fn get_user(&self, user_id: &str, session_ref: Option<&str>) -> Result<Option<BackendUser>> {
		let session = self.manager.resolve_session_from_ref(session_ref, true, true, false).await?;
		let response: GetUserResponse = self
			.manager
			.executor()
			.run(session, |session| async move {
				session.client().get_user(user_id, session.id()).await
			})
			.await?;

		match response.status() {
			RemoteStatus::Success => {},
			RemoteStatus::NotFound => return Ok(None),
			status => return Err(Error::Remote { status }),
		}

		let user = response.user.ok_or(Error::Remote { status: RemoteStatus::NotFound })?;

		if user.user_entry_id != user_id {
			return Err(Error::UserMismatch {
				requested: user_id.to_owned(),
				returned: user.user_entry_id,
			});
		}

		Ok(Some(Self::user_from_remote(user)))
	}

	#[tracing::instrument(skip(self), fields(backend = self.name()))]
	async fn resolve_user_by_username(
		&self,
		username: &str,
		session_ref: Option<&str>,
	) -> Result<Option<BackendUser>> {
		let session = self.manager.resolve_session_from_ref(session_ref, true, true, false).await?;
		let response = self
			.manager
			.executor()
			.run(session, |session| async move {
				session.client().resolve_username(username, session.id()).await
			})
			.await?;

		match response.status() {
			RemoteStatus::Success => Ok(Some(BackendUser {
				subject: response.user_entry_id,
				id: response.id,
				username: username.to_owned(),
				..Default::default()
			})),
			RemoteStatus::NotFound => Ok(None),
			status => Err(Error::Remote { status }),
		}
	}

	async fn refresh_session(
		&self,
		_user_id: &str,
		session_ref: Option<&str>,
		_claims: &Claims,
	) -> Result<()> {
		self.manager.resolve_session_from_ref(session_ref, true, true, false).await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(backend = self.name()))]
	async fn destroy_session(&self, session_ref: Option<&str>) -> Result<()> {
		match self.manager.resolve_session_from_ref(session_ref, false, false, true).await? {
			Some(session) => session.destroy(true).await,
			None => Ok(()),
		}
	}

	fn user_claims(&self, user_id: &str, authorized_scopes: &HashSet<String>) -> Option<Claims> {
		if !authorized_scopes.contains(SCOPE_SERVER_ID) {
			return None;
		}

		let mut claims = Claims::new();

		claims.insert(SERVER_ID_CLAIM.into(), user_id.into());

		Some(claims)
	}

	fn scopes_supported(&self) -> Vec<String> {
		SUPPORTED_SCOPES
			.into_iter()
			.filter(|scope| self.allowed_scopes.as_ref().is_none_or(|allowed| allowed.contains(*scope)))
			.map(str::to_owned)
			.collect()
	}

	fn scopes_meta(&self) -> Option<ScopesMeta> {
		Some(ScopesMeta::default().with_definition(
			SCOPE_SERVER_ID,
			10,
			"Read your global user id on the identity server",
		))
	}

	fn name(&self) -> &str {
		self.manager.name()
	}
}
