//! Session manager owning the service session and the per-login session cache.

// crates.io
use serde::{Deserialize, Serialize};
use tokio::{
	sync::{Mutex, watch},
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	backend::remote::{IdentityClient, NO_SESSION_ID, RemoteResponse, RemoteStatus},
	metrics::BackendMetrics,
	session::{
		handle::{ServiceSlot, Session},
		reference::SessionRef,
		retry::RetryExecutor,
		store::SessionStore,
	},
};

/// Username used for the service session when none is configured.
pub const DEFAULT_SERVICE_USERNAME: &str = "SYSTEM";

/// Timing and retry configuration for a session manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
	/// Retries performed after the first failed remote call.
	pub max_retries: u32,
	/// Fixed delay between remote call attempts.
	pub retry_backoff: Duration,
	/// Interval of the inactive session sweep.
	pub sweep_interval: Duration,
	/// Delay before re-establishing a service session after a failed attempt.
	pub service_retry_delay: Duration,
	/// Interval at which live sessions are refreshed.
	pub keepalive_interval: Duration,
}
impl SessionPolicy {
	/// Validate invariants for the policy.
	pub fn validate(&self) -> Result<()> {
		for (field, value) in [
			("session_policy.retry_backoff", self.retry_backoff),
			("session_policy.sweep_interval", self.sweep_interval),
			("session_policy.service_retry_delay", self.service_retry_delay),
			("session_policy.keepalive_interval", self.keepalive_interval),
		] {
			if value.is_zero() {
				return Err(Error::Validation { field, reason: "Must be greater than zero.".into() });
			}
		}

		Ok(())
	}
}
impl Default for SessionPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			retry_backoff: Duration::from_millis(50),
			sweep_interval: Duration::from_secs(1),
			service_retry_delay: Duration::from_secs(5),
			keepalive_interval: Duration::from_secs(60),
		}
	}
}

/// Credentials of the long-lived service session.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServiceCredentials {
	/// Service account name; empty selects [`DEFAULT_SERVICE_USERNAME`].
	#[serde(default)]
	pub username: String,
	/// Service account password.
	pub password: String,
}
impl ServiceCredentials {
	/// Build credentials for the given account.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: password.into() }
	}

	/// Account name actually used to log on.
	pub fn effective_username(&self) -> &str {
		if self.username.is_empty() { DEFAULT_SERVICE_USERNAME } else { &self.username }
	}
}
impl std::fmt::Debug for ServiceCredentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ServiceCredentials")
			.field("username", &self.effective_username())
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Lifecycle of the service session maintenance loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
	/// Logging on to the identity source.
	Connecting,
	/// A service session is published.
	Active,
	/// The last attempt failed; waiting for the retry delay.
	WaitingRetry,
	/// The loop is not running.
	Stopped,
}

/// Successful remote logon resolved to a user and a cached session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogonOutcome {
	/// Entry identifier of the authenticated user.
	pub user_entry_id: String,
	/// Numeric id of the authenticated user.
	pub user_id: u64,
	/// Opaque session reference for the HTTP layer.
	pub session_ref: String,
}

/// Owns the sessions of one backend.
#[derive(Debug)]
pub struct SessionManager {
	client: Arc<dyn IdentityClient>,
	credentials: Option<ServiceCredentials>,
	policy: SessionPolicy,
	root: CancellationToken,
	service: Arc<ServiceSlot>,
	store: Arc<SessionStore>,
	executor: RetryExecutor,
	state: Arc<watch::Sender<ServiceState>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	metrics: Arc<BackendMetrics>,
}
impl SessionManager {
	/// Build a manager for `client`. With credentials a service session is maintained once running.
	pub fn new(
		name: impl Into<String>,
		client: Arc<dyn IdentityClient>,
		credentials: Option<ServiceCredentials>,
		policy: SessionPolicy,
	) -> Result<Self> {
		policy.validate()?;

		let root = CancellationToken::new();
		let service = Arc::new(ServiceSlot::default());
		let metrics = BackendMetrics::new(name);
		let executor = RetryExecutor::new(&policy, service.clone(), root.clone(), metrics.clone());
		let (state, _) = watch::channel(ServiceState::Stopped);

		Ok(Self {
			client,
			credentials,
			policy,
			root,
			service,
			store: Arc::new(SessionStore::new()),
			executor,
			state: Arc::new(state),
			tasks: Mutex::new(Vec::new()),
			metrics,
		})
	}

	/// Backend name used in logs and metrics.
	pub fn name(&self) -> &str {
		self.metrics.backend()
	}

	/// Whether remote calls run in the shared service session.
	pub fn uses_service_session(&self) -> bool {
		self.credentials.is_some()
	}

	/// Active policy.
	pub fn policy(&self) -> &SessionPolicy {
		&self.policy
	}

	/// Per-backend metrics accumulator.
	pub fn metrics(&self) -> Arc<BackendMetrics> {
		self.metrics.clone()
	}

	/// Retry executor bound to this manager's service session and shutdown signal.
	pub fn executor(&self) -> &RetryExecutor {
		&self.executor
	}

	/// Per-login session cache.
	pub fn store(&self) -> &SessionStore {
		&self.store
	}

	/// Currently published service session.
	pub async fn service_session(&self) -> Option<Arc<Session>> {
		self.service.current().await
	}

	/// Current state of the service session loop.
	pub fn service_state(&self) -> ServiceState {
		*self.state.borrow()
	}

	/// Subscribe to service session state changes.
	pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
		self.state.subscribe()
	}

	/// Start the background maintenance tasks, bound to `ctx`.
	///
	/// Returns once the tasks are spawned; they run until `ctx` is cancelled or
	/// [`shutdown`](Self::shutdown) is called.
	pub async fn run_with_context(&self, ctx: CancellationToken) -> Result<()> {
		if self.root.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let mut tasks = self.tasks.lock().await;

		if !tasks.is_empty() {
			return Err(Error::Config(format!("Backend {} is already running.", self.name())));
		}

		let root = self.root.clone();

		tasks.push(tokio::spawn(async move {
			tokio::select! {
				_ = ctx.cancelled() => root.cancel(),
				_ = root.cancelled() => {},
			}
		}));

		if let Some(credentials) = self.credentials.clone() {
			tracing::info!(
				backend = self.name(),
				username = credentials.effective_username(),
				"service session enabled"
			);

			tasks.push(tokio::spawn(maintain_service_session(ServiceLoop {
				client: self.client.clone(),
				credentials,
				policy: self.policy.clone(),
				root: self.root.clone(),
				service: self.service.clone(),
				state: self.state.clone(),
				metrics: self.metrics.clone(),
			})));
		}

		tasks.push(tokio::spawn(sweep_sessions(
			self.store.clone(),
			self.policy.sweep_interval,
			self.root.clone(),
			self.metrics.clone(),
		)));

		Ok(())
	}

	/// Cancel every background task and wait for them to exit.
	pub async fn shutdown(&self) {
		self.root.cancel();

		let tasks = std::mem::take(&mut *self.tasks.lock().await);

		for task in tasks {
			if let Err(err) = task.await {
				tracing::warn!(backend = self.name(), error = %err, "session task failed");
			}
		}

		self.service.publish(None).await;
		self.state.send_replace(ServiceState::Stopped);
	}

	/// Authenticate against the identity source.
	///
	/// Rejected credentials yield `Ok(None)`; every other non-success status is an error.
	#[tracing::instrument(skip(self, password), fields(backend = self.name()))]
	pub async fn logon(&self, username: &str, password: &str) -> Result<Option<LogonOutcome>> {
		let response = self.client.logon(username, password).await?;

		match response.status() {
			RemoteStatus::Success => {},
			RemoteStatus::LogonFailed => {
				self.metrics.record_logon(false);

				return Ok(None);
			},
			status => return Err(Error::Remote { status }),
		}
		if response.session_id == NO_SESSION_ID {
			return Err(Error::NoSession);
		}

		let reference = SessionRef::new(response.session_id, response.server_guid);
		let session_ref = reference.to_string();
		let session = match self.store.get(&session_ref) {
			Some(session) => {
				session.refresh().await?;

				session
			},
			None => Session::new(reference, self.client.clone(), &self.root),
		};
		let resolved = self
			.executor
			.run(Some(session.clone()), |session| async move {
				session.client().resolve_username(username, session.id()).await
			})
			.await?;

		if !resolved.status().is_success() {
			return Err(Error::Remote { status: resolved.status() });
		}

		self.register(&session_ref, session);
		self.metrics.record_logon(true);

		tracing::debug!(session = %session_ref, id = %resolved.user_entry_id, "logon");

		Ok(Some(LogonOutcome {
			user_entry_id: resolved.user_entry_id,
			user_id: resolved.id,
			session_ref,
		}))
	}

	/// Resolve the session for an opaque reference.
	///
	/// Service-session backends do not track per-login sessions and always yield `Ok(None)`, as does
	/// a missing reference. Unknown references are reconstructed from their parts.
	#[tracing::instrument(skip(self), fields(backend = self.name()))]
	pub async fn resolve_session_from_ref(
		&self,
		reference: Option<&str>,
		register: bool,
		refresh: bool,
		remove_if_registered: bool,
	) -> Result<Option<Arc<Session>>> {
		if self.uses_service_session() {
			return Ok(None);
		}

		let Some(reference) = reference else {
			return Ok(None);
		};

		if let Some(session) = self.store.get(reference) {
			if refresh {
				session.refresh().await?;
			}
			if remove_if_registered {
				self.store.remove(reference);
			}

			return Ok(Some(session));
		}

		let parsed = SessionRef::parse(reference)?;
		let mut session = Session::new(parsed, self.client.clone(), &self.root);

		if register {
			session = self.register(reference, session);
		}
		if refresh {
			session.refresh().await?;
		}

		Ok(Some(session))
	}

	fn register(&self, reference: &str, session: Arc<Session>) -> Arc<Session> {
		let (session, inserted) = self.store.insert_if_absent(reference.to_owned(), session);

		if inserted {
			session.spawn_keepalive(self.policy.keepalive_interval);

			self.metrics.record_session_registered();

			tracing::debug!(backend = self.name(), session = reference, "session registered");
		}

		session
	}
}

struct ServiceLoop {
	client: Arc<dyn IdentityClient>,
	credentials: ServiceCredentials,
	policy: SessionPolicy,
	root: CancellationToken,
	service: Arc<ServiceSlot>,
	state: Arc<watch::Sender<ServiceState>>,
	metrics: Arc<BackendMetrics>,
}

async fn maintain_service_session(ctx: ServiceLoop) {
	let backend = ctx.metrics.backend();

	loop {
		ctx.service.publish(None).await;
		ctx.state.send_replace(ServiceState::Connecting);

		let attempt = Session::establish(
			ctx.client.clone(),
			ctx.credentials.effective_username(),
			&ctx.credentials.password,
			&ctx.root,
		);
		let established = tokio::select! {
			biased;

			_ = ctx.root.cancelled() => break,
			result = attempt => result,
		};
		let session = match established {
			Ok(session) => {
				tracing::debug!(backend, session = %session.reference(), "service session established");

				session.spawn_keepalive(ctx.policy.keepalive_interval);
				ctx.service.publish(Some(session.clone())).await;
				ctx.state.send_replace(ServiceState::Active);

				Some(session)
			},
			Err(err) => {
				tracing::error!(backend, error = %err, "failed to create service session");

				ctx.state.send_replace(ServiceState::WaitingRetry);

				None
			},
		};
		let wait = async {
			match &session {
				Some(session) => {
					session.ended().await;

					tracing::debug!(backend, session = %session.reference(), "service session has ended");
				},
				None => time::sleep(ctx.policy.service_retry_delay).await,
			}
		};

		tokio::select! {
			biased;

			_ = ctx.root.cancelled() => break,
			_ = wait => {},
		}
	}

	ctx.service.publish(None).await;
	ctx.state.send_replace(ServiceState::Stopped);
}

async fn sweep_sessions(
	store: Arc<SessionStore>,
	interval: Duration,
	root: CancellationToken,
	metrics: Arc<BackendMetrics>,
) {
	let mut ticker = time::interval(interval);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = root.cancelled() => break,
			_ = ticker.tick() => {
				let swept = store.sweep();

				if swept > 0 {
					tracing::debug!(backend = metrics.backend(), swept, "evicted inactive sessions");

					metrics.record_sessions_swept(swept);
				}
			},
		}
	}
}
