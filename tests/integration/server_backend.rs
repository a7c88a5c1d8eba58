//! Integration tests for the remote identity server backend.

// std
use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicU64, AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use idp_core::{
	BackendUser, IdentityBackend, Result, ServerBackend, SessionPolicy,
	backend::{
		IdentityClient, RemoteStatus, RemoteUser,
		remote::{GetUserResponse, LogonResponse, ResolveUserResponse, StatusResponse},
	},
	session::{ServiceCredentials, ServiceState, SessionId},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Directory {
	users: HashMap<String, (String, RemoteUser)>,
	get_user_failures: Mutex<VecDeque<RemoteStatus>>,
	next_session: AtomicU64,
	get_user_calls: AtomicUsize,
	logoff_calls: AtomicUsize,
}
impl Directory {
	fn with_user(mut self, password: &str, user: RemoteUser) -> Self {
		self.users.insert(user.username.clone(), (password.into(), user));

		self
	}

	fn fail_get_user(&self, status: RemoteStatus) {
		self.get_user_failures.lock().unwrap().push_back(status);
	}
}
#[async_trait::async_trait]
impl IdentityClient for Directory {
	async fn logon(&self, username: &str, password: &str) -> Result<LogonResponse> {
		Ok(match self.users.get(username) {
			Some((expected, _)) if expected == password => LogonResponse {
				status: RemoteStatus::Success,
				session_id: self.next_session.fetch_add(1, Ordering::SeqCst) + 1,
				server_guid: "directory-1".into(),
			},
			_ => LogonResponse {
				status: RemoteStatus::LogonFailed,
				session_id: 0,
				server_guid: "directory-1".into(),
			},
		})
	}

	async fn resolve_username(&self, username: &str, _: SessionId) -> Result<ResolveUserResponse> {
		Ok(match self.users.get(username) {
			Some((_, user)) => ResolveUserResponse {
				status: RemoteStatus::Success,
				user_entry_id: user.user_entry_id.clone(),
				id: user.id,
			},
			None => ResolveUserResponse {
				status: RemoteStatus::NotFound,
				user_entry_id: String::new(),
				id: 0,
			},
		})
	}

	async fn get_user(&self, user_entry_id: &str, _: SessionId) -> Result<GetUserResponse> {
		self.get_user_calls.fetch_add(1, Ordering::SeqCst);

		if let Some(status) = self.get_user_failures.lock().unwrap().pop_front() {
			return Ok(GetUserResponse { status, user: None });
		}

		let user = self
			.users
			.values()
			.find(|(_, user)| user.user_entry_id == user_entry_id)
			.map(|(_, user)| user.clone());

		Ok(GetUserResponse {
			status: if user.is_some() { RemoteStatus::Success } else { RemoteStatus::NotFound },
			user,
		})
	}

	async fn refresh_session(&self, _: SessionId) -> Result<StatusResponse> {
		Ok(StatusResponse { status: RemoteStatus::Success })
	}

	async fn logoff(&self, _: SessionId) -> Result<StatusResponse> {
		self.logoff_calls.fetch_add(1, Ordering::SeqCst);

		Ok(StatusResponse { status: RemoteStatus::Success })
	}
}

fn carol() -> RemoteUser {
	RemoteUser {
		user_entry_id: "entry-carol".into(),
		id: 42,
		username: "carol".into(),
		full_name: "Carol Danvers".into(),
		email: "carol@example.com".into(),
		..Default::default()
	}
}

fn policy() -> SessionPolicy {
	SessionPolicy {
		retry_backoff: Duration::from_millis(5),
		service_retry_delay: Duration::from_millis(20),
		..Default::default()
	}
}

#[tokio::test]
async fn per_login_sessions_follow_the_user() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let directory = Arc::new(Directory::default().with_user("marvel", carol()));
	let backend = ServerBackend::new("directory", directory.clone(), None, policy())?;

	backend.run_with_context(CancellationToken::new()).await?;

	assert!(backend.logon("client", "carol", "wrong").await?.is_none());

	let success = backend.logon("client", "carol", "marvel").await?.expect("logon");
	let session_ref = success.session_ref.expect("session reference");
	let user: BackendUser =
		backend.get_user(&success.user_id, Some(&session_ref)).await?.expect("user");

	assert_eq!(user.subject, "entry-carol");
	assert_eq!(user.id, 42);
	assert_eq!(user.name, "Carol Danvers");
	assert_eq!(
		backend.resolve_user_by_username("carol", Some(&session_ref)).await?.map(|u| u.id),
		Some(42)
	);
	assert_eq!(backend.manager().store().len(), 1);

	backend.destroy_session(Some(&session_ref)).await?;

	assert_eq!(directory.logoff_calls.load(Ordering::SeqCst), 1);
	assert!(backend.manager().store().is_empty());

	backend.shutdown().await;

	Ok(())
}

#[tokio::test]
async fn service_session_retries_transient_failures() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let directory = Arc::new(
		Directory::default().with_user("marvel", carol()).with_user("service-secret", RemoteUser {
			user_entry_id: "entry-service".into(),
			username: "svc".into(),
			..Default::default()
		}),
	);
	let backend = ServerBackend::new(
		"directory",
		directory.clone(),
		Some(ServiceCredentials::new("svc", "service-secret")),
		policy(),
	)?;
	let mut states = backend.manager().subscribe();

	backend.run_with_context(CancellationToken::new()).await?;

	tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == ServiceState::Active))
		.await
		.expect("service session in time")
		.expect("state channel open");

	let resolved = backend.resolve_user_by_username("carol", None).await?.expect("resolved");

	assert_eq!(resolved.subject, "entry-carol");
	assert!(backend.resolve_user_by_username("nobody", None).await?.is_none());

	directory.fail_get_user(RemoteStatus::Timeout);
	directory.fail_get_user(RemoteStatus::NetworkError);

	let user = backend.get_user("entry-carol", None).await?.expect("user");

	assert_eq!(user.email, "carol@example.com");
	assert_eq!(directory.get_user_calls.load(Ordering::SeqCst), 3);
	assert_eq!(backend.manager().metrics().snapshot().retries, 2);

	backend.shutdown().await;

	assert_eq!(backend.manager().service_state(), ServiceState::Stopped);

	Ok(())
}
