//! Live session handles and the published service session slot.

// std
use std::sync::Weak;
// crates.io
use tokio::{sync::RwLock, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	backend::remote::{IdentityClient, NO_SESSION_ID, RemoteResponse, RemoteStatus},
	session::{SessionId, reference::SessionRef},
};

/// Authenticated connection to the remote identity source.
///
/// A session is active until it is destroyed, reported as ended by the source, or its owning
/// manager shuts down. The end is observable exactly once through [`Session::ended`].
#[derive(Debug)]
pub struct Session {
	reference: SessionRef,
	client: Arc<dyn IdentityClient>,
	ended: CancellationToken,
}
impl Session {
	/// Wrap an existing remote session. The session ends when `parent` is cancelled.
	pub fn new(
		reference: SessionRef,
		client: Arc<dyn IdentityClient>,
		parent: &CancellationToken,
	) -> Arc<Self> {
		Arc::new(Self { reference, client, ended: parent.child_token() })
	}

	/// Open a new session by logging on with the given credentials.
	#[tracing::instrument(skip(client, password, parent))]
	pub async fn establish(
		client: Arc<dyn IdentityClient>,
		username: &str,
		password: &str,
		parent: &CancellationToken,
	) -> Result<Arc<Self>> {
		let response = client.logon(username, password).await?;

		if !response.status().is_success() {
			return Err(Error::Remote { status: response.status() });
		}
		if response.session_id == NO_SESSION_ID {
			return Err(Error::NoSession);
		}

		Ok(Self::new(SessionRef::new(response.session_id, response.server_guid), client, parent))
	}

	/// Numeric session id.
	pub fn id(&self) -> SessionId {
		self.reference.id
	}

	/// Reference that can later be used to reconstruct this session.
	pub fn reference(&self) -> &SessionRef {
		&self.reference
	}

	/// Client bound to this session.
	pub fn client(&self) -> &dyn IdentityClient {
		self.client.as_ref()
	}

	/// Whether the session can still be used.
	pub fn is_active(&self) -> bool {
		!self.ended.is_cancelled()
	}

	/// Wait until the session has ended.
	pub async fn ended(&self) {
		self.ended.cancelled().await;
	}

	/// Ask the source to extend the session.
	///
	/// An end-of-session answer ends the session locally as well.
	#[tracing::instrument(skip(self), fields(session = %self.reference))]
	pub async fn refresh(&self) -> Result<()> {
		if !self.is_active() {
			return Err(Error::SessionEnded);
		}

		let response = self.client.refresh_session(self.id()).await?;

		match response.status() {
			RemoteStatus::Success => Ok(()),
			RemoteStatus::EndOfSession => {
				tracing::debug!("session ended by remote source");

				self.end();

				Err(Error::Remote { status: RemoteStatus::EndOfSession })
			},
			status => Err(Error::Remote { status }),
		}
	}

	/// End the session, optionally asking the source to tear it down as well.
	#[tracing::instrument(skip(self), fields(session = %self.reference))]
	pub async fn destroy(&self, notify_remote: bool) -> Result<()> {
		let result = if notify_remote {
			match self.client.logoff(self.id()).await {
				Ok(response) if response.status().is_success() => Ok(()),
				Ok(response) => Err(Error::Remote { status: response.status() }),
				Err(err) => Err(err),
			}
		} else {
			Ok(())
		};

		self.end();

		result
	}

	/// Keep the session alive by refreshing it every `interval` until it ends.
	pub fn spawn_keepalive(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
		let session = Arc::downgrade(self);
		let ended = self.ended.clone();

		tokio::spawn(keepalive(session, ended, interval))
	}

	fn end(&self) {
		self.ended.cancel();
	}
}

async fn keepalive(session: Weak<Session>, ended: CancellationToken, interval: Duration) {
	let mut ticker = time::interval_at(Instant::now() + interval, interval);

	loop {
		tokio::select! {
			_ = ended.cancelled() => break,
			_ = ticker.tick() => {
				let Some(session) = session.upgrade() else { break };

				if let Err(err) = session.refresh().await {
					tracing::debug!(session = %session.reference, error = %err, "session keepalive failed");
				}
			},
		}
	}
}

/// Reader/writer guarded slot holding the currently published service session.
#[derive(Debug, Default)]
pub struct ServiceSlot {
	session: RwLock<Option<Arc<Session>>>,
}
impl ServiceSlot {
	/// Currently published session, if any.
	pub async fn current(&self) -> Option<Arc<Session>> {
		self.session.read().await.clone()
	}

	pub(crate) async fn publish(&self, session: Option<Arc<Session>>) {
		*self.session.write().await = session;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::backend::remote::scripted::ScriptedClient;

	fn session_with(client: Arc<ScriptedClient>) -> (Arc<Session>, CancellationToken) {
		let root = CancellationToken::new();
		let session = Session::new(SessionRef::new(9, "guid"), client, &root);

		(session, root)
	}

	#[tokio::test]
	async fn end_of_session_on_refresh_ends_the_session() -> Result<()> {
		let client = Arc::new(ScriptedClient::default());

		client.queue_refresh(RemoteStatus::EndOfSession);

		let (session, _root) = session_with(client.clone());
		let err = session.refresh().await.expect_err("refresh must fail");

		assert_eq!(err.remote_status(), Some(RemoteStatus::EndOfSession));
		assert!(!session.is_active());
		assert!(matches!(session.refresh().await, Err(Error::SessionEnded)));

		Ok(())
	}

	#[tokio::test]
	async fn destroy_notifies_remote_only_on_request() -> Result<()> {
		let client = Arc::new(ScriptedClient::default());
		let (quiet, _root) = session_with(client.clone());

		quiet.destroy(false).await?;

		assert_eq!(client.logoff_calls(), 0);
		assert!(!quiet.is_active());

		let (loud, _root) = session_with(client.clone());

		loud.destroy(true).await?;

		assert_eq!(client.logoff_calls(), 1);
		assert!(!loud.is_active());

		Ok(())
	}

	#[tokio::test]
	async fn parent_cancellation_ends_the_session() {
		let client = Arc::new(ScriptedClient::default());
		let (session, root) = session_with(client);

		root.cancel();
		session.ended().await;

		assert!(!session.is_active());
	}

	#[tokio::test(start_paused = true)]
	async fn keepalive_refreshes_until_the_session_ends() {
		let client = Arc::new(ScriptedClient::default());
		let (session, _root) = session_with(client.clone());
		let task = session.spawn_keepalive(Duration::from_secs(60));

		time::sleep(Duration::from_secs(125)).await;

		assert_eq!(client.refresh_calls(), 2);

		client.queue_refresh(RemoteStatus::EndOfSession);
		time::sleep(Duration::from_secs(60)).await;
		task.await.expect("keepalive task");

		assert_eq!(client.refresh_calls(), 3);
		assert!(!session.is_active());
	}
}
