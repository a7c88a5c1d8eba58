//! Bounded retry of remote identity source calls.

// std
use std::future::Future;
// crates.io
use tokio::time;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	backend::remote::{RemoteResponse, RemoteStatus},
	metrics::BackendMetrics,
	session::{
		handle::{ServiceSlot, Session},
		manager::SessionPolicy,
	},
};

/// Runs remote operations against a session, retrying transient failures with a fixed backoff.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
	max_retries: u32,
	backoff: Duration,
	service: Arc<ServiceSlot>,
	shutdown: CancellationToken,
	metrics: Arc<BackendMetrics>,
}
impl RetryExecutor {
	/// Create an executor that falls back to the session published in `service`.
	pub fn new(
		policy: &SessionPolicy,
		service: Arc<ServiceSlot>,
		shutdown: CancellationToken,
		metrics: Arc<BackendMetrics>,
	) -> Self {
		Self {
			max_retries: policy.max_retries,
			backoff: policy.retry_backoff,
			service,
			shutdown,
			metrics,
		}
	}

	/// Execute `op` with `session`, or with the published service session when none is given.
	///
	/// A response whose status is transient counts as a failure. Any other response, successful
	/// or not, is returned to the caller for interpretation. An end-of-session failure destroys the
	/// session locally and the next attempt uses the current service session.
	pub async fn run<T, Op, Fut>(&self, session: Option<Arc<Session>>, mut op: Op) -> Result<T>
	where
		T: RemoteResponse,
		Op: FnMut(Arc<Session>) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut session = session;
		let mut retries = 0;

		loop {
			let current = match session.take() {
				Some(session) => session,
				None => self.service.current().await.ok_or(Error::NoSession)?,
			};

			if !current.is_active() {
				return Err(Error::NoSession);
			}

			let failure = match op(current.clone()).await {
				Ok(response) => {
					let status = response.status();

					if status.is_success() || !status.is_transient() {
						return Ok(response);
					}

					Error::Remote { status }
				},
				Err(err) if err.is_transient() => err,
				Err(err) => return Err(err),
			};

			if failure.remote_status() == Some(RemoteStatus::EndOfSession) {
				let _ = current.destroy(false).await;
			} else {
				session = Some(current);
			}

			if retries >= self.max_retries {
				tracing::error!(
					backend = self.metrics.backend(),
					retry = retries,
					error = %failure,
					"giving up remote call"
				);

				self.metrics.record_retries_exhausted();

				return Err(Error::RetriesExhausted { retries, source: Box::new(failure) });
			}

			tokio::select! {
				_ = self.shutdown.cancelled() => return Err(Error::Cancelled),
				_ = time::sleep(self.backoff) => {},
			}

			retries += 1;

			tracing::debug!(
				backend = self.metrics.backend(),
				retry = retries,
				error = %failure,
				"remote call retry in progress"
			);

			self.metrics.record_retry();
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		backend::remote::{StatusResponse, scripted::ScriptedClient},
		session::reference::SessionRef,
	};

	struct Harness {
		executor: RetryExecutor,
		service: Arc<ServiceSlot>,
		root: CancellationToken,
		metrics: Arc<BackendMetrics>,
	}
	impl Harness {
		fn new() -> Self {
			let root = CancellationToken::new();
			let service = Arc::new(ServiceSlot::default());
			let metrics = BackendMetrics::new("test");
			let executor =
				RetryExecutor::new(&SessionPolicy::default(), service.clone(), root.clone(), metrics.clone());

			Self { executor, service, root, metrics }
		}

		fn session(&self, id: u64) -> Arc<Session> {
			Session::new(SessionRef::new(id, "guid"), Arc::new(ScriptedClient::default()), &self.root)
		}
	}

	#[tokio::test(start_paused = true)]
	async fn always_transient_failure_uses_the_whole_budget() {
		let harness = Harness::new();
		let attempts = AtomicUsize::new(0);
		let started = Instant::now();
		let err = harness
			.executor
			.run(Some(harness.session(1)), |_| {
				attempts.fetch_add(1, Ordering::SeqCst);

				async { Ok(StatusResponse { status: RemoteStatus::NetworkError }) }
			})
			.await
			.expect_err("must give up");

		assert_eq!(attempts.load(Ordering::SeqCst), 4);
		assert!(started.elapsed() >= Duration::from_millis(150));
		assert!(started.elapsed() < Duration::from_millis(200));
		assert!(matches!(err, Error::RetriesExhausted { retries: 3, .. }));
		assert_eq!(err.remote_status(), Some(RemoteStatus::NetworkError));
		assert_eq!(harness.metrics.snapshot().retries, 3);
		assert_eq!(harness.metrics.snapshot().retries_exhausted, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_during_backoff_returns_immediately() {
		let harness = Harness::new();
		let root = harness.root.clone();
		let attempts = AtomicUsize::new(0);
		let err = harness
			.executor
			.run(Some(harness.session(1)), |_| {
				attempts.fetch_add(1, Ordering::SeqCst);
				root.cancel();

				async { Err::<StatusResponse, _>(Error::Transport("reset".into())) }
			})
			.await
			.expect_err("must be cancelled");

		assert!(matches!(err, Error::Cancelled));
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn terminal_statuses_are_returned_without_retry() -> Result<()> {
		let harness = Harness::new();
		let attempts = AtomicUsize::new(0);
		let response = harness
			.executor
			.run(Some(harness.session(1)), |_| {
				attempts.fetch_add(1, Ordering::SeqCst);

				async { Ok(StatusResponse { status: RemoteStatus::NotFound }) }
			})
			.await?;

		assert_eq!(response.status, RemoteStatus::NotFound);
		assert_eq!(attempts.load(Ordering::SeqCst), 1);

		Ok(())
	}

	#[tokio::test]
	async fn non_transient_errors_are_returned_without_retry() {
		let harness = Harness::new();
		let attempts = AtomicUsize::new(0);
		let err = harness
			.executor
			.run(Some(harness.session(1)), |_| {
				attempts.fetch_add(1, Ordering::SeqCst);

				async { Err::<StatusResponse, _>(Error::InvalidSessionRef("bogus".into())) }
			})
			.await
			.expect_err("must fail");

		assert!(matches!(err, Error::InvalidSessionRef(_)));
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn end_of_session_switches_to_the_service_session() -> Result<()> {
		let harness = Harness::new();
		let stale = harness.session(1);
		let fresh = harness.session(2);

		harness.service.publish(Some(fresh.clone())).await;

		let seen = std::sync::Mutex::new(Vec::new());
		let response = harness
			.executor
			.run(Some(stale.clone()), |session| {
				seen.lock().unwrap().push(session.id());

				let status = if session.id() == 1 {
					RemoteStatus::EndOfSession
				} else {
					RemoteStatus::Success
				};

				async move { Ok(StatusResponse { status }) }
			})
			.await?;

		assert_eq!(response.status, RemoteStatus::Success);
		assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
		assert!(!stale.is_active());
		assert!(fresh.is_active());

		Ok(())
	}

	#[tokio::test]
	async fn missing_session_fails_without_calling_the_source() {
		let harness = Harness::new();
		let attempts = AtomicUsize::new(0);
		let err = harness
			.executor
			.run(None, |_| {
				attempts.fetch_add(1, Ordering::SeqCst);

				async { Ok(StatusResponse { status: RemoteStatus::Success }) }
			})
			.await
			.expect_err("no session");

		assert!(matches!(err, Error::NoSession));
		assert_eq!(attempts.load(Ordering::SeqCst), 0);
	}
}
