//! Concurrent per-login session cache.

// crates.io
use dashmap::{DashMap, mapref::entry::Entry};
// self
use crate::{_prelude::*, session::handle::Session};

/// Per-login sessions keyed by their reference string.
///
/// Insertion is first-writer-wins so at most one session object exists per reference.
#[derive(Debug, Default)]
pub struct SessionStore {
	sessions: DashMap<String, Arc<Session>>,
}
impl SessionStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Cached session for `reference`.
	pub fn get(&self, reference: &str) -> Option<Arc<Session>> {
		self.sessions.get(reference).map(|entry| entry.value().clone())
	}

	/// Insert `session` unless the reference is already cached.
	///
	/// Returns the session every caller should use, and whether `session` was the one stored.
	pub fn insert_if_absent(&self, reference: String, session: Arc<Session>) -> (Arc<Session>, bool) {
		match self.sessions.entry(reference) {
			Entry::Occupied(entry) => (entry.get().clone(), false),
			Entry::Vacant(entry) => {
				entry.insert(session.clone());

				(session, true)
			},
		}
	}

	/// Remove and return the session cached for `reference`.
	pub fn remove(&self, reference: &str) -> Option<Arc<Session>> {
		self.sessions.remove(reference).map(|(_, session)| session)
	}

	/// Point-in-time copy of every cached entry.
	pub fn snapshot(&self) -> Vec<(String, Arc<Session>)> {
		self.sessions.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
	}

	/// Evict every inactive session, returning how many were removed.
	pub fn sweep(&self) -> usize {
		let expired = self
			.snapshot()
			.into_iter()
			.filter(|(_, session)| !session.is_active())
			.map(|(reference, _)| reference)
			.collect::<Vec<_>>();

		expired
			.iter()
			.filter(|reference| {
				self.sessions.remove_if(reference.as_str(), |_, session| !session.is_active()).is_some()
			})
			.count()
	}

	/// Number of cached sessions.
	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	/// Whether the store is empty.
	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio_util::sync::CancellationToken;
	// self
	use super::*;
	use crate::{backend::remote::scripted::ScriptedClient, session::reference::SessionRef};

	fn session(id: u64, root: &CancellationToken) -> Arc<Session> {
		Session::new(SessionRef::new(id, "guid"), Arc::new(ScriptedClient::default()), root)
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_registration_keeps_the_first_writer() {
		let root = CancellationToken::new();
		let store = Arc::new(SessionStore::new());
		let mut tasks = Vec::new();

		for _ in 0..16 {
			let store = store.clone();
			let candidate = session(42, &root);

			tasks.push(tokio::spawn(async move {
				store.insert_if_absent("42@guid".into(), candidate)
			}));
		}

		let mut winners = Vec::new();

		for task in tasks {
			winners.push(task.await.expect("join"));
		}

		assert_eq!(store.len(), 1);
		assert_eq!(winners.iter().filter(|(_, inserted)| *inserted).count(), 1);

		let cached = store.get("42@guid").expect("cached session");

		assert!(winners.iter().all(|(session, _)| Arc::ptr_eq(session, &cached)));
		assert!(cached.is_active());
	}

	#[tokio::test]
	async fn sweep_evicts_only_inactive_sessions() -> Result<()> {
		let root = CancellationToken::new();
		let store = SessionStore::new();
		let alive = session(1, &root);
		let dead = session(2, &root);

		store.insert_if_absent("1@guid".into(), alive.clone());
		store.insert_if_absent("2@guid".into(), dead.clone());
		dead.destroy(false).await?;

		assert_eq!(store.sweep(), 1);
		assert!(store.get("1@guid").is_some());
		assert!(store.get("2@guid").is_none());
		assert_eq!(store.sweep(), 0);

		Ok(())
	}

	#[test]
	fn remove_returns_the_cached_session() {
		let root = CancellationToken::new();
		let store = SessionStore::new();

		store.insert_if_absent("5@guid".into(), session(5, &root));

		assert_eq!(store.remove("5@guid").map(|session| session.id()), Some(5));
		assert!(store.is_empty());
		assert!(store.remove("5@guid").is_none());
	}
}
