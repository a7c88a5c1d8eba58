//! Contract with the remote identity source that backs [`ServerBackend`](super::server::ServerBackend).
//!
//! Every response type carries an explicit [`RemoteStatus`] exposed through [`RemoteResponse`], so the
//! retry executor can classify outcomes without knowing which call produced them.

// std
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, session::SessionId};

/// Session id the source reports when a logon did not open a session.
pub const NO_SESSION_ID: SessionId = 0;

/// Outcome code reported by the remote identity source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
	/// Call succeeded.
	Success,
	/// Requested object does not exist.
	NotFound,
	/// Credentials were rejected.
	LogonFailed,
	/// The session used for the call is no longer valid.
	EndOfSession,
	/// Transport between the source and its store failed.
	NetworkError,
	/// The source did not answer in time.
	Timeout,
	/// The source is temporarily unavailable.
	Unavailable,
	/// Any other source specific status code.
	Other(u32),
}
impl RemoteStatus {
	/// Whether the call succeeded.
	pub fn is_success(self) -> bool {
		matches!(self, Self::Success)
	}

	/// Whether repeating the call may produce a different outcome.
	pub fn is_transient(self) -> bool {
		matches!(self, Self::EndOfSession | Self::NetworkError | Self::Timeout | Self::Unavailable)
	}
}
impl Display for RemoteStatus {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Success => f.write_str("success"),
			Self::NotFound => f.write_str("not found"),
			Self::LogonFailed => f.write_str("logon failed"),
			Self::EndOfSession => f.write_str("end of session"),
			Self::NetworkError => f.write_str("network error"),
			Self::Timeout => f.write_str("timeout"),
			Self::Unavailable => f.write_str("unavailable"),
			Self::Other(code) => write!(f, "status {code:#x}"),
		}
	}
}

/// Shared view over every remote response type.
pub trait RemoteResponse {
	/// Status reported by the remote source for this call.
	fn status(&self) -> RemoteStatus;
}

/// Result of a remote logon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonResponse {
	/// Outcome of the call.
	pub status: RemoteStatus,
	/// Numeric session identifier assigned by the source, [`NO_SESSION_ID`] when none was opened.
	pub session_id: SessionId,
	/// Instance GUID of the server that owns the session.
	pub server_guid: String,
}

/// Result of resolving a username to a user entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveUserResponse {
	/// Outcome of the call.
	pub status: RemoteStatus,
	/// Entry identifier of the resolved user.
	pub user_entry_id: String,
	/// Numeric id of the resolved user.
	#[serde(default)]
	pub id: u64,
}

/// Result of fetching a user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserResponse {
	/// Outcome of the call.
	pub status: RemoteStatus,
	/// User record, present on success.
	pub user: Option<RemoteUser>,
}

/// Result of a call that only reports a status (refresh, logoff).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
	/// Outcome of the call.
	pub status: RemoteStatus,
}

macro_rules! impl_remote_response {
	($($ty:ty),+) => {
		$(
			impl RemoteResponse for $ty {
				fn status(&self) -> RemoteStatus {
					self.status
				}
			}
		)+
	};
}
impl_remote_response!(LogonResponse, ResolveUserResponse, GetUserResponse, StatusResponse);

/// User record as stored by the remote source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
	/// Stable entry identifier, used as the subject.
	pub user_entry_id: String,
	/// Numeric user id.
	pub id: u64,
	/// Login name.
	pub username: String,
	/// Display name.
	pub full_name: String,
	/// Primary mail address.
	pub email: String,
	/// Structured given name property, when the directory provides one.
	#[serde(default)]
	pub given_name: Option<String>,
	/// Structured family name property, when the directory provides one.
	#[serde(default)]
	pub family_name: Option<String>,
}

/// Client for the remote identity source.
///
/// Implementations report transport failures as [`Error::Transport`] and every protocol level
/// outcome through the response status.
#[async_trait::async_trait]
pub trait IdentityClient: Debug + Send + Sync {
	/// Authenticate the given credentials and open a session.
	async fn logon(&self, username: &str, password: &str) -> Result<LogonResponse>;

	/// Resolve a username to a user entry within `session`.
	async fn resolve_username(
		&self,
		username: &str,
		session: SessionId,
	) -> Result<ResolveUserResponse>;

	/// Fetch a user record by entry identifier within `session`.
	async fn get_user(&self, user_entry_id: &str, session: SessionId) -> Result<GetUserResponse>;

	/// Extend the lifetime of `session`.
	async fn refresh_session(&self, session: SessionId) -> Result<StatusResponse>;

	/// Tear down `session` on the source.
	async fn logoff(&self, session: SessionId) -> Result<StatusResponse>;
}
