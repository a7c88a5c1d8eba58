//! Crate-wide error types and `Result` alias.

// std
use std::path::PathBuf;
// self
use crate::{backend::remote::RemoteStatus, protocol::ProtocolError};

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the identity provider core.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Failed to parse key file {path:?}: {reason}")]
	KeyParse { path: PathBuf, reason: String },
	#[error("Invalid token: {0}")]
	InvalidToken(String),
	#[error("Invalid session reference '{0}'.")]
	InvalidSessionRef(String),
	#[error("No identity server session available.")]
	NoSession,
	#[error("Identity server session has ended.")]
	SessionEnded,
	#[error("Remote identity source returned {status}.")]
	Remote { status: RemoteStatus },
	#[error("Remote identity source transport failure: {0}")]
	Transport(String),
	#[error("Giving up remote call after {retries} retries: {source}")]
	RetriesExhausted {
		retries: u32,
		#[source]
		source: Box<Error>,
	},
	#[error("Operation cancelled.")]
	Cancelled,
	#[error("Backend returned user '{returned}' when '{requested}' was requested.")]
	UserMismatch { requested: String, returned: String },
	#[error("Unexpected HTTP status {status} from {url}.")]
	HttpStatus { status: http::StatusCode, url: url::Url },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether the failure may succeed when the remote call is attempted again.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Remote { status } => status.is_transient(),
			_ => false,
		}
	}

	/// Remote status carried by the error, looking through retry annotations.
	pub fn remote_status(&self) -> Option<RemoteStatus> {
		match self {
			Self::Remote { status } => Some(*status),
			Self::RetriesExhausted { source, .. } => source.remote_status(),
			_ => None,
		}
	}
}
#[cfg(feature = "prometheus")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
