//! OAuth 2.0 and OpenID Connect protocol vocabulary and the structured protocol error.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// `response_type=code`.
pub const RESPONSE_TYPE_CODE: &str = "code";
/// `response_type=token`.
pub const RESPONSE_TYPE_TOKEN: &str = "token";
/// `response_type=id_token`.
pub const RESPONSE_TYPE_ID_TOKEN: &str = "id_token";
/// `response_type=id_token token`.
pub const RESPONSE_TYPE_ID_TOKEN_TOKEN: &str = "id_token token";
/// `response_type=code id_token`.
pub const RESPONSE_TYPE_CODE_ID_TOKEN: &str = "code id_token";
/// `response_type=code token`.
pub const RESPONSE_TYPE_CODE_TOKEN: &str = "code token";
/// `response_type=code id_token token`.
pub const RESPONSE_TYPE_CODE_ID_TOKEN_TOKEN: &str = "code id_token token";

/// `grant_type=authorization_code`.
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
/// `grant_type=implicit`.
pub const GRANT_TYPE_IMPLICIT: &str = "implicit";
/// `grant_type=refresh_token`.
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";

/// `application_type=web`.
pub const APPLICATION_TYPE_WEB: &str = "web";
/// `application_type=native`.
pub const APPLICATION_TYPE_NATIVE: &str = "native";

/// `token_endpoint_auth_method=client_secret_basic`.
pub const AUTH_METHOD_CLIENT_SECRET_BASIC: &str = "client_secret_basic";
/// `token_endpoint_auth_method=none`.
pub const AUTH_METHOD_NONE: &str = "none";

/// Standard `profile` scope.
pub const SCOPE_PROFILE: &str = "profile";
/// Standard `email` scope.
pub const SCOPE_EMAIL: &str = "email";
/// Provider scope exposing the stable user id as subject.
pub const SCOPE_ID: &str = "idp/id";
/// Provider scope exposing the unhashed backend subject.
pub const SCOPE_RAW_SUBJECT: &str = "idp/raw_sub";

/// Error codes surfaced verbatim to OAuth 2.0 / OpenID Connect clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	/// The request is missing a parameter or is otherwise malformed.
	InvalidRequest,
	/// The presented token is malformed or cannot be validated.
	InvalidToken,
	/// One or more `redirect_uris` values are invalid.
	InvalidRedirectUri,
	/// The value of one of the client metadata fields is invalid.
	InvalidClientMetadata,
}
impl ErrorCode {
	/// Wire representation of the code.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InvalidRequest => "invalid_request",
			Self::InvalidToken => "invalid_token",
			Self::InvalidRedirectUri => "invalid_redirect_uri",
			Self::InvalidClientMetadata => "invalid_client_metadata",
		}
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Protocol-level error returned to the client as an OAuth 2.0 error response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {description}")]
pub struct ProtocolError {
	/// Error code identifying the violated rule family.
	#[serde(rename = "error")]
	pub code: ErrorCode,
	/// Human readable explanation.
	#[serde(rename = "error_description")]
	pub description: String,
}
impl ProtocolError {
	/// Build a new protocol error.
	pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
		Self { code, description: description.into() }
	}

	/// Shorthand for `invalid_redirect_uri`.
	pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
		Self::new(ErrorCode::InvalidRedirectUri, description)
	}

	/// Shorthand for `invalid_client_metadata`.
	pub fn invalid_client_metadata(description: impl Into<String>) -> Self {
		Self::new(ErrorCode::InvalidClientMetadata, description)
	}

	/// HTTP status the surrounding handler should answer with.
	pub fn status_code(&self) -> StatusCode {
		match self.code {
			ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
			_ => StatusCode::BAD_REQUEST,
		}
	}
}
