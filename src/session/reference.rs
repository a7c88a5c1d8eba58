//! Opaque session references handed to the HTTP layer.

// std
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	str::FromStr,
};
// self
use crate::{_prelude::*, session::SessionId};

const SEPARATOR: char = '@';

/// Parsed `<decimal session id>@<server instance guid>` reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionRef {
	/// Numeric session id assigned by the remote source.
	pub id: SessionId,
	/// GUID of the server instance that owns the session.
	pub server_guid: String,
}
impl SessionRef {
	/// Build a reference from its parts.
	pub fn new(id: SessionId, server_guid: impl Into<String>) -> Self {
		Self { id, server_guid: server_guid.into() }
	}

	/// Parse a reference string, rejecting missing or empty components.
	pub fn parse(value: &str) -> Result<Self> {
		let Some((id, server_guid)) = value.split_once(SEPARATOR) else {
			return Err(Error::InvalidSessionRef(value.into()));
		};

		if id.is_empty() || server_guid.is_empty() {
			return Err(Error::InvalidSessionRef(value.into()));
		}

		let id = id.parse::<SessionId>().map_err(|_| Error::InvalidSessionRef(value.into()))?;

		Ok(Self { id, server_guid: server_guid.into() })
	}
}
impl Display for SessionRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "{}{SEPARATOR}{}", self.id, self.server_guid)
	}
}
impl FromStr for SessionRef {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}
