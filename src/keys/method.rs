//! Signing methods and the key families that back them.

// std
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	str::FromStr,
};
// crates.io
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Name of the unsecured JWS algorithm.
pub const NONE: &str = "none";

/// Key family required by an asymmetric signing method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyFamily {
	/// RSASSA-PKCS1-v1_5.
	Rsa,
	/// RSASSA-PSS.
	RsaPss,
	/// ECDSA.
	Ecdsa,
}
impl KeyFamily {
	/// Whether keys of this family are RSA keys.
	pub fn is_rsa(self) -> bool {
		matches!(self, Self::Rsa | Self::RsaPss)
	}
}

/// JWS signing method as named in a token header or client metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SigningMethod {
	/// Unsecured `none`.
	None,
	/// Any algorithm supported by the token primitives.
	Jws(Algorithm),
}
impl SigningMethod {
	/// Resolve a JOSE algorithm name.
	pub fn from_name(name: &str) -> Option<Self> {
		if name == NONE {
			return Some(Self::None);
		}

		Algorithm::from_str(name).ok().map(Self::Jws)
	}

	/// JOSE algorithm name.
	pub fn name(self) -> &'static str {
		match self {
			Self::None => NONE,
			Self::Jws(alg) => match alg {
				Algorithm::HS256 => "HS256",
				Algorithm::HS384 => "HS384",
				Algorithm::HS512 => "HS512",
				Algorithm::ES256 => "ES256",
				Algorithm::ES384 => "ES384",
				Algorithm::RS256 => "RS256",
				Algorithm::RS384 => "RS384",
				Algorithm::RS512 => "RS512",
				Algorithm::PS256 => "PS256",
				Algorithm::PS384 => "PS384",
				Algorithm::PS512 => "PS512",
				Algorithm::EdDSA => "EdDSA",
			},
		}
	}

	/// Underlying token algorithm, absent for `none`.
	pub fn algorithm(self) -> Option<Algorithm> {
		match self {
			Self::None => None,
			Self::Jws(alg) => Some(alg),
		}
	}

	/// Asymmetric key family the method needs, if it is one of RSA, RSA-PSS or ECDSA.
	pub fn family(self) -> Option<KeyFamily> {
		match self.algorithm()? {
			Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => Some(KeyFamily::Rsa),
			Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => Some(KeyFamily::RsaPss),
			Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ecdsa),
			_ => None,
		}
	}
}
impl Display for SigningMethod {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.name())
	}
}
impl FromStr for SigningMethod {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_name(s)
			.ok_or_else(|| Error::Config(format!("Unknown signing method '{s}'.")))
	}
}
