//! Federated upstream authorities and verification of the tokens they issue.
//!
//! Keys are looked up strictly by the token's `kid`. A token without `alg` or `kid`, with an
//! algorithm outside the RSA, RSA-PSS and ECDSA families, or naming an unknown key is rejected
//! without trying any other key.

pub mod discovery;

pub use discovery::ProviderMetadata;

// std
use std::{
	collections::HashMap,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use base64::prelude::*;
use jsonwebtoken::{Algorithm, TokenData, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;
// self
use crate::{
	_prelude::*,
	backend::Claims,
	keys::{SigningMethod, ValidatorKey},
	security,
};

/// Authority type speaking OpenID Connect.
pub const AUTHORITY_TYPE_OIDC: &str = "oidc";
/// Claim identifying the user when none is configured.
pub const DEFAULT_IDENTITY_CLAIM: &str = "preferred_username";

/// Raw JOSE header of a token.
pub type RawHeader = serde_json::Map<String, serde_json::Value>;

/// Configured upstream authority.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorityRegistration {
	/// Identifier referenced by the login flow.
	pub id: String,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Protocol spoken by the authority.
	#[serde(default = "default_authority_type")]
	pub authority_type: String,
	/// OAuth client id registered at the authority.
	pub client_id: String,
	/// OAuth client secret registered at the authority.
	#[serde(default)]
	pub client_secret: String,
	/// Allow plain HTTP endpoints.
	#[serde(default)]
	pub insecure: bool,
	/// Scopes requested from the authority.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Response type used with the authority.
	#[serde(default)]
	pub response_type: String,
	/// PKCE method used with the authority.
	#[serde(default)]
	pub code_challenge_method: String,
	/// Claim holding the user identity in tokens from the authority.
	#[serde(default = "default_identity_claim")]
	pub identity_claim_name: String,
	/// Issuer identifier, required for discovery.
	#[serde(default)]
	pub issuer: Option<Url>,
	/// Authorization endpoint, overriding the discovered one.
	#[serde(default)]
	pub authorization_endpoint: Option<Url>,
	/// JWK Set location, overriding the discovered one.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// Load endpoints from the issuer's configuration document.
	#[serde(default)]
	pub discover: bool,
}
impl AuthorityRegistration {
	/// Create a registration for the OpenID Connect authority at `issuer` with discovery enabled.
	pub fn new(id: impl Into<String>, client_id: impl Into<String>, issuer: Url) -> Self {
		Self {
			id: id.into(),
			name: String::new(),
			authority_type: default_authority_type(),
			client_id: client_id.into(),
			client_secret: String::new(),
			insecure: false,
			scopes: Vec::new(),
			response_type: String::new(),
			code_challenge_method: String::new(),
			identity_claim_name: default_identity_claim(),
			issuer: Some(issuer),
			authorization_endpoint: None,
			jwks_uri: None,
			discover: true,
		}
	}

	/// Toggle plain HTTP endpoints.
	pub fn with_insecure(mut self, insecure: bool) -> Self {
		self.insecure = insecure;

		self
	}

	/// Validate invariants before any network access.
	pub fn validate(&self) -> Result<()> {
		if self.id.is_empty() {
			return Err(Error::Validation { field: "authority.id", reason: "Must not be empty.".into() });
		}
		if self.client_id.is_empty() {
			return Err(Error::Validation {
				field: "authority.client_id",
				reason: "Must not be empty.".into(),
			});
		}
		if self.authority_type != AUTHORITY_TYPE_OIDC {
			return Err(Error::Validation {
				field: "authority.authority_type",
				reason: format!("Unsupported authority type '{}'.", self.authority_type),
			});
		}
		if self.identity_claim_name.is_empty() {
			return Err(Error::Validation {
				field: "authority.identity_claim_name",
				reason: "Must not be empty.".into(),
			});
		}
		if self.discover && self.issuer.is_none() {
			return Err(Error::Validation {
				field: "authority.issuer",
				reason: "Required when discovery is enabled.".into(),
			});
		}
		if !self.discover && self.authorization_endpoint.is_none() {
			return Err(Error::Validation {
				field: "authority.authorization_endpoint",
				reason: "Required when discovery is disabled.".into(),
			});
		}

		for url in [&self.issuer, &self.authorization_endpoint, &self.jwks_uri].into_iter().flatten() {
			security::enforce_https_unless(url, self.insecure)?;
		}

		Ok(())
	}

	/// Extract the configured identity claim from `claims`.
	pub fn identity_claim_value(&self, claims: &Claims) -> Result<String> {
		identity_claim_value(&self.identity_claim_name, claims)
	}

	/// Load endpoints and keys, producing the authority details.
	///
	/// Keys without a `kid` or of an unsupported type are skipped. The details are ready once an
	/// authorization endpoint and at least one key are known.
	#[tracing::instrument(skip(self, client), fields(authority = %self.id))]
	pub async fn discover(&self, client: &reqwest::Client) -> Result<AuthorityDetails> {
		self.validate()?;

		let mut authorization_endpoint = self.authorization_endpoint.clone();
		let mut jwks_uri = self.jwks_uri.clone();

		if let (true, Some(issuer)) = (self.discover, &self.issuer) {
			let metadata = discovery::fetch_provider_metadata(client, issuer, self.insecure).await?;

			authorization_endpoint.get_or_insert(metadata.authorization_endpoint);

			if jwks_uri.is_none() {
				jwks_uri = metadata.jwks_uri;
			}
		}

		let mut keys = HashMap::new();

		if let Some(jwks_uri) = &jwks_uri {
			for jwk in discovery::fetch_jwks(client, jwks_uri, self.insecure).await?.keys {
				let Some(kid) = jwk.common.key_id.clone() else {
					tracing::warn!(authority = %self.id, "skipping authority key without kid");

					continue;
				};

				match ValidatorKey::from_jwk(&jwk) {
					Ok(key) => {
						keys.insert(kid, key);
					},
					Err(e) => {
						tracing::warn!(authority = %self.id, kid = %kid, error = %e, "skipping authority key");
					},
				}
			}
		}

		let details = self.clone().into_details(authorization_endpoint, keys);

		tracing::info!(
			authority = %details.id,
			ready = details.is_ready(),
			keys = details.validation_keys.len(),
			"authority loaded"
		);

		Ok(details)
	}

	/// Build details from already known endpoints and keys.
	pub fn into_details(
		self,
		authorization_endpoint: Option<Url>,
		validation_keys: HashMap<String, ValidatorKey>,
	) -> AuthorityDetails {
		let ready = authorization_endpoint.is_some() && !validation_keys.is_empty();

		AuthorityDetails {
			id: self.id,
			name: self.name,
			authority_type: self.authority_type,
			client_id: self.client_id,
			client_secret: self.client_secret,
			insecure: self.insecure,
			scopes: self.scopes,
			response_type: self.response_type,
			code_challenge_method: self.code_challenge_method,
			authorization_endpoint,
			identity_claim_name: self.identity_claim_name,
			ready,
			validation_keys,
		}
	}
}
impl Debug for AuthorityRegistration {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AuthorityRegistration")
			.field("id", &self.id)
			.field("authority_type", &self.authority_type)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("issuer", &self.issuer)
			.field("discover", &self.discover)
			.finish_non_exhaustive()
	}
}

/// Loaded upstream authority.
#[derive(Clone)]
pub struct AuthorityDetails {
	/// Identifier referenced by the login flow.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Protocol spoken by the authority.
	pub authority_type: String,
	/// OAuth client id registered at the authority.
	pub client_id: String,
	/// OAuth client secret registered at the authority.
	pub client_secret: String,
	/// Whether plain HTTP endpoints are allowed.
	pub insecure: bool,
	/// Scopes requested from the authority.
	pub scopes: Vec<String>,
	/// Response type used with the authority.
	pub response_type: String,
	/// PKCE method used with the authority.
	pub code_challenge_method: String,
	/// Authorization endpoint end users are redirected to.
	pub authorization_endpoint: Option<Url>,
	identity_claim_name: String,
	ready: bool,
	validation_keys: HashMap<String, ValidatorKey>,
}
impl AuthorityDetails {
	/// Whether metadata and key material were loaded.
	pub fn is_ready(&self) -> bool {
		self.ready
	}

	/// Key identifiers known for this authority.
	pub fn kids(&self) -> impl Iterator<Item = &str> {
		self.validation_keys.keys().map(String::as_str)
	}

	/// Extract the configured identity claim from `claims`.
	pub fn identity_claim_value(&self, claims: &Claims) -> Result<String> {
		identity_claim_value(&self.identity_claim_name, claims)
	}

	/// Resolve the verification key for a token header.
	pub fn validation_key(&self, header: &RawHeader) -> Result<(Algorithm, &ValidatorKey)> {
		let alg = header
			.get("alg")
			.ok_or_else(|| Error::InvalidToken("no alg header".into()))?
			.as_str()
			.ok_or_else(|| Error::InvalidToken("invalid alg value".into()))?;
		let method = SigningMethod::from_name(alg)
			.filter(|method| method.family().is_some())
			.ok_or_else(|| Error::InvalidToken("unexpected alg value".into()))?;
		let kid = header
			.get("kid")
			.ok_or_else(|| Error::InvalidToken("no kid header".into()))?
			.as_str()
			.ok_or_else(|| Error::InvalidToken("invalid kid value".into()))?;
		let key = self
			.validation_keys
			.get(kid)
			.ok_or_else(|| Error::InvalidToken("no key available".into()))?;

		if !key.supports(method) {
			return Err(Error::InvalidToken(format!("key {kid} cannot verify {method}")));
		}

		let algorithm =
			method.algorithm().ok_or_else(|| Error::InvalidToken("unexpected alg value".into()))?;

		Ok((algorithm, key))
	}

	/// Verify `token` with the key its header names.
	///
	/// `validation` algorithms are replaced by the header's algorithm once it is accepted.
	pub fn verify<T>(&self, token: &str, validation: &Validation) -> Result<TokenData<T>>
	where
		T: DeserializeOwned,
	{
		let header = decode_raw_header(token)?;
		let (algorithm, key) = self.validation_key(&header).inspect_err(|e| {
			tracing::debug!(authority = %self.id, error = %e, "rejected authority token");
		})?;
		let mut validation = validation.clone();

		validation.algorithms = vec![algorithm];

		Ok(jsonwebtoken::decode(token, &key.decoding_key()?, &validation)?)
	}
}
impl Debug for AuthorityDetails {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AuthorityDetails")
			.field("id", &self.id)
			.field("ready", &self.ready)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.field("kids", &self.kids().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

/// Decode a token's JOSE header without interpreting it.
pub fn decode_raw_header(token: &str) -> Result<RawHeader> {
	let encoded = token
		.split('.')
		.next()
		.filter(|segment| !segment.is_empty())
		.ok_or_else(|| Error::InvalidToken("missing header".into()))?;
	let bytes = BASE64_URL_SAFE_NO_PAD
		.decode(encoded)
		.map_err(|e| Error::InvalidToken(format!("invalid header encoding: {e}")))?;

	serde_json::from_slice(&bytes).map_err(|e| Error::InvalidToken(format!("invalid header: {e}")))
}

fn identity_claim_value(name: &str, claims: &Claims) -> Result<String> {
	match claims.get(name) {
		Some(serde_json::Value::String(value)) if !value.is_empty() => Ok(value.clone()),
		Some(_) => Err(Error::InvalidToken(format!("identity claim {name} is invalid"))),
		None => Err(Error::InvalidToken(format!("identity claim {name} not found"))),
	}
}

fn default_authority_type() -> String {
	AUTHORITY_TYPE_OIDC.into()
}

fn default_identity_claim() -> String {
	DEFAULT_IDENTITY_CLAIM.into()
}
