//! OpenID Provider metadata and JWKS retrieval for upstream authorities.

// crates.io
use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;
// self
use crate::{_prelude::*, security};

/// Path of the provider configuration document relative to the issuer.
pub const WELL_KNOWN_OPENID_CONFIGURATION: &str = ".well-known/openid-configuration";
/// Size guard for discovery and JWKS documents (1 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 1_048_576;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subset of OpenID Provider metadata used by the authority validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
	/// Issuer identifier; must equal the configured issuer.
	pub issuer: Url,
	/// Authorization endpoint end users are redirected to.
	pub authorization_endpoint: Url,
	/// Token endpoint.
	#[serde(default)]
	pub token_endpoint: Option<Url>,
	/// Userinfo endpoint.
	#[serde(default)]
	pub userinfo_endpoint: Option<Url>,
	/// End session endpoint.
	#[serde(default)]
	pub end_session_endpoint: Option<Url>,
	/// Location of the provider's JWK Set.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// Supported scopes.
	#[serde(default)]
	pub scopes_supported: Vec<String>,
	/// Supported response types.
	#[serde(default)]
	pub response_types_supported: Vec<String>,
	/// Algorithms the provider signs ID tokens with.
	#[serde(default)]
	pub id_token_signing_alg_values_supported: Vec<String>,
	/// Supported PKCE methods.
	#[serde(default)]
	pub code_challenge_methods_supported: Vec<String>,
}

/// Location of the configuration document for `issuer`.
pub fn well_known_url(issuer: &Url) -> Result<Url> {
	let mut base = issuer.clone();

	if !base.path().ends_with('/') {
		base.set_path(&format!("{}/", base.path()));
	}

	Ok(base.join(WELL_KNOWN_OPENID_CONFIGURATION)?)
}

/// Fetch and check the provider configuration of `issuer`.
#[tracing::instrument(skip(client), fields(issuer = %issuer))]
pub async fn fetch_provider_metadata(
	client: &Client,
	issuer: &Url,
	insecure: bool,
) -> Result<ProviderMetadata> {
	let metadata: ProviderMetadata = get_json(client, &well_known_url(issuer)?, insecure).await?;

	if metadata.issuer.as_str().trim_end_matches('/') != issuer.as_str().trim_end_matches('/') {
		return Err(Error::Security(format!(
			"Discovered issuer {} does not match configured issuer {issuer}.",
			metadata.issuer
		)));
	}

	security::enforce_https_unless(&metadata.authorization_endpoint, insecure)?;

	Ok(metadata)
}

/// Fetch a JWK Set.
#[tracing::instrument(skip(client), fields(jwks_uri = %jwks_uri))]
pub async fn fetch_jwks(client: &Client, jwks_uri: &Url, insecure: bool) -> Result<JwkSet> {
	get_json(client, jwks_uri, insecure).await
}

async fn get_json<T>(client: &Client, url: &Url, insecure: bool) -> Result<T>
where
	T: DeserializeOwned,
{
	security::enforce_https_unless(url, insecure)?;

	let start = Instant::now();
	let response = client.get(url.clone()).timeout(DEFAULT_TIMEOUT).send().await?;
	let status = response.status();

	if !status.is_success() {
		return Err(Error::HttpStatus { status, url: url.clone() });
	}

	let bytes = response.bytes().await?;

	if bytes.len() > MAX_DOCUMENT_BYTES {
		return Err(Error::Validation {
			field: "max_document_bytes",
			reason: format!(
				"Response size {size} bytes exceeds the guard of {MAX_DOCUMENT_BYTES} bytes.",
				size = bytes.len()
			),
		});
	}

	tracing::debug!(%url, %status, elapsed = ?start.elapsed(), "document fetched");

	Ok(serde_json::from_slice(&bytes)?)
}
