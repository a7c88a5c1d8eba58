//! OpenID Connect Dynamic Client Registration request validation.
//!
//! [`ClientRegistrationRequest::validate`] normalizes a request in place and rejects it with the
//! protocol error the registering client expects. Rules run in a fixed order, so the first
//! violated rule decides the error.

// std
use std::collections::BTreeSet;
// crates.io
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	keys::{SigningMethod, ValidatorKey},
	protocol::{self, ErrorCode, ProtocolError},
	security,
};

/// Prefix of dynamically issued client ids.
pub const DYNAMIC_CLIENT_ID_PREFIX: &str = "dyn.";
/// Signing algorithm assumed for ID tokens when the client names none.
pub const DEFAULT_ID_TOKEN_SIGNED_RESPONSE_ALG: &str = "RS256";

// Relative references are resolved against this before checking their syntax.
const URI_REFERENCE_BASE: &str = "https://client.invalid/";

const CLIENT_ID_LENGTH: usize = 32;
const CLIENT_SECRET_LENGTH: usize = 64;
const KNOWN_GRANT_TYPES: [&str; 3] = [
	protocol::GRANT_TYPE_AUTHORIZATION_CODE,
	protocol::GRANT_TYPE_IMPLICIT,
	protocol::GRANT_TYPE_REFRESH_TOKEN,
];

/// Client metadata submitted to the registration endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
	/// Redirection URIs for authorization responses.
	#[serde(default)]
	pub redirect_uris: Vec<String>,
	/// Response types the client will use.
	#[serde(default)]
	pub response_types: Vec<String>,
	/// Grant types the client will use.
	#[serde(default)]
	pub grant_types: Vec<String>,
	/// `web` or `native`.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub application_type: String,

	/// Contact addresses of the people responsible for the client.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub contacts: Vec<String>,
	/// Display name.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub client_name: String,
	/// Home page.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub client_uri: String,

	/// Public keys of the client.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jwks: Option<JwkSet>,

	/// Algorithm for signing ID tokens issued to this client.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub id_token_signed_response_alg: String,
	/// Algorithm for signing userinfo responses.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub userinfo_signed_response_alg: String,
	/// Algorithm the client signs request objects with.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub request_object_signing_alg: String,
	/// Authentication method at the token endpoint.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub token_endpoint_auth_method: String,
	/// Algorithm for JWT based token endpoint authentication.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub token_endpoint_auth_signing_alg: String,

	/// URIs the client may be sent to after logout.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub post_logout_redirect_uris: Vec<String>,
}
impl ClientRegistrationRequest {
	/// Decode a JSON request body.
	///
	/// A malformed body is `invalid_request`; a `jwks` member that is not a JWK Set is
	/// `invalid_client_metadata`.
	pub fn from_slice(body: &[u8]) -> Result<Self> {
		let mut value = serde_json::from_slice::<serde_json::Value>(body).map_err(|e| {
			ProtocolError::new(ErrorCode::InvalidRequest, format!("Failed to decode request: {e}."))
		})?;
		let jwks = value.as_object_mut().and_then(|object| object.remove("jwks"));
		let mut request = serde_json::from_value::<Self>(value).map_err(|e| {
			ProtocolError::new(ErrorCode::InvalidRequest, format!("Failed to decode request: {e}."))
		})?;

		request.jwks = match jwks {
			None | Some(serde_json::Value::Null) => None,
			Some(jwks) => Some(serde_json::from_value(jwks).map_err(|e| {
				ProtocolError::invalid_client_metadata(format!("Failed to decode jwks: {e}."))
			})?),
		};

		Ok(request)
	}

	/// Validate the request and fill in defaults.
	pub fn validate(&mut self) -> Result<()> {
		if self.redirect_uris.is_empty() {
			return Err(ProtocolError::invalid_redirect_uri("redirect_uris required").into());
		}

		let required_grant_types = self.normalize_response_types();
		let grant_types = self.normalize_grant_types();

		if !required_grant_types.is_subset(&grant_types) {
			return Err(
				ProtocolError::invalid_client_metadata("grant_types conflict with response_types").into(),
			);
		}

		self.validate_redirect_uris(grant_types.contains(protocol::GRANT_TYPE_IMPLICIT))?;
		self.validate_algorithms()?;

		if self.token_endpoint_auth_method.is_empty() {
			self.token_endpoint_auth_method = protocol::AUTH_METHOD_CLIENT_SECRET_BASIC.into();
		}
		if !matches!(
			self.token_endpoint_auth_method.as_str(),
			protocol::AUTH_METHOD_CLIENT_SECRET_BASIC | protocol::AUTH_METHOD_NONE
		) {
			return Err(
				ProtocolError::invalid_client_metadata("unsupported token_endpoint_auth_method").into(),
			);
		}
		let reference_base = Url::parse(URI_REFERENCE_BASE)?;

		if self
			.post_logout_redirect_uris
			.iter()
			.any(|uri| Url::options().base_url(Some(&reference_base)).parse(uri).is_err())
		{
			return Err(
				ProtocolError::invalid_client_metadata("failed to parse post_logout_redirect_uris").into(),
			);
		}

		self.normalize_jwks()
	}

	/// Validate the request and turn it into a dynamic client registration.
	pub fn into_registration(mut self) -> Result<ClientRegistration> {
		self.validate()?;

		Ok(ClientRegistration { metadata: self, dynamic: true })
	}

	// Drops unknown response types and returns the grant types the remaining ones need.
	fn normalize_response_types(&mut self) -> BTreeSet<&'static str> {
		if self.response_types.is_empty() {
			self.response_types = vec![protocol::RESPONSE_TYPE_CODE.into()];
		}

		let mut required = BTreeSet::new();

		self.response_types.retain(|response_type| match response_type.as_str() {
			protocol::RESPONSE_TYPE_CODE => {
				required.insert(protocol::GRANT_TYPE_AUTHORIZATION_CODE);

				true
			},
			protocol::RESPONSE_TYPE_CODE_ID_TOKEN
			| protocol::RESPONSE_TYPE_CODE_TOKEN
			| protocol::RESPONSE_TYPE_CODE_ID_TOKEN_TOKEN
			| protocol::RESPONSE_TYPE_ID_TOKEN
			| protocol::RESPONSE_TYPE_ID_TOKEN_TOKEN
			| protocol::RESPONSE_TYPE_TOKEN => {
				required.insert(protocol::GRANT_TYPE_AUTHORIZATION_CODE);
				required.insert(protocol::GRANT_TYPE_IMPLICIT);

				true
			},
			_ => false,
		});

		required
	}

	// Drops unknown grant types and returns the registered ones.
	fn normalize_grant_types(&mut self) -> BTreeSet<&'static str> {
		if self.grant_types.is_empty() {
			self.grant_types = vec![protocol::GRANT_TYPE_AUTHORIZATION_CODE.into()];
		}

		let mut registered = BTreeSet::new();

		self.grant_types.retain(|grant_type| {
			match KNOWN_GRANT_TYPES.iter().find(|known| **known == grant_type.as_str()) {
				Some(known) => {
					registered.insert(*known);

					true
				},
				None => false,
			}
		});

		registered
	}

	fn validate_redirect_uris(&mut self, implicit: bool) -> Result<()> {
		if self.application_type.is_empty() {
			self.application_type = protocol::APPLICATION_TYPE_WEB.into();
		}

		let native = match self.application_type.as_str() {
			protocol::APPLICATION_TYPE_WEB => false,
			protocol::APPLICATION_TYPE_NATIVE => true,
			_ => return Err(ProtocolError::invalid_client_metadata("unknown application_type").into()),
		};

		for uri in &self.redirect_uris {
			let uri = Url::parse(uri)
				.map_err(|_| ProtocolError::invalid_redirect_uri("failed to parse redirect_uris"))?;
			let localhost = security::is_localhost(&uri);

			if native {
				if uri.scheme() == "http" && !localhost {
					return Err(ProtocolError::invalid_redirect_uri(
						"native clients must only use localhost redirect_uris with http",
					).into());
				}
			} else if implicit {
				if uri.scheme() != "https" {
					return Err(ProtocolError::invalid_redirect_uri(
						"implicit web clients must use https redirect_uris",
					).into());
				}
				if localhost {
					return Err(ProtocolError::invalid_redirect_uri(
						"implicit web clients must not use localhost redirect_uris",
					).into());
				}
			}
		}

		Ok(())
	}

	fn validate_algorithms(&mut self) -> Result<()> {
		if self.id_token_signed_response_alg.is_empty() {
			self.id_token_signed_response_alg = DEFAULT_ID_TOKEN_SIGNED_RESPONSE_ALG.into();
		}

		for (field, alg) in [
			("id_token_signed_response_alg", &self.id_token_signed_response_alg),
			("userinfo_signed_response_alg", &self.userinfo_signed_response_alg),
			("request_object_signing_alg", &self.request_object_signing_alg),
			("token_endpoint_auth_signing_alg", &self.token_endpoint_auth_signing_alg),
		] {
			if !alg.is_empty() && SigningMethod::from_name(alg).is_none() {
				return Err(
					ProtocolError::invalid_client_metadata(format!("unknown {field}")).into(),
				);
			}
		}

		Ok(())
	}

	// An unset key use means signing, which cannot be combined with encryption keys.
	fn normalize_jwks(&mut self) -> Result<()> {
		let Some(jwks) = &mut self.jwks else {
			return Ok(());
		};

		if jwks.keys.is_empty() {
			self.jwks = None;

			return Ok(());
		}

		let unset = jwks.keys.iter().any(|key| key.common.public_key_use.is_none());
		let enc = jwks
			.keys
			.iter()
			.any(|key| key.common.public_key_use == Some(PublicKeyUse::Encryption));

		if unset && enc {
			return Err(
				ProtocolError::invalid_client_metadata("jwks includes enc key and unset use key").into(),
			);
		}

		for key in &mut jwks.keys {
			ValidatorKey::from_jwk(key).map_err(|e| {
				ProtocolError::invalid_client_metadata(format!("unsupported jwks key: {e}"))
			})?;

			key.common.public_key_use.get_or_insert(PublicKeyUse::Signature);
		}

		Ok(())
	}
}

/// Validated, normalized client registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistration {
	/// Normalized metadata.
	#[serde(flatten)]
	pub metadata: ClientRegistrationRequest,
	/// Whether the client registered itself at runtime.
	#[serde(skip)]
	pub dynamic: bool,
}
impl ClientRegistration {
	/// Whether the client authenticates at the token endpoint.
	pub fn is_confidential(&self) -> bool {
		self.metadata.token_endpoint_auth_method != protocol::AUTH_METHOD_NONE
	}

	/// Validation keys from the client's JWK Set, keyed by kid. Keys without a kid are skipped.
	pub fn validation_keys(&self) -> Result<Vec<(String, ValidatorKey)>> {
		let Some(jwks) = &self.metadata.jwks else {
			return Ok(Vec::new());
		};

		jwks.keys
			.iter()
			.filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
			.map(|(kid, jwk)| Ok((kid, ValidatorKey::from_jwk(jwk)?)))
			.collect()
	}

	/// Issue client credentials for this registration.
	///
	/// Public clients (`token_endpoint_auth_method=none`) get no secret. Secrets never expire.
	pub fn issue(self) -> ClientRegistrationResponse {
		let client_id = format!("{DYNAMIC_CLIENT_ID_PREFIX}{}", random_token(CLIENT_ID_LENGTH));
		let client_secret = self.is_confidential().then(|| random_token(CLIENT_SECRET_LENGTH));

		tracing::debug!(
			client_id = %client_id,
			confidential = client_secret.is_some(),
			redirect_uris = self.metadata.redirect_uris.len(),
			"client registered"
		);

		ClientRegistrationResponse {
			client_id,
			client_secret,
			client_id_issued_at: Utc::now().timestamp(),
			client_secret_expires_at: 0,
			registration: self,
		}
	}
}

/// Registration endpoint response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
	/// Issued client id.
	pub client_id: String,
	/// Issued client secret, absent for public clients.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<String>,
	/// Issue time in seconds since the Unix epoch.
	pub client_id_issued_at: i64,
	/// Secret expiry in seconds since the Unix epoch; `0` means never.
	pub client_secret_expires_at: i64,
	/// Echo of the registered metadata.
	#[serde(flatten)]
	pub registration: ClientRegistration,
}

fn random_token(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// std
	use std::path::Path;
	// crates.io
	use jsonwebtoken::jwk::Jwk;
	// self
	use super::*;
	use crate::keys::load_validator;

	fn request(redirect_uri: &str) -> ClientRegistrationRequest {
		ClientRegistrationRequest { redirect_uris: vec![redirect_uri.into()], ..Default::default() }
	}

	fn code_of(result: Result<()>) -> Option<ErrorCode> {
		match result {
			Err(Error::Protocol(err)) => Some(err.code),
			_ => None,
		}
	}

	fn jwk(kid: &str, key_use: Option<PublicKeyUse>) -> Jwk {
		let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/keys/rsa-public-pkix.pem");
		let mut jwk = load_validator(&path).unwrap().to_jwk(kid, None).unwrap();

		jwk.common.public_key_use = key_use;

		jwk
	}

	#[test]
	fn redirect_uris_are_required() {
		let mut req = ClientRegistrationRequest::default();

		assert_eq!(code_of(req.validate()), Some(ErrorCode::InvalidRedirectUri));
	}

	#[test]
	fn defaults_are_filled_in() -> Result<()> {
		let mut req = request("https://rp.example.com/cb");

		req.validate()?;

		assert_eq!(req.response_types, ["code"]);
		assert_eq!(req.grant_types, ["authorization_code"]);
		assert_eq!(req.application_type, "web");
		assert_eq!(req.id_token_signed_response_alg, "RS256");
		assert_eq!(req.token_endpoint_auth_method, "client_secret_basic");

		Ok(())
	}

	#[test]
	fn response_types_require_matching_grant_types() -> Result<()> {
		let mut req = ClientRegistrationRequest {
			response_types: vec!["code".into(), "token".into()],
			..request("https://rp.example.com/cb")
		};

		assert_eq!(code_of(req.clone().validate()), Some(ErrorCode::InvalidClientMetadata));

		req.grant_types = vec!["authorization_code".into(), "implicit".into()];
		req.validate()?;

		assert_eq!(req.application_type, "web");

		Ok(())
	}

	#[test]
	fn unknown_response_and_grant_types_are_dropped() -> Result<()> {
		let mut req = ClientRegistrationRequest {
			response_types: vec!["code".into(), "device_code".into()],
			grant_types: vec![
				"authorization_code".into(),
				"client_credentials".into(),
				"refresh_token".into(),
			],
			..request("https://rp.example.com/cb")
		};

		req.validate()?;

		assert_eq!(req.response_types, ["code"]);
		assert_eq!(req.grant_types, ["authorization_code", "refresh_token"]);

		Ok(())
	}

	#[test]
	fn implicit_web_clients_need_public_https_redirects() {
		let implicit = |uri: &str| ClientRegistrationRequest {
			response_types: vec!["id_token".into()],
			grant_types: vec!["authorization_code".into(), "implicit".into()],
			..request(uri)
		};

		assert_eq!(code_of(implicit("http://rp.example.com/cb").validate()), Some(ErrorCode::InvalidRedirectUri));
		assert_eq!(code_of(implicit("https://localhost/cb").validate()), Some(ErrorCode::InvalidRedirectUri));
		assert_eq!(code_of(implicit("https://rp.example.com/cb").validate()), None);
		assert_eq!(code_of(request("http://localhost:8080/cb").validate()), None);
	}

	#[test]
	fn native_clients_use_localhost_for_http() {
		let native = |uri: &str| ClientRegistrationRequest {
			application_type: "native".into(),
			..request(uri)
		};

		assert_eq!(code_of(native("http://example.com/cb").validate()), Some(ErrorCode::InvalidRedirectUri));
		assert_eq!(code_of(native("http://localhost/cb").validate()), None);
		assert_eq!(code_of(native("myapp://cb").validate()), None);
		assert_eq!(code_of(native("not a uri").validate()), Some(ErrorCode::InvalidRedirectUri));

		let mut other = ClientRegistrationRequest {
			application_type: "service".into(),
			..request("https://rp.example.com/cb")
		};

		assert_eq!(code_of(other.validate()), Some(ErrorCode::InvalidClientMetadata));
	}

	#[test]
	fn algorithms_and_auth_methods_must_be_known() {
		let mut unknown_alg = ClientRegistrationRequest {
			userinfo_signed_response_alg: "RS1024".into(),
			..request("https://rp.example.com/cb")
		};
		let mut none_alg = ClientRegistrationRequest {
			request_object_signing_alg: "none".into(),
			..request("https://rp.example.com/cb")
		};
		let mut post_auth = ClientRegistrationRequest {
			token_endpoint_auth_method: "client_secret_post".into(),
			..request("https://rp.example.com/cb")
		};
		let mut relative_logout = ClientRegistrationRequest {
			post_logout_redirect_uris: vec!["/signed-out".into(), "https://rp.example.com/bye".into()],
			..request("https://rp.example.com/cb")
		};
		let mut bad_logout = ClientRegistrationRequest {
			post_logout_redirect_uris: vec!["https://[::1/signed-out".into()],
			..request("https://rp.example.com/cb")
		};

		assert_eq!(code_of(unknown_alg.validate()), Some(ErrorCode::InvalidClientMetadata));
		assert_eq!(code_of(none_alg.validate()), None);
		assert_eq!(code_of(post_auth.validate()), Some(ErrorCode::InvalidClientMetadata));
		assert!(relative_logout.validate().is_ok());
		assert_eq!(code_of(bad_logout.validate()), Some(ErrorCode::InvalidClientMetadata));
	}

	#[test]
	fn jwks_use_is_normalized() -> Result<()> {
		let mut empty = ClientRegistrationRequest {
			jwks: Some(JwkSet { keys: Vec::new() }),
			..request("https://rp.example.com/cb")
		};

		empty.validate()?;

		assert!(empty.jwks.is_none());

		let mut mixed = ClientRegistrationRequest {
			jwks: Some(JwkSet {
				keys: vec![jwk("a", None), jwk("b", Some(PublicKeyUse::Encryption))],
			}),
			..request("https://rp.example.com/cb")
		};

		assert_eq!(code_of(mixed.validate()), Some(ErrorCode::InvalidClientMetadata));

		let mut unset = ClientRegistrationRequest {
			jwks: Some(JwkSet { keys: vec![jwk("a", None), jwk("b", Some(PublicKeyUse::Signature))] }),
			..request("https://rp.example.com/cb")
		};

		unset.validate()?;

		let registration = unset.into_registration()?;

		assert!(
			registration
				.metadata
				.jwks
				.iter()
				.flat_map(|jwks| &jwks.keys)
				.all(|key| key.common.public_key_use == Some(PublicKeyUse::Signature))
		);
		assert_eq!(registration.validation_keys()?.len(), 2);

		Ok(())
	}

	#[test]
	fn bodies_decode_with_protocol_errors() -> Result<()> {
		let req = ClientRegistrationRequest::from_slice(
			br#"{"redirect_uris":["https://rp.example.com/cb"],"client_name":"RP","jwks":null}"#,
		)?;

		assert_eq!(req.client_name, "RP");
		assert!(req.jwks.is_none());
		assert!(matches!(
			ClientRegistrationRequest::from_slice(b"{not json"),
			Err(Error::Protocol(ProtocolError { code: ErrorCode::InvalidRequest, .. }))
		));
		assert!(matches!(
			ClientRegistrationRequest::from_slice(br#"{"redirect_uris":[],"jwks":"nope"}"#),
			Err(Error::Protocol(ProtocolError { code: ErrorCode::InvalidClientMetadata, .. }))
		));

		let body = serde_json::to_vec(&serde_json::json!({
			"redirect_uris": ["https://rp.example.com/cb"],
			"jwks": { "keys": [jwk("k1", None)] },
		}))?;
		let req = ClientRegistrationRequest::from_slice(&body)?;

		assert_eq!(req.jwks.map(|jwks| jwks.keys.len()), Some(1));

		Ok(())
	}

	#[test]
	fn issuing_credentials_depends_on_the_auth_method() -> Result<()> {
		let confidential = request("https://rp.example.com/cb").into_registration()?.issue();

		assert!(confidential.client_id.starts_with(DYNAMIC_CLIENT_ID_PREFIX));
		assert_eq!(confidential.client_secret.as_ref().map(String::len), Some(CLIENT_SECRET_LENGTH));
		assert!(confidential.client_id_issued_at > 0);
		assert_eq!(confidential.client_secret_expires_at, 0);

		let body = serde_json::to_value(&confidential)?;

		assert_eq!(body["redirect_uris"][0], "https://rp.example.com/cb");
		assert_eq!(body["token_endpoint_auth_method"], "client_secret_basic");

		let public = ClientRegistrationRequest {
			token_endpoint_auth_method: "none".into(),
			..request("myapp://cb")
		}
		.into_registration()?
		.issue();

		assert!(public.client_secret.is_none());
		assert_ne!(public.client_id, confidential.client_id);

		Ok(())
	}
}
