//! Integration tests for key registry startup.

// std
use std::path::{Path, PathBuf};
// crates.io
use idp_core::{Error, KeyRegistry, KeysConfig, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header, Validation, jwk::PublicKeyUse};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Claims {
	sub: String,
	exp: u64,
}

fn fixtures() -> PathBuf {
	Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn claims() -> Claims {
	let now = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("clock after epoch")
		.as_secs();

	Claims { sub: "carol".into(), exp: now + 600 }
}

#[test]
fn startup_from_deserialized_config() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let config: KeysConfig = serde_json::from_value(json!({
		"signing_private_keys": [
			fixtures().join("keys/rsa-pkcs8.pem"),
			fixtures().join("keys/ec-p256-pkcs8.pem"),
		],
		"validation_keys_path": fixtures().join("validators"),
	}))?;
	let registry = KeyRegistry::from_config(&config)?;

	assert_eq!(registry.signing_method().to_string(), "PS256");
	assert_eq!(registry.default_kid(), Some("rsa-pkcs8"));
	assert_eq!(registry.validator_kids(), [
		"ec-p256-pkcs8",
		"legacy",
		"primary",
		"rsa-pkcs8",
		"secondary"
	]);

	let jwks = registry.jwks()?;

	assert_eq!(jwks.keys.len(), 5);
	assert!(jwks.keys.iter().all(|jwk| jwk.common.public_key_use == Some(PublicKeyUse::Signature)));

	let token = registry.sign(&claims())?;
	let header = jsonwebtoken::decode_header(&token)?;

	assert_eq!(header.alg, Algorithm::PS256);
	assert_eq!(header.kid.as_deref(), Some("rsa-pkcs8"));
	assert_eq!(registry.verify::<Claims>(&token, &Validation::default())?.claims, claims());

	Ok(())
}

#[test]
fn symmetric_tokens_are_rejected() -> Result<()> {
	let config = KeysConfig {
		signing_private_keys: vec![fixtures().join("keys/rsa-pkcs8.pem")],
		..Default::default()
	};
	let registry = KeyRegistry::from_config(&config)?;
	let header = Header { kid: Some("rsa-pkcs8".into()), ..Header::new(Algorithm::HS256) };
	let forged = jsonwebtoken::encode(&header, &claims(), &EncodingKey::from_secret(b"shared"))?;

	assert!(matches!(
		registry.verify::<Claims>(&forged, &Validation::default()),
		Err(Error::InvalidToken(_))
	));

	Ok(())
}

#[test]
fn signing_method_without_matching_key_fails_startup() {
	let config = KeysConfig {
		signing_private_keys: vec![fixtures().join("keys/rsa-pkcs8.pem")],
		signing_method: "ES256".into(),
		..Default::default()
	};

	assert!(matches!(
		KeyRegistry::from_config(&config),
		Err(Error::Config(reason)) if reason.contains("ES256")
	));
}
