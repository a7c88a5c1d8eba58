//! Integration tests for upstream authority discovery and token validation.

// std
use std::path::Path;
// crates.io
use idp_core::{AuthorityRegistration, Error, KeyRegistry, KeysConfig, Result, backend::Claims};
use jsonwebtoken::Validation;
use serde_json::json;
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn upstream_keys() -> Result<KeyRegistry> {
	KeyRegistry::from_config(&KeysConfig {
		signing_private_keys: vec![
			Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/keys/rsa-pkcs8.pem"),
		],
		signing_kid: Some("upstream-1".into()),
		signing_method: "RS256".into(),
		..Default::default()
	})
}

async fn mount_provider(server: &MockServer, issuer: &str, keys: &KeyRegistry) -> Result<()> {
	Mock::given(method("GET"))
		.and(path("/.well-known/openid-configuration"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"issuer": issuer,
			"authorization_endpoint": format!("{}/authorize", server.uri()),
			"token_endpoint": format!("{}/token", server.uri()),
			"jwks_uri": format!("{}/jwks", server.uri()),
			"response_types_supported": ["code"],
		})))
		.expect(1)
		.mount(server)
		.await;
	Mock::given(method("GET"))
		.and(path("/jwks"))
		.respond_with(ResponseTemplate::new(200).set_body_json(keys.jwks()?))
		.mount(server)
		.await;

	Ok(())
}

fn now() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("clock after epoch")
		.as_secs()
}

#[tokio::test]
async fn discovered_authority_verifies_upstream_tokens() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let keys = upstream_keys()?;

	mount_provider(&server, &server.uri(), &keys).await?;

	let registration =
		AuthorityRegistration::new("upstream", "idp-client", Url::parse(&server.uri())?)
			.with_insecure(true);
	let details = registration.discover(&reqwest::Client::new()).await?;

	assert!(details.is_ready());
	assert_eq!(details.kids().collect::<Vec<_>>(), ["upstream-1"]);
	assert_eq!(
		details.authorization_endpoint.as_ref().map(Url::path),
		Some("/authorize")
	);

	let token = keys.sign(&json!({
		"sub": "entry-carol",
		"preferred_username": "carol",
		"exp": now() + 600,
	}))?;
	let verified = details.verify::<Claims>(&token, &Validation::default())?;

	assert_eq!(details.identity_claim_value(&verified.claims)?, "carol");

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn issuer_mismatch_is_rejected() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let keys = upstream_keys()?;

	mount_provider(&server, "https://impostor.example", &keys).await?;

	let registration =
		AuthorityRegistration::new("upstream", "idp-client", Url::parse(&server.uri())?)
			.with_insecure(true);

	assert!(matches!(
		registration.discover(&reqwest::Client::new()).await,
		Err(Error::Security(_))
	));

	Ok(())
}

#[tokio::test]
async fn failing_jwks_endpoint_surfaces_the_status() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/jwks"))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;

	let registration = AuthorityRegistration {
		discover: false,
		authorization_endpoint: Some(Url::parse(&format!("{}/authorize", server.uri()))?),
		jwks_uri: Some(Url::parse(&format!("{}/jwks", server.uri()))?),
		..AuthorityRegistration::new("upstream", "idp-client", Url::parse(&server.uri())?)
			.with_insecure(true)
	};

	assert!(matches!(
		registration.discover(&reqwest::Client::new()).await,
		Err(Error::HttpStatus { status, .. }) if status.as_u16() == 503
	));

	Ok(())
}
