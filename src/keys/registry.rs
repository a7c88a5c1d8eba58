//! Signer and validator registry built once at startup.
//!
//! Keys are loaded from PEM files, assigned key identifiers and checked against the configured
//! signing method. The registry is immutable after [`KeyRegistry::from_config`] returns.

// std
use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};
// crates.io
use jsonwebtoken::{Header, TokenData, Validation, jwk::JwkSet};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
// self
use crate::{
	_prelude::*,
	keys::{
		loader,
		material::{MIN_RSA_PUBLIC_EXPONENT, SignerKey, ValidatorKey},
		method::{KeyFamily, SigningMethod},
	},
};

/// Signing method used when none is configured.
pub const DEFAULT_SIGNING_METHOD: &str = "PS256";
/// File extension scanned for in validator directories.
pub const VALIDATOR_FILE_EXTENSION: &str = "pem";

/// Key material configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeysConfig {
	/// PEM files holding signing private keys.
	#[serde(default)]
	pub signing_private_keys: Vec<PathBuf>,
	/// Explicit key identifier for the first signing key.
	#[serde(default)]
	pub signing_kid: Option<String>,
	/// Directory scanned for additional validation keys.
	#[serde(default)]
	pub validation_keys_path: Option<PathBuf>,
	/// JOSE name of the method used to sign outbound tokens.
	#[serde(default = "default_signing_method")]
	pub signing_method: String,
}
impl KeysConfig {
	/// Validate the configuration before any file is touched.
	pub fn validate(&self) -> Result<()> {
		if self.signing_private_keys.is_empty() {
			return Err(Error::Validation {
				field: "keys.signing_private_keys",
				reason: "At least one signing key is required.".into(),
			});
		}
		if self.signing_kid.as_deref().is_some_and(str::is_empty) {
			return Err(Error::Validation {
				field: "keys.signing_kid",
				reason: "Must not be empty when set.".into(),
			});
		}
		if SigningMethod::from_name(&self.signing_method).is_none() {
			return Err(Error::Validation {
				field: "keys.signing_method",
				reason: format!("Unknown signing method '{}'.", self.signing_method),
			});
		}

		Ok(())
	}
}
impl Default for KeysConfig {
	fn default() -> Self {
		Self {
			signing_private_keys: Vec::new(),
			signing_kid: None,
			validation_keys_path: None,
			signing_method: default_signing_method(),
		}
	}
}

/// Signing key registered under a key identifier.
#[derive(Clone, Debug)]
pub struct Signer {
	kid: String,
	key: SignerKey,
}
impl Signer {
	/// Pair a key with its identifier.
	pub fn new(kid: impl Into<String>, key: SignerKey) -> Self {
		Self { kid: kid.into(), key }
	}

	/// Key identifier placed in token headers.
	pub fn kid(&self) -> &str {
		&self.kid
	}

	/// Underlying private key.
	pub fn key(&self) -> &SignerKey {
		&self.key
	}

	/// Token signing key.
	pub fn encoding_key(&self) -> Result<jsonwebtoken::EncodingKey> {
		self.key.encoding_key()
	}

	fn can_sign(&self, method: SigningMethod) -> bool {
		match method.family() {
			Some(KeyFamily::Ecdsa) => self.key.ecdsa_method() == Some(method),
			Some(family) => self.key.supports(family),
			None => false,
		}
	}
}

/// Signers, validators and the active signing method.
#[derive(Debug)]
pub struct KeyRegistry {
	signing_method: SigningMethod,
	signers: HashMap<String, Signer>,
	default_kid: Option<String>,
	validators: HashMap<String, ValidatorKey>,
}
impl KeyRegistry {
	/// Create an empty registry for `signing_method`.
	pub fn new(signing_method: SigningMethod) -> Self {
		Self {
			signing_method,
			signers: HashMap::new(),
			default_kid: None,
			validators: HashMap::new(),
		}
	}

	/// Run the startup pipeline: load signers, load the validator directory, publish signer public
	/// halves and check the signing method.
	pub fn from_config(config: &KeysConfig) -> Result<Self> {
		config.validate()?;

		let signing_method = config.signing_method.parse()?;
		let mut registry = Self::new(signing_method);

		for (i, path) in config.signing_private_keys.iter().enumerate() {
			let kid = if i == 0 { config.signing_kid.as_deref() } else { None };

			registry.add_signer_with_id_from_file(path, kid)?;
		}
		if let Some(dir) = &config.validation_keys_path {
			registry.add_validators_from_path(dir)?;
		}

		registry.register_signer_validators();
		registry.validate_signers()?;

		tracing::info!(
			signing_method = %registry.signing_method,
			default_kid = registry.default_kid.as_deref().unwrap_or_default(),
			signers = registry.signers.len(),
			validators = registry.validators.len(),
			"key registry loaded"
		);

		Ok(registry)
	}

	/// Load a signer from `path` and register it.
	///
	/// Without an explicit `kid` the identifier is the file name with its last extension removed;
	/// for a symbolic link the link target's name is used instead. The first signer added becomes
	/// the default one.
	pub fn add_signer_with_id_from_file(&mut self, path: &Path, kid: Option<&str>) -> Result<String> {
		let metadata = std::fs::symlink_metadata(path).map_err(access_error(path))?;

		if metadata.is_dir() {
			return Err(Error::Config(format!("Signer key {} must be a file.", path.display())));
		}

		let key = loader::load_signer(path)?;
		let kid = match kid {
			Some(kid) => kid.to_owned(),
			None if metadata.file_type().is_symlink() => {
				kid_from_file_name(&std::fs::read_link(path).map_err(access_error(path))?)?
			},
			None => kid_from_file_name(path)?,
		};

		tracing::debug!(kid = %kid, kind = key.kind(), path = %path.display(), "signer loaded");

		self.add_signer(Signer::new(kid.clone(), key));

		Ok(kid)
	}

	/// Register a signer; the first one becomes the default.
	pub fn add_signer(&mut self, signer: Signer) {
		if self.default_kid.is_none() {
			self.default_kid = Some(signer.kid.clone());
		}

		self.signers.insert(signer.kid.clone(), signer);
	}

	/// Make `kid` the default signer.
	pub fn set_default_kid(&mut self, kid: &str) -> Result<()> {
		if !self.signers.contains_key(kid) {
			return Err(Error::Config(format!("No signer registered with kid '{kid}'.")));
		}

		self.default_kid = Some(kid.to_owned());

		Ok(())
	}

	/// Register every `*.pem` file directly inside `dir` as a validator.
	///
	/// Files that fail to parse are logged and skipped. Returns the number of keys added.
	pub fn add_validators_from_path(&mut self, dir: &Path) -> Result<usize> {
		if !std::fs::metadata(dir).map_err(access_error(dir))?.is_dir() {
			return Err(Error::Config(format!(
				"Validation keys path {} must be a directory.",
				dir.display()
			)));
		}

		let mut paths = std::fs::read_dir(dir)
			.and_then(|entries| {
				entries.map(|entry| entry.map(|entry| entry.path())).collect::<std::io::Result<Vec<_>>>()
			})
			.map_err(access_error(dir))?;

		paths.retain(|path| {
			path.extension().is_some_and(|ext| ext == VALIDATOR_FILE_EXTENSION)
		});
		paths.sort();

		let mut added = 0;

		for path in paths {
			let loaded = loader::load_validator(&path).and_then(|key| Ok((kid_from_file_name(&path)?, key)));

			match loaded {
				Ok((kid, key)) => {
					tracing::debug!(kid = %kid, kind = key.kind(), path = %path.display(), "validator loaded");

					self.validators.insert(kid, key);

					added += 1;
				},
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "skipping validation key");
				},
			}
		}

		Ok(added)
	}

	/// Register a validator key under `kid`, replacing any previous one.
	pub fn add_validator(&mut self, kid: impl Into<String>, key: ValidatorKey) {
		self.validators.insert(kid.into(), key);
	}

	/// Publish each signer's public half unless a validator already claims its kid.
	pub fn register_signer_validators(&mut self) {
		for signer in self.signers.values() {
			self.validators
				.entry(signer.kid.clone())
				.or_insert_with(|| signer.key.public_key());
		}
	}

	/// Check signer strength and that the signing method is backed by a loaded key.
	pub fn validate_signers(&self) -> Result<()> {
		let mut have_rsa = false;

		for signer in self.signers.values() {
			if let Some(exponent) = signer.key.rsa_public_exponent() {
				if *exponent < rsa::BigUint::from(MIN_RSA_PUBLIC_EXPONENT) {
					return Err(Error::Config(format!(
						"RSA signing key '{}' has public exponent {exponent} < {MIN_RSA_PUBLIC_EXPONENT}.",
						signer.kid
					)));
				}

				have_rsa = true;
			}
		}

		let family = self.signing_method.family().ok_or_else(|| {
			Error::Config(format!("Unsupported signing method '{}'.", self.signing_method))
		})?;

		if !self.signers.values().any(|signer| signer.key.supports(family)) {
			return Err(Error::Config(format!(
				"No private key for signing method '{}'.",
				self.signing_method
			)));
		}
		if !have_rsa {
			tracing::warn!("no RSA signing private key, some clients might not be compatible");
		}

		Ok(())
	}

	/// Configured signing method.
	pub fn signing_method(&self) -> SigningMethod {
		self.signing_method
	}

	/// Key identifier of the default signer.
	pub fn default_kid(&self) -> Option<&str> {
		self.default_kid.as_deref()
	}

	/// Signer registered under `kid`.
	pub fn signer(&self, kid: &str) -> Option<&Signer> {
		self.signers.get(kid)
	}

	/// Default signer.
	pub fn default_signer(&self) -> Option<&Signer> {
		self.default_kid.as_deref().and_then(|kid| self.signers.get(kid))
	}

	/// Validator registered under `kid`.
	pub fn validator(&self, kid: &str) -> Option<&ValidatorKey> {
		self.validators.get(kid)
	}

	/// Sorted key identifiers of all validators.
	pub fn validator_kids(&self) -> Vec<&str> {
		let mut kids = self.validators.keys().map(String::as_str).collect::<Vec<_>>();

		kids.sort_unstable();

		kids
	}

	/// All validation keys as a JWK Set, ordered by kid.
	pub fn jwks(&self) -> Result<JwkSet> {
		let keys = self
			.validator_kids()
			.into_iter()
			.map(|kid| self.validators[kid].to_jwk(kid, Some(self.signing_method)))
			.collect::<Result<Vec<_>>>()?;

		Ok(JwkSet { keys })
	}

	/// Sign `claims` with the configured method.
	///
	/// The default signer is used when it can produce the method, otherwise the first compatible
	/// signer by kid.
	pub fn sign<T>(&self, claims: &T) -> Result<String>
	where
		T: Serialize,
	{
		let algorithm = self.signing_method.algorithm().ok_or_else(|| {
			Error::Config(format!("Cannot sign with method '{}'.", self.signing_method))
		})?;
		let signer = self
			.default_signer()
			.filter(|signer| signer.can_sign(self.signing_method))
			.or_else(|| {
				let mut compatible = self
					.signers
					.values()
					.filter(|signer| signer.can_sign(self.signing_method))
					.collect::<Vec<_>>();

				compatible.sort_unstable_by(|a, b| a.kid.cmp(&b.kid));
				compatible.into_iter().next()
			})
			.ok_or_else(|| {
				Error::Config(format!("No signer can produce '{}' tokens.", self.signing_method))
			})?;
		let mut header = Header::new(algorithm);

		header.kid = Some(signer.kid.clone());

		Ok(jsonwebtoken::encode(&header, claims, &signer.encoding_key()?)?)
	}

	/// Verify a token against the validator named by its header kid.
	///
	/// The header algorithm must be one the key can verify; `validation` algorithms are replaced by
	/// that algorithm.
	pub fn verify<T>(&self, token: &str, validation: &Validation) -> Result<TokenData<T>>
	where
		T: DeserializeOwned,
	{
		let header = jsonwebtoken::decode_header(token)?;
		let kid = header.kid.ok_or_else(|| Error::InvalidToken("Missing kid header.".into()))?;
		let key = self
			.validators
			.get(&kid)
			.ok_or_else(|| Error::InvalidToken(format!("Unknown kid '{kid}'.")))?;

		if !key.supports(SigningMethod::Jws(header.alg)) {
			return Err(Error::InvalidToken(format!(
				"Key '{kid}' cannot verify {} signatures.",
				SigningMethod::Jws(header.alg)
			)));
		}

		let mut validation = validation.clone();

		validation.algorithms = vec![header.alg];

		Ok(jsonwebtoken::decode(token, &key.decoding_key()?, &validation)?)
	}
}

fn access_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
	move |err| Error::Config(format!("Cannot access {}: {err}.", path.display()))
}

/// Key identifier derived from a key file name: the name without its last extension.
pub fn kid_from_file_name(path: &Path) -> Result<String> {
	path.file_stem()
		.and_then(|stem| stem.to_str())
		.filter(|stem| !stem.is_empty())
		.map(str::to_owned)
		.ok_or_else(|| {
			Error::Config(format!("Cannot derive a key identifier from {}.", path.display()))
		})
}

fn default_signing_method() -> String {
	DEFAULT_SIGNING_METHOD.into()
}
