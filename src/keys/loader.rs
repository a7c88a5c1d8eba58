//! PEM key file loading.
//!
//! Each supported encoding is one entry in an ordered parser table; the first structurally valid
//! parse wins and loading fails only when no entry applies.

// std
use std::path::Path;
// crates.io
use rsa::{
	RsaPrivateKey, RsaPublicKey,
	pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
	pkcs8::{DecodePrivateKey, DecodePublicKey, der::pem},
};
// self
use crate::{
	_prelude::*,
	keys::material::{SignerKey, ValidatorKey},
};

type Parser<T> = fn(&[u8]) -> Option<T>;

const SIGNER_PARSERS: &[(&str, Parser<SignerKey>)] = &[
	("PKCS#1 private key", signer_from_pkcs1),
	("PKCS#8 private key", signer_from_pkcs8),
	("SEC1 EC private key", signer_from_sec1),
];
const VALIDATOR_PARSERS: &[(&str, Parser<ValidatorKey>)] = &[
	("PKIX public key", validator_from_pkix),
	("PKCS#1 public key", validator_from_pkcs1_public),
	("PKCS#1 private key", validator_from_pkcs1_private),
	("PKCS#8 private key", validator_from_pkcs8_private),
	("SEC1 EC private key", validator_from_sec1_private),
];

/// Load a signing key from a PEM file.
pub fn load_signer(path: &Path) -> Result<SignerKey> {
	let pem = read_key_file(path)?;

	parse_with(SIGNER_PARSERS, &pem).map_err(|reason| Error::KeyParse { path: path.into(), reason })
}

/// Load a validation key from a PEM file.
pub fn load_validator(path: &Path) -> Result<ValidatorKey> {
	let pem = read_key_file(path)?;

	parse_with(VALIDATOR_PARSERS, &pem)
		.map_err(|reason| Error::KeyParse { path: path.into(), reason })
}

/// Parse a signing key from PEM text.
pub fn parse_signer(pem: &[u8]) -> std::result::Result<SignerKey, String> {
	parse_with(SIGNER_PARSERS, pem)
}

/// Parse a validation key from PEM text.
pub fn parse_validator(pem: &[u8]) -> std::result::Result<ValidatorKey, String> {
	parse_with(VALIDATOR_PARSERS, pem)
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
	std::fs::read(path)
		.map_err(|err| Error::KeyParse { path: path.into(), reason: format!("Cannot read file: {err}.") })
}

fn parse_with<T>(parsers: &[(&str, Parser<T>)], pem: &[u8]) -> std::result::Result<T, String> {
	let der = first_pem_block(pem)?;

	for (encoding, parse) in parsers {
		if let Some(key) = parse(&der) {
			tracing::trace!(encoding, "parsed key");

			return Ok(key);
		}
	}

	Err(format!("Not a supported key encoding (tried {}).", describe(parsers)))
}

fn describe<T>(parsers: &[(&str, Parser<T>)]) -> String {
	parsers.iter().map(|(encoding, _)| *encoding).collect::<Vec<_>>().join(", ")
}

// The decoder skips any preamble; blocks after the first one are cut off here.
fn first_pem_block(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
	let text = std::str::from_utf8(data).map_err(|_| "PEM data is not text.".to_owned())?;
	let post_boundary = text.find("-----END ").ok_or_else(|| "No PEM block found.".to_owned())?;
	let end = text[post_boundary..]
		.find('\n')
		.map_or(text.len(), |offset| post_boundary + offset + 1);
	let (_, der) = pem::decode_vec(text[..end].as_bytes())
		.map_err(|err| format!("Invalid PEM data: {err}."))?;

	if der.is_empty() {
		return Err("Empty PEM block.".into());
	}

	Ok(der)
}

fn signer_from_pkcs1(der: &[u8]) -> Option<SignerKey> {
	RsaPrivateKey::from_pkcs1_der(der).ok().map(SignerKey::Rsa)
}

fn signer_from_pkcs8(der: &[u8]) -> Option<SignerKey> {
	RsaPrivateKey::from_pkcs8_der(der)
		.map(SignerKey::Rsa)
		.or_else(|_| p256::SecretKey::from_pkcs8_der(der).map(SignerKey::EcP256))
		.or_else(|_| p384::SecretKey::from_pkcs8_der(der).map(SignerKey::EcP384))
		.ok()
}

fn signer_from_sec1(der: &[u8]) -> Option<SignerKey> {
	p256::SecretKey::from_sec1_der(der)
		.map(SignerKey::EcP256)
		.or_else(|_| p384::SecretKey::from_sec1_der(der).map(SignerKey::EcP384))
		.ok()
}

fn validator_from_pkix(der: &[u8]) -> Option<ValidatorKey> {
	RsaPublicKey::from_public_key_der(der)
		.map(ValidatorKey::Rsa)
		.or_else(|_| p256::PublicKey::from_public_key_der(der).map(ValidatorKey::EcP256))
		.or_else(|_| p384::PublicKey::from_public_key_der(der).map(ValidatorKey::EcP384))
		.ok()
}

fn validator_from_pkcs1_public(der: &[u8]) -> Option<ValidatorKey> {
	RsaPublicKey::from_pkcs1_der(der).ok().map(ValidatorKey::Rsa)
}

fn validator_from_pkcs1_private(der: &[u8]) -> Option<ValidatorKey> {
	signer_from_pkcs1(der).map(|key| key.public_key())
}

fn validator_from_pkcs8_private(der: &[u8]) -> Option<ValidatorKey> {
	signer_from_pkcs8(der).map(|key| key.public_key())
}

fn validator_from_sec1_private(der: &[u8]) -> Option<ValidatorKey> {
	signer_from_sec1(der).map(|key| key.public_key())
}
