//! Signer and validator key material.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use base64::prelude::*;
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey,
	jwk::{
		AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
		EllipticCurveKeyType, Jwk, KeyAlgorithm, PublicKeyUse, RSAKeyParameters, RSAKeyType,
	},
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::{
	BigUint, RsaPrivateKey, RsaPublicKey, pkcs1::EncodeRsaPrivateKey, pkcs8::EncodePrivateKey,
	traits::PublicKeyParts,
};
// self
use crate::{
	_prelude::*,
	keys::method::{KeyFamily, SigningMethod},
};

/// Smallest RSA public exponent accepted for signing keys.
pub const MIN_RSA_PUBLIC_EXPONENT: u32 = 65_537;

/// Private key able to sign tokens.
#[derive(Clone)]
pub enum SignerKey {
	/// RSA private key, usable for RSA and RSA-PSS methods.
	Rsa(RsaPrivateKey),
	/// NIST P-256 private key.
	EcP256(p256::SecretKey),
	/// NIST P-384 private key.
	EcP384(p384::SecretKey),
}
impl SignerKey {
	/// Short description of the key type.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Rsa(_) => "RSA",
			Self::EcP256(_) => "EC P-256",
			Self::EcP384(_) => "EC P-384",
		}
	}

	/// Whether this key can back methods of `family`.
	pub fn supports(&self, family: KeyFamily) -> bool {
		match self {
			Self::Rsa(_) => family.is_rsa(),
			Self::EcP256(_) | Self::EcP384(_) => family == KeyFamily::Ecdsa,
		}
	}

	/// ECDSA method matching the key's curve; RSA keys have none.
	pub fn ecdsa_method(&self) -> Option<SigningMethod> {
		match self {
			Self::Rsa(_) => None,
			Self::EcP256(_) => Some(SigningMethod::Jws(Algorithm::ES256)),
			Self::EcP384(_) => Some(SigningMethod::Jws(Algorithm::ES384)),
		}
	}

	/// Public exponent of RSA keys.
	pub fn rsa_public_exponent(&self) -> Option<&BigUint> {
		match self {
			Self::Rsa(key) => Some(key.e()),
			_ => None,
		}
	}

	/// Public half of the key.
	pub fn public_key(&self) -> ValidatorKey {
		match self {
			Self::Rsa(key) => ValidatorKey::Rsa(key.to_public_key()),
			Self::EcP256(key) => ValidatorKey::EcP256(key.public_key()),
			Self::EcP384(key) => ValidatorKey::EcP384(key.public_key()),
		}
	}

	/// Token signing key.
	pub fn encoding_key(&self) -> Result<EncodingKey> {
		let der_error = |err: &dyn std::fmt::Display| {
			Error::Config(format!("Failed to encode {} signing key: {err}.", self.kind()))
		};

		match self {
			Self::Rsa(key) => {
				let der = key.to_pkcs1_der().map_err(|err| der_error(&err))?;

				Ok(EncodingKey::from_rsa_der(der.as_bytes()))
			},
			Self::EcP256(key) => {
				let der = key.to_pkcs8_der().map_err(|err| der_error(&err))?;

				Ok(EncodingKey::from_ec_der(der.as_bytes()))
			},
			Self::EcP384(key) => {
				let der = key.to_pkcs8_der().map_err(|err| der_error(&err))?;

				Ok(EncodingKey::from_ec_der(der.as_bytes()))
			},
		}
	}
}
impl Debug for SignerKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "SignerKey({})", self.kind())
	}
}

/// Public key able to verify tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatorKey {
	/// RSA public key.
	Rsa(RsaPublicKey),
	/// NIST P-256 public key.
	EcP256(p256::PublicKey),
	/// NIST P-384 public key.
	EcP384(p384::PublicKey),
}
impl ValidatorKey {
	/// Short description of the key type.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Rsa(_) => "RSA",
			Self::EcP256(_) => "EC P-256",
			Self::EcP384(_) => "EC P-384",
		}
	}

	/// Whether this key can verify signatures made with `method`.
	pub fn supports(&self, method: SigningMethod) -> bool {
		match (self, method.algorithm()) {
			(Self::Rsa(_), _) => method.family().is_some_and(KeyFamily::is_rsa),
			(Self::EcP256(_), Some(Algorithm::ES256)) => true,
			(Self::EcP384(_), Some(Algorithm::ES384)) => true,
			_ => false,
		}
	}

	/// Token verification key.
	pub fn decoding_key(&self) -> Result<DecodingKey> {
		match self {
			Self::Rsa(key) =>
				Ok(DecodingKey::from_rsa_raw_components(&key.n().to_bytes_be(), &key.e().to_bytes_be())),
			Self::EcP256(_) | Self::EcP384(_) => {
				let (x, y) = self.ec_coordinates()?;

				Ok(DecodingKey::from_ec_components(&x, &y)?)
			},
		}
	}

	/// JSON Web Key representation, published with `use=sig`.
	pub fn to_jwk(&self, kid: &str, method: Option<SigningMethod>) -> Result<Jwk> {
		let algorithm = match self {
			Self::Rsa(key) => AlgorithmParameters::RSA(RSAKeyParameters {
				key_type: RSAKeyType::RSA,
				n: BASE64_URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
				e: BASE64_URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
			}),
			Self::EcP256(_) | Self::EcP384(_) => {
				let (x, y) = self.ec_coordinates()?;
				let curve =
					if matches!(self, Self::EcP256(_)) { EllipticCurve::P256 } else { EllipticCurve::P384 };

				AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
					key_type: EllipticCurveKeyType::EC,
					curve,
					x,
					y,
				})
			},
		};
		let key_algorithm = method
			.filter(|method| self.supports(*method))
			.and_then(|method| method.name().parse::<KeyAlgorithm>().ok());

		Ok(Jwk {
			common: CommonParameters {
				public_key_use: Some(PublicKeyUse::Signature),
				key_algorithm,
				key_id: Some(kid.to_owned()),
				..Default::default()
			},
			algorithm,
		})
	}

	/// Convert a JSON Web Key into a validator key.
	pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
		let invalid = |reason: String| Error::Validation { field: "jwk", reason };

		match &jwk.algorithm {
			AlgorithmParameters::RSA(params) => {
				let n = BASE64_URL_SAFE_NO_PAD
					.decode(params.n.trim_end_matches('='))
					.map_err(|err| invalid(format!("Invalid RSA modulus encoding: {err}.")))?;
				let e = BASE64_URL_SAFE_NO_PAD
					.decode(params.e.trim_end_matches('='))
					.map_err(|err| invalid(format!("Invalid RSA exponent encoding: {err}.")))?;
				let key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
					.map_err(|err| invalid(format!("Invalid RSA public key: {err}.")))?;

				Ok(Self::Rsa(key))
			},
			AlgorithmParameters::EllipticCurve(params) => {
				let x = BASE64_URL_SAFE_NO_PAD
					.decode(&params.x)
					.map_err(|err| invalid(format!("Invalid EC x coordinate encoding: {err}.")))?;
				let y = BASE64_URL_SAFE_NO_PAD
					.decode(&params.y)
					.map_err(|err| invalid(format!("Invalid EC y coordinate encoding: {err}.")))?;
				let mut point = Vec::with_capacity(1 + x.len() + y.len());

				point.push(0x04);
				point.extend_from_slice(&x);
				point.extend_from_slice(&y);

				match params.curve {
					EllipticCurve::P256 => p256::PublicKey::from_sec1_bytes(&point)
						.map(Self::EcP256)
						.map_err(|_| invalid("Invalid P-256 public key.".into())),
					EllipticCurve::P384 => p384::PublicKey::from_sec1_bytes(&point)
						.map(Self::EcP384)
						.map_err(|_| invalid("Invalid P-384 public key.".into())),
					ref curve => Err(invalid(format!("Unsupported curve {curve:?}."))),
				}
			},
			_ => Err(invalid("Unsupported key type.".into())),
		}
	}

	fn ec_coordinates(&self) -> Result<(String, String)> {
		let point = match self {
			Self::EcP256(key) => {
				let point = key.to_encoded_point(false);

				point.x().zip(point.y()).map(|(x, y)| (x.to_vec(), y.to_vec()))
			},
			Self::EcP384(key) => {
				let point = key.to_encoded_point(false);

				point.x().zip(point.y()).map(|(x, y)| (x.to_vec(), y.to_vec()))
			},
			Self::Rsa(_) => None,
		};
		let (x, y) = point.ok_or_else(|| Error::Validation {
			field: "jwk",
			reason: format!("{} key has no affine coordinates.", self.kind()),
		})?;

		Ok((BASE64_URL_SAFE_NO_PAD.encode(x), BASE64_URL_SAFE_NO_PAD.encode(y)))
	}
}
