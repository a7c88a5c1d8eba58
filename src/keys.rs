//! Signing and validation key material: PEM loading, signing methods and the startup registry.

pub mod loader;
pub mod material;
pub mod method;
pub mod registry;

pub use loader::{load_signer, load_validator};
pub use material::{MIN_RSA_PUBLIC_EXPONENT, SignerKey, ValidatorKey};
pub use method::{KeyFamily, SigningMethod};
pub use registry::{KeyRegistry, KeysConfig, Signer};
