//! URL checks shared by client registration and authority discovery.

// crates.io
use url::Url;
// self
use crate::_prelude::*;

/// Canonicalise a DNS name by trimming whitespace, removing any trailing dot, and lowercasing.
pub fn canonicalize_dns_name(value: &str) -> Option<String> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return None;
	}

	let without_trailing_dot = trimmed.trim_end_matches('.');

	if without_trailing_dot.is_empty() {
		return None;
	}

	Some(without_trailing_dot.to_ascii_lowercase())
}

/// Whether the URL targets the `localhost` host name.
pub fn is_localhost(url: &Url) -> bool {
	url.host_str().and_then(canonicalize_dns_name).is_some_and(|host| host == "localhost")
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Upstream URL {url} must use HTTPS.")))
	}
}

/// [`enforce_https`] unless `insecure` is set.
pub fn enforce_https_unless(url: &Url, insecure: bool) -> Result<()> {
	if insecure {
		tracing::debug!(%url, "HTTPS enforcement disabled");

		return Ok(());
	}

	enforce_https(url)
}
