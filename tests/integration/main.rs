//! Integration tests for the identity provider core.

mod authority_discovery;
mod key_registry;
mod server_backend;
