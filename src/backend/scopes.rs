//! Scope metadata published by backends for consent and discovery.

// std
use std::collections::BTreeMap;
// crates.io
use serde::{Deserialize, Serialize};

/// Presentation details for one scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDefinition {
	/// Ordering hint; higher values are shown first.
	#[serde(default)]
	pub priority: i32,
	/// Human readable description.
	#[serde(default)]
	pub description: String,
}

/// Scope metadata keyed by scope name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopesMeta {
	/// Scope aliases resolved before looking up a definition.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub mapping: BTreeMap<String, String>,
	/// Definitions by scope name.
	#[serde(default)]
	pub definitions: BTreeMap<String, ScopeDefinition>,
}
impl ScopesMeta {
	/// Add or replace the definition of `scope`.
	pub fn with_definition(
		mut self,
		scope: impl Into<String>,
		priority: i32,
		description: impl Into<String>,
	) -> Self {
		self.definitions
			.insert(scope.into(), ScopeDefinition { priority, description: description.into() });

		self
	}

	/// Resolve `alias` to `scope` before definition lookups.
	pub fn with_alias(mut self, alias: impl Into<String>, scope: impl Into<String>) -> Self {
		self.mapping.insert(alias.into(), scope.into());

		self
	}

	/// Definition of `scope`, following one alias hop.
	pub fn get(&self, scope: &str) -> Option<&ScopeDefinition> {
		let scope = self.mapping.get(scope).map_or(scope, String::as_str);

		self.definitions.get(scope)
	}

	/// Merge `other` into this set; entries of `other` win.
	pub fn extend(&mut self, other: &Self) {
		self.mapping.extend(other.mapping.iter().map(|(k, v)| (k.clone(), v.clone())));
		self.definitions.extend(other.definitions.iter().map(|(k, v)| (k.clone(), v.clone())));
	}
}
