//! Session configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Protocol feature switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
	/// Request delta-encoded results where the method allows it.
	#[serde(default = "default_delta")]
	pub delta: bool,
}

impl Default for ProtocolConfig {
	fn default() -> Self {
		Self { delta: default_delta() }
	}
}

fn default_delta() -> bool {
	true
}

/// Configuration for a session.
///
/// ```toml
/// url = "ws://localhost:9076/app/engineData"
/// suspend_on_close = true
///
/// [protocol]
/// delta = true
///
/// [headers]
/// X-Qlik-User = "UserDirectory=internal; UserId=sa_engine"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Engine WebSocket url.
	pub url: String,
	/// Suspend instead of closing when the socket drops unexpectedly.
	#[serde(default)]
	pub suspend_on_close: bool,
	/// Protocol switches.
	#[serde(default)]
	pub protocol: ProtocolConfig,
	/// Extra headers for the WebSocket upgrade request.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
}

impl SessionConfig {
	/// Creates a configuration with defaults for everything but the url.
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			suspend_on_close: false,
			protocol: ProtocolConfig::default(),
			headers: BTreeMap::new(),
		}
	}

	/// Parses a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self> {
		toml::from_str(input).map_err(|e| Error::Config(e.to_string()))
	}

	/// Set whether an unexpected close suspends the session.
	pub fn suspend_on_close(mut self, suspend: bool) -> Self {
		self.suspend_on_close = suspend;
		self
	}

	/// Enable or disable the delta protocol.
	pub fn delta(mut self, delta: bool) -> Self {
		self.protocol.delta = delta;
		self
	}

	/// Add an upgrade header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}
}
