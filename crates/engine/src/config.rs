// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{env, time::Duration};

use anyhow::{Context, Result};
use parlay_sdk::SignatureAlgorithm;
use serde::{Deserialize, Serialize};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "engine";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Ledger configuration constants
/// Default ledger node URL (can be overridden by PARLAY_LEDGER_URL)
pub const DEFAULT_LEDGER_URL: &str = "http://localhost:8545";

/// Gas budget used when estimation fails; covers the heaviest write (createMatch)
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// Default interval between receipt polls in milliseconds
pub const DEFAULT_CONFIRMATION_POLL_MS: u64 = 1_000;

/// Default time to wait for a receipt before reporting a transport failure
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Default per-request HTTP timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of status events kept for history
pub const DEFAULT_STATUS_HISTORY: usize = 256;

/// Largest match count a refresh will walk; higher counts are treated as a bad answer
pub const MAX_TRACKED_MATCHES: u64 = 100_000;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Ledger node base URL
	pub ledger_url: String,
	/// Gas budget substituted when estimation fails
	pub default_gas_limit: u64,
	/// Receipt polling interval
	pub confirmation_poll_ms: u64,
	/// Maximum wait for a receipt
	pub confirmation_timeout_secs: u64,
	/// Per-request HTTP timeout
	pub request_timeout_secs: u64,
	/// Status events retained in the history log
	pub status_history: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			ledger_url: DEFAULT_LEDGER_URL.to_string(),
			default_gas_limit: DEFAULT_GAS_LIMIT,
			confirmation_poll_ms: DEFAULT_CONFIRMATION_POLL_MS,
			confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			status_history: DEFAULT_STATUS_HISTORY,
		}
	}
}

impl EngineConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("PARLAY"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("PARLAY"))
			.build()?;

		cfg.try_deserialize()
	}

	pub fn confirmation_poll_interval(&self) -> Duration {
		Duration::from_millis(self.confirmation_poll_ms)
	}

	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

/// Settings for the `parlay` binary that are not part of the engine itself
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	/// Optional config file (PARLAY_CONFIG_FILE)
	pub config_file: Option<String>,
	/// Use the in-process demo ledger instead of a node (PARLAY_DEMO)
	pub demo: bool,
	/// Hex private key of the connected account (PARLAY_PRIVATE_KEY)
	pub private_key: Option<String>,
	/// Key algorithm (PARLAY_KEY_ALGORITHM, default ecdsa)
	pub key_algorithm: SignatureAlgorithm,
}

impl RuntimeConfig {
	pub fn from_env() -> Result<Self> {
		dotenv::dotenv().ok();

		let config_file = env::var("PARLAY_CONFIG_FILE").ok();

		let demo = env::var("PARLAY_DEMO")
			.map(|v| v == "true" || v == "1" || v == "yes")
			.unwrap_or(false);

		let private_key = env::var("PARLAY_PRIVATE_KEY").ok().filter(|k| !k.is_empty());

		let key_algorithm = match env::var("PARLAY_KEY_ALGORITHM") {
			Ok(hint) => SignatureAlgorithm::parse(&hint)
				.with_context(|| format!("Invalid PARLAY_KEY_ALGORITHM: {}", hint))?,
			Err(_) => SignatureAlgorithm::Ecdsa,
		};

		Ok(Self {
			config_file,
			demo,
			private_key,
			key_algorithm,
		})
	}

	/// Engine configuration from the config file (if set) or the environment
	pub fn engine_config(&self) -> Result<EngineConfig> {
		match &self.config_file {
			Some(path) => EngineConfig::from_file(path)
				.with_context(|| format!("Failed to load config file: {}", path)),
			None => EngineConfig::from_env().context("Failed to load configuration from environment"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = EngineConfig::default();
		assert_eq!(config.ledger_url, DEFAULT_LEDGER_URL);
		assert_eq!(config.default_gas_limit, 300_000);
		assert_eq!(config.confirmation_poll_interval(), Duration::from_secs(1));
		assert_eq!(config.confirmation_timeout(), Duration::from_secs(120));
	}

	#[test]
	fn test_log_constants() {
		assert_eq!(LOG_COMPONENT_NAME, "engine");
		assert_eq!(DEFAULT_LOG_LEVEL, "info");
		const _: () = {
			assert!(!DEFAULT_LOG_TO_CONSOLE);
		};
	}

	#[test]
	fn test_missing_fields_fall_back_to_defaults() {
		let config: EngineConfig =
			serde_json::from_str(r#"{"ledger_url":"http://node:8545"}"#).unwrap();
		assert_eq!(config.ledger_url, "http://node:8545");
		assert_eq!(config.default_gas_limit, DEFAULT_GAS_LIMIT);
		assert_eq!(config.status_history, DEFAULT_STATUS_HISTORY);
	}
}
