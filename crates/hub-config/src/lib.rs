//! Configuration loading for the settlement layer.
//!
//! Configuration is TOML with `${VAR}` environment substitution, plus a small
//! set of direct environment overrides under the `HUB_` prefix.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Fee parameters of the settlement layer.
///
/// All three are decimal rates in `[0, 1)`. The bridging fee is skimmed from
/// every inbound transfer at order creation; the multipliers price the demand
/// orders spawned for failed or timed-out outbound transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
	#[serde(default = "default_bridging_fee_rate")]
	pub bridging_fee_rate: Decimal,
	#[serde(default = "default_errack_fee_multiplier")]
	pub errack_fee_multiplier: Decimal,
	#[serde(default = "default_timeout_fee_multiplier")]
	pub timeout_fee_multiplier: Decimal,
}

fn default_bridging_fee_rate() -> Decimal {
	// 0.1%
	Decimal::new(1, 3)
}

fn default_errack_fee_multiplier() -> Decimal {
	// 0.15%
	Decimal::new(15, 4)
}

fn default_timeout_fee_multiplier() -> Decimal {
	// 0.15%
	Decimal::new(15, 4)
}

impl Default for Params {
	fn default() -> Self {
		Self {
			bridging_fee_rate: default_bridging_fee_rate(),
			errack_fee_multiplier: default_errack_fee_multiplier(),
			timeout_fee_multiplier: default_timeout_fee_multiplier(),
		}
	}
}

impl Params {
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (name, rate) in [
			("bridging_fee_rate", self.bridging_fee_rate),
			("errack_fee_multiplier", self.errack_fee_multiplier),
			("timeout_fee_multiplier", self.timeout_fee_multiplier),
		] {
			if rate < Decimal::ZERO || rate >= Decimal::ONE {
				return Err(ConfigError::ValidationError(format!(
					"{} must lie in [0, 1): {}",
					name, rate
				)));
			}
		}
		Ok(())
	}
}

/// Top-level settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default)]
	pub params: Params,
}

fn default_log_level() -> String {
	"info".to_string()
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			log_level: default_log_level(),
			params: Params::default(),
		}
	}
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "HUB_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<HubConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;

		config.params.validate()?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<HubConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;

		let substituted_content = self.substitute_env_vars(&content)?;

		let config: HubConfig = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut HubConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.log_level = log_level;
		}

		if let Ok(rate) = env::var(format!("{}BRIDGING_FEE_RATE", self.env_prefix)) {
			config.params.bridging_fee_rate = rate.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid bridging fee rate: {}", e))
			})?;
		}

		Ok(())
	}
}
