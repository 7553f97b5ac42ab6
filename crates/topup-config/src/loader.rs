use crate::{Config, ConfigError};
use regex::Regex;
use std::env;
use std::path::Path;

/// Configuration loader with environment variable substitution.
///
/// `${VAR}` references in the file are replaced with the variable's value
/// before parsing. `<PREFIX>LOG_LEVEL` and `<PREFIX>HTTP_PORT` override the
/// matching service settings after parsing.
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "TOPUP_".to_string(),
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

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};
		let mut config = self.load_from_file(file_path).await?;

		self.apply_env_overrides(&mut config)?;
		self.validate_config(&config)?;

		tracing::debug!(path = %file_path, "Configuration loaded");
		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = self.substitute_env_vars(&content)?;

		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
		let mut result = content.to_string();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}

	fn validate_config(&self, config: &Config) -> Result<(), ConfigError> {
		let order = &config.order;
		let durations = [
			("order.cache_ttl_secs", order.cache_ttl_secs),
			("order.lock_timeout_secs", order.lock_timeout_secs),
			("order.idempotency_ttl_secs", order.idempotency_ttl_secs),
			("order.purge_interval_secs", order.purge_interval_secs),
		];
		for (name, value) in durations {
			if value == 0 {
				return Err(ConfigError::ValidationError(format!(
					"{} must be greater than zero",
					name
				)));
			}
		}

		if order.event_capacity == 0 {
			return Err(ConfigError::ValidationError(
				"order.event_capacity must be greater than zero".to_string(),
			));
		}

		if !order.callback_url.starts_with("http://") && !order.callback_url.starts_with("https://") {
			return Err(ConfigError::ValidationError(
				"order.callback_url must be an http(s) URL".to_string(),
			));
		}

		let backends = [
			("cache", &config.cache),
			("idempotency", config.idempotency_backend()),
			("lock", &config.lock),
			("ledger", &config.ledger),
			("catalog", &config.catalog),
			("payment", &config.payment),
		];
		for (section, backend) in backends {
			if backend.backend.trim().is_empty() {
				return Err(ConfigError::ValidationError(format!(
					"{}.backend must not be empty",
					section
				)));
			}
			if !backend.config.is_table() {
				return Err(ConfigError::ValidationError(format!(
					"{}.config must be a table",
					section
				)));
			}
		}

		Ok(())
	}
}
