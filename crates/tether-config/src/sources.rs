// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tether_core::LevelFilter;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::TetherConfigLayer;
use crate::sections::{BatcherConfigLayer, BreakerConfigLayer, SourceMapsConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TetherConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TetherConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(TetherConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$XDG_CONFIG_HOME/tether/tether.toml`, usually `~/.config/tether/tether.toml`.
	pub fn user() -> Result<Self, ConfigError> {
		Ok(Self::new(default_config_path()?))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Default location of the user config file.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
	let config_dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
	Ok(config_dir.join("tether").join("tether.toml"))
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TetherConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TetherConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: TetherConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `TETHER_<FIELD>`, e.g. `TETHER_SERVER_URL`, `TETHER_DEBOUNCE_MS`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TetherConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from_vars(|name| std::env::var(name).ok())
	}
}

/// Build a layer from `TETHER_*` variables read through `lookup`.
pub fn load_from_vars<F>(lookup: F) -> Result<TetherConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let vars = Vars(lookup);

	let batcher = BatcherConfigLayer {
		debounce_ms: vars.parsed("TETHER_DEBOUNCE_MS")?,
		max_batch_size: vars.parsed("TETHER_MAX_BATCH_SIZE")?,
		max_pending_buffer: vars.parsed("TETHER_MAX_PENDING_BUFFER")?,
		retry_budget: vars.parsed("TETHER_RETRY_BUDGET")?,
	};
	let breaker = BreakerConfigLayer {
		max_failures: vars.parsed("TETHER_MAX_FAILURES")?,
		reset_timeout_ms: vars.parsed("TETHER_RESET_TIMEOUT_MS")?,
		backoff_schedule_ms: None,
	};
	let source_maps = SourceMapsConfigLayer {
		enabled: vars.bool("TETHER_SOURCE_MAPS_ENABLED"),
		cache_capacity: vars.parsed("TETHER_SOURCE_MAP_CACHE_CAPACITY")?,
	};

	Ok(TetherConfigLayer {
		server_url: vars.string("TETHER_SERVER_URL"),
		log_level: vars.parsed::<LevelFilter>("TETHER_LOG_LEVEL")?,
		request_timeout_ms: vars.parsed("TETHER_REQUEST_TIMEOUT_MS")?,
		batcher: Some(batcher),
		breaker: Some(breaker),
		error_groups: None,
		memory: None,
		source_maps: Some(source_maps),
	})
}

struct Vars<F>(F);

impl<F> Vars<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn string(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.string(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.string(name) {
			Some(v) => v
				.trim()
				.to_lowercase()
				.parse()
				.map(Some)
				.map_err(|e| ConfigError::invalid_value(name, format!("'{v}': {e}"))),
			None => Ok(None),
		}
	}
}
