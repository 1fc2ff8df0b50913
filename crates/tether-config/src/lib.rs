// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the tether telemetry pipeline.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of the merged result
//! - Conversion into [`tether_delivery::PipelineOptions`]
//!
//! # Usage
//!
//! ```ignore
//! use tether_config::load_config;
//!
//! let config = load_config()?;
//! let pipeline = tether_delivery::TelemetryPipeline::new(config.to_pipeline_options())?;
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::TetherConfigLayer;
pub use sections::*;
pub use sources::{
	default_config_path, load_from_vars, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};

use std::path::PathBuf;
use std::time::Duration;

use tether_core::LevelFilter;
use tether_delivery::PipelineOptions;
use tracing::{debug, info};
use url::Url;

/// Default collector address.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:7890";

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
	pub server_url: String,
	/// Capture filter for console entries.
	pub log_level: LevelFilter,
	pub request_timeout_ms: u64,
	pub batcher: BatcherSettings,
	pub breaker: BreakerSettings,
	pub error_groups: ErrorGroupsSettings,
	pub memory: MemorySettings,
	pub source_maps: SourceMapsSettings,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		finalize_layer(TetherConfigLayer::default())
	}
}

impl PipelineConfig {
	pub fn to_pipeline_options(&self) -> PipelineOptions {
		PipelineOptions {
			server_url: self.server_url.clone(),
			request_timeout: Duration::from_millis(self.request_timeout_ms),
			capture_filter: self.log_level,
			batcher: self.batcher.to_batcher_config(),
			breaker: self.breaker.to_breaker_config(),
			error_groups: self.error_groups.to_error_group_config(),
			memory: self.memory.to_memory_config(),
			source_maps_enabled: self.source_maps.enabled,
			source_map_cache_capacity: self.source_maps.cache_capacity,
		}
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TETHER_*`)
/// 2. Config file (`~/.config/tether/tether.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PipelineConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::user()?),
		Box::new(EnvSource),
	];
	load_sources(sources)
}

/// Load configuration with a custom config file path.
pub fn load_config_from(config_path: impl Into<PathBuf>) -> Result<PipelineConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	load_sources(sources)
}

/// Merge `sources` in precedence order, then finalize and validate.
pub fn load_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<PipelineConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = TetherConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize a merged layer into a validated configuration.
pub fn finalize(layer: TetherConfigLayer) -> Result<PipelineConfig, ConfigError> {
	let config = finalize_layer(layer);
	validate_config(&config)?;

	info!(
		server_url = %config.server_url,
		log_level = %config.log_level,
		max_batch_size = config.batcher.max_batch_size,
		max_failures = config.breaker.max_failures,
		source_maps = config.source_maps.enabled,
		"tether configuration loaded"
	);
	Ok(config)
}

fn finalize_layer(layer: TetherConfigLayer) -> PipelineConfig {
	PipelineConfig {
		server_url: layer.server_url.unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
		log_level: layer.log_level.unwrap_or_default(),
		request_timeout_ms: layer.request_timeout_ms.unwrap_or(5_000),
		batcher: layer.batcher.unwrap_or_default().finalize(),
		breaker: layer.breaker.unwrap_or_default().finalize(),
		error_groups: layer.error_groups.unwrap_or_default().finalize(),
		memory: layer.memory.unwrap_or_default().finalize(),
		source_maps: layer.source_maps.unwrap_or_default().finalize(),
	}
}

/// Validate cross-field configuration rules.
fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
	let url = Url::parse(&config.server_url)
		.map_err(|e| ConfigError::invalid_value("server_url", format!("'{}': {e}", config.server_url)))?;
	if !matches!(url.scheme(), "http" | "https") {
		return Err(ConfigError::invalid_value(
			"server_url",
			format!("unsupported scheme '{}', expected http or https", url.scheme()),
		));
	}

	if config.batcher.max_batch_size == 0 {
		return Err(ConfigError::validation("batcher.max_batch_size must be greater than 0"));
	}
	if config.batcher.max_pending_buffer < config.batcher.max_batch_size {
		return Err(ConfigError::validation(
			"batcher.max_pending_buffer must be at least batcher.max_batch_size",
		));
	}
	if config.batcher.retry_budget == 0 {
		return Err(ConfigError::validation("batcher.retry_budget must be at least 1"));
	}
	if config.breaker.max_failures == 0 {
		return Err(ConfigError::validation("breaker.max_failures must be at least 1"));
	}
	if config.breaker.backoff_schedule_ms.is_empty() {
		return Err(ConfigError::validation("breaker.backoff_schedule_ms must not be empty"));
	}
	if config.error_groups.flush_interval_ms == 0 || config.memory.check_interval_ms == 0 {
		return Err(ConfigError::validation("sweep intervals must be greater than 0"));
	}
	if config.memory.soft_limit_bytes > config.memory.hard_limit_bytes {
		return Err(ConfigError::validation(
			"memory.soft_limit_bytes must not exceed memory.hard_limit_bytes",
		));
	}

	Ok(())
}
