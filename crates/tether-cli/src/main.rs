// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `tether` - ship captured browser telemetry to a local collector.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tether_config::PipelineConfig;
use tracing_subscriber::EnvFilter;

mod ingest;
mod resolve;

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Browser telemetry delivery pipeline", version)]
struct Args {
	/// Config file (defaults to ~/.config/tether/tether.toml)
	#[arg(long, global = true, env = "TETHER_CONFIG")]
	config: Option<PathBuf>,

	/// Collector base URL, overriding the config file
	#[arg(long, global = true)]
	server_url: Option<String>,

	/// Log output format
	#[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Read newline-delimited JSON entries from stdin and deliver them (default)
	Ingest(ingest::IngestArgs),
	/// Probe the collector's health endpoint
	Health,
	/// Resolve a minified stack trace against a source map file
	Resolve(resolve::ResolveArgs),
	/// Show version information
	Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
	Text,
	Json,
}

fn init_tracing(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr);
	match format {
		LogFormat::Text => builder.init(),
		LogFormat::Json => builder.json().init(),
	}
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
	let mut config = match &args.config {
		Some(path) => tether_config::load_config_from(path)
			.with_context(|| format!("loading config from {}", path.display()))?,
		None => tether_config::load_config().context("loading config")?,
	};
	if let Some(server_url) = &args.server_url {
		config.server_url = server_url.clone();
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_tracing(args.log_format);

	match &args.command {
		Some(Command::Version) => {
			println!("tether {}", env!("CARGO_PKG_VERSION"));
			Ok(())
		}
		Some(Command::Resolve(resolve_args)) => resolve::run(resolve_args),
		Some(Command::Health) => {
			let config = load_config(&args)?;
			let pipeline = tether_delivery::TelemetryPipeline::new(config.to_pipeline_options())?;
			let health = pipeline.health().await;
			println!("{}", serde_json::to_string_pretty(&health)?);
			if !health.connected {
				anyhow::bail!("collector at {} is not reachable", config.server_url);
			}
			Ok(())
		}
		Some(Command::Ingest(ingest_args)) => {
			let config = load_config(&args)?;
			ingest::run(config, ingest_args).await
		}
		None => {
			let config = load_config(&args)?;
			ingest::run(config, &ingest::IngestArgs::default()).await
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_valid() {
		Args::command().debug_assert();
	}

	#[test]
	fn defaults_to_ingest_without_subcommand() {
		let args = Args::try_parse_from(["tether", "--server-url", "http://127.0.0.1:9"]).unwrap();
		assert!(args.command.is_none());
		assert_eq!(args.server_url.as_deref(), Some("http://127.0.0.1:9"));
		assert_eq!(args.log_format, LogFormat::Text);
	}

	#[test]
	fn parses_resolve_arguments() {
		let args = Args::try_parse_from([
			"tether",
			"resolve",
			"--map",
			"bundle.js.map",
			"--script-url",
			"https://app.test/bundle.js",
		])
		.unwrap();
		match args.command {
			Some(Command::Resolve(resolve)) => {
				assert_eq!(resolve.map, PathBuf::from("bundle.js.map"));
				assert!(resolve.stack.is_none());
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn cli_server_url_overrides_config() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tether.toml");
		std::fs::write(&path, "server_url = \"http://file:1\"\n").unwrap();

		let args = Args::try_parse_from([
			"tether",
			"--config",
			path.to_str().unwrap(),
			"--server-url",
			"http://flag:2",
			"health",
		])
		.unwrap();
		let config = load_config(&args).unwrap();
		assert_eq!(config.server_url, "http://flag:2");
	}
}
