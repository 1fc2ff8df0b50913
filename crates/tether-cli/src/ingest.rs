// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `tether ingest`: feed newline-delimited JSON entries from stdin into the pipeline.

use clap::Args;
use tether_config::PipelineConfig;
use tether_core::{Entry, EntryKind};
use tether_delivery::{Disposition, SourceMeta, TelemetryPipeline};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub struct IngestArgs {
	/// Tab id attached to entries that lack one
	#[arg(long)]
	pub tab_id: Option<i64>,

	/// Page URL attached to entries that lack one
	#[arg(long)]
	pub page_url: Option<String>,

	/// Script URLs whose source maps are fetched before ingesting
	#[arg(long = "preload-map")]
	pub preload_maps: Vec<String>,
}

/// Where an entry is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
	Log,
	Action,
	WebSocket,
	NetworkBody,
	Performance,
}

impl Channel {
	fn for_entry(entry: &Entry) -> Self {
		match entry.kind() {
			EntryKind::Action { .. } => Self::Action,
			EntryKind::WebSocket { .. } => Self::WebSocket,
			EntryKind::Performance => Self::Performance,
			EntryKind::Other("network_body") => Self::NetworkBody,
			_ => Self::Log,
		}
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
struct IngestCounts {
	lines: u64,
	invalid: u64,
	queued: u64,
	suppressed: u64,
	filtered: u64,
}

fn parse_entry(line: &str) -> anyhow::Result<Entry> {
	let value: serde_json::Value = serde_json::from_str(line)?;
	Ok(Entry::from_value(value)?)
}

fn dispatch(pipeline: &TelemetryPipeline, meta: &SourceMeta, line: &str, counts: &mut IngestCounts) {
	let line = line.trim();
	if line.is_empty() {
		return;
	}
	counts.lines += 1;

	let entry = match parse_entry(line) {
		Ok(entry) => entry,
		Err(e) => {
			counts.invalid += 1;
			warn!(error = %e, line = counts.lines, "skipping invalid entry");
			return;
		}
	};

	match Channel::for_entry(&entry) {
		Channel::Log => match pipeline.handle_log_message(entry, meta) {
			Disposition::Queued => counts.queued += 1,
			Disposition::Suppressed => counts.suppressed += 1,
			Disposition::Filtered => counts.filtered += 1,
		},
		Channel::Action => {
			pipeline.add_action(entry);
			counts.queued += 1;
		}
		Channel::WebSocket => {
			pipeline.add_websocket_event(entry);
			counts.queued += 1;
		}
		Channel::NetworkBody => {
			pipeline.add_network_body(entry);
			counts.queued += 1;
		}
		Channel::Performance => {
			pipeline.add_performance_snapshot(entry);
			counts.queued += 1;
		}
	}
}

pub async fn run(config: PipelineConfig, args: &IngestArgs) -> anyhow::Result<()> {
	let pipeline = TelemetryPipeline::new(config.to_pipeline_options())?;
	pipeline.start_background_tasks();

	for script_url in &args.preload_maps {
		match pipeline.load_source_map(script_url).await {
			Ok(true) => info!(script_url = %script_url, "source map loaded"),
			Ok(false) => warn!(script_url = %script_url, "script has no sourceMappingURL"),
			Err(e) => warn!(script_url = %script_url, error = %e, "failed to load source map"),
		}
	}

	let meta = SourceMeta {
		tab_id: args.tab_id,
		page_url: args.page_url.clone(),
	};
	let mut counts = IngestCounts::default();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	loop {
		tokio::select! {
			line = lines.next_line() => match line? {
				Some(line) => dispatch(&pipeline, &meta, &line, &mut counts),
				None => break,
			},
			_ = tokio::signal::ctrl_c() => {
				info!("interrupted, flushing");
				break;
			}
		}
	}

	pipeline.shutdown().await;

	let stats = pipeline.stats();
	let dropped: u64 = stats.batchers.iter().map(|(_, s)| s.dropped_entries).sum();
	info!(
		lines = counts.lines,
		queued = counts.queued,
		suppressed = counts.suppressed,
		filtered = counts.filtered,
		invalid = counts.invalid,
		dropped,
		connected = stats.connection.connected,
		"ingest finished"
	);
	Ok(())
}
