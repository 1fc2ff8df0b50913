// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The telemetry pipeline: one long-lived object owning every batcher, the
//! shared circuit breaker, the error group tracker, the memory monitor and the
//! source map resolver.
//!
//! ```text
//! entry ─▶ error groups ─▶ level filter ─▶ truncation ─▶ Batcher ─▶ CircuitBreaker ─▶ POST
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{format_log_entry, should_capture_log, Entry, LevelFilter};
use tether_symbolicate::{locate_source_map, SourceMapLocation, SourceMapResolver, DEFAULT_CACHE_CAPACITY};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::batcher::{BatchSender, Batcher, BatcherConfig, BatcherStats};
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::error::{DeliveryError, Result};
use crate::error_groups::{ErrorGroupConfig, ErrorGroupTracker, GroupOutcome};
use crate::memory::{BufferKind, MemoryConfig, MemoryPressureMonitor, MemoryPressureState};
use crate::status::{ConnectionStatus, ConnectionTracker};
use crate::transport::{Endpoint, HealthStatus, HttpTransport, DEFAULT_REQUEST_TIMEOUT};

/// How often groups older than the max age are swept.
pub const STALE_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Runtime options for a [`TelemetryPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
	pub server_url: String,
	pub request_timeout: Duration,
	/// Minimum level for console entries; network and exception entries always pass.
	pub capture_filter: LevelFilter,
	/// Shared by every endpoint's batcher; `kind` is set per endpoint.
	pub batcher: BatcherConfig,
	pub breaker: CircuitBreakerConfig,
	pub error_groups: ErrorGroupConfig,
	pub memory: MemoryConfig,
	pub source_maps_enabled: bool,
	pub source_map_cache_capacity: usize,
}

impl Default for PipelineOptions {
	fn default() -> Self {
		Self {
			server_url: "http://localhost:7890".to_string(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			capture_filter: LevelFilter::All,
			batcher: BatcherConfig::default(),
			breaker: CircuitBreakerConfig::default(),
			error_groups: ErrorGroupConfig::default(),
			memory: MemoryConfig::default(),
			source_maps_enabled: true,
			source_map_cache_capacity: DEFAULT_CACHE_CAPACITY,
		}
	}
}

/// Where a raw entry came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMeta {
	pub tab_id: Option<i64>,
	pub page_url: Option<String>,
}

/// What happened to an entry passed to [`TelemetryPipeline::handle_log_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	Queued,
	/// Counted as a duplicate by the error group tracker.
	Suppressed,
	/// Below the capture level filter.
	Filtered,
}

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStats {
	pub connection: ConnectionStatus,
	pub breaker: CircuitBreakerStats,
	pub memory: MemoryPressureState,
	pub error_groups: usize,
	pub source_maps_cached: usize,
	pub batchers: Vec<(Endpoint, BatcherStats)>,
}

struct Batchers {
	logs: Batcher,
	actions: Batcher,
	websocket_events: Batcher,
	network_bodies: Batcher,
	performance_snapshots: Batcher,
}

impl Batchers {
	fn get(&self, endpoint: Endpoint) -> &Batcher {
		match endpoint {
			Endpoint::Logs => &self.logs,
			Endpoint::EnhancedActions => &self.actions,
			Endpoint::WebSocketEvents => &self.websocket_events,
			Endpoint::NetworkBodies => &self.network_bodies,
			Endpoint::PerformanceSnapshots => &self.performance_snapshots,
		}
	}

	fn iter(&self) -> impl Iterator<Item = (Endpoint, &Batcher)> {
		Endpoint::ALL.into_iter().map(move |endpoint| (endpoint, self.get(endpoint)))
	}
}

fn buffer_kind(endpoint: Endpoint) -> BufferKind {
	match endpoint {
		Endpoint::Logs => BufferKind::Logs,
		Endpoint::EnhancedActions => BufferKind::Actions,
		Endpoint::WebSocketEvents => BufferKind::WebSocketEvents,
		Endpoint::NetworkBodies => BufferKind::NetworkBodies,
		Endpoint::PerformanceSnapshots => BufferKind::PerformanceSnapshots,
	}
}

struct Inner {
	options: PipelineOptions,
	transport: Option<Arc<HttpTransport>>,
	breaker: CircuitBreaker,
	connection: Arc<ConnectionTracker>,
	memory: Arc<MemoryPressureMonitor>,
	batchers: Batchers,
	error_groups: Mutex<ErrorGroupTracker>,
	resolver: Mutex<SourceMapResolver>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Process-wide telemetry pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TelemetryPipeline {
	inner: Arc<Inner>,
}

impl TelemetryPipeline {
	/// Build a pipeline that delivers to the collector at `options.server_url`.
	pub fn new(options: PipelineOptions) -> Result<Self> {
		let transport = Arc::new(HttpTransport::new(&options.server_url, options.request_timeout)?);
		let senders = Arc::clone(&transport);
		Ok(Self::build(options, Some(transport), move |endpoint| senders.sender(endpoint)))
	}

	/// Build a pipeline with custom senders, one per endpoint.
	pub fn with_senders<F>(options: PipelineOptions, make_sender: F) -> Self
	where
		F: Fn(Endpoint) -> Arc<dyn BatchSender>,
	{
		Self::build(options, None, make_sender)
	}

	fn build<F>(options: PipelineOptions, transport: Option<Arc<HttpTransport>>, make_sender: F) -> Self
	where
		F: Fn(Endpoint) -> Arc<dyn BatchSender>,
	{
		let breaker = CircuitBreaker::new(options.breaker.clone());
		let connection = Arc::new(ConnectionTracker::new());
		let memory = Arc::new(MemoryPressureMonitor::new(options.memory.clone()));

		let batcher = |endpoint: Endpoint| {
			Batcher::with_shared(
				BatcherConfig {
					kind: buffer_kind(endpoint),
					..options.batcher.clone()
				},
				make_sender(endpoint),
				breaker.clone(),
				Arc::clone(&connection),
				Some(Arc::clone(&memory)),
			)
		};
		let batchers = Batchers {
			logs: batcher(Endpoint::Logs),
			actions: batcher(Endpoint::EnhancedActions),
			websocket_events: batcher(Endpoint::WebSocketEvents),
			network_bodies: batcher(Endpoint::NetworkBodies),
			performance_snapshots: batcher(Endpoint::PerformanceSnapshots),
		};

		let error_groups = Mutex::new(ErrorGroupTracker::new(options.error_groups.clone()));
		let resolver = Mutex::new(SourceMapResolver::new(options.source_map_cache_capacity));

		Self {
			inner: Arc::new(Inner {
				options,
				transport,
				breaker,
				connection,
				memory,
				batchers,
				error_groups,
				resolver,
				tasks: Mutex::new(Vec::new()),
			}),
		}
	}

	pub fn options(&self) -> &PipelineOptions {
		&self.inner.options
	}

	pub fn breaker(&self) -> &CircuitBreaker {
		&self.inner.breaker
	}

	pub fn memory(&self) -> &Arc<MemoryPressureMonitor> {
		&self.inner.memory
	}

	pub fn batcher(&self, endpoint: Endpoint) -> &Batcher {
		self.inner.batchers.get(endpoint)
	}

	/// Entry point for raw captured entries.
	///
	/// Runs error grouping, the level filter, stack enrichment for exceptions
	/// and truncation, then queues the entry on the log batcher.
	pub fn handle_log_message(&self, mut entry: Entry, meta: &SourceMeta) -> Disposition {
		if let Some(tab_id) = meta.tab_id {
			if entry.get("tabId").is_none() {
				entry.insert("tabId", tab_id);
			}
		}
		if let Some(page_url) = &meta.page_url {
			if entry.get("pageUrl").is_none() {
				entry.insert("pageUrl", page_url.as_str());
			}
		}

		let entry = match self.inner.error_groups.lock().process(entry) {
			GroupOutcome::Send(entry) => entry,
			GroupOutcome::Suppressed => return Disposition::Suppressed,
		};

		if !should_capture_log(entry.level(), self.inner.options.capture_filter, entry.entry_type()) {
			return Disposition::Filtered;
		}

		let entry = if entry.entry_type() == "exception" {
			self.enrich_exception(entry)
		} else {
			entry
		};

		self.inner.batchers.logs.add(format_log_entry(entry));
		Disposition::Queued
	}

	pub fn add_action(&self, entry: Entry) {
		self.add_to(Endpoint::EnhancedActions, entry);
	}

	pub fn add_websocket_event(&self, entry: Entry) {
		self.add_to(Endpoint::WebSocketEvents, entry);
	}

	pub fn add_network_body(&self, entry: Entry) {
		self.add_to(Endpoint::NetworkBodies, entry);
	}

	pub fn add_performance_snapshot(&self, entry: Entry) {
		self.add_to(Endpoint::PerformanceSnapshots, entry);
	}

	fn add_to(&self, endpoint: Endpoint, entry: Entry) {
		self.inner.batchers.get(endpoint).add(format_log_entry(entry));
	}

	/// Rewrite an exception's `stack` using cached source maps.
	///
	/// Adds `_resolvedStack` and tags `_enrichments` with `"sourceMap"` when at
	/// least one frame resolved. Never fetches; see [`Self::load_source_map`].
	pub fn enrich_exception(&self, mut entry: Entry) -> Entry {
		if !self.inner.options.source_maps_enabled {
			return entry;
		}
		let Some(stack) = entry.get_str("stack") else {
			return entry;
		};

		let resolved = self.inner.resolver.lock().resolve_stack(stack);
		if resolved.resolved == 0 {
			return entry;
		}

		debug!(frames = resolved.resolved, "resolved exception stack");
		entry.insert("_resolvedStack", resolved.text);
		let tag = Value::String("sourceMap".to_string());
		match entry.as_map_mut().get_mut("_enrichments") {
			Some(Value::Array(tags)) => {
				if !tags.contains(&tag) {
					tags.push(tag);
				}
			}
			_ => entry.insert("_enrichments", Value::Array(vec![tag])),
		}
		entry
	}

	/// Cache an already-fetched source map for `script_url`.
	pub fn register_source_map(&self, script_url: &str, map_json: &str) -> Result<()> {
		self.inner.resolver.lock().insert_map(script_url, map_json)?;
		Ok(())
	}

	/// Fetch `script_url`, follow its `sourceMappingURL` and cache the map.
	///
	/// Returns `Ok(false)` when the script references no source map.
	pub async fn load_source_map(&self, script_url: &str) -> Result<bool> {
		if self.inner.resolver.lock().cached(script_url).is_some() {
			return Ok(true);
		}
		let transport = self
			.inner
			.transport
			.as_ref()
			.ok_or(DeliveryError::NoTransport)?;

		let script = transport.fetch_text(script_url).await?;
		let json = match locate_source_map(script_url, &script) {
			Some(SourceMapLocation::Inline(json)) => json,
			Some(SourceMapLocation::External(map_url)) => transport.fetch_text(&map_url).await?,
			None => return Ok(false),
		};

		self.register_source_map(script_url, &json)?;
		Ok(true)
	}

	/// Probe the collector's health endpoint.
	pub async fn health(&self) -> HealthStatus {
		match &self.inner.transport {
			Some(transport) => transport.health().await,
			None => HealthStatus {
				connected: false,
				error: Some(DeliveryError::NoTransport.to_string()),
				..HealthStatus::default()
			},
		}
	}

	pub fn connection_status(&self) -> ConnectionStatus {
		self.inner.connection.snapshot()
	}

	/// Emit aggregated error groups onto the log batcher.
	pub fn flush_error_groups(&self) -> usize {
		let aggregated = self.inner.error_groups.lock().flush();
		let count = aggregated.len();
		for entry in aggregated {
			self.inner.batchers.logs.add(format_log_entry(entry));
		}
		count
	}

	pub fn cleanup_stale_error_groups(&self) -> usize {
		self.inner.error_groups.lock().cleanup_stale()
	}

	/// Deliver everything pending on every endpoint.
	pub async fn flush(&self) {
		let flushes = self.inner.batchers.iter().map(|(_, batcher)| batcher.flush());
		futures::future::join_all(flushes).await;
	}

	/// Spawn the periodic error group flush, stale cleanup and memory check.
	/// Calling this again replaces the running tasks.
	pub fn start_background_tasks(&self) {
		let weak = Arc::downgrade(&self.inner);
		let options = &self.inner.options;

		let handles = vec![
			spawn_periodic(weak.clone(), options.error_groups.flush_interval, |pipeline| {
				pipeline.flush_error_groups();
			}),
			spawn_periodic(weak.clone(), STALE_CLEANUP_INTERVAL, |pipeline| {
				pipeline.cleanup_stale_error_groups();
			}),
			spawn_periodic(weak, options.memory.check_interval, |pipeline| {
				pipeline.inner.memory.check();
			}),
		];

		let previous = std::mem::replace(&mut *self.inner.tasks.lock(), handles);
		for handle in previous {
			handle.abort();
		}
		info!("telemetry pipeline background tasks started");
	}

	/// Stop background tasks, emit pending aggregates, flush every batcher,
	/// then clear all state.
	pub async fn shutdown(&self) {
		let tasks = std::mem::take(&mut *self.inner.tasks.lock());
		for handle in tasks {
			handle.abort();
		}

		self.flush_error_groups();
		self.flush().await;

		for (_, batcher) in self.inner.batchers.iter() {
			batcher.clear();
		}
		self.inner.error_groups.lock().clear();
		self.inner.resolver.lock().clear();
		info!("telemetry pipeline shut down");
	}

	pub fn stats(&self) -> PipelineStats {
		PipelineStats {
			connection: self.connection_status(),
			breaker: self.inner.breaker.stats(),
			memory: self.inner.memory.state(),
			error_groups: self.inner.error_groups.lock().len(),
			source_maps_cached: self.inner.resolver.lock().cache().len(),
			batchers: self
				.inner
				.batchers
				.iter()
				.map(|(endpoint, batcher)| (endpoint, batcher.stats()))
				.collect(),
		}
	}
}

fn spawn_periodic<F>(weak: Weak<Inner>, period: Duration, tick: F) -> JoinHandle<()>
where
	F: Fn(&TelemetryPipeline) + Send + 'static,
{
	tokio::spawn(async move {
		let mut interval = interval_at(Instant::now() + period, period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			interval.tick().await;
			let Some(inner) = weak.upgrade() else {
				break;
			};
			tick(&TelemetryPipeline { inner });
		}
	})
}

impl std::fmt::Debug for TelemetryPipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TelemetryPipeline")
			.field("server_url", &self.inner.options.server_url)
			.field("breaker", &self.inner.breaker.state())
			.finish()
	}
}
