// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Debounced, size-triggered batching with retry and circuit breaking.
//!
//! `add` is synchronous and never blocks on the network. A batch is flushed
//! when the queue reaches `max_batch_size` or when the debounce timer fires.
//! A flush claims the whole queue before its first send, so entries added
//! while a send is in flight start the next batch. At most one delivery runs
//! per batcher; a flush that finds one in progress waits for it, which keeps
//! batches in `add` order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tether_core::Entry;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::error::Result;
use crate::memory::{BufferKind, MemoryPressureMonitor, MemorySource};
use crate::status::ConnectionTracker;
use crate::timer::TimerSlot;

/// Configuration for a [`Batcher`].
#[derive(Debug, Clone)]
pub struct BatcherConfig {
	/// Quiet period after the last `add` before a partial batch is flushed.
	pub debounce: Duration,
	/// Queue length that triggers an immediate flush.
	pub max_batch_size: usize,
	/// Maximum queued entries; adds past this bound are dropped.
	pub max_pending_buffer: usize,
	/// Total send attempts per batch before it is dropped.
	pub retry_budget: u32,
	/// What this batcher carries, for memory estimates and logging.
	pub kind: BufferKind,
}

impl Default for BatcherConfig {
	fn default() -> Self {
		Self {
			debounce: Duration::from_millis(100),
			max_batch_size: 50,
			max_pending_buffer: 1000,
			retry_budget: 3,
			kind: BufferKind::Logs,
		}
	}
}

/// Delivers one batch to the collector.
#[async_trait::async_trait]
pub trait BatchSender: Send + Sync {
	async fn send_batch(&self, entries: &[Entry]) -> Result<()>;
}

/// Delivery counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
	pub pending: usize,
	pub sent_batches: u64,
	pub dropped_batches: u64,
	pub dropped_entries: u64,
	pub requeued_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
	sent_batches: AtomicU64,
	dropped_batches: AtomicU64,
	dropped_entries: AtomicU64,
	requeued_batches: AtomicU64,
}

struct Inner {
	config: BatcherConfig,
	sender: Arc<dyn BatchSender>,
	breaker: CircuitBreaker,
	connection: Arc<ConnectionTracker>,
	memory: Option<Arc<MemoryPressureMonitor>>,
	queue: Mutex<VecDeque<Entry>>,
	/// Held from claiming the queue until the batch is delivered, requeued
	/// or dropped.
	delivery: tokio::sync::Mutex<()>,
	timer: TimerSlot,
	counters: Counters,
}

impl Inner {
	fn effective_batch_size(&self) -> usize {
		match &self.memory {
			Some(monitor) => monitor.effective_capacity(self.config.max_batch_size),
			None => self.config.max_batch_size.max(1),
		}
	}

	fn effective_pending_limit(&self) -> usize {
		match &self.memory {
			Some(monitor) => monitor.effective_capacity(self.config.max_pending_buffer),
			None => self.config.max_pending_buffer.max(1),
		}
	}
}

impl MemorySource for Inner {
	fn estimated_bytes(&self) -> usize {
		let kind = self.config.kind;
		self.queue.lock().iter().map(|entry| kind.estimate(entry)).sum()
	}
}

/// Accumulates entries and delivers them in batches through a shared
/// [`CircuitBreaker`]. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Batcher {
	inner: Arc<Inner>,
}

impl Batcher {
	pub fn new(config: BatcherConfig, sender: Arc<dyn BatchSender>, breaker: CircuitBreaker) -> Self {
		Self::with_shared(config, sender, breaker, Arc::new(ConnectionTracker::new()), None)
	}

	/// Build a batcher that reports into a shared connection tracker and, if
	/// given, scales its capacities by the memory monitor's level.
	pub fn with_shared(
		config: BatcherConfig,
		sender: Arc<dyn BatchSender>,
		breaker: CircuitBreaker,
		connection: Arc<ConnectionTracker>,
		memory: Option<Arc<MemoryPressureMonitor>>,
	) -> Self {
		let batcher = Self {
			inner: Arc::new(Inner {
				config,
				sender,
				breaker,
				connection,
				memory,
				queue: Mutex::new(VecDeque::new()),
				delivery: tokio::sync::Mutex::new(()),
				timer: TimerSlot::new(),
				counters: Counters::default(),
			}),
		};
		if let Some(monitor) = &batcher.inner.memory {
			monitor.register(batcher.inner.config.kind, batcher.memory_source());
		}
		batcher
	}

	pub fn config(&self) -> &BatcherConfig {
		&self.inner.config
	}

	pub fn breaker(&self) -> &CircuitBreaker {
		&self.inner.breaker
	}

	pub fn connection(&self) -> &Arc<ConnectionTracker> {
		&self.inner.connection
	}

	/// Weak handle for registering this batcher with a memory monitor.
	pub fn memory_source(&self) -> Weak<dyn MemorySource> {
		let weak: Weak<Inner> = Arc::downgrade(&self.inner);
		weak
	}

	/// Queue an entry. Must be called within a tokio runtime.
	///
	/// When the queue is full the entry is dropped. Reaching the batch size
	/// starts a flush immediately; otherwise the debounce timer is re-armed.
	pub fn add(&self, entry: Entry) {
		let batch_size = self.inner.effective_batch_size();
		let pending_limit = self.inner.effective_pending_limit();

		let len = {
			let mut queue = self.inner.queue.lock();
			if queue.len() >= pending_limit {
				self.inner.counters.dropped_entries.fetch_add(1, Ordering::Relaxed);
				warn!(
					kind = %self.inner.config.kind,
					pending = queue.len(),
					limit = pending_limit,
					"pending buffer full, dropping entry"
				);
			} else {
				queue.push_back(entry);
			}
			queue.len()
		};

		if len >= batch_size {
			self.inner.timer.cancel();
			let batcher = self.clone();
			tokio::spawn(async move {
				batcher.flush().await;
			});
		} else {
			self.schedule_flush();
		}
	}

	fn schedule_flush(&self) {
		let weak = Arc::downgrade(&self.inner);
		self.inner
			.timer
			.arm(self.inner.config.debounce, move |generation| async move {
				let Some(inner) = weak.upgrade() else {
					return;
				};
				if inner.timer.disarm(generation) {
					Batcher { inner }.flush().await;
				}
			});
	}

	/// Deliver everything currently queued.
	///
	/// Never fails: delivery errors are reflected in the connection status,
	/// the breaker state and [`BatcherStats`].
	pub async fn flush(&self) {
		self.inner.timer.cancel();
		let _delivery = self.inner.delivery.lock().await;

		let batch: Vec<Entry> = {
			let mut queue = self.inner.queue.lock();
			queue.drain(..).collect()
		};
		if batch.is_empty() {
			return;
		}

		let breaker = &self.inner.breaker;
		if breaker.is_open() {
			debug!(count = batch.len(), kind = %self.inner.config.kind, "circuit open, requeueing batch");
			self.requeue(batch);
			return;
		}

		let retry_budget = self.inner.config.retry_budget.max(1);
		let mut attempt = 0;
		loop {
			attempt += 1;
			let sender = &self.inner.sender;
			let result = breaker.execute(|| sender.send_batch(&batch)).await;

			let error = match result {
				Ok(()) => {
					self.inner.connection.mark_connected();
					self.inner.counters.sent_batches.fetch_add(1, Ordering::Relaxed);
					debug!(count = batch.len(), kind = %self.inner.config.kind, attempt, "batch delivered");
					return;
				}
				Err(e) if e.is_circuit_open() => {
					self.requeue(batch);
					return;
				}
				Err(e) => e,
			};

			self.inner.connection.mark_disconnected(&error.to_string());
			if breaker.is_open() {
				self.requeue(batch);
				return;
			}
			if attempt >= retry_budget {
				self.inner.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
				self.inner
					.counters
					.dropped_entries
					.fetch_add(batch.len() as u64, Ordering::Relaxed);
				warn!(
					count = batch.len(),
					kind = %self.inner.config.kind,
					attempts = attempt,
					error = %error,
					"retries exhausted, dropping batch"
				);
				return;
			}

			let delay = breaker.backoff_delay();
			debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying batch");
			tokio::time::sleep(delay).await;

			if breaker.is_open() {
				self.requeue(batch);
				return;
			}
		}
	}

	/// Put a batch back at the front of the queue, keeping the oldest entries
	/// when the combined length exceeds the pending bound.
	fn requeue(&self, batch: Vec<Entry>) {
		let limit = self.inner.effective_pending_limit();
		let mut queue = self.inner.queue.lock();
		for entry in batch.into_iter().rev() {
			queue.push_front(entry);
		}
		if queue.len() > limit {
			let overflow = queue.len() - limit;
			queue.truncate(limit);
			self.inner
				.counters
				.dropped_entries
				.fetch_add(overflow as u64, Ordering::Relaxed);
			warn!(overflow, kind = %self.inner.config.kind, "requeue exceeded pending buffer, dropped newest entries");
		}
		self.inner.counters.requeued_batches.fetch_add(1, Ordering::Relaxed);
	}

	/// Drop everything pending and cancel the debounce timer.
	pub fn clear(&self) {
		self.inner.timer.cancel();
		self.inner.queue.lock().clear();
	}

	/// Snapshot of the pending queue.
	pub fn pending(&self) -> Vec<Entry> {
		self.inner.queue.lock().iter().cloned().collect()
	}

	pub fn pending_len(&self) -> usize {
		self.inner.queue.lock().len()
	}

	pub fn has_pending_timer(&self) -> bool {
		self.inner.timer.is_armed()
	}

	pub fn stats(&self) -> BatcherStats {
		let counters = &self.inner.counters;
		BatcherStats {
			pending: self.pending_len(),
			sent_batches: counters.sent_batches.load(Ordering::Relaxed),
			dropped_batches: counters.dropped_batches.load(Ordering::Relaxed),
			dropped_entries: counters.dropped_entries.load(Ordering::Relaxed),
			requeued_batches: counters.requeued_batches.load(Ordering::Relaxed),
		}
	}
}

impl std::fmt::Debug for Batcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Batcher")
			.field("config", &self.inner.config)
			.field("stats", &self.stats())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::breaker::{CircuitBreakerConfig, CircuitState};
	use crate::backoff::BackoffSchedule;
	use crate::error::DeliveryError;
	use crate::memory::MemoryConfig;
	use proptest::prelude::*;
	use serde_json::json;
	use std::sync::atomic::{AtomicBool, AtomicUsize};
	use tether_core::LogLevel;

	struct MockSender {
		calls: AtomicUsize,
		sent: Mutex<Vec<Vec<Entry>>>,
		should_fail: AtomicBool,
	}

	impl MockSender {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				sent: Mutex::new(Vec::new()),
				should_fail: AtomicBool::new(false),
			})
		}

		fn failing() -> Arc<Self> {
			let sender = Self::new();
			sender.set_should_fail(true);
			sender
		}

		fn set_should_fail(&self, fail: bool) {
			self.should_fail.store(fail, Ordering::SeqCst);
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn sent_batches(&self) -> Vec<Vec<Entry>> {
			self.sent.lock().clone()
		}
	}

	#[async_trait::async_trait]
	impl BatchSender for MockSender {
		async fn send_batch(&self, entries: &[Entry]) -> Result<()> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.should_fail.load(Ordering::SeqCst) {
				return Err(DeliveryError::ServerError {
					status: 503,
					message: "mock failure".to_string(),
				});
			}
			self.sent.lock().push(entries.to_vec());
			Ok(())
		}
	}

	fn entry(n: usize) -> Entry {
		Entry::console(LogLevel::Info, vec![json!(format!("line {n}"))])
	}

	fn config(retry_budget: u32) -> BatcherConfig {
		BatcherConfig {
			retry_budget,
			..BatcherConfig::default()
		}
	}

	fn breaker() -> CircuitBreaker {
		CircuitBreaker::new(CircuitBreakerConfig {
			max_failures: 5,
			reset_timeout: Duration::from_secs(30),
			backoff: BackoffSchedule::default(),
		})
	}

	#[tokio::test(start_paused = true)]
	async fn flushes_after_debounce() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());

		batcher.add(entry(1));
		batcher.add(entry(2));
		assert!(batcher.has_pending_timer());

		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(sender.calls(), 0);

		tokio::time::sleep(Duration::from_millis(60)).await;
		let batches = sender.sent_batches();
		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].len(), 2);
		assert_eq!(batcher.pending_len(), 0);
		assert!(!batcher.has_pending_timer());
	}

	#[tokio::test(start_paused = true)]
	async fn each_add_restarts_debounce() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());

		for i in 0..5 {
			batcher.add(entry(i));
			tokio::time::sleep(Duration::from_millis(80)).await;
		}
		assert_eq!(sender.calls(), 0);

		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(sender.sent_batches()[0].len(), 5);
	}

	#[tokio::test(start_paused = true)]
	async fn reaching_batch_size_flushes_immediately() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());

		for i in 0..50 {
			batcher.add(entry(i));
		}
		tokio::time::sleep(Duration::from_millis(1)).await;

		let batches = sender.sent_batches();
		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].len(), 50);
		assert_eq!(batches[0][0].get("args"), Some(&json!(["line 0"])));
	}

	#[tokio::test(start_paused = true)]
	async fn entries_are_delivered_in_order() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());

		for i in 0..3 {
			batcher.add(Entry::from_value(json!({"n": i})).unwrap());
		}
		batcher.flush().await;

		let sent: Vec<u64> = sender.sent_batches()[0]
			.iter()
			.map(|e| e.get_u64("n").unwrap())
			.collect();
		assert_eq!(sent, vec![0, 1, 2]);
	}

	#[tokio::test(start_paused = true)]
	async fn flush_of_empty_queue_is_noop() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());
		batcher.flush().await;
		assert_eq!(sender.calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn retry_budget_exhaustion_drops_batch() {
		let sender = MockSender::failing();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());

		batcher.add(entry(1));
		batcher.flush().await;

		assert_eq!(sender.calls(), 3);
		assert!(batcher.pending().is_empty());
		let stats = batcher.stats();
		assert_eq!(stats.dropped_batches, 1);
		assert_eq!(stats.dropped_entries, 1);
		assert_eq!(batcher.breaker().stats().consecutive_failures, 3);
	}

	#[tokio::test(start_paused = true)]
	async fn retry_succeeds_after_transient_failure() {
		let sender = MockSender::failing();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());
		batcher.add(entry(1));

		let flusher = batcher.clone();
		let flush = tokio::spawn(async move { flusher.flush().await });
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(sender.calls(), 1);

		sender.set_should_fail(false);
		flush.await.unwrap();

		assert_eq!(sender.calls(), 2);
		assert_eq!(sender.sent_batches().len(), 1);
		assert_eq!(batcher.breaker().stats().consecutive_failures, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn breaker_opens_and_blocks_further_sends() {
		let sender = MockSender::failing();
		let batcher = Batcher::new(config(1), sender.clone(), breaker());

		for i in 0..5 {
			batcher.add(entry(i));
			batcher.flush().await;
		}
		assert_eq!(batcher.breaker().state(), CircuitState::Open);
		assert_eq!(sender.calls(), 5);

		batcher.add(entry(99));
		batcher.flush().await;
		batcher.flush().await;

		assert_eq!(sender.calls(), 5);
		// The fifth batch tripped the breaker and was requeued, then joined by 99.
		assert_eq!(batcher.pending_len(), 2);
		assert_eq!(batcher.stats().requeued_batches, 3);
	}

	#[tokio::test(start_paused = true)]
	async fn batch_that_opens_breaker_is_requeued() {
		let sender = MockSender::failing();
		let breaker = CircuitBreaker::new(CircuitBreakerConfig {
			max_failures: 2,
			..CircuitBreakerConfig::default()
		});
		let batcher = Batcher::new(config(3), sender.clone(), breaker);

		batcher.add(entry(1));
		batcher.flush().await;

		assert_eq!(sender.calls(), 2);
		assert_eq!(batcher.pending_len(), 1);
		assert_eq!(batcher.stats().dropped_batches, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn requeued_batch_goes_to_front() {
		let sender = MockSender::new();
		let breaker = breaker();
		let batcher = Batcher::new(config(1), sender.clone(), breaker.clone());

		for _ in 0..5 {
			breaker.record_failure();
		}
		batcher.add(Entry::from_value(json!({"n": 1})).unwrap());
		batcher.flush().await;
		batcher.add(Entry::from_value(json!({"n": 2})).unwrap());

		let order: Vec<u64> = batcher.pending().iter().map(|e| e.get_u64("n").unwrap()).collect();
		assert_eq!(order, vec![1, 2]);
	}

	#[tokio::test(start_paused = true)]
	async fn half_open_probe_delivers_requeued_entries() {
		let sender = MockSender::failing();
		let batcher = Batcher::new(config(1), sender.clone(), breaker());
		for i in 0..5 {
			batcher.add(entry(i));
			batcher.flush().await;
		}
		batcher.add(entry(5));
		batcher.flush().await;
		assert_eq!(batcher.pending_len(), 2);

		tokio::time::sleep(Duration::from_secs(31)).await;
		assert_eq!(batcher.breaker().state(), CircuitState::HalfOpen);

		sender.set_should_fail(false);
		batcher.flush().await;
		assert_eq!(batcher.breaker().state(), CircuitState::Closed);
		assert_eq!(batcher.pending_len(), 0);
		assert!(batcher.connection().is_connected());
	}

	#[tokio::test(start_paused = true)]
	async fn pending_buffer_drops_newest() {
		let sender = MockSender::new();
		let batcher = Batcher::new(
			BatcherConfig {
				max_batch_size: 100,
				max_pending_buffer: 3,
				..BatcherConfig::default()
			},
			sender,
			breaker(),
		);
		let breaker = batcher.breaker().clone();
		for _ in 0..5 {
			breaker.record_failure();
		}

		for i in 0..5 {
			batcher.add(Entry::from_value(json!({"n": i})).unwrap());
		}
		let kept: Vec<u64> = batcher.pending().iter().map(|e| e.get_u64("n").unwrap()).collect();
		assert_eq!(kept, vec![0, 1, 2]);
		assert_eq!(batcher.stats().dropped_entries, 2);
	}

	#[tokio::test(start_paused = true)]
	async fn clear_drops_pending_and_timer() {
		let sender = MockSender::new();
		let batcher = Batcher::new(config(3), sender.clone(), breaker());
		batcher.add(entry(1));
		batcher.clear();

		assert!(batcher.pending().is_empty());
		assert!(!batcher.has_pending_timer());
		tokio::time::sleep(Duration::from_millis(500)).await;
		assert_eq!(sender.calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn adds_during_inflight_send_start_new_batch() {
		struct SlowSender {
			inner: Arc<MockSender>,
		}

		#[async_trait::async_trait]
		impl BatchSender for SlowSender {
			async fn send_batch(&self, entries: &[Entry]) -> Result<()> {
				tokio::time::sleep(Duration::from_millis(500)).await;
				self.inner.send_batch(entries).await
			}
		}

		let mock = MockSender::new();
		let batcher = Batcher::new(
			config(3),
			Arc::new(SlowSender { inner: mock.clone() }),
			breaker(),
		);

		batcher.add(entry(1));
		let flusher = batcher.clone();
		let inflight = tokio::spawn(async move { flusher.flush().await });
		tokio::time::sleep(Duration::from_millis(10)).await;

		batcher.add(entry(2));
		assert_eq!(batcher.pending_len(), 1);

		inflight.await.unwrap();
		tokio::time::sleep(Duration::from_secs(1)).await;
		let batches = mock.sent_batches();
		assert_eq!(batches.len(), 2);
		assert_eq!(batches[0].len(), 1);
		assert_eq!(batches[1].len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn shared_breaker_blocks_every_batcher() {
		let breaker = breaker();
		let failing = MockSender::failing();
		let healthy = MockSender::new();
		let a = Batcher::new(config(1), failing.clone(), breaker.clone());
		let b = Batcher::new(config(1), healthy.clone(), breaker.clone());

		for i in 0..5 {
			a.add(entry(i));
			a.flush().await;
		}
		b.add(entry(0));
		b.flush().await;

		assert_eq!(healthy.calls(), 0);
		assert_eq!(b.pending_len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn memory_pressure_halves_batch_size() {
		let monitor = Arc::new(MemoryPressureMonitor::new(MemoryConfig {
			soft_limit_bytes: 1000,
			hard_limit_bytes: 100_000,
			check_interval: Duration::from_secs(1),
		}));
		let sender = MockSender::new();
		let batcher = Batcher::with_shared(
			BatcherConfig {
				max_batch_size: 10,
				..BatcherConfig::default()
			},
			sender.clone(),
			breaker(),
			Arc::new(ConnectionTracker::new()),
			Some(monitor.clone()),
		);

		batcher.add(entry(0));
		batcher.add(entry(1));
		assert_eq!(monitor.check().level, crate::memory::MemoryPressureLevel::Soft);

		for i in 2..5 {
			batcher.add(entry(i));
		}
		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(sender.sent_batches()[0].len(), 5);
	}

	#[tokio::test(start_paused = true)]
	async fn later_batch_waits_for_earlier_retries() {
		struct FailFirst {
			failures_left: AtomicUsize,
			inner: Arc<MockSender>,
		}

		#[async_trait::async_trait]
		impl BatchSender for FailFirst {
			async fn send_batch(&self, entries: &[Entry]) -> Result<()> {
				let failing = self
					.failures_left
					.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
					.is_ok();
				if failing {
					return Err(DeliveryError::ServerError {
						status: 503,
						message: "mock failure".to_string(),
					});
				}
				self.inner.send_batch(entries).await
			}
		}

		let mock = MockSender::new();
		let sender = Arc::new(FailFirst {
			failures_left: AtomicUsize::new(2),
			inner: mock.clone(),
		});
		let batcher = Batcher::new(config(3), sender, breaker());

		batcher.add(Entry::from_value(json!({"n": 1})).unwrap());
		// First attempt fails at 100ms, second at 200ms, then a 500ms backoff.
		tokio::time::sleep(Duration::from_millis(250)).await;
		batcher.add(Entry::from_value(json!({"n": 2})).unwrap());
		tokio::time::sleep(Duration::from_secs(2)).await;

		let sent: Vec<Vec<u64>> = mock
			.sent_batches()
			.iter()
			.map(|batch| batch.iter().map(|e| e.get_u64("n").unwrap()).collect())
			.collect();
		assert_eq!(sent, vec![vec![1], vec![2]]);
		assert_eq!(batcher.breaker().stats().consecutive_failures, 0);
		assert_eq!(batcher.stats().sent_batches, 2);
	}

	#[derive(Debug, Clone)]
	enum Op {
		Add,
		Flush,
		Advance(u64),
	}

	fn op() -> impl Strategy<Value = Op> {
		prop_oneof![
			4 => Just(Op::Add),
			1 => Just(Op::Flush),
			1 => (1..300u64).prop_map(Op::Advance),
		]
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(64))]

		#[test]
		fn pending_never_exceeds_buffer(
			ops in prop::collection::vec(op(), 1..120),
			max_batch in 1..20usize,
			extra in 0..20usize,
			failing in any::<bool>(),
		) {
			let limit = max_batch + extra;
			let runtime = tokio::runtime::Builder::new_current_thread()
				.enable_time()
				.start_paused(true)
				.build()
				.unwrap();

			runtime.block_on(async move {
				let sender = MockSender::new();
				sender.set_should_fail(failing);
				let batcher = Batcher::new(
					BatcherConfig {
						max_batch_size: max_batch,
						max_pending_buffer: limit,
						retry_budget: 2,
						..BatcherConfig::default()
					},
					sender,
					breaker(),
				);

				for (i, op) in ops.into_iter().enumerate() {
					match op {
						Op::Add => batcher.add(entry(i)),
						Op::Flush => batcher.flush().await,
						Op::Advance(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
					}
					prop_assert!(batcher.pending_len() <= limit);
				}
				Ok(())
			})?;
		}
	}
}
