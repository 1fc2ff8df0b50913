// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Circuit breaker guarding collector sends.
//!
//! ```text
//!            failures >= max_failures
//!   Closed ───────────────────────────▶ Open
//!     ▲                                  │ reset_timeout elapses
//!     │ probe succeeds                   ▼
//!     └──────────────────────────── HalfOpen ──probe fails──▶ Open
//! ```
//!
//! A breaker is a cheap `Clone` handle; every batcher holding a clone observes
//! and mutates the same state.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backoff::BackoffSchedule;
use crate::error::{DeliveryError, Result};
use crate::timer::TimerSlot;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

impl CircuitState {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Closed => "closed",
			Self::Open => "open",
			Self::HalfOpen => "half-open",
		}
	}
}

impl fmt::Display for CircuitState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
	/// Consecutive failures that open the circuit.
	pub max_failures: u32,
	/// How long the circuit stays open before allowing a probe.
	pub reset_timeout: Duration,
	/// Advisory wait before retries, indexed by consecutive failures.
	pub backoff: BackoffSchedule,
}

impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			max_failures: 5,
			reset_timeout: Duration::from_secs(30),
			backoff: BackoffSchedule::default(),
		}
	}
}

/// Point-in-time breaker statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
	pub consecutive_failures: u32,
	pub current_backoff: Duration,
	pub state: CircuitState,
}

#[derive(Debug)]
struct BreakerState {
	state: CircuitState,
	consecutive_failures: u32,
	probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerInner {
	config: CircuitBreakerConfig,
	state: Mutex<BreakerState>,
	reset_timer: TimerSlot,
}

/// Shared circuit breaker. Requires a tokio runtime for its reset timer.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
	inner: Arc<BreakerInner>,
}

impl CircuitBreaker {
	pub fn new(config: CircuitBreakerConfig) -> Self {
		Self {
			inner: Arc::new(BreakerInner {
				config,
				state: Mutex::new(BreakerState {
					state: CircuitState::Closed,
					consecutive_failures: 0,
					probe_in_flight: false,
				}),
				reset_timer: TimerSlot::new(),
			}),
		}
	}

	pub fn config(&self) -> &CircuitBreakerConfig {
		&self.inner.config
	}

	/// Run `operation` through the breaker.
	///
	/// Returns [`DeliveryError::CircuitOpen`] without calling `operation` when
	/// the circuit is open, or half-open with the probe already in flight.
	pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut permit = self.acquire()?;

		let result = operation().await;
		permit.completed = true;
		match &result {
			Ok(_) => self.record_success(),
			Err(e) => {
				debug!(error = %e, "send through circuit breaker failed");
				self.record_failure();
			}
		}
		result
	}

	fn acquire(&self) -> Result<Permit<'_>> {
		let mut state = self.inner.state.lock();
		match state.state {
			CircuitState::Closed => Ok(Permit::new(self, false)),
			CircuitState::Open => Err(DeliveryError::CircuitOpen),
			CircuitState::HalfOpen if state.probe_in_flight => Err(DeliveryError::CircuitOpen),
			CircuitState::HalfOpen => {
				state.probe_in_flight = true;
				debug!("circuit breaker allowing probe");
				Ok(Permit::new(self, true))
			}
		}
	}

	/// Record a successful send: closes the circuit and clears the failure count.
	pub fn record_success(&self) {
		let mut state = self.inner.state.lock();
		state.consecutive_failures = 0;
		state.probe_in_flight = false;
		if state.state != CircuitState::Closed {
			info!(from = %state.state, "circuit breaker closed");
			state.state = CircuitState::Closed;
			self.inner.reset_timer.cancel();
		}
	}

	/// Record a failed send.
	pub fn record_failure(&self) {
		let mut state = self.inner.state.lock();
		state.consecutive_failures = state.consecutive_failures.saturating_add(1);
		state.probe_in_flight = false;

		let trip = match state.state {
			CircuitState::Closed => state.consecutive_failures >= self.inner.config.max_failures,
			CircuitState::HalfOpen => true,
			CircuitState::Open => false,
		};
		if trip {
			warn!(
				consecutive_failures = state.consecutive_failures,
				reset_timeout_ms = self.inner.config.reset_timeout.as_millis() as u64,
				"circuit breaker opened"
			);
			state.state = CircuitState::Open;
			self.schedule_probe();
		}
	}

	/// Force the breaker closed with zero failures.
	pub fn reset(&self) {
		let mut state = self.inner.state.lock();
		self.inner.reset_timer.cancel();
		state.state = CircuitState::Closed;
		state.consecutive_failures = 0;
		state.probe_in_flight = false;
	}

	pub fn state(&self) -> CircuitState {
		self.inner.state.lock().state
	}

	pub fn is_open(&self) -> bool {
		self.state() == CircuitState::Open
	}

	pub fn stats(&self) -> CircuitBreakerStats {
		let state = self.inner.state.lock();
		CircuitBreakerStats {
			consecutive_failures: state.consecutive_failures,
			current_backoff: self.inner.config.backoff.delay_for(state.consecutive_failures),
			state: state.state,
		}
	}

	/// Advisory wait before the next retry, from the current failure count.
	pub fn backoff_delay(&self) -> Duration {
		self.stats().current_backoff
	}

	fn schedule_probe(&self) {
		let weak: Weak<BreakerInner> = Arc::downgrade(&self.inner);
		self.inner
			.reset_timer
			.arm(self.inner.config.reset_timeout, move |generation| async move {
				let Some(inner) = weak.upgrade() else {
					return;
				};
				if !inner.reset_timer.disarm(generation) {
					return;
				}
				let mut state = inner.state.lock();
				if state.state == CircuitState::Open {
					info!("circuit breaker half-open");
					state.state = CircuitState::HalfOpen;
					state.probe_in_flight = false;
				}
			});
	}
}

impl Default for CircuitBreaker {
	fn default() -> Self {
		Self::new(CircuitBreakerConfig::default())
	}
}

/// Releases a half-open probe slot if the send is abandoned mid-flight.
struct Permit<'a> {
	breaker: &'a CircuitBreaker,
	probe: bool,
	completed: bool,
}

impl<'a> Permit<'a> {
	fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
		Self {
			breaker,
			probe,
			completed: false,
		}
	}
}

impl Drop for Permit<'_> {
	fn drop(&mut self) {
		if self.probe && !self.completed {
			self.breaker.inner.state.lock().probe_in_flight = false;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn failing() -> Result<()> {
		Err(DeliveryError::ServerError {
			status: 500,
			message: "boom".to_string(),
		})
	}

	fn breaker(max_failures: u32) -> CircuitBreaker {
		CircuitBreaker::new(CircuitBreakerConfig {
			max_failures,
			reset_timeout: Duration::from_millis(1000),
			backoff: BackoffSchedule::default(),
		})
	}

	#[tokio::test(start_paused = true)]
	async fn opens_after_max_failures() {
		let breaker = breaker(5);
		for i in 1..=5 {
			assert_eq!(breaker.state(), CircuitState::Closed, "before failure {i}");
			let _ = breaker.execute(|| async { failing() }).await;
		}
		assert_eq!(breaker.state(), CircuitState::Open);
		assert_eq!(breaker.stats().consecutive_failures, 5);
	}

	#[tokio::test(start_paused = true)]
	async fn open_circuit_blocks_calls() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;

		let calls = AtomicUsize::new(0);
		for _ in 0..3 {
			let result = breaker
				.execute(|| async {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(())
				})
				.await;
			assert!(result.unwrap_err().is_circuit_open());
		}
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn half_open_after_reset_timeout() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;
		assert_eq!(breaker.state(), CircuitState::Open);

		tokio::time::sleep(Duration::from_millis(999)).await;
		assert_eq!(breaker.state(), CircuitState::Open);
		tokio::time::sleep(Duration::from_millis(2)).await;
		assert_eq!(breaker.state(), CircuitState::HalfOpen);
	}

	#[tokio::test(start_paused = true)]
	async fn probe_success_closes_circuit() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;
		tokio::time::sleep(Duration::from_millis(1001)).await;

		breaker.execute(|| async { Ok(()) }).await.unwrap();
		let stats = breaker.stats();
		assert_eq!(stats.state, CircuitState::Closed);
		assert_eq!(stats.consecutive_failures, 0);
		assert_eq!(stats.current_backoff, Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn probe_failure_reopens_circuit() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;
		tokio::time::sleep(Duration::from_millis(1001)).await;
		assert_eq!(breaker.state(), CircuitState::HalfOpen);

		let _ = breaker.execute(|| async { failing() }).await;
		assert_eq!(breaker.state(), CircuitState::Open);

		tokio::time::sleep(Duration::from_millis(1001)).await;
		assert_eq!(breaker.state(), CircuitState::HalfOpen);
	}

	#[tokio::test(start_paused = true)]
	async fn half_open_allows_exactly_one_probe() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;
		tokio::time::sleep(Duration::from_millis(1001)).await;

		let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
		let probe_breaker = breaker.clone();
		let probe = tokio::spawn(async move {
			probe_breaker
				.execute(|| async move {
					let _ = gate_rx.await;
					Ok(())
				})
				.await
		});
		tokio::task::yield_now().await;

		let second = breaker.execute(|| async { Ok(()) }).await;
		assert!(second.unwrap_err().is_circuit_open());

		gate_tx.send(()).unwrap();
		probe.await.unwrap().unwrap();
		assert_eq!(breaker.state(), CircuitState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn abandoned_probe_releases_slot() {
		let breaker = breaker(1);
		let _ = breaker.execute(|| async { failing() }).await;
		tokio::time::sleep(Duration::from_millis(1001)).await;

		let mut probe = tokio_test::task::spawn(breaker.execute(std::future::pending::<Result<()>>));
		tokio_test::assert_pending!(probe.poll());
		let blocked = breaker.execute(|| async { Ok(()) }).await;
		assert!(blocked.unwrap_err().is_circuit_open());

		drop(probe);
		assert_eq!(breaker.state(), CircuitState::HalfOpen);
		breaker.execute(|| async { Ok(()) }).await.unwrap();
		assert_eq!(breaker.state(), CircuitState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn success_resets_failures_and_backoff() {
		let breaker = breaker(5);
		for _ in 0..3 {
			let _ = breaker.execute(|| async { failing() }).await;
		}
		assert_eq!(breaker.stats().current_backoff, Duration::from_millis(2000));

		breaker.execute(|| async { Ok(()) }).await.unwrap();
		let stats = breaker.stats();
		assert_eq!(stats.consecutive_failures, 0);
		assert_eq!(stats.current_backoff, Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn backoff_tracks_failure_count() {
		let breaker = breaker(10);
		let expected = [100, 500, 2000, 2000];
		for ms in expected {
			breaker.record_failure();
			assert_eq!(breaker.backoff_delay(), Duration::from_millis(ms));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn reset_forces_closed() {
		let breaker = breaker(1);
		breaker.record_failure();
		assert!(breaker.is_open());

		breaker.reset();
		assert_eq!(breaker.state(), CircuitState::Closed);
		assert_eq!(breaker.stats().consecutive_failures, 0);

		tokio::time::sleep(Duration::from_millis(2000)).await;
		assert_eq!(breaker.state(), CircuitState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn clones_share_state() {
		let a = breaker(2);
		let b = a.clone();
		a.record_failure();
		b.record_failure();
		assert!(a.is_open());
		assert_eq!(b.stats().consecutive_failures, 2);
	}
}
