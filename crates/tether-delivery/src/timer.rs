// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cancellable one-shot timers.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A spawned task that runs a future after a delay unless cancelled first.
///
/// Dropping the timer cancels it.
#[derive(Debug)]
pub struct CancellableTimer {
	handle: Option<JoinHandle<()>>,
}

impl CancellableTimer {
	/// Spawn `task` to run after `delay`. Must be called within a tokio runtime.
	pub fn spawn<F>(delay: Duration, task: F) -> Self
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let handle = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			task.await;
		});
		Self {
			handle: Some(handle),
		}
	}

	pub fn cancel(mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}

	/// Release the handle without aborting the task. Used by a timer that is
	/// disarming itself from inside its own task.
	fn detach(mut self) {
		self.handle.take();
	}

	pub fn is_finished(&self) -> bool {
		self.handle.as_ref().map_or(true, JoinHandle::is_finished)
	}
}

impl Drop for CancellableTimer {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}
}

#[derive(Debug, Default)]
struct SlotState {
	generation: u64,
	timer: Option<CancellableTimer>,
}

/// Holds at most one pending timer.
///
/// Arming replaces (and cancels) any pending timer. Each arm gets a new
/// generation number; a firing timer calls [`TimerSlot::disarm`] with its
/// generation to claim the slot, which fails if it was re-armed or cancelled
/// in the meantime.
#[derive(Debug, Default)]
pub struct TimerSlot {
	state: Mutex<SlotState>,
}

impl TimerSlot {
	pub fn new() -> Self {
		Self::default()
	}

	/// Arm the slot. `make_task` receives the generation to pass to `disarm`.
	pub fn arm<F, Fut>(&self, delay: Duration, make_task: F)
	where
		F: FnOnce(u64) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let mut state = self.state.lock();
		state.generation = state.generation.wrapping_add(1);
		let task = make_task(state.generation);
		if let Some(previous) = state.timer.replace(CancellableTimer::spawn(delay, task)) {
			previous.cancel();
		}
	}

	/// Cancel the pending timer. Returns true if one was pending.
	pub fn cancel(&self) -> bool {
		let mut state = self.state.lock();
		state.generation = state.generation.wrapping_add(1);
		match state.timer.take() {
			Some(timer) => {
				timer.cancel();
				true
			}
			None => false,
		}
	}

	/// Claim the slot from inside a fired timer. Returns false if the timer
	/// was superseded, in which case the caller must do nothing.
	pub fn disarm(&self, generation: u64) -> bool {
		let mut state = self.state.lock();
		if state.generation != generation {
			return false;
		}
		match state.timer.take() {
			Some(timer) => {
				timer.detach();
				true
			}
			None => false,
		}
	}

	pub fn is_armed(&self) -> bool {
		self.state.lock().timer.is_some()
	}
}
