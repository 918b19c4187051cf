// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Status Reporter
//!
//! One current status, overwritten by every workflow step and observable
//! through a watch channel, plus a bounded history of every change.

use std::{
	collections::VecDeque,
	fmt,
	sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

/// User-visible engine action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Connect,
	Refresh,
	CreateMatch,
	PlaceBet,
	CloseMatch,
	SettleMatch,
	Claim,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Action::Connect => "Connect",
			Action::Refresh => "Refresh",
			Action::CreateMatch => "Create match",
			Action::PlaceBet => "Place bet",
			Action::CloseMatch => "Close match",
			Action::SettleMatch => "Settle match",
			Action::Claim => "Claim",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
	#[default]
	Idle,
	InProgress(Action),
	Succeeded(Action),
	Failed { action: Action, cause: String },
}

impl Status {
	pub fn is_failure(&self) -> bool {
		matches!(self, Status::Failed { .. })
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Status::Idle => f.write_str("idle"),
			Status::InProgress(action) => write!(f, "{} in progress", action),
			Status::Succeeded(action) => write!(f, "{} succeeded", action),
			Status::Failed { action, cause } => write!(f, "{} failed: {}", action, cause),
		}
	}
}

/// One entry in the status history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
	pub seq: u64,
	pub at: DateTime<Utc>,
	pub status: Status,
}

struct History {
	events: VecDeque<StatusEvent>,
	next_seq: u64,
}

pub struct StatusReporter {
	current: watch::Sender<Status>,
	history: Mutex<History>,
	capacity: usize,
}

impl StatusReporter {
	/// Reporter keeping at most `capacity` events (at least one)
	pub fn new(capacity: usize) -> Self {
		let (current, _) = watch::channel(Status::Idle);
		Self {
			current,
			history: Mutex::new(History {
				events: VecDeque::new(),
				next_seq: 0,
			}),
			capacity: capacity.max(1),
		}
	}

	/// Overwrite the current status and append it to the history
	pub fn set(&self, status: Status) {
		if let Status::Failed { action, cause } = &status {
			warn!(target: "engine", %action, %cause, "Action failed");
		} else {
			info!(target: "engine", status = %status, "Status changed");
		}

		// Hold the history lock across the publish so seq order matches slot order
		let mut history = self.lock_history();
		let event = StatusEvent {
			seq: history.next_seq,
			at: Utc::now(),
			status: status.clone(),
		};
		history.next_seq += 1;
		if history.events.len() == self.capacity {
			history.events.pop_front();
		}
		history.events.push_back(event);
		self.current.send_replace(status);
	}

	pub fn begin(&self, action: Action) {
		self.set(Status::InProgress(action));
	}

	pub fn succeed(&self, action: Action) {
		self.set(Status::Succeeded(action));
	}

	pub fn fail(&self, action: Action, cause: impl fmt::Display) {
		self.set(Status::Failed {
			action,
			cause: cause.to_string(),
		});
	}

	pub fn current(&self) -> Status {
		self.current.borrow().clone()
	}

	/// Watch the status slot; the receiver sees the latest value on each change
	pub fn subscribe(&self) -> watch::Receiver<Status> {
		self.current.subscribe()
	}

	/// Retained events, oldest first
	pub fn history(&self) -> Vec<StatusEvent> {
		self.lock_history().events.iter().cloned().collect()
	}

	fn lock_history(&self) -> MutexGuard<'_, History> {
		self.history
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
