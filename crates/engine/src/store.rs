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

//! Match Store - local mirror of the ledger's matches
//!
//! The store only changes through [`MatchStore::refresh`], which reads the
//! match count and then every match in id order. Failed reads are excluded
//! from the new snapshot instead of failing the refresh. The finished
//! snapshot is swapped in whole, so readers never observe a partial list.

use std::sync::{Arc, RwLock};

use parlay_sdk::{Match, MatchId};
use tracing::{debug, error, info, warn};

use crate::{
	config::MAX_TRACKED_MATCHES,
	ledger::{LedgerError, LedgerGateway},
};

/// Outcome of a bulk refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
	/// Match count reported by the ledger
	pub total: u64,
	/// Entries in the new snapshot
	pub loaded: usize,
	/// Ids excluded from the snapshot and why
	pub failed: Vec<(MatchId, LedgerError)>,
	/// Ids whose ledger answer moved backwards in state; prior entry kept
	pub regressed: Vec<MatchId>,
}

impl RefreshReport {
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty() && self.regressed.is_empty()
	}
}

pub struct MatchStore {
	matches: RwLock<Arc<[Match]>>,
}

impl MatchStore {
	pub fn new() -> Self {
		Self {
			matches: RwLock::new(Arc::from(Vec::new())),
		}
	}

	/// Read-only view of the current snapshot, ordered by id
	pub fn snapshot(&self) -> Arc<[Match]> {
		self.matches
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	pub fn get(&self, match_id: MatchId) -> Option<Match> {
		let snapshot = self.snapshot();
		snapshot
			.binary_search_by_key(&match_id, |m| m.id)
			.ok()
			.map(|i| snapshot[i].clone())
	}

	pub fn len(&self) -> usize {
		self.snapshot().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Rebuild the snapshot from the ledger
	///
	/// Fails only when the match count cannot be read or exceeds
	/// [`MAX_TRACKED_MATCHES`]; the previous snapshot then stays in place.
	///
	/// Refreshes may overlap. Each fetched entry is compared with the
	/// snapshot current at publish time, so a refresh that finishes late
	/// never moves a match back to an earlier state.
	pub async fn refresh(&self, ledger: &dyn LedgerGateway) -> Result<RefreshReport, LedgerError> {
		let total = ledger.total_matches().await.map_err(|e| {
			error!(target: "engine::refresh", error = %e, "Failed to read match count");
			e
		})?;
		if total > MAX_TRACKED_MATCHES {
			error!(
				target: "engine::refresh",
				total,
				limit = MAX_TRACKED_MATCHES,
				"Ledger reported an implausible match count"
			);
			return Err(LedgerError::InvalidResponse(format!(
				"ledger reported {} matches, above the limit of {}",
				total, MAX_TRACKED_MATCHES
			)));
		}

		let mut report = RefreshReport {
			total,
			..RefreshReport::default()
		};
		let mut fetched = Vec::new();

		for match_id in 0..total {
			match ledger.match_info(match_id).await.and_then(|m| check(match_id, m)) {
				Ok(m) => fetched.push(m),
				Err(e) => {
					warn!(
						target: "engine::refresh",
						match_id,
						error = %e,
						"Failed to load match, excluding it"
					);
					report.failed.push((match_id, e));
				}
			}
		}

		{
			let mut current = self
				.matches
				.write()
				.unwrap_or_else(|poisoned| poisoned.into_inner());
			let next = merge(&current, fetched, total, &mut report.regressed);
			report.loaded = next.len();
			*current = Arc::from(next);
		}

		if report.is_complete() {
			debug!(target: "engine::refresh", total, "Refresh complete");
		} else {
			info!(
				target: "engine::refresh",
				total,
				loaded = report.loaded,
				failed = report.failed.len(),
				regressed = report.regressed.len(),
				"Refresh completed with exclusions"
			);
		}
		Ok(report)
	}
}

/// Combine freshly read entries with the published snapshot
///
/// An entry whose state is behind the published one keeps the published
/// entry. Published ids at or above `total` come from a newer count and
/// are carried over.
fn merge(
	current: &[Match],
	fetched: Vec<Match>,
	total: u64,
	regressed: &mut Vec<MatchId>,
) -> Vec<Match> {
	let mut next = Vec::with_capacity(fetched.len());
	for m in fetched {
		let prior = current
			.binary_search_by_key(&m.id, |p| p.id)
			.ok()
			.map(|i| &current[i]);
		match prior {
			Some(prior) if m.state < prior.state => {
				error!(
					target: "engine::refresh",
					match_id = m.id,
					prior = %prior.state,
					reported = %m.state,
					"Ledger reported a state regression, keeping prior entry"
				);
				regressed.push(m.id);
				next.push(prior.clone());
			}
			_ => next.push(m),
		}
	}
	next.extend(current.iter().filter(|p| p.id >= total).cloned());
	next
}

impl Default for MatchStore {
	fn default() -> Self {
		Self::new()
	}
}

/// Reject answers that break the match invariants
fn check(match_id: MatchId, m: Match) -> Result<Match, LedgerError> {
	if m.id != match_id {
		return Err(LedgerError::InvalidResponse(format!(
			"requested match {} but got {}",
			match_id, m.id
		)));
	}
	if !m.pools_balanced() {
		return Err(LedgerError::InvalidResponse(format!(
			"match {}: outcome pools do not sum to the total pool",
			match_id
		)));
	}
	Ok(m)
}
