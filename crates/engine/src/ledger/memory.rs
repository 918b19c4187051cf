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

use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use dashmap::DashMap;
use parlay_sdk::{
	Address, Amount, FeeData, Match, MatchId, MatchState, Outcome, SignedWrite, TransactionReceipt,
	TransactionStatus, TxHash, WriteCall, verify_signed_write,
};
use tracing::debug;
use uuid::Uuid;

use super::{LedgerError, LedgerGateway, Receipt, settle_receipt};

/// Gas charged per ledger method
pub const CREATE_MATCH_GAS: u64 = 250_000;
pub const PLACE_BET_GAS: u64 = 120_000;
pub const CLOSE_MATCH_GAS: u64 = 60_000;
pub const SETTLE_MATCH_GAS: u64 = 80_000;
pub const CLAIM_GAS: u64 = 90_000;

fn gas_cost(call: &WriteCall) -> u64 {
	match call {
		WriteCall::CreateMatch { .. } => CREATE_MATCH_GAS,
		WriteCall::PlaceBet { .. } => PLACE_BET_GAS,
		WriteCall::CloseMatch { .. } => CLOSE_MATCH_GAS,
		WriteCall::SettleMatch { .. } => SETTLE_MATCH_GAS,
		WriteCall::Claim { .. } => CLAIM_GAS,
	}
}

struct MatchRecord {
	snapshot: Match,
	creator: Address,
	result: Option<Outcome>,
	/// Stake per (bettor, outcome)
	stakes: HashMap<(Address, Outcome), Amount>,
	/// Payout per bettor that has claimed
	claimed: HashMap<Address, Amount>,
}

#[derive(Default)]
struct LedgerState {
	matches: Vec<MatchRecord>,
	/// Matches each account has bet on, in first-bet order
	bettors: HashMap<Address, Vec<MatchId>>,
}

impl LedgerState {
	fn record(&self, match_id: MatchId) -> Result<&MatchRecord, String> {
		usize::try_from(match_id)
			.ok()
			.and_then(|i| self.matches.get(i))
			.ok_or_else(|| "Match does not exist".to_string())
	}

	fn record_mut(&mut self, match_id: MatchId) -> Result<&mut MatchRecord, String> {
		usize::try_from(match_id)
			.ok()
			.and_then(|i| self.matches.get_mut(i))
			.ok_or_else(|| "Match does not exist".to_string())
	}

	/// Contract rules; runs for both estimates and execution
	fn validate(&self, from: &Address, call: &WriteCall, now: u64) -> Result<(), String> {
		match call {
			WriteCall::CreateMatch {
				home_team,
				away_team,
				game_date,
				deadline,
				..
			} => {
				if [home_team, away_team, game_date]
					.iter()
					.any(|s| s.trim().is_empty())
				{
					return Err("Teams and game date are required".to_string());
				}
				if *deadline <= now {
					return Err("Deadline must be in the future".to_string());
				}
			}
			WriteCall::PlaceBet {
				match_id, stake, ..
			} => {
				let record = self.record(*match_id)?;
				if record.snapshot.state != MatchState::Open {
					return Err("Match not open".to_string());
				}
				if now >= record.snapshot.deadline {
					return Err("Betting deadline passed".to_string());
				}
				if stake.is_zero() {
					return Err("Stake must be positive".to_string());
				}
			}
			WriteCall::CloseMatch { match_id } => {
				let record = self.record(*match_id)?;
				if &record.creator != from {
					return Err("Only the match creator can close betting".to_string());
				}
				if !record.snapshot.state.can_transition_to(MatchState::Closed) {
					return Err("Match not open".to_string());
				}
			}
			WriteCall::SettleMatch { match_id, .. } => {
				let record = self.record(*match_id)?;
				if &record.creator != from {
					return Err("Only the match creator can settle".to_string());
				}
				if !record.snapshot.state.can_transition_to(MatchState::Settled) {
					return Err("Match not closed".to_string());
				}
			}
			WriteCall::Claim { match_id } => {
				let record = self.record(*match_id)?;
				payout(record, from)?;
			}
		}
		Ok(())
	}

	/// Execute a validated call; returns the created match id for `createMatch`
	fn apply(&mut self, from: &Address, call: &WriteCall, now: u64) -> Result<Option<MatchId>, String> {
		self.validate(from, call, now)?;

		match call {
			WriteCall::CreateMatch {
				home_team,
				away_team,
				game_date,
				deadline,
				over_under_line,
			} => {
				let id = self.matches.len() as MatchId;
				self.matches.push(MatchRecord {
					snapshot: Match {
						id,
						home_team: home_team.trim().to_string(),
						away_team: away_team.trim().to_string(),
						game_date: game_date.trim().to_string(),
						deadline: *deadline,
						over_under_line: *over_under_line,
						state: MatchState::Open,
						total_pool: Amount::ZERO,
						pool_by_outcome: [Amount::ZERO; 3],
					},
					creator: from.clone(),
					result: None,
					stakes: HashMap::new(),
					claimed: HashMap::new(),
				});
				Ok(Some(id))
			}
			WriteCall::PlaceBet {
				match_id,
				outcome,
				stake,
			} => {
				let record = self.record_mut(*match_id)?;
				let overflow = || "Pool overflow".to_string();
				let total = record.snapshot.total_pool.checked_add(*stake).ok_or_else(overflow)?;
				let pool = record.snapshot.pool(*outcome).checked_add(*stake).ok_or_else(overflow)?;
				let entry = record
					.stakes
					.entry((from.clone(), *outcome))
					.or_insert(Amount::ZERO);
				*entry = entry.checked_add(*stake).ok_or_else(overflow)?;
				record.snapshot.total_pool = total;
				record.snapshot.pool_by_outcome[outcome.index()] = pool;

				let ids = self.bettors.entry(from.clone()).or_default();
				if !ids.contains(match_id) {
					ids.push(*match_id);
				}
				Ok(None)
			}
			WriteCall::CloseMatch { match_id } => {
				self.record_mut(*match_id)?.snapshot.state = MatchState::Closed;
				Ok(None)
			}
			WriteCall::SettleMatch { match_id, result } => {
				let record = self.record_mut(*match_id)?;
				record.snapshot.state = MatchState::Settled;
				record.result = Some(*result);
				Ok(None)
			}
			WriteCall::Claim { match_id } => {
				let record = self.record_mut(*match_id)?;
				let amount = payout(record, from)?;
				record.claimed.insert(from.clone(), amount);
				Ok(None)
			}
		}
	}
}

/// Pari-mutuel payout: winners split the whole pool by stake on the result
fn payout(record: &MatchRecord, bettor: &Address) -> Result<Amount, String> {
	let result = match (record.snapshot.state, record.result) {
		(MatchState::Settled, Some(result)) => result,
		_ => return Err("Match not settled".to_string()),
	};
	if record.claimed.contains_key(bettor) {
		return Err("Already claimed".to_string());
	}
	let stake = record
		.stakes
		.get(&(bettor.clone(), result))
		.copied()
		.unwrap_or(Amount::ZERO);
	if stake.is_zero() {
		return Err("Nothing to claim".to_string());
	}

	let winning_pool = record.snapshot.pool(result).wei();
	stake
		.wei()
		.checked_mul(record.snapshot.total_pool.wei())
		.map(|v| Amount::from_wei(v / winning_pool))
		.ok_or_else(|| "Payout overflow".to_string())
}

/// In-process ledger with the wagering contract's rules
///
/// Stands in for a ledger node in tests and in demo mode. Writes are
/// signature-checked, charged gas, and executed atomically on submit; the
/// receipt is final immediately. The clock can be pinned with
/// [`MemoryLedger::set_time`] to exercise deadlines.
pub struct MemoryLedger {
	state: Mutex<LedgerState>,
	receipts: DashMap<TxHash, TransactionReceipt>,
	clock: Mutex<Option<u64>>,
	fee_data: FeeData,
}

impl MemoryLedger {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(LedgerState::default()),
			receipts: DashMap::new(),
			clock: Mutex::new(None),
			fee_data: FeeData {
				max_fee_per_gas: Some(30_000_000_000),
				max_priority_fee_per_gas: Some(1_500_000_000),
			},
		}
	}

	pub fn with_fee_data(mut self, fee_data: FeeData) -> Self {
		self.fee_data = fee_data;
		self
	}

	/// Pin the ledger clock (unix seconds)
	pub fn set_time(&self, now: u64) {
		*lock(&self.clock) = Some(now);
	}

	/// Current ledger time
	pub fn now(&self) -> u64 {
		let pinned = *lock(&self.clock);
		pinned.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
	}

	/// Payout recorded for a bettor's claim, if any
	pub fn claimed_amount(&self, match_id: MatchId, bettor: &Address) -> Option<Amount> {
		lock(&self.state)
			.record(match_id)
			.ok()
			.and_then(|r| r.claimed.get(bettor).copied())
	}

	/// Settlement result of a match, if settled
	pub fn result_of(&self, match_id: MatchId) -> Option<Outcome> {
		lock(&self.state).record(match_id).ok().and_then(|r| r.result)
	}
}

impl Default for MemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
	async fn total_matches(&self) -> Result<u64, LedgerError> {
		Ok(lock(&self.state).matches.len() as u64)
	}

	async fn match_info(&self, match_id: MatchId) -> Result<Match, LedgerError> {
		lock(&self.state)
			.record(match_id)
			.map(|r| r.snapshot.clone())
			.map_err(|_| LedgerError::NotFound(format!("match {}", match_id)))
	}

	async fn user_matches(&self, account: &Address) -> Result<Vec<MatchId>, LedgerError> {
		Ok(lock(&self.state)
			.bettors
			.get(account)
			.cloned()
			.unwrap_or_default())
	}

	async fn fee_data(&self) -> Result<FeeData, LedgerError> {
		Ok(self.fee_data)
	}

	async fn estimate_gas(&self, call: &WriteCall, from: &Address) -> Result<u64, LedgerError> {
		let now = self.now();
		lock(&self.state)
			.validate(from, call, now)
			.map_err(LedgerError::Rejected)?;
		Ok(gas_cost(call))
	}

	async fn submit(&self, write: &SignedWrite) -> Result<TxHash, LedgerError> {
		verify_signed_write(write)
			.map_err(|e| LedgerError::Rejected(format!("invalid signature: {}", e)))?;

		let tx_hash = TxHash(format!("0x{}", Uuid::new_v4().simple()));
		let cost = gas_cost(&write.call);
		let now = self.now();

		let receipt = if write.options.gas_limit < cost {
			TransactionReceipt {
				tx_hash: tx_hash.clone(),
				status: TransactionStatus::Failed,
				created_match_id: None,
				gas_used: Some(write.options.gas_limit),
				error: Some("out of gas".to_string()),
			}
		} else {
			match lock(&self.state).apply(&write.from, &write.call, now) {
				Ok(created_match_id) => TransactionReceipt {
					tx_hash: tx_hash.clone(),
					status: TransactionStatus::Confirmed,
					created_match_id,
					gas_used: Some(cost),
					error: None,
				},
				Err(reason) => TransactionReceipt {
					tx_hash: tx_hash.clone(),
					status: TransactionStatus::Failed,
					created_match_id: None,
					gas_used: Some(cost),
					error: Some(reason),
				},
			}
		};

		debug!(
			target: "ledger",
			tx_hash = %tx_hash,
			method = write.call.method(),
			status = ?receipt.status,
			"Memory ledger executed transaction"
		);
		self.receipts.insert(tx_hash.clone(), receipt);
		Ok(tx_hash)
	}

	async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
		let receipt = self
			.receipts
			.get(tx_hash)
			.map(|r| r.value().clone())
			.ok_or_else(|| LedgerError::Transport(format!("unknown transaction {}", tx_hash)))?;

		settle_receipt(receipt).unwrap_or_else(|| {
			Err(LedgerError::Transport(format!(
				"transaction {} still pending",
				tx_hash
			)))
		})
	}
}
