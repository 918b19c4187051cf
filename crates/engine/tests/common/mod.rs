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

#![allow(dead_code)]

use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};

use async_trait::async_trait;
use parlay_engine::{
	CreateMatchForm, EngineConfig, LedgerError, LedgerGateway, LifecycleEngine, MemoryLedger,
	Receipt,
};
use parlay_sdk::{
	Address, FeeData, Match, MatchId, MatchState, SignatureAlgorithm, SignedWrite, Signer, TxHash,
	WriteCall,
};

/// Deadline far enough ahead for any test run
pub const FUTURE_DEADLINE: &str = "2099-01-15T19:30";

/// [`MemoryLedger`] with failure injection
pub struct FlakyLedger {
	pub ledger: MemoryLedger,
	fail_total: AtomicBool,
	reported_total: AtomicU64,
	fail_estimates: AtomicBool,
	hide_created_ids: AtomicBool,
	failed_reads: Mutex<HashSet<MatchId>>,
	state_overrides: Mutex<HashMap<MatchId, MatchState>>,
	submitted: Mutex<Vec<SignedWrite>>,
}

impl FlakyLedger {
	pub fn new() -> Self {
		Self {
			ledger: MemoryLedger::new(),
			fail_total: AtomicBool::new(false),
			reported_total: AtomicU64::new(0),
			fail_estimates: AtomicBool::new(false),
			hide_created_ids: AtomicBool::new(false),
			failed_reads: Mutex::new(HashSet::new()),
			state_overrides: Mutex::new(HashMap::new()),
			submitted: Mutex::new(Vec::new()),
		}
	}

	pub fn fail_total_matches(&self, fail: bool) {
		self.fail_total.store(fail, Ordering::SeqCst);
	}

	/// Report `total` as the match count; zero reports the real count
	pub fn report_total(&self, total: u64) {
		self.reported_total.store(total, Ordering::SeqCst);
	}

	pub fn fail_estimates(&self, fail: bool) {
		self.fail_estimates.store(fail, Ordering::SeqCst);
	}

	/// Strip the created id from receipts, as a node that does not report it would
	pub fn hide_created_ids(&self, hide: bool) {
		self.hide_created_ids.store(hide, Ordering::SeqCst);
	}

	pub fn fail_read(&self, match_id: MatchId) {
		self.failed_reads.lock().unwrap().insert(match_id);
	}

	pub fn clear_read_failures(&self) {
		self.failed_reads.lock().unwrap().clear();
	}

	/// Report `state` for a match regardless of what the ledger holds
	pub fn override_state(&self, match_id: MatchId, state: MatchState) {
		self.state_overrides.lock().unwrap().insert(match_id, state);
	}

	/// Writes submitted so far, oldest first
	pub fn submitted(&self) -> Vec<SignedWrite> {
		self.submitted.lock().unwrap().clone()
	}
}

#[async_trait]
impl LedgerGateway for FlakyLedger {
	async fn total_matches(&self) -> Result<u64, LedgerError> {
		if self.fail_total.load(Ordering::SeqCst) {
			return Err(LedgerError::Transport("connection reset".to_string()));
		}
		match self.reported_total.load(Ordering::SeqCst) {
			0 => self.ledger.total_matches().await,
			total => Ok(total),
		}
	}

	async fn match_info(&self, match_id: MatchId) -> Result<Match, LedgerError> {
		if self.failed_reads.lock().unwrap().contains(&match_id) {
			return Err(LedgerError::Transport(format!("timeout reading match {}", match_id)));
		}
		let mut m = self.ledger.match_info(match_id).await?;
		if let Some(state) = self.state_overrides.lock().unwrap().get(&match_id) {
			m.state = *state;
		}
		Ok(m)
	}

	async fn user_matches(&self, account: &Address) -> Result<Vec<MatchId>, LedgerError> {
		self.ledger.user_matches(account).await
	}

	async fn fee_data(&self) -> Result<FeeData, LedgerError> {
		self.ledger.fee_data().await
	}

	async fn estimate_gas(&self, call: &WriteCall, from: &Address) -> Result<u64, LedgerError> {
		if self.fail_estimates.load(Ordering::SeqCst) {
			return Err(LedgerError::Transport("estimate unavailable".to_string()));
		}
		self.ledger.estimate_gas(call, from).await
	}

	async fn submit(&self, write: &SignedWrite) -> Result<TxHash, LedgerError> {
		self.submitted.lock().unwrap().push(write.clone());
		self.ledger.submit(write).await
	}

	async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
		let mut receipt = self.ledger.wait_for_receipt(tx_hash).await?;
		if self.hide_created_ids.load(Ordering::SeqCst) {
			receipt.created_match_id = None;
		}
		Ok(receipt)
	}
}

pub fn match_form(home: &str, away: &str) -> CreateMatchForm {
	CreateMatchForm {
		home_team: home.to_string(),
		away_team: away.to_string(),
		game_date: "2099-01-15".to_string(),
		deadline: FUTURE_DEADLINE.to_string(),
		over_under_line: "220".to_string(),
	}
}

/// Engine over a fresh [`FlakyLedger`], connected with a new account
pub async fn connected_engine() -> (Arc<FlakyLedger>, LifecycleEngine, Address) {
	let ledger = Arc::new(FlakyLedger::new());
	let engine = LifecycleEngine::new(ledger.clone(), &EngineConfig::default());
	let signer = Signer::generate(SignatureAlgorithm::Ecdsa);
	let address = signer.address().clone();
	engine.connect(signer).await.unwrap();
	(ledger, engine, address)
}

/// Create `count` matches through the engine
pub async fn create_matches(engine: &LifecycleEngine, count: usize) {
	for i in 0..count {
		engine
			.create_match(&match_form(&format!("Home {}", i), &format!("Away {}", i)))
			.await
			.unwrap();
	}
}
