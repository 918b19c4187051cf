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

//! Lifecycle Orchestrator
//!
//! Every mutating action runs the same linear pipeline:
//!
//! ```text
//! validate -> estimate fee -> sign + submit -> await receipt -> refresh store
//! ```
//!
//! A failing step halts the workflow; earlier steps are not rolled back.
//! The store is only touched by the final refresh, so a failed write never
//! leaves it half-updated. Each workflow reports through the shared
//! [`StatusReporter`] and also returns its own result to the caller.

use std::{
	future::Future,
	sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use parlay_sdk::{
	Address, Amount, Match, MatchId, Outcome, Signer, SigningError, TxHash, WriteCall,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
	config::EngineConfig,
	fees::FeeEstimator,
	ledger::{LedgerError, LedgerGateway, Receipt},
	status::{Action, StatusReporter},
	store::{MatchStore, RefreshReport},
};

/// Error types for engine workflows
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
	#[error("{0}")]
	Validation(String),
	#[error("wallet not connected")]
	NotConnected,
	#[error("signing failed: {0}")]
	Signing(String),
	#[error("{0}")]
	Rejected(String),
	#[error("transport error: {0}")]
	Transport(String),
}

impl From<LedgerError> for WorkflowError {
	fn from(e: LedgerError) -> Self {
		match e {
			LedgerError::Rejected(reason) => WorkflowError::Rejected(reason),
			LedgerError::Transport(msg) => WorkflowError::Transport(msg),
			LedgerError::NotFound(msg) => WorkflowError::Transport(format!("not found: {}", msg)),
			LedgerError::InvalidResponse(msg) => {
				WorkflowError::Transport(format!("invalid ledger response: {}", msg))
			}
		}
	}
}

impl From<SigningError> for WorkflowError {
	fn from(e: SigningError) -> Self {
		WorkflowError::Signing(e.to_string())
	}
}

/// Result of a successful workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOutcome {
	pub action: Action,
	/// Match the workflow acted on (the new id for create)
	pub match_id: Option<MatchId>,
	pub tx_hash: Option<TxHash>,
	/// Gas budget attached to the write
	pub gas_limit: Option<u64>,
	/// Report of the follow-up refresh, when one ran and succeeded
	pub refresh: Option<RefreshReport>,
	/// Follow-up refresh failure; the write itself is confirmed
	pub refresh_error: Option<LedgerError>,
}

impl WorkflowOutcome {
	fn new(action: Action) -> Self {
		Self {
			action,
			match_id: None,
			tx_hash: None,
			gas_limit: None,
			refresh: None,
			refresh_error: None,
		}
	}
}

/// Human-entered fields for a new match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMatchForm {
	pub home_team: String,
	pub away_team: String,
	pub game_date: String,
	/// Unix seconds, RFC 3339, or `YYYY-MM-DD[ HH:MM[:SS]]` (UTC)
	pub deadline: String,
	pub over_under_line: String,
}

impl CreateMatchForm {
	/// Validate the form and build the `createMatch` call
	pub fn to_call(&self) -> Result<WriteCall, WorkflowError> {
		let home_team = self.home_team.trim();
		let away_team = self.away_team.trim();
		let game_date = self.game_date.trim();
		if home_team.is_empty() || away_team.is_empty() || game_date.is_empty() {
			return Err(WorkflowError::Validation(
				"Team names and game date are required".to_string(),
			));
		}

		let deadline = parse_deadline(&self.deadline)?;
		let over_under_line = self.over_under_line.trim().parse::<u64>().map_err(|_| {
			WorkflowError::Validation(format!(
				"Invalid over/under line: {}",
				self.over_under_line.trim()
			))
		})?;

		Ok(WriteCall::CreateMatch {
			home_team: home_team.to_string(),
			away_team: away_team.to_string(),
			game_date: game_date.to_string(),
			deadline,
			over_under_line,
		})
	}
}

const DEADLINE_FORMATS: [&str; 4] = [
	"%Y-%m-%dT%H:%M",
	"%Y-%m-%dT%H:%M:%S",
	"%Y-%m-%d %H:%M",
	"%Y-%m-%d %H:%M:%S",
];

/// Convert a human-entered deadline to unix seconds
///
/// Naive dates and times are read as UTC. Whether the deadline lies in the
/// future is left to the ledger.
pub fn parse_deadline(input: &str) -> Result<u64, WorkflowError> {
	let input = input.trim();
	if input.is_empty() {
		return Err(WorkflowError::Validation("Deadline is required".to_string()));
	}
	let invalid = || WorkflowError::Validation(format!("Invalid deadline: {}", input));

	if let Ok(ts) = input.parse::<u64>() {
		return Ok(ts);
	}

	let timestamp = if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
		dt.timestamp()
	} else if let Some(naive) = DEADLINE_FORMATS
		.iter()
		.find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
	{
		naive.and_utc().timestamp()
	} else {
		NaiveDate::parse_from_str(input, "%Y-%m-%d")
			.ok()
			.and_then(|d| d.and_hms_opt(0, 0, 0))
			.ok_or_else(invalid)?
			.and_utc()
			.timestamp()
	};

	u64::try_from(timestamp).map_err(|_| invalid())
}

#[derive(Default)]
struct Session {
	signer: Option<Arc<Signer>>,
	bet_selection: Option<MatchId>,
	settle_selection: Option<MatchId>,
}

/// Match lifecycle engine
///
/// Owns the match store and status reporter, and drives every write
/// against the injected ledger. All methods take `&self`; workflows may
/// run concurrently, in which case the status slot is last-writer-wins.
pub struct LifecycleEngine {
	ledger: Arc<dyn LedgerGateway>,
	fees: FeeEstimator,
	store: MatchStore,
	status: StatusReporter,
	session: RwLock<Session>,
}

impl LifecycleEngine {
	pub fn new(ledger: Arc<dyn LedgerGateway>, config: &EngineConfig) -> Self {
		Self {
			ledger,
			fees: FeeEstimator::new(config.default_gas_limit),
			store: MatchStore::new(),
			status: StatusReporter::new(config.status_history),
			session: RwLock::new(Session::default()),
		}
	}

	pub fn status(&self) -> &StatusReporter {
		&self.status
	}

	/// Current snapshot of the store, ordered by id
	pub fn matches(&self) -> Arc<[Match]> {
		self.store.snapshot()
	}

	pub fn get_match(&self, match_id: MatchId) -> Option<Match> {
		self.store.get(match_id)
	}

	pub fn account(&self) -> Option<Address> {
		self.session_read()
			.signer
			.as_ref()
			.map(|s| s.address().clone())
	}

	pub fn bet_selection(&self) -> Option<MatchId> {
		self.session_read().bet_selection
	}

	pub fn settle_selection(&self) -> Option<MatchId> {
		self.session_read().settle_selection
	}

	/// Match targeted by `place_bet`
	pub fn select_bet_match(&self, match_id: MatchId) {
		self.session_write().bet_selection = Some(match_id);
	}

	/// Match targeted by `close_match`, `settle_match` and `claim`
	pub fn select_settle_match(&self, match_id: MatchId) {
		self.session_write().settle_selection = Some(match_id);
	}

	/// Attach a signer and load the matches
	pub async fn connect(&self, signer: Signer) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::Connect, self.run_connect(signer)).await
	}

	pub fn disconnect(&self) {
		if let Some(signer) = self.session_write().signer.take() {
			info!(target: "engine", account = %signer.address(), "Account disconnected");
		}
		self.status.set(Default::default());
	}

	/// Rebuild the store on demand
	pub async fn refresh(&self) -> Result<RefreshReport, WorkflowError> {
		self.track(Action::Refresh, self.run_refresh()).await
	}

	/// Create a match, then select it for betting and settlement
	pub async fn create_match(
		&self,
		form: &CreateMatchForm,
	) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::CreateMatch, self.run_create(form)).await
	}

	/// Bet `stake` ether on outcome `choice` (0 home, 1 away, 2 over/under) of the selected match
	pub async fn place_bet(&self, choice: u8, stake: &str) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::PlaceBet, self.run_place_bet(choice, stake))
			.await
	}

	/// Close betting on the selected match
	pub async fn close_match(&self) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::CloseMatch, self.run_close()).await
	}

	/// Record the final `result` of the selected match
	pub async fn settle_match(&self, result: u8) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::SettleMatch, self.run_settle(result))
			.await
	}

	/// Claim winnings on the selected match
	///
	/// Payouts do not show in pool fields, so no refresh follows.
	pub async fn claim(&self) -> Result<WorkflowOutcome, WorkflowError> {
		self.track(Action::Claim, self.run_claim()).await
	}

	/// Store entries for the matches the connected account has bet on
	pub async fn my_matches(&self) -> Result<Vec<Match>, WorkflowError> {
		let signer = self.signer()?;
		let ids = self.ledger.user_matches(signer.address()).await?;
		let snapshot = self.store.snapshot();
		Ok(snapshot
			.iter()
			.filter(|m| ids.contains(&m.id))
			.cloned()
			.collect())
	}

	async fn run_connect(&self, signer: Signer) -> Result<WorkflowOutcome, WorkflowError> {
		let address = signer.address().clone();
		self.session_write().signer = Some(Arc::new(signer));
		info!(target: "engine", account = %address, "Account connected");

		let mut outcome = WorkflowOutcome::new(Action::Connect);
		self.refresh_after(&mut outcome).await;
		Ok(outcome)
	}

	async fn run_refresh(&self) -> Result<RefreshReport, WorkflowError> {
		Ok(self.store.refresh(self.ledger.as_ref()).await?)
	}

	async fn run_create(&self, form: &CreateMatchForm) -> Result<WorkflowOutcome, WorkflowError> {
		let signer = self.signer()?;
		let call = form.to_call()?;

		let mut outcome = WorkflowOutcome::new(Action::CreateMatch);
		let receipt = self.execute(&signer, call, &mut outcome).await?;
		let match_id = self.created_match_id(&receipt).await?;
		outcome.match_id = Some(match_id);

		self.refresh_after(&mut outcome).await;
		{
			let mut session = self.session_write();
			session.bet_selection = Some(match_id);
			session.settle_selection = Some(match_id);
		}
		info!(target: "engine", match_id, "Match created");
		Ok(outcome)
	}

	async fn run_place_bet(&self, choice: u8, stake: &str) -> Result<WorkflowOutcome, WorkflowError> {
		let signer = self.signer()?;
		let match_id = self.bet_selection().ok_or_else(no_selection)?;
		let picked = Outcome::from_code(choice)
			.ok_or_else(|| WorkflowError::Validation(format!("Invalid outcome: {}", choice)))?;
		let stake = Amount::parse_ether(stake)
			.map_err(|e| WorkflowError::Validation(format!("Invalid stake: {}", e)))?;
		if stake.is_zero() {
			return Err(WorkflowError::Validation(
				"Stake must be greater than zero".to_string(),
			));
		}

		let call = WriteCall::PlaceBet {
			match_id,
			outcome: picked,
			stake,
		};
		let mut outcome = WorkflowOutcome::new(Action::PlaceBet);
		outcome.match_id = Some(match_id);
		self.execute(&signer, call, &mut outcome).await?;
		self.refresh_after(&mut outcome).await;
		Ok(outcome)
	}

	async fn run_close(&self) -> Result<WorkflowOutcome, WorkflowError> {
		let signer = self.signer()?;
		let match_id = self.settle_selection().ok_or_else(no_selection)?;

		let mut outcome = WorkflowOutcome::new(Action::CloseMatch);
		outcome.match_id = Some(match_id);
		self.execute(&signer, WriteCall::CloseMatch { match_id }, &mut outcome)
			.await?;
		self.refresh_after(&mut outcome).await;
		Ok(outcome)
	}

	async fn run_settle(&self, result: u8) -> Result<WorkflowOutcome, WorkflowError> {
		let signer = self.signer()?;
		let match_id = self.settle_selection().ok_or_else(no_selection)?;
		let result = Outcome::from_code(result)
			.ok_or_else(|| WorkflowError::Validation(format!("Invalid result: {}", result)))?;

		let mut outcome = WorkflowOutcome::new(Action::SettleMatch);
		outcome.match_id = Some(match_id);
		self.execute(&signer, WriteCall::SettleMatch { match_id, result }, &mut outcome)
			.await?;
		self.refresh_after(&mut outcome).await;
		Ok(outcome)
	}

	async fn run_claim(&self) -> Result<WorkflowOutcome, WorkflowError> {
		let signer = self.signer()?;
		let match_id = self.settle_selection().ok_or_else(no_selection)?;

		let mut outcome = WorkflowOutcome::new(Action::Claim);
		outcome.match_id = Some(match_id);
		self.execute(&signer, WriteCall::Claim { match_id }, &mut outcome)
			.await?;
		Ok(outcome)
	}

	/// Run a workflow under the status slot
	async fn track<T, F>(&self, action: Action, workflow: F) -> Result<T, WorkflowError>
	where
		F: Future<Output = Result<T, WorkflowError>>,
	{
		self.status.begin(action);
		let result = workflow.await;
		match &result {
			Ok(_) => self.status.succeed(action),
			Err(e) => self.status.fail(action, e),
		}
		result
	}

	/// Estimate, sign, submit and await one write
	async fn execute(
		&self,
		signer: &Signer,
		call: WriteCall,
		outcome: &mut WorkflowOutcome,
	) -> Result<Receipt, WorkflowError> {
		let options = self
			.fees
			.options_for(self.ledger.as_ref(), &call, signer.address())
			.await;
		outcome.gas_limit = Some(options.gas_limit);

		let method = call.method();
		let write = signer.sign_write(call, options)?;
		let tx_hash = self.ledger.submit(&write).await?;
		info!(
			target: "engine",
			method,
			tx_hash = %tx_hash,
			gas_limit = options.gas_limit,
			"Write submitted, awaiting confirmation"
		);
		outcome.tx_hash = Some(tx_hash.clone());

		let receipt = self.ledger.wait_for_receipt(&tx_hash).await?;
		info!(target: "engine", method, tx_hash = %tx_hash, gas_used = ?receipt.gas_used, "Write confirmed");
		Ok(receipt)
	}

	/// Id of a freshly created match
	///
	/// Prefers the id on the receipt; otherwise reads the counter, which
	/// assumes no other match was created in between.
	async fn created_match_id(&self, receipt: &Receipt) -> Result<MatchId, WorkflowError> {
		if let Some(id) = receipt.created_match_id {
			return Ok(id);
		}

		let count = self.ledger.total_matches().await.map_err(|e| {
			WorkflowError::Transport(format!("match created but its id could not be read: {}", e))
		})?;
		warn!(
			target: "engine",
			tx_hash = %receipt.tx_hash,
			count,
			"Receipt carried no match id, deriving it from the match counter"
		);
		count.checked_sub(1).ok_or_else(|| {
			WorkflowError::Transport("match counter is zero after a confirmed create".to_string())
		})
	}

	/// Refresh after a confirmed write; a failure is recorded, not returned
	async fn refresh_after(&self, outcome: &mut WorkflowOutcome) {
		match self.store.refresh(self.ledger.as_ref()).await {
			Ok(report) => outcome.refresh = Some(report),
			Err(e) => {
				warn!(
					target: "engine",
					action = %outcome.action,
					error = %e,
					"Refresh after confirmed write failed"
				);
				outcome.refresh_error = Some(e);
			}
		}
	}

	fn signer(&self) -> Result<Arc<Signer>, WorkflowError> {
		self.session_read()
			.signer
			.clone()
			.ok_or(WorkflowError::NotConnected)
	}

	fn session_read(&self) -> RwLockReadGuard<'_, Session> {
		self.session
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn session_write(&self) -> RwLockWriteGuard<'_, Session> {
		self.session
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

fn no_selection() -> WorkflowError {
	WorkflowError::Validation("No match selected".to_string())
}

#[cfg(test)]
mod tests {
	use parlay_sdk::SignatureAlgorithm;

	use super::*;
	use crate::{ledger::MemoryLedger, status::Status};

	fn form() -> CreateMatchForm {
		CreateMatchForm {
			home_team: " Lakers ".to_string(),
			away_team: "Warriors".to_string(),
			game_date: "2099-01-15".to_string(),
			deadline: "2099-01-15T19:30".to_string(),
			over_under_line: "220".to_string(),
		}
	}

	fn engine() -> LifecycleEngine {
		LifecycleEngine::new(Arc::new(MemoryLedger::new()), &EngineConfig::default())
	}

	#[test]
	fn test_parse_deadline_formats() {
		assert_eq!(parse_deadline("1700000000").unwrap(), 1_700_000_000);
		assert_eq!(parse_deadline("2023-11-14T22:13:20Z").unwrap(), 1_700_000_000);
		assert_eq!(parse_deadline("2023-11-14T23:13:20+01:00").unwrap(), 1_700_000_000);
		assert_eq!(parse_deadline("2023-11-14T22:13").unwrap(), 1_699_999_980);
		assert_eq!(parse_deadline("2023-11-14 22:13:20").unwrap(), 1_700_000_000);
		assert_eq!(parse_deadline("1970-01-02").unwrap(), 86_400);
	}

	#[test]
	fn test_parse_deadline_rejects_garbage() {
		assert!(matches!(parse_deadline(""), Err(WorkflowError::Validation(_))));
		assert!(matches!(parse_deadline("tomorrow"), Err(WorkflowError::Validation(_))));
		assert!(matches!(
			parse_deadline("1960-01-01T00:00"),
			Err(WorkflowError::Validation(_))
		));
	}

	#[test]
	fn test_form_validation() {
		let call = form().to_call().unwrap();
		match call {
			WriteCall::CreateMatch {
				home_team,
				over_under_line,
				..
			} => {
				assert_eq!(home_team, "Lakers");
				assert_eq!(over_under_line, 220);
			}
			other => panic!("unexpected call {:?}", other),
		}

		let mut blank = form();
		blank.away_team = "   ".to_string();
		assert!(matches!(blank.to_call(), Err(WorkflowError::Validation(_))));

		let mut bad_line = form();
		bad_line.over_under_line = "two-twenty".to_string();
		assert!(matches!(bad_line.to_call(), Err(WorkflowError::Validation(_))));
	}

	#[test]
	fn test_ledger_error_mapping() {
		assert_eq!(
			WorkflowError::from(LedgerError::Rejected("Match not open".to_string())),
			WorkflowError::Rejected("Match not open".to_string())
		);
		assert!(matches!(
			WorkflowError::from(LedgerError::InvalidResponse("x".to_string())),
			WorkflowError::Transport(_)
		));
	}

	#[tokio::test]
	async fn test_writes_require_connection() {
		let engine = engine();
		engine.select_bet_match(0);
		engine.select_settle_match(0);

		assert_eq!(
			engine.create_match(&form()).await,
			Err(WorkflowError::NotConnected)
		);
		assert_eq!(engine.place_bet(0, "0.01").await, Err(WorkflowError::NotConnected));
		assert_eq!(engine.close_match().await, Err(WorkflowError::NotConnected));
		assert_eq!(engine.claim().await, Err(WorkflowError::NotConnected));
		assert_eq!(
			engine.status().current().to_string(),
			"Claim failed: wallet not connected"
		);
	}

	#[tokio::test]
	async fn test_bet_input_shape_checked_before_ledger() {
		let engine = engine();
		engine
			.connect(Signer::generate(SignatureAlgorithm::Ecdsa))
			.await
			.unwrap();

		assert_eq!(
			engine.place_bet(0, "0.01").await,
			Err(WorkflowError::Validation("No match selected".to_string()))
		);

		engine.select_bet_match(0);
		assert!(matches!(
			engine.place_bet(3, "0.01").await,
			Err(WorkflowError::Validation(_))
		));
		assert!(matches!(
			engine.place_bet(1, "abc").await,
			Err(WorkflowError::Validation(_))
		));
		assert!(matches!(
			engine.place_bet(1, "0").await,
			Err(WorkflowError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_connect_and_disconnect() {
		let engine = engine();
		let signer = Signer::generate(SignatureAlgorithm::Ed25519);
		let address = signer.address().clone();

		let outcome = engine.connect(signer).await.unwrap();
		assert_eq!(outcome.refresh.map(|r| r.total), Some(0));
		assert_eq!(engine.account(), Some(address));
		assert_eq!(engine.status().current(), Status::Succeeded(Action::Connect));

		engine.disconnect();
		assert_eq!(engine.account(), None);
		assert_eq!(engine.status().current(), Status::Idle);
	}
}
