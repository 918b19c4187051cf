//! Integration tests for store synchronization
//!
//! These tests verify:
//! - Partial read failures exclude only the failing ids
//! - A failed match count leaves the previous snapshot in place
//! - State regressions reported by the ledger are not applied
//! - Pool accounting holds after every refresh
//! - Overlapping refreshes never move a match back to an earlier state
//! - Implausible match counts are refused

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{FlakyLedger, connected_engine, create_matches};
use parlay_engine::{
	Action, EngineConfig, LedgerError, LedgerGateway, LifecycleEngine, MatchStore, Receipt,
	Status, WorkflowError, config::MAX_TRACKED_MATCHES,
};
use parlay_sdk::{
	Address, FeeData, Match, MatchId, MatchState, Outcome, SignedWrite, TxHash, WriteCall,
};
use tokio::sync::oneshot;

/// Holds the first read of match 0 until released
///
/// The match is read before the pause, so the caller sees the state from
/// before anything that happens while it is held.
struct GatedLedger {
	inner: Arc<FlakyLedger>,
	gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl GatedLedger {
	/// Returns the ledger, a receiver fired when the read is held, and the release sender
	fn new(inner: Arc<FlakyLedger>) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
		let (held_tx, held_rx) = oneshot::channel();
		let (release_tx, release_rx) = oneshot::channel();
		let ledger = Self {
			inner,
			gate: Mutex::new(Some((held_tx, release_rx))),
		};
		(ledger, held_rx, release_tx)
	}
}

#[async_trait]
impl LedgerGateway for GatedLedger {
	async fn total_matches(&self) -> Result<u64, LedgerError> {
		self.inner.total_matches().await
	}

	async fn match_info(&self, match_id: MatchId) -> Result<Match, LedgerError> {
		let m = self.inner.match_info(match_id).await?;
		let gate = if match_id == 0 {
			self.gate.lock().unwrap().take()
		} else {
			None
		};
		if let Some((held, release)) = gate {
			held.send(()).unwrap();
			release.await.unwrap();
		}
		Ok(m)
	}

	async fn user_matches(&self, account: &Address) -> Result<Vec<MatchId>, LedgerError> {
		self.inner.user_matches(account).await
	}

	async fn fee_data(&self) -> Result<FeeData, LedgerError> {
		self.inner.fee_data().await
	}

	async fn estimate_gas(&self, call: &WriteCall, from: &Address) -> Result<u64, LedgerError> {
		self.inner.estimate_gas(call, from).await
	}

	async fn submit(&self, write: &SignedWrite) -> Result<TxHash, LedgerError> {
		self.inner.submit(write).await
	}

	async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
		self.inner.wait_for_receipt(tx_hash).await
	}
}

#[tokio::test]
async fn test_single_failed_read_is_excluded() {
	let (ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 3).await;
	ledger.fail_read(1);

	let report = engine.refresh().await.unwrap();

	assert_eq!(report.total, 3);
	assert_eq!(report.loaded, 2);
	assert_eq!(report.failed.len(), 1);
	assert_eq!(report.failed[0].0, 1);
	assert!(matches!(report.failed[0].1, LedgerError::Transport(_)));

	let ids: Vec<u64> = engine.matches().iter().map(|m| m.id).collect();
	assert_eq!(ids, vec![0, 2]);
	assert_eq!(engine.status().current(), Status::Succeeded(Action::Refresh));

	ledger.clear_read_failures();
	let report = engine.refresh().await.unwrap();
	assert!(report.is_complete());
	assert_eq!(engine.matches().len(), 3);
}

#[tokio::test]
async fn test_count_failure_keeps_previous_snapshot() {
	let (ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 2).await;
	let before = engine.matches();
	ledger.fail_total_matches(true);

	let err = engine.refresh().await.unwrap_err();

	assert!(matches!(err, WorkflowError::Transport(_)));
	assert!(Arc::ptr_eq(&before, &engine.matches()));
	assert!(engine.status().current().is_failure());
}

#[tokio::test]
async fn test_state_regression_keeps_prior_entry() {
	let (ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 2).await;
	engine.select_settle_match(0);
	engine.close_match().await.unwrap();
	assert_eq!(engine.get_match(0).unwrap().state, MatchState::Closed);

	ledger.override_state(0, MatchState::Open);
	let report = engine.refresh().await.unwrap();

	assert_eq!(report.regressed, vec![0]);
	assert_eq!(report.loaded, 2);
	assert_eq!(engine.get_match(0).unwrap().state, MatchState::Closed);
	assert_eq!(engine.get_match(1).unwrap().state, MatchState::Open);
}

#[tokio::test]
async fn test_pools_balanced_after_every_refresh() {
	let (_ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 2).await;

	let bets = [(0, 0, "0.5"), (0, 2, "0.01"), (1, 1, "2"), (0, 1, "0.125")];
	for (match_id, outcome, stake) in bets {
		engine.select_bet_match(match_id);
		let result = engine.place_bet(outcome, stake).await.unwrap();
		assert!(result.refresh.is_some());
		assert!(engine.matches().iter().all(|m| m.pools_balanced()));
	}

	let m = engine.get_match(0).unwrap();
	assert_eq!(m.pool(Outcome::Away).to_string(), "0.125 ETH");
	assert_eq!(m.total_pool.to_string(), "0.635 ETH");
}

#[tokio::test]
async fn test_unknown_ids_are_not_fetched() {
	let ledger = Arc::new(FlakyLedger::new());
	let store = MatchStore::new();

	let report = store.refresh(ledger.as_ref()).await.unwrap();

	assert_eq!(report.total, 0);
	assert!(store.is_empty());
}

#[tokio::test]
async fn test_snapshots_are_immutable_views() {
	let (_ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 1).await;
	let old = engine.matches();

	create_matches(&engine, 1).await;

	assert_eq!(old.len(), 1);
	assert_eq!(engine.matches().len(), 2);
}

#[tokio::test]
async fn test_my_matches_lists_bet_matches() {
	let (_ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 3).await;
	assert!(engine.my_matches().await.unwrap().is_empty());

	engine.select_bet_match(1);
	engine.place_bet(0, "0.01").await.unwrap();

	let mine: Vec<u64> = engine
		.my_matches()
		.await
		.unwrap()
		.iter()
		.map(|m| m.id)
		.collect();
	assert_eq!(mine, vec![1]);
}

#[tokio::test]
async fn test_refresh_without_account() {
	let ledger = Arc::new(FlakyLedger::new());
	let engine = LifecycleEngine::new(ledger.clone(), &EngineConfig::default());

	let report = engine.refresh().await.unwrap();
	assert_eq!(report.total, 0);
	assert_eq!(engine.my_matches().await, Err(WorkflowError::NotConnected));
}

#[tokio::test]
async fn test_late_refresh_does_not_regress_state() {
	let (ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 2).await;
	engine.select_settle_match(0);

	let (gated, held, release) = GatedLedger::new(ledger.clone());
	let store = MatchStore::new();

	let slow = store.refresh(&gated);
	let interleaved = async {
		held.await.unwrap();
		engine.close_match().await.unwrap();
		store.refresh(ledger.as_ref()).await.unwrap();
		assert_eq!(store.get(0).unwrap().state, MatchState::Closed);
		release.send(()).unwrap();
	};
	let (report, ()) = tokio::join!(slow, interleaved);
	let report = report.unwrap();

	assert_eq!(report.regressed, vec![0]);
	assert_eq!(store.get(0).unwrap().state, MatchState::Closed);
	assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_implausible_count_is_refused() {
	let (ledger, engine, _) = connected_engine().await;
	create_matches(&engine, 1).await;
	let before = engine.matches();

	for total in [u64::MAX, MAX_TRACKED_MATCHES + 1] {
		ledger.report_total(total);
		let err = engine.refresh().await.unwrap_err();
		assert!(matches!(err, WorkflowError::Transport(msg) if msg.contains("invalid ledger response")));
		assert!(Arc::ptr_eq(&before, &engine.matches()));
	}

	ledger.report_total(0);
	assert_eq!(engine.refresh().await.unwrap().loaded, 1);
}
