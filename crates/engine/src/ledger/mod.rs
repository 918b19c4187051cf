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

//! Ledger Gateway - typed boundary to the external ledger
//!
//! The ledger is the system of record for matches, pools and settlement.
//! The engine talks to it only through [`LedgerGateway`]:
//! - Reads return fully validated values (`Match`, counts, id lists)
//! - Writes are split into `submit` and `wait_for_receipt`, two separate
//!   suspension points; a write is only considered applied once a
//!   confirmed [`Receipt`] comes back
//!
//! Implementations:
//! - [`HttpLedgerGateway`]: a ledger node reached over its JSON API
//! - [`MemoryLedger`]: in-process ledger for tests and demo mode

mod http;
mod memory;

use async_trait::async_trait;
use parlay_sdk::{
	Address, ClientError, FeeData, Match, MatchId, SignedWrite, TransactionReceipt,
	TransactionStatus, TxHash, WriteCall,
};
use thiserror::Error;

pub use http::HttpLedgerGateway;
pub use memory::{
	CLAIM_GAS, CLOSE_MATCH_GAS, CREATE_MATCH_GAS, MemoryLedger, PLACE_BET_GAS, SETTLE_MATCH_GAS,
};

/// Error types for ledger operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Rejected by ledger: {0}")]
	Rejected(String),
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Invalid ledger response: {0}")]
	InvalidResponse(String),
}

impl From<ClientError> for LedgerError {
	fn from(e: ClientError) -> Self {
		match e {
			ClientError::NotFound(msg) => LedgerError::NotFound(msg),
			ClientError::Rejected(msg) => LedgerError::Rejected(msg),
			ClientError::Network(msg) | ClientError::Server(msg) => LedgerError::Transport(msg),
			ClientError::Serialization(msg) => LedgerError::InvalidResponse(msg),
		}
	}
}

/// Confirmed result of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	pub tx_hash: TxHash,
	/// Identifier assigned by `createMatch`, when the ledger reports it
	pub created_match_id: Option<MatchId>,
	pub gas_used: Option<u64>,
}

/// Interpret a raw receipt
///
/// Returns `None` while the transaction is still pending. A failed
/// transaction is a ledger refusal and carries the revert reason.
pub fn settle_receipt(receipt: TransactionReceipt) -> Option<Result<Receipt, LedgerError>> {
	match receipt.status {
		TransactionStatus::Pending => None,
		TransactionStatus::Confirmed => Some(Ok(Receipt {
			tx_hash: receipt.tx_hash,
			created_match_id: receipt.created_match_id,
			gas_used: receipt.gas_used,
		})),
		TransactionStatus::Failed => Some(Err(LedgerError::Rejected(
			receipt
				.error
				.unwrap_or_else(|| "transaction reverted".to_string()),
		))),
	}
}

/// Typed request/response boundary to the external ledger
///
/// No operation may partially apply: a write either yields a confirmed
/// receipt or fails with `Rejected` / `Transport`. Timeouts are the
/// implementation's responsibility.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
	/// Number of matches created so far (`matchCounter`)
	async fn total_matches(&self) -> Result<u64, LedgerError>;

	/// Snapshot of one match
	async fn match_info(&self, match_id: MatchId) -> Result<Match, LedgerError>;

	/// Ids of the matches an account has bet on
	async fn user_matches(&self, account: &Address) -> Result<Vec<MatchId>, LedgerError>;

	/// Current fee market data
	async fn fee_data(&self) -> Result<FeeData, LedgerError>;

	/// Gas estimate for a pending write
	async fn estimate_gas(&self, call: &WriteCall, from: &Address) -> Result<u64, LedgerError>;

	/// Submit a signed write; returns once the ledger has accepted it for processing
	async fn submit(&self, write: &SignedWrite) -> Result<TxHash, LedgerError>;

	/// Wait until a submitted write is final
	async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn receipt(status: TransactionStatus, error: Option<&str>) -> TransactionReceipt {
		TransactionReceipt {
			tx_hash: TxHash("0xabc".to_string()),
			status,
			created_match_id: Some(7),
			gas_used: Some(21_000),
			error: error.map(str::to_string),
		}
	}

	#[test]
	fn test_settle_receipt() {
		assert!(settle_receipt(receipt(TransactionStatus::Pending, None)).is_none());

		let confirmed = settle_receipt(receipt(TransactionStatus::Confirmed, None))
			.unwrap()
			.unwrap();
		assert_eq!(confirmed.created_match_id, Some(7));

		let failed = settle_receipt(receipt(TransactionStatus::Failed, Some("Match not open")));
		assert_eq!(
			failed,
			Some(Err(LedgerError::Rejected("Match not open".to_string())))
		);

		let reverted = settle_receipt(receipt(TransactionStatus::Failed, None));
		assert_eq!(
			reverted,
			Some(Err(LedgerError::Rejected("transaction reverted".to_string())))
		);
	}

	#[test]
	fn test_client_error_mapping() {
		assert_eq!(
			LedgerError::from(ClientError::Network("refused".to_string())),
			LedgerError::Transport("refused".to_string())
		);
		assert_eq!(
			LedgerError::from(ClientError::Rejected("deadline passed".to_string())),
			LedgerError::Rejected("deadline passed".to_string())
		);
		assert_eq!(
			LedgerError::from(ClientError::NotFound("match 9".to_string())),
			LedgerError::NotFound("match 9".to_string())
		);
		assert!(matches!(
			LedgerError::from(ClientError::Serialization("bad json".to_string())),
			LedgerError::InvalidResponse(_)
		));
	}
}
