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

//! Fee Estimator
//!
//! Produces the [`TxOptions`] attached to every write. Estimation is
//! best-effort: a failed gas estimate falls back to the configured default
//! budget and a failed fee-data read leaves the fee caps unset. Neither
//! failure reaches the caller.

use parlay_sdk::{Address, TxOptions, WriteCall};
use tracing::{debug, warn};

use crate::{config::DEFAULT_GAS_LIMIT, ledger::LedgerGateway};

#[derive(Debug, Clone, Copy)]
pub struct FeeEstimator {
	default_gas_limit: u64,
}

impl FeeEstimator {
	pub fn new(default_gas_limit: u64) -> Self {
		Self { default_gas_limit }
	}

	pub fn default_gas_limit(&self) -> u64 {
		self.default_gas_limit
	}

	/// Gas budget and fee caps for `call` sent by `from`
	pub async fn options_for(
		&self,
		ledger: &dyn LedgerGateway,
		call: &WriteCall,
		from: &Address,
	) -> TxOptions {
		let gas_limit = match ledger.estimate_gas(call, from).await {
			Ok(gas) => {
				debug!(target: "engine::fees", method = call.method(), gas, "Gas estimated");
				gas
			}
			Err(e) => {
				warn!(
					target: "engine::fees",
					method = call.method(),
					error = %e,
					default = self.default_gas_limit,
					"Gas estimation failed, using default budget"
				);
				self.default_gas_limit
			}
		};

		let mut options = TxOptions::with_gas_limit(gas_limit);
		match ledger.fee_data().await {
			Ok(fees) => {
				options.max_fee_per_gas = fees.max_fee_per_gas;
				options.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
			}
			Err(e) => {
				debug!(target: "engine::fees", error = %e, "Fee data unavailable");
			}
		}
		options
	}
}

impl Default for FeeEstimator {
	fn default() -> Self {
		Self::new(DEFAULT_GAS_LIMIT)
	}
}

#[cfg(test)]
mod tests {
	use async_trait::async_trait;
	use parlay_sdk::{FeeData, Match, MatchId, SignedWrite, TxHash};

	use super::*;
	use crate::ledger::{LedgerError, MemoryLedger, Receipt};

	/// Ledger whose every call fails
	struct DownLedger;

	#[async_trait]
	impl LedgerGateway for DownLedger {
		async fn total_matches(&self) -> Result<u64, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn match_info(&self, _: MatchId) -> Result<Match, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn user_matches(&self, _: &Address) -> Result<Vec<MatchId>, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn fee_data(&self) -> Result<FeeData, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn estimate_gas(&self, _: &WriteCall, _: &Address) -> Result<u64, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn submit(&self, _: &SignedWrite) -> Result<TxHash, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
		async fn wait_for_receipt(&self, _: &TxHash) -> Result<Receipt, LedgerError> {
			Err(LedgerError::Transport("down".to_string()))
		}
	}

	fn sender() -> Address {
		Address::parse("0x00000000000000000000000000000000000000aa").unwrap()
	}

	#[tokio::test]
	async fn test_estimate_used_when_available() {
		let ledger = MemoryLedger::new();
		let call = WriteCall::CreateMatch {
			home_team: "Lakers".to_string(),
			away_team: "Warriors".to_string(),
			game_date: "2099-01-01".to_string(),
			deadline: u64::MAX,
			over_under_line: 220,
		};

		let options = FeeEstimator::default()
			.options_for(&ledger, &call, &sender())
			.await;
		assert_eq!(options.gas_limit, crate::ledger::CREATE_MATCH_GAS);
		assert_eq!(options.max_fee_per_gas, Some(30_000_000_000));
		assert_eq!(options.max_priority_fee_per_gas, Some(1_500_000_000));
	}

	#[tokio::test]
	async fn test_failed_estimate_falls_back_to_default() {
		let ledger = MemoryLedger::new().with_fee_data(FeeData::default());
		let call = WriteCall::Claim { match_id: 3 };

		let options = FeeEstimator::new(123_456)
			.options_for(&ledger, &call, &sender())
			.await;
		assert_eq!(options.gas_limit, 123_456);
		assert_eq!(options.max_fee_per_gas, None);
	}

	#[tokio::test]
	async fn test_unreachable_ledger_never_fails_estimation() {
		let estimator = FeeEstimator::default();
		let options = estimator
			.options_for(&DownLedger, &WriteCall::CloseMatch { match_id: 0 }, &sender())
			.await;
		assert_eq!(options.gas_limit, DEFAULT_GAS_LIMIT);
		assert_eq!(options.max_fee_per_gas, None);
		assert_eq!(options.max_priority_fee_per_gas, None);
	}
}
