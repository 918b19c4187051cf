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

use std::time::Duration;

use async_trait::async_trait;
use parlay_sdk::{
	Address, Client, ClientError, EstimateGasRequest, FeeData, Match, MatchId, SignedWrite, TxHash,
	WriteCall,
};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::{LedgerError, LedgerGateway, Receipt, settle_receipt};
use crate::config::EngineConfig;

/// Ledger node reached over its JSON API
pub struct HttpLedgerGateway {
	client: Client,
	poll_interval: Duration,
	confirmation_timeout: Duration,
}

impl HttpLedgerGateway {
	pub fn new(config: &EngineConfig) -> Result<Self, LedgerError> {
		let client = Client::with_config(&config.ledger_url, config.request_timeout())?;
		Ok(Self {
			client,
			poll_interval: config.confirmation_poll_interval(),
			confirmation_timeout: config.confirmation_timeout(),
		})
	}

	pub fn base_url(&self) -> &str {
		self.client.base_url()
	}
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
	async fn total_matches(&self) -> Result<u64, LedgerError> {
		Ok(self.client.total_matches().await?)
	}

	async fn match_info(&self, match_id: MatchId) -> Result<Match, LedgerError> {
		let info = self.client.match_info(match_id).await?;
		Match::from_info(match_id, info)
			.map_err(|e| LedgerError::InvalidResponse(format!("match {}: {}", match_id, e)))
	}

	async fn user_matches(&self, account: &Address) -> Result<Vec<MatchId>, LedgerError> {
		Ok(self.client.user_matches(account).await?)
	}

	async fn fee_data(&self) -> Result<FeeData, LedgerError> {
		Ok(self.client.fee_data().await?)
	}

	async fn estimate_gas(&self, call: &WriteCall, from: &Address) -> Result<u64, LedgerError> {
		let request = EstimateGasRequest {
			from: from.clone(),
			call: call.clone(),
		};
		Ok(self.client.estimate_gas(&request).await?)
	}

	async fn submit(&self, write: &SignedWrite) -> Result<TxHash, LedgerError> {
		let tx_hash = self.client.submit_transaction(write).await?;
		debug!(
			target: "ledger",
			tx_hash = %tx_hash,
			method = write.call.method(),
			gas_limit = write.options.gas_limit,
			"Transaction submitted"
		);
		Ok(tx_hash)
	}

	async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
		let deadline = Instant::now() + self.confirmation_timeout;

		loop {
			match self.client.transaction_receipt(tx_hash).await {
				Ok(receipt) => {
					if let Some(outcome) = settle_receipt(receipt) {
						return outcome;
					}
				}
				// The node may not have indexed the hash yet
				Err(ClientError::NotFound(_)) => {}
				Err(e) => return Err(e.into()),
			}

			if Instant::now() >= deadline {
				warn!(target: "ledger", tx_hash = %tx_hash, "Confirmation timed out");
				return Err(LedgerError::Transport(format!(
					"transaction {} not confirmed within {}s",
					tx_hash,
					self.confirmation_timeout.as_secs()
				)));
			}
			sleep(self.poll_interval).await;
		}
	}
}
