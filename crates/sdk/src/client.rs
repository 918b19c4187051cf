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

use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{
	Address, ErrorResponse, EstimateGasRequest, EstimateGasResponse, FeeData, MatchCountResponse,
	MatchId, MatchInfo, SignedWrite, SubmitTransactionResponse, TransactionReceipt, TxHash,
	UserMatchesResponse,
};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("Server error: {0}")]
	Server(String),
}

/// Client for a ledger node's JSON API
///
/// All paths live under `{base_url}/api/v1`. Reads map 404 to
/// [`ClientError::NotFound`]; 4xx answers to writes carry the ledger's
/// refusal reason and map to [`ClientError::Rejected`].
#[derive(Clone)]
pub struct Client {
	base_url: String,
	client: ReqwestClient,
}

impl Client {
	/// Create a new client with the default timeout
	pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
		Self::with_config(base_url, DEFAULT_TIMEOUT)
	}

	/// Create a new client with custom configuration
	pub fn with_config(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			client,
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn url(&self, path: &str) -> String {
		format!("{}/api/v1{}", self.base_url, path)
	}

	/// Number of matches created so far (`matchCounter`)
	pub async fn total_matches(&self) -> Result<u64, ClientError> {
		let response = self.get(&self.url("/matches/count")).await?;
		let body: MatchCountResponse = read_json(response).await?;
		Ok(body.count)
	}

	/// Raw record for one match
	pub async fn match_info(&self, match_id: MatchId) -> Result<MatchInfo, ClientError> {
		let response = self.get(&self.url(&format!("/matches/{}", match_id))).await?;
		read_json(response).await
	}

	/// Ids of the matches an account has bet on
	pub async fn user_matches(&self, address: &Address) -> Result<Vec<MatchId>, ClientError> {
		let response = self
			.get(&self.url(&format!("/accounts/{}/matches", address)))
			.await?;
		let body: UserMatchesResponse = read_json(response).await?;
		Ok(body.match_ids)
	}

	/// Current fee market data
	pub async fn fee_data(&self) -> Result<FeeData, ClientError> {
		let response = self.get(&self.url("/fees")).await?;
		read_json(response).await
	}

	/// Gas estimate for a pending write
	pub async fn estimate_gas(&self, request: &EstimateGasRequest) -> Result<u64, ClientError> {
		let response = self
			.client
			.post(self.url("/estimate"))
			.json(request)
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;
		let body: EstimateGasResponse = read_json(response).await?;
		Ok(body.gas)
	}

	/// Submit a signed write; returns the transaction hash
	pub async fn submit_transaction(&self, write: &SignedWrite) -> Result<TxHash, ClientError> {
		let response = self
			.client
			.post(self.url("/transactions"))
			.json(write)
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;
		let body: SubmitTransactionResponse = read_json(response).await?;
		Ok(body.tx_hash)
	}

	/// Current receipt for a submitted transaction
	pub async fn transaction_receipt(
		&self,
		tx_hash: &TxHash,
	) -> Result<TransactionReceipt, ClientError> {
		let response = self
			.get(&self.url(&format!("/transactions/{}", tx_hash)))
			.await?;
		read_json(response).await
	}

	/// Check ledger node health
	pub async fn health_check(&self) -> Result<bool, ClientError> {
		let response = self.get(&format!("{}/health", self.base_url)).await?;
		Ok(response.status().is_success())
	}

	async fn get(&self, url: &str) -> Result<Response, ClientError> {
		self.client
			.get(url)
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))
	}
}

/// Decode a success body or map the failure status to a [`ClientError`]
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
	let status = response.status();
	if !status.is_success() {
		let error_text = response
			.text()
			.await
			.unwrap_or_else(|_| format!("HTTP {}", status));
		return Err(error_for_status(status, &error_text));
	}

	response
		.json()
		.await
		.map_err(|e| ClientError::Serialization(format!("Failed to parse response: {}", e)))
}

fn error_for_status(status: StatusCode, body: &str) -> ClientError {
	let reason = serde_json::from_str::<ErrorResponse>(body)
		.map(|e| e.error)
		.unwrap_or_else(|_| body.to_string());

	if status == StatusCode::NOT_FOUND {
		ClientError::NotFound(reason)
	} else if status.is_client_error() {
		ClientError::Rejected(reason)
	} else {
		ClientError::Server(format!("{}: {}", status, reason))
	}
}
