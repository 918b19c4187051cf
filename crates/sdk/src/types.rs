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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger-assigned match identifier (dense, starting at 0)
pub type MatchId = u64;

/// Number of decimal places in one ether
pub const ETHER_DECIMALS: u32 = 18;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Error types for amount parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Amount is empty")]
	Empty,
	#[error("Invalid amount: {0}")]
	Invalid(String),
	#[error("Too many decimal places: {0}")]
	TooPrecise(String),
	#[error("Amount overflows: {0}")]
	Overflow(String),
}

/// Error types for converting raw ledger responses into typed values
#[derive(Debug, Error)]
pub enum ConversionError {
	#[error("Unknown match state code: {0}")]
	UnknownState(u8),
	#[error("Invalid {field}: {source}")]
	InvalidAmount {
		field: &'static str,
		source: AmountError,
	},
	#[error("Pool mismatch: total {total} != sum of outcome pools {sum}")]
	PoolMismatch { total: Amount, sum: Amount },
}

/// Match life-cycle state
///
/// Transitions are one-directional: Open -> Closed -> Settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MatchState {
	Open,
	Closed,
	Settled,
}

impl MatchState {
	pub fn from_code(code: u8) -> Option<Self> {
		match code {
			0 => Some(MatchState::Open),
			1 => Some(MatchState::Closed),
			2 => Some(MatchState::Settled),
			_ => None,
		}
	}

	pub fn code(self) -> u8 {
		match self {
			MatchState::Open => 0,
			MatchState::Closed => 1,
			MatchState::Settled => 2,
		}
	}

	/// Whether the ledger allows moving from `self` to `next`
	pub fn can_transition_to(self, next: MatchState) -> bool {
		matches!(
			(self, next),
			(MatchState::Open, MatchState::Closed) | (MatchState::Closed, MatchState::Settled)
		)
	}
}

impl TryFrom<u8> for MatchState {
	type Error = ConversionError;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		MatchState::from_code(code).ok_or(ConversionError::UnknownState(code))
	}
}

impl From<MatchState> for u8 {
	fn from(state: MatchState) -> Self {
		state.code()
	}
}

impl fmt::Display for MatchState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			MatchState::Open => "Open",
			MatchState::Closed => "Closed",
			MatchState::Settled => "Settled",
		};
		f.write_str(name)
	}
}

/// Bet outcome, also used as the settlement result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Outcome {
	Home,
	Away,
	OverUnder,
}

impl Outcome {
	pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Away, Outcome::OverUnder];

	pub fn from_code(code: u8) -> Option<Self> {
		match code {
			0 => Some(Outcome::Home),
			1 => Some(Outcome::Away),
			2 => Some(Outcome::OverUnder),
			_ => None,
		}
	}

	pub fn code(self) -> u8 {
		match self {
			Outcome::Home => 0,
			Outcome::Away => 1,
			Outcome::OverUnder => 2,
		}
	}

	pub fn index(self) -> usize {
		self.code() as usize
	}
}

impl TryFrom<u8> for Outcome {
	type Error = String;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		Outcome::from_code(code).ok_or_else(|| format!("unknown outcome code {}", code))
	}
}

impl From<Outcome> for u8 {
	fn from(outcome: Outcome) -> Self {
		outcome.code()
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Outcome::Home => "Home Win",
			Outcome::Away => "Away Win",
			Outcome::OverUnder => "Over/Under",
		};
		f.write_str(name)
	}
}

/// Stake amount in wei
///
/// Serialized as a decimal wei string so that values above 2^53 survive JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

impl Amount {
	pub const ZERO: Amount = Amount(0);

	pub fn from_wei(wei: u128) -> Self {
		Self(wei)
	}

	pub fn wei(self) -> u128 {
		self.0
	}

	pub fn is_zero(self) -> bool {
		self.0 == 0
	}

	pub fn checked_add(self, other: Amount) -> Option<Amount> {
		self.0.checked_add(other.0).map(Amount)
	}

	/// Parse a human-entered ether amount such as `"0.01"`
	pub fn parse_ether(input: &str) -> Result<Self, AmountError> {
		let input = input.trim();
		if input.is_empty() {
			return Err(AmountError::Empty);
		}

		let (whole, fraction) = match input.split_once('.') {
			Some((whole, fraction)) => (whole, fraction),
			None => (input, ""),
		};
		if whole.is_empty() && fraction.is_empty() {
			return Err(AmountError::Invalid(input.to_string()));
		}
		if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
		{
			return Err(AmountError::Invalid(input.to_string()));
		}
		if fraction.len() > ETHER_DECIMALS as usize {
			return Err(AmountError::TooPrecise(input.to_string()));
		}

		let whole: u128 = if whole.is_empty() {
			0
		} else {
			whole
				.parse()
				.map_err(|_| AmountError::Overflow(input.to_string()))?
		};
		let fraction_wei: u128 = if fraction.is_empty() {
			0
		} else {
			let scale = 10u128.pow(ETHER_DECIMALS - fraction.len() as u32);
			fraction
				.parse::<u128>()
				.map_err(|_| AmountError::Invalid(input.to_string()))?
				* scale
		};

		whole
			.checked_mul(WEI_PER_ETHER)
			.and_then(|w| w.checked_add(fraction_wei))
			.map(Amount)
			.ok_or_else(|| AmountError::Overflow(input.to_string()))
	}

	/// Format as ether, keeping at least one fractional digit (`1.0`, `0.01`)
	pub fn format_ether(self) -> String {
		let whole = self.0 / WEI_PER_ETHER;
		let fraction = self.0 % WEI_PER_ETHER;
		let digits = format!("{:018}", fraction);
		let trimmed = digits.trim_end_matches('0');
		if trimmed.is_empty() {
			format!("{}.0", whole)
		} else {
			format!("{}.{}", whole, trimmed)
		}
	}
}

impl FromStr for Amount {
	type Err = AmountError;

	/// Parse a decimal wei string
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(AmountError::Empty);
		}
		if !s.chars().all(|c| c.is_ascii_digit()) {
			return Err(AmountError::Invalid(s.to_string()));
		}
		s.parse::<u128>()
			.map(Amount)
			.map_err(|_| AmountError::Overflow(s.to_string()))
	}
}

impl TryFrom<String> for Amount {
	type Error = AmountError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Amount> for String {
	fn from(amount: Amount) -> Self {
		amount.0.to_string()
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ETH", self.format_ether())
	}
}

/// Hex account address (`0x` + 40 lowercase hex digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
	pub fn parse(input: &str) -> Result<Self, String> {
		let body = input
			.strip_prefix("0x")
			.or_else(|| input.strip_prefix("0X"))
			.unwrap_or(input);
		if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(format!("invalid address: {}", input));
		}
		Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
	}

	pub fn from_bytes(bytes: [u8; 20]) -> Self {
		Self(format!("0x{}", hex::encode(bytes)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Abbreviated form for display, e.g. `0x1234...abcd`
	pub fn short(&self) -> String {
		format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
	}
}

impl TryFrom<String> for Address {
	type Error = String;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Address::parse(&value)
	}
}

impl From<Address> for String {
	fn from(address: Address) -> Self {
		address.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Transaction hash returned by the ledger on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Raw match record as returned by the ledger's `matchInfo` read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
	pub home_team: String,
	pub away_team: String,
	pub game_date: String,
	pub deadline: u64,
	pub state: u8,
	pub total_pool: String,
	pub pool_home: String,
	pub pool_away: String,
	pub pool_over_under: String,
	pub over_under_line: u64,
}

/// One wagering event, validated at the ledger boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
	pub id: MatchId,
	pub home_team: String,
	pub away_team: String,
	pub game_date: String,
	/// Unix seconds after which the ledger rejects bets
	pub deadline: u64,
	pub over_under_line: u64,
	pub state: MatchState,
	pub total_pool: Amount,
	/// Indexed by `Outcome::index()`
	pub pool_by_outcome: [Amount; 3],
}

impl Match {
	/// Build a typed match from the ledger's raw record
	///
	/// Rejects unknown states, unparseable amounts and pools that do not
	/// add up to the total.
	pub fn from_info(id: MatchId, info: MatchInfo) -> Result<Self, ConversionError> {
		let state = MatchState::try_from(info.state)?;
		let amount = |field: &'static str, raw: &str| {
			raw.parse::<Amount>()
				.map_err(|source| ConversionError::InvalidAmount { field, source })
		};

		let total_pool = amount("total_pool", &info.total_pool)?;
		let pool_by_outcome = [
			amount("pool_home", &info.pool_home)?,
			amount("pool_away", &info.pool_away)?,
			amount("pool_over_under", &info.pool_over_under)?,
		];

		let sum = pool_by_outcome
			.iter()
			.try_fold(Amount::ZERO, |acc, p| acc.checked_add(*p))
			.ok_or(ConversionError::PoolMismatch {
				total: total_pool,
				sum: Amount::from_wei(u128::MAX),
			})?;
		if sum != total_pool {
			return Err(ConversionError::PoolMismatch {
				total: total_pool,
				sum,
			});
		}

		Ok(Self {
			id,
			home_team: info.home_team,
			away_team: info.away_team,
			game_date: info.game_date,
			deadline: info.deadline,
			over_under_line: info.over_under_line,
			state,
			total_pool,
			pool_by_outcome,
		})
	}

	pub fn pool(&self, outcome: Outcome) -> Amount {
		self.pool_by_outcome[outcome.index()]
	}

	/// `sum(pool_by_outcome) == total_pool`
	pub fn pools_balanced(&self) -> bool {
		self.pool_by_outcome
			.iter()
			.try_fold(Amount::ZERO, |acc, p| acc.checked_add(*p))
			== Some(self.total_pool)
	}
}

impl From<&Match> for MatchInfo {
	fn from(m: &Match) -> Self {
		Self {
			home_team: m.home_team.clone(),
			away_team: m.away_team.clone(),
			game_date: m.game_date.clone(),
			deadline: m.deadline,
			state: m.state.code(),
			total_pool: m.total_pool.into(),
			pool_home: m.pool(Outcome::Home).into(),
			pool_away: m.pool(Outcome::Away).into(),
			pool_over_under: m.pool(Outcome::OverUnder).into(),
			over_under_line: m.over_under_line,
		}
	}
}

/// State-changing ledger call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum WriteCall {
	CreateMatch {
		home_team: String,
		away_team: String,
		game_date: String,
		deadline: u64,
		over_under_line: u64,
	},
	PlaceBet {
		match_id: MatchId,
		outcome: Outcome,
		stake: Amount,
	},
	CloseMatch {
		match_id: MatchId,
	},
	SettleMatch {
		match_id: MatchId,
		result: Outcome,
	},
	Claim {
		match_id: MatchId,
	},
}

impl WriteCall {
	/// Ledger method name
	pub fn method(&self) -> &'static str {
		match self {
			WriteCall::CreateMatch { .. } => "createMatch",
			WriteCall::PlaceBet { .. } => "placeBet",
			WriteCall::CloseMatch { .. } => "closeMatch",
			WriteCall::SettleMatch { .. } => "settleMatch",
			WriteCall::Claim { .. } => "claim",
		}
	}

	/// Value transferred with the call (the stake for bets, zero otherwise)
	pub fn value(&self) -> Amount {
		match self {
			WriteCall::PlaceBet { stake, .. } => *stake,
			_ => Amount::ZERO,
		}
	}

	pub fn match_id(&self) -> Option<MatchId> {
		match self {
			WriteCall::CreateMatch { .. } => None,
			WriteCall::PlaceBet { match_id, .. }
			| WriteCall::CloseMatch { match_id }
			| WriteCall::SettleMatch { match_id, .. }
			| WriteCall::Claim { match_id } => Some(*match_id),
		}
	}
}

/// Fee market data reported by the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
	pub max_fee_per_gas: Option<u64>,
	pub max_priority_fee_per_gas: Option<u64>,
}

/// Resource budget attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
	pub gas_limit: u64,
	pub max_fee_per_gas: Option<u64>,
	pub max_priority_fee_per_gas: Option<u64>,
}

impl TxOptions {
	pub fn with_gas_limit(gas_limit: u64) -> Self {
		Self {
			gas_limit,
			max_fee_per_gas: None,
			max_priority_fee_per_gas: None,
		}
	}
}

/// Signed write as submitted to the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedWrite {
	pub from: Address,
	pub call: WriteCall,
	pub options: TxOptions,
	/// Hex-encoded public key of the sender
	pub public_key: String,
	/// `ed25519` or `ecdsa`
	pub algorithm: String,
	/// Hex-encoded signature over `signing_payload`
	pub signature: String,
}

/// Transaction status as tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
	Pending,
	Confirmed,
	Failed,
}

/// Receipt for a submitted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub tx_hash: TxHash,
	pub status: TransactionStatus,
	/// Identifier assigned by `createMatch`, when the ledger reports it
	#[serde(default)]
	pub created_match_id: Option<MatchId>,
	#[serde(default)]
	pub gas_used: Option<u64>,
	/// Revert reason for failed transactions
	#[serde(default)]
	pub error: Option<String>,
}

/// Request body for gas estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateGasRequest {
	pub from: Address,
	pub call: WriteCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateGasResponse {
	pub gas: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCountResponse {
	pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMatchesResponse {
	pub match_ids: Vec<MatchId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
	pub tx_hash: TxHash,
}

/// Error body returned by the ledger node on 4xx/5xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
}
