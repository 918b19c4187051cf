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

//! Parlay Engine - match lifecycle and synchronization
//!
//! Mirrors wagering matches held by an external ledger and drives their
//! lifecycle (create, bet, close, settle, claim) through it.
//!
//! Components, leaves first:
//! - [`ledger`]: typed gateway to the ledger (HTTP node or in-memory)
//! - [`fees`]: best-effort gas budget and fee caps for each write
//! - [`store`]: local snapshot of all matches, rebuilt by refresh
//! - [`status`]: observable status slot with bounded history
//! - [`lifecycle`]: the orchestrator tying the above together

pub mod config;
pub mod fees;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod status;
pub mod store;

pub use config::{EngineConfig, RuntimeConfig};
pub use fees::FeeEstimator;
pub use ledger::{HttpLedgerGateway, LedgerError, LedgerGateway, MemoryLedger, Receipt};
pub use lifecycle::{CreateMatchForm, LifecycleEngine, WorkflowError, WorkflowOutcome, parse_deadline};
pub use status::{Action, Status, StatusEvent, StatusReporter};
pub use store::{MatchStore, RefreshReport};
