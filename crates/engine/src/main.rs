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

//! `parlay` - command line front end for the match engine
//!
//! ```text
//! parlay list
//! parlay create <home> <away> <game-date> <deadline> <over-under-line>
//! parlay bet <match-id> <outcome 0|1|2> <stake-ether>
//! parlay close <match-id>
//! parlay settle <match-id> <result 0|1|2>
//! parlay claim <match-id>
//! parlay mine
//! parlay demo
//! ```
//!
//! The ledger node comes from `PARLAY_LEDGER_URL` (or `PARLAY_CONFIG_FILE`);
//! `PARLAY_DEMO=true` or the `demo` command use an in-process ledger instead.
//! Writes are signed with `PARLAY_PRIVATE_KEY`.

use std::{env, sync::Arc};

use anyhow::{Context, Result, bail};
use parlay_engine::{
	CreateMatchForm, HttpLedgerGateway, LedgerGateway, LifecycleEngine, MemoryLedger,
	RuntimeConfig, logging::init_logging,
};
use parlay_sdk::{Match, MatchId, Outcome, Signer};
use tracing::info;

enum Command {
	List,
	Create(CreateMatchForm),
	Bet {
		match_id: MatchId,
		outcome: u8,
		stake: String,
	},
	Close(MatchId),
	Settle {
		match_id: MatchId,
		result: u8,
	},
	Claim(MatchId),
	Mine,
	Demo,
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
	args.get(i)
		.map(String::as_str)
		.with_context(|| format!("Missing argument: {}", name))
}

fn number<T: std::str::FromStr>(args: &[String], i: usize, name: &str) -> Result<T> {
	let raw = arg(args, i, name)?;
	raw.parse()
		.ok()
		.with_context(|| format!("Invalid {}: {}", name, raw))
}

impl Command {
	fn parse(args: &[String]) -> Result<Self> {
		let text = |i: usize, name: &str| arg(args, i, name).map(str::to_string);

		let command = match args.first().map(String::as_str) {
			None | Some("list") => Command::List,
			Some("create") => Command::Create(CreateMatchForm {
				home_team: text(1, "home")?,
				away_team: text(2, "away")?,
				game_date: text(3, "game-date")?,
				deadline: text(4, "deadline")?,
				over_under_line: text(5, "over-under-line")?,
			}),
			Some("bet") => Command::Bet {
				match_id: number(args, 1, "match-id")?,
				outcome: number(args, 2, "outcome")?,
				stake: text(3, "stake")?,
			},
			Some("close") => Command::Close(number(args, 1, "match-id")?),
			Some("settle") => Command::Settle {
				match_id: number(args, 1, "match-id")?,
				result: number(args, 2, "result")?,
			},
			Some("claim") => Command::Claim(number(args, 1, "match-id")?),
			Some("mine") => Command::Mine,
			Some("demo") => Command::Demo,
			Some(other) => bail!("Unknown command: {}", other),
		};
		Ok(command)
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	init_logging()?;

	let runtime = RuntimeConfig::from_env()?;
	let config = runtime.engine_config()?;
	let args: Vec<String> = env::args().skip(1).collect();
	let command = Command::parse(&args)?;

	if matches!(command, Command::Demo) {
		return run_demo(&runtime).await;
	}

	let ledger: Arc<dyn LedgerGateway> = if runtime.demo {
		info!(target: "engine", "Using in-process demo ledger");
		Arc::new(MemoryLedger::new())
	} else {
		info!(target: "engine", ledger_url = %config.ledger_url, "Using ledger node");
		Arc::new(HttpLedgerGateway::new(&config).context("Failed to create ledger gateway")?)
	};
	let engine = LifecycleEngine::new(ledger, &config);

	let signer = match &runtime.private_key {
		Some(key) => Some(
			Signer::from_hex(runtime.key_algorithm, key).context("Invalid PARLAY_PRIVATE_KEY")?,
		),
		None if runtime.demo => Some(Signer::generate(runtime.key_algorithm)),
		None => None,
	};
	match signer {
		Some(signer) => {
			engine.connect(signer).await?;
		}
		None => {
			engine.refresh().await?;
		}
	}

	let result = run(&engine, command).await;
	print_status_log(&engine);
	result
}

async fn run(engine: &LifecycleEngine, command: Command) -> Result<()> {
	match command {
		Command::List => print_matches(&engine.matches()),
		Command::Create(form) => {
			let outcome = engine.create_match(&form).await?;
			if let Some(id) = outcome.match_id {
				println!("Match created successfully! Match ID: {}", id);
			}
			print_matches(&engine.matches());
		}
		Command::Bet {
			match_id,
			outcome,
			stake,
		} => {
			engine.select_bet_match(match_id);
			engine.place_bet(outcome, &stake).await?;
			print_match(engine.get_match(match_id));
		}
		Command::Close(match_id) => {
			engine.select_settle_match(match_id);
			engine.close_match().await?;
			print_match(engine.get_match(match_id));
		}
		Command::Settle { match_id, result } => {
			engine.select_settle_match(match_id);
			engine.settle_match(result).await?;
			print_match(engine.get_match(match_id));
		}
		Command::Claim(match_id) => {
			engine.select_settle_match(match_id);
			let outcome = engine.claim().await?;
			if let Some(tx_hash) = outcome.tx_hash {
				println!("Winnings claimed in {}", tx_hash);
			}
		}
		Command::Mine => print_matches(&engine.my_matches().await?),
		Command::Demo => bail!("demo runs on its own ledger"),
	}
	Ok(())
}

/// Full lifecycle against an in-process ledger
async fn run_demo(runtime: &RuntimeConfig) -> Result<()> {
	let config = runtime.engine_config()?;
	let ledger = Arc::new(MemoryLedger::new());
	let engine = LifecycleEngine::new(ledger.clone(), &config);
	let signer = Signer::generate(runtime.key_algorithm);
	let account = signer.address().clone();
	println!("Demo account {}", account.short());

	engine.connect(signer).await?;

	let deadline = (chrono::Utc::now() + chrono::Duration::days(1)).timestamp();
	let created = engine
		.create_match(&CreateMatchForm {
			home_team: "Lakers".to_string(),
			away_team: "Warriors".to_string(),
			game_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
			deadline: deadline.to_string(),
			over_under_line: "220".to_string(),
		})
		.await?;
	let match_id = created
		.match_id
		.context("Create returned no match id")?;

	engine.place_bet(Outcome::OverUnder.code(), "0.01").await?;
	engine.place_bet(Outcome::Home.code(), "0.02").await?;
	engine.close_match().await?;
	engine.settle_match(Outcome::OverUnder.code()).await?;
	engine.claim().await?;

	print_matches(&engine.matches());
	if let Some(payout) = ledger.claimed_amount(match_id, &account) {
		println!("Claimed {}", payout);
	}
	print_status_log(&engine);
	Ok(())
}

fn print_matches(matches: &[Match]) {
	if matches.is_empty() {
		println!("No matches");
	}
	for m in matches {
		print_match(Some(m.clone()));
	}
}

fn print_match(m: Option<Match>) {
	let Some(m) = m else {
		println!("Match not loaded");
		return;
	};
	let deadline = chrono::DateTime::from_timestamp(m.deadline as i64, 0)
		.map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
		.unwrap_or_else(|| m.deadline.to_string());
	println!(
		"#{} {} vs {} ({}) [{}] deadline {} | pool {} | {} {} | {} {} | {} {} (line {})",
		m.id,
		m.home_team,
		m.away_team,
		m.game_date,
		m.state,
		deadline,
		m.total_pool,
		Outcome::Home,
		m.pool(Outcome::Home),
		Outcome::Away,
		m.pool(Outcome::Away),
		Outcome::OverUnder,
		m.pool(Outcome::OverUnder),
		m.over_under_line,
	);
}

fn print_status_log(engine: &LifecycleEngine) {
	for event in engine.status().history() {
		println!(
			"[{:>3}] {} {}",
			event.seq,
			event.at.format("%H:%M:%S%.3f"),
			event.status
		);
	}
}
