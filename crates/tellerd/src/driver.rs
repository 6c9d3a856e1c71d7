//! Driver loop: feeds scenario steps or stdin lines into the engine

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::time::Duration;
use teller_api::{Decision, Input, Resolution, TickOutcome};
use teller_core::{Engine, Transaction};
use teller_host_api::ScriptedDecider;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::scenario::{Scenario, StepInput};

/// One interactive command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Voice(String),
    /// Voice input with the intent the scripted classifier should return
    Scripted(Decision, String),
    Signal(String),
    Wait(u64),
    Quit,
}

/// Parse one stdin line
///
/// `!signal`, `+secs`, `@intent key=value ...`, `quit`; anything else is a
/// voice utterance.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "quit" || line == "exit" {
        return Some(Command::Quit);
    }
    if let Some(signal) = line.strip_prefix('!') {
        return Some(Command::Signal(signal.trim().to_string()));
    }
    if let Some(secs) = line.strip_prefix('+') {
        return secs.trim().parse().ok().map(Command::Wait);
    }
    if let Some(rest) = line.strip_prefix('@') {
        let mut words = rest.split_whitespace();
        let intent = words.next()?;
        let decision = words
            .filter_map(|w| w.split_once('='))
            .fold(Decision::new(intent), |d, (k, v)| d.with_param(k, v));
        return Some(Command::Scripted(decision, rest.to_string()));
    }
    Some(Command::Voice(line.to_string()))
}

pub struct Driver {
    engine: Engine,
    scripted: Option<ScriptedDecider>,
    max_chain: u32,
    tick_interval: Duration,
    offset: chrono::Duration,
}

impl Driver {
    /// `scripted` is the classifier handle when the engine runs on canned
    /// decisions
    pub fn new(
        engine: Engine,
        scripted: Option<ScriptedDecider>,
        max_chain: u32,
        tick_interval: Duration,
    ) -> Self {
        Self {
            engine,
            scripted,
            max_chain,
            tick_interval,
            offset: chrono::Duration::zero(),
        }
    }

    /// Driver clock: wall time plus any simulated waiting
    fn now(&self) -> DateTime<Local> {
        teller_util::now() + self.offset
    }

    fn advance(&mut self, secs: u64) {
        match shifted_offset(self.offset, secs) {
            Some(offset) => {
                self.offset = offset;
                info!(secs, now = %teller_util::format_datetime_full(&self.now()), "Clock advanced");
            }
            None => warn!(secs, "Wait out of range, clock unchanged"),
        }
    }

    async fn feed(&self, txn: &mut Transaction, input: Option<Input>) -> Vec<TickOutcome> {
        let outcomes = self
            .engine
            .run_until_settled(txn, input, self.now(), self.max_chain)
            .await;
        for outcome in &outcomes {
            report(outcome);
        }
        outcomes
    }

    pub async fn run_scenario(&mut self, scenario: Scenario) -> Result<Transaction> {
        let mut txn = self.engine.start(self.now());
        info!(transaction_id = %txn.id, scenario = ?scenario, "Scenario started");

        for step in scenario.steps() {
            if txn.is_finished(self.engine.rules()) {
                break;
            }
            if txn.state != step.state {
                bail!(
                    "scenario expected state {} but the kiosk is in {}",
                    step.state,
                    txn.state
                );
            }

            if let (Some(scripted), Some(decision)) = (&self.scripted, step.scripted_decision()) {
                scripted.push(decision);
            }
            if let StepInput::Wait(secs) = step.input {
                self.advance(secs);
            }

            self.feed(&mut txn, step.to_input()).await;
            tokio::time::sleep(self.tick_interval).await;
        }

        Ok(txn)
    }

    pub async fn run_interactive(&mut self) -> Result<Transaction> {
        let mut txn = self.engine.start(self.now());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(self.tick_interval);
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        println!("state {}; type an utterance, !signal, +secs, @intent key=value, or quit", txn.state);

        while !txn.is_finished(self.engine.rules()) {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, stopping");
                    break;
                }

                // Timer poll
                _ = ticker.tick() => {
                    self.feed(&mut txn, None).await;
                }

                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else {
                        break;
                    };
                    let input = match parse_line(&line) {
                        None => continue,
                        Some(Command::Quit) => break,
                        Some(Command::Wait(secs)) => {
                            self.advance(secs);
                            None
                        }
                        Some(Command::Signal(signal)) => Some(Input::system(signal)),
                        Some(Command::Voice(text)) => {
                            if self.scripted.is_some() {
                                warn!("No classifier configured; use @intent with the scripted decider");
                            }
                            Some(Input::voice(text))
                        }
                        Some(Command::Scripted(decision, text)) => {
                            match &self.scripted {
                                Some(scripted) => scripted.push(decision),
                                None => warn!("@intent ignored; the HTTP decider classifies input"),
                            }
                            Some(Input::voice(text))
                        }
                    };
                    self.feed(&mut txn, input).await;
                }
            }
        }

        Ok(txn)
    }
}

/// `offset` pushed `secs` further, or `None` when the driver clock would
/// leave chrono's representable range
fn shifted_offset(offset: chrono::Duration, secs: u64) -> Option<chrono::Duration> {
    let step = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
    let offset = offset.checked_add(&step)?;
    teller_util::now().checked_add_signed(offset)?;
    Some(offset)
}

fn report(outcome: &TickOutcome) {
    if matches!(outcome.resolution, Resolution::Idle | Resolution::Halted) {
        return;
    }
    let event = outcome
        .event
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
    let actions: Vec<String> = outcome.actions.iter().map(|a| a.to_string()).collect();
    println!(
        "{:<14} --{}--> {:<14} [{}] {}",
        outcome.from,
        event,
        outcome.to,
        outcome.resolution.as_str(),
        actions.join(", ")
    );
}
