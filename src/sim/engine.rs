//! Simulation engine - orchestrates persons, ticks, and checkpointing
//!
//! Persons simulate in parallel under a bounded semaphore; each person's
//! ticks run strictly in chronological order. Every completed tick is
//! appended to a JSON-lines run log, which doubles as the resume checkpoint:
//! a restart replays completed ticks (memories and branch state) without
//! touching the oracle, then continues from the first incomplete one.

use crate::core::config::RunContext;
use crate::core::error::{GapError, Result};
use crate::core::types::{Cell, ContextMode, PolicyKind, Tick};
use crate::household::environment::Environment;
use crate::household::person::Person;
use crate::memory::{MemoryKind, MemoryRecord, MemoryStore};
use crate::oracle::{Oracle, RetryPolicy};
use crate::policy::{GenerativePolicy, RulePolicy, RuleTable};
use crate::sim::branch::{BranchEnvironments, BranchMatrixExecutor};
use crate::sim::record::{TickDisposition, TickRecord};
use crate::sim::tick::TickGenerator;
use ahash::AHashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The person's single lived memory stream is taken from this cell: the
/// context-present generative branch, the one conditioned on their real
/// hidden intent.
const LIVED_CELL: Cell = Cell {
    context: ContextMode::ContextPresent,
    policy: PolicyKind::Generative,
};

const SKIP_REASON: &str = "발화가 불가능한 활동";

/// Everything a run produces for the evaluation and export stages
#[derive(Debug)]
pub struct RunOutput {
    pub ticks: Vec<TickRecord>,
    pub memories: Vec<MemoryRecord>,
}

/// Append-only checkpoint writer shared by person tasks
pub struct RunLogWriter {
    file: Mutex<std::fs::File>,
}

impl RunLogWriter {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, record: &TickRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// Load a run log, deduplicating by (person, tick) with the last occurrence
/// winning, ordered by (person, tick).
pub fn load_run_log(path: &Path) -> Result<Vec<TickRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    let mut latest: AHashMap<(String, Tick), TickRecord> = AHashMap::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let record: TickRecord = serde_json::from_str(line)?;
        latest.insert((record.person_name.clone(), record.tick), record);
    }
    let mut records: Vec<TickRecord> = latest.into_values().collect();
    records.sort_by(|a, b| {
        a.person_name
            .cmp(&b.person_name)
            .then(a.tick.cmp(&b.tick))
            .then(a.time.cmp(&b.time))
    });
    Ok(records)
}

/// Rewrite a run log in full (used after the observer pass fills ratings).
pub fn rewrite_run_log(path: &Path, records: &[TickRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut lines = String::new();
    for record in records {
        lines.push_str(&serde_json::to_string(record)?);
        lines.push('\n');
    }
    std::fs::write(path, lines)?;
    Ok(())
}

pub fn write_memory_log(path: &Path, memories: &[MemoryRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut lines = String::new();
    for memory in memories {
        lines.push_str(&serde_json::to_string(memory)?);
        lines.push('\n');
    }
    std::fs::write(path, lines)?;
    Ok(())
}

pub fn load_memory_log(path: &Path) -> Result<Vec<MemoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(GapError::from))
        .collect()
}

pub struct SimulationEngine {
    ctx: RunContext,
    oracle: Arc<dyn Oracle>,
    rule_table: RuleTable,
}

impl SimulationEngine {
    pub fn new(ctx: RunContext, oracle: Arc<dyn Oracle>, rule_table: RuleTable) -> Self {
        Self {
            ctx,
            oracle,
            rule_table,
        }
    }

    /// Simulate every person against the canonical environment. Persons run
    /// in parallel bounded by the configured concurrency limit.
    pub async fn run(&self, canonical: &Environment, persons: &[Person]) -> Result<RunOutput> {
        let config = &self.ctx.config;
        let existing = load_run_log(&config.paths.run_log)?;
        let writer = Arc::new(RunLogWriter::open(&config.paths.run_log)?);
        let breaker = Arc::new(AtomicU32::new(0));
        let semaphore = Arc::new(Semaphore::new(config.concurrency_limit));

        let mut join_set: JoinSet<Result<(Vec<TickRecord>, Vec<MemoryRecord>)>> = JoinSet::new();
        for person in persons {
            let mut person = person.clone();
            let prior: AHashMap<Tick, TickRecord> = existing
                .iter()
                .filter(|t| t.person_name == person.name)
                .map(|t| (t.tick, t.clone()))
                .collect();
            // keep the id stable across resumed runs
            if let Some(first) = prior.values().next() {
                person.id = first.person;
            }

            let ctx = self.ctx.clone();
            let oracle = self.oracle.clone();
            let rule_table = self.rule_table.clone();
            let canonical = canonical.snapshot();
            let writer = writer.clone();
            let breaker = breaker.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| GapError::TaskFailed(e.to_string()))?;
                simulate_person(ctx, oracle, rule_table, canonical, person, prior, writer, breaker)
                    .await
            });
        }

        let mut ticks = Vec::new();
        let mut memories = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (person_ticks, person_memories) =
                joined.map_err(|e| GapError::TaskFailed(e.to_string()))??;
            ticks.extend(person_ticks);
            memories.extend(person_memories);
        }

        ticks.sort_by(|a, b| a.person_name.cmp(&b.person_name).then(a.tick.cmp(&b.tick)));
        memories.sort_by(|a, b| {
            a.person
                .0
                .cmp(&b.person.0)
                .then(a.created_tick.cmp(&b.created_tick))
        });

        write_memory_log(&config.paths.memory_log, &memories)?;
        tracing::info!(
            run = ?self.ctx.run_id,
            ticks = ticks.len(),
            memories = memories.len(),
            "simulation complete"
        );
        Ok(RunOutput { ticks, memories })
    }
}

#[allow(clippy::too_many_arguments)]
async fn simulate_person(
    ctx: RunContext,
    oracle: Arc<dyn Oracle>,
    rule_table: RuleTable,
    canonical: Environment,
    person: Person,
    prior: AHashMap<Tick, TickRecord>,
    writer: Arc<RunLogWriter>,
    breaker: Arc<AtomicU32>,
) -> Result<(Vec<TickRecord>, Vec<MemoryRecord>)> {
    let config = &ctx.config;
    let retry = RetryPolicy::from_config(config);
    let generative = Arc::new(GenerativePolicy::new(oracle.clone(), retry.clone()));
    let rule_based = Arc::new(RulePolicy::new(oracle.clone(), retry.clone(), rule_table));
    let executor = BranchMatrixExecutor::new(
        oracle.clone(),
        retry.clone(),
        generative,
        rule_based,
        config.recall_limit,
    );
    let tick_generator = TickGenerator::new(oracle.as_ref(), retry.clone(), config);

    let mut branches = BranchEnvironments::new(&canonical);
    let mut memory = MemoryStore::new(config.decay_rate, config.decay_floor);
    let mut ticks: Vec<TickRecord> = Vec::new();

    for entry in person.sorted_schedule() {
        let quarters_per_hour = config.quarters_per_hour();
        let hour_ticks: Vec<Tick> = (0..quarters_per_hour)
            .map(|i| {
                entry
                    .time
                    .add_minutes(i * config.tick_minutes)
                    .tick_index(config.tick_minutes)
            })
            .collect();

        // fully checkpointed hours replay without oracle calls
        if hour_ticks.iter().all(|t| prior.contains_key(t)) {
            for tick in &hour_ticks {
                let record = prior[tick].clone();
                replay_tick(&record, &mut memory, &mut branches);
                ticks.push(record);
            }
            continue;
        }

        let quarters = match tick_generator.quarters(&person, &entry).await {
            Ok(quarters) => quarters,
            Err(error) => {
                tracing::warn!(person = %person.name, time = %entry.time, %error,
                    "quarter narrative failed, skipping hour");
                trip_breaker(&breaker, config.breaker_threshold)?;
                for (i, tick) in hour_ticks.iter().enumerate() {
                    let time = entry.time.add_minutes(i as u32 * config.tick_minutes);
                    let record = TickRecord {
                        person: person.id,
                        person_name: person.name.clone(),
                        time,
                        tick: *tick,
                        hour_activity: entry.activity.clone(),
                        quarter_activity: entry.activity.clone(),
                        visible_action: String::new(),
                        hidden_intent: String::new(),
                        concrete_action: String::new(),
                        disposition: TickDisposition::Skipped {
                            reason: format!("서사 생성 실패: {error}"),
                        },
                    };
                    write_back_memory(&record, &mut memory);
                    writer.append(&record)?;
                    ticks.push(record);
                }
                continue;
            }
        };

        for descriptor in quarters {
            // partial-hour resume: prefer the checkpointed tick verbatim
            if let Some(record) = prior.get(&descriptor.tick) {
                replay_tick(record, &mut memory, &mut branches);
                ticks.push(record.clone());
                continue;
            }

            let disposition = if descriptor.command_eligible {
                let records = executor
                    .run_tick(&person, &descriptor, &memory, &mut branches)
                    .await;
                for record in &records {
                    if record.status.is_completed() {
                        breaker.store(0, Ordering::SeqCst);
                    } else {
                        trip_breaker(&breaker, config.breaker_threshold)?;
                    }
                }
                TickDisposition::Executed { records }
            } else {
                tracing::debug!(person = %person.name, time = %descriptor.time,
                    activity = %descriptor.quarter_activity, "feasibility-gated tick");
                TickDisposition::Skipped {
                    reason: SKIP_REASON.to_string(),
                }
            };

            let record = TickRecord {
                person: person.id,
                person_name: person.name.clone(),
                time: descriptor.time,
                tick: descriptor.tick,
                hour_activity: descriptor.hour_activity.clone(),
                quarter_activity: descriptor.quarter_activity.clone(),
                visible_action: descriptor.visible_action.clone(),
                hidden_intent: descriptor.hidden_intent.clone(),
                concrete_action: descriptor.concrete_action.clone(),
                disposition,
            };

            write_back_memory(&record, &mut memory);
            writer.append(&record)?;
            ticks.push(record);
        }
    }

    let memories = memory.dump(person.id);
    Ok((ticks, memories))
}

fn trip_breaker(breaker: &AtomicU32, threshold: u32) -> Result<()> {
    let failures = breaker.fetch_add(1, Ordering::SeqCst) + 1;
    if failures >= threshold {
        return Err(GapError::CircuitBreaker { failures });
    }
    Ok(())
}

/// Memory is written once per person-tick regardless of how many cells ran:
/// one activity memory always, plus one assistant-call memory when the lived
/// (context-present, generative) timeline completed a command.
fn write_back_memory(record: &TickRecord, memory: &mut MemoryStore) {
    memory.record(
        record.person,
        record.tick,
        MemoryKind::Activity,
        format!("{} {}", record.time, record.quarter_activity),
    );
    if let Some(lived) = record
        .records()
        .iter()
        .find(|r| r.cell == LIVED_CELL && r.status.is_completed() && !r.command.is_empty())
    {
        memory.record(
            record.person,
            record.tick,
            MemoryKind::AssistantCall,
            format!(
                "VA에게 \"{}\"라고 요청했고 \"{}\"라는 응답을 받았다.",
                lived.command, lived.reply
            ),
        );
    }
}

/// Re-establish in-memory state from a checkpointed tick: the memory stream
/// and each branch's state changes, with no oracle involvement.
fn replay_tick(record: &TickRecord, memory: &mut MemoryStore, branches: &mut BranchEnvironments) {
    write_back_memory(record, memory);
    for cell_record in record.records() {
        if !cell_record.status.is_completed() {
            continue;
        }
        for change in &cell_record.state_changes {
            let env = branches.get_mut(cell_record.cell);
            if let Err(error) = env.apply(&change.device, &change.property, &change.after) {
                tracing::warn!(%error, "checkpointed change no longer applies");
            }
        }
    }
}
