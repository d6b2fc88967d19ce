//! Gapsim - Entry Point
//!
//! Three stages mirror the study workflow: `simulate` runs the branching
//! engine over every person, `evaluate` fills observer ratings in a later
//! pass, and `export` renders the run into JSON and CSV tables.

use clap::{Parser, Subcommand};
use gapsim::core::config::{Provider, RunContext, SimConfig};
use gapsim::core::error::Result;
use gapsim::eval::ObserverEvaluator;
use gapsim::export::{CsvSink, ExportBundle, ExportSink, JsonSink};
use gapsim::household::loader;
use gapsim::oracle::{HttpOracle, Oracle, RetryPolicy, ScriptedOracle};
use gapsim::policy::RuleTable;
use gapsim::sim::engine::{
    load_memory_log, load_run_log, rewrite_run_log, SimulationEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "gapsim", about = "Smart-home VA evaluation-gap simulator")]
struct Cli {
    /// Configuration file (defaults apply when absent)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Route every oracle call-site to this one model
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the branching simulation for every person
    Simulate,
    /// Fill observer ratings on a completed run log
    Evaluate,
    /// Render the run log into JSON and CSV tables
    Export,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gapsim=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = if cli.config.exists() {
        SimConfig::load(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "no config file, using defaults");
        SimConfig::default()
    };
    if let Some(model) = cli.model {
        let models = &mut config.models;
        models.narrative = model.clone();
        models.command = model.clone();
        models.generative_reply = model.clone();
        models.classifier = model.clone();
        models.self_eval = model.clone();
        models.observer_eval = model;
    }

    let rt = Runtime::new()?;
    rt.block_on(run(cli.command, config))
}

async fn run(command: Command, config: SimConfig) -> Result<()> {
    match command {
        Command::Simulate => {
            let canonical = loader::load_environment(&config.paths.environment)?;
            let persons = loader::load_persons(&config.paths.persons)?;
            let oracle = build_oracle(&config)?;
            let rule_table = match &config.paths.rules {
                Some(path) => RuleTable::load(path)?,
                None => RuleTable::default(),
            };
            let ctx = RunContext::new(config);
            tracing::info!(run = ?ctx.run_id, persons = persons.len(), "simulation starting");
            let engine = SimulationEngine::new(ctx, oracle, rule_table);
            let output = engine.run(&canonical, &persons).await?;
            let executed = output
                .ticks
                .iter()
                .filter(|t| !t.records().is_empty())
                .count();
            println!(
                "시뮬레이션 완료: {}명, {}틱 (명령 발화 {}틱, 기억 {}건)",
                persons.len(),
                output.ticks.len(),
                executed,
                output.memories.len()
            );
        }
        Command::Evaluate => {
            let canonical = loader::load_environment(&config.paths.environment)?;
            let mut ticks = load_run_log(&config.paths.run_log)?;
            let oracle = build_oracle(&config)?;
            let evaluator = ObserverEvaluator::new(oracle, RetryPolicy::from_config(&config));
            let rated = evaluator.evaluate_run(&canonical, &mut ticks).await?;
            rewrite_run_log(&config.paths.run_log, &ticks)?;
            println!("관찰자 평가 완료: {rated}건 채점");
        }
        Command::Export => {
            let persons = loader::load_persons(&config.paths.persons)?;
            let ticks = load_run_log(&config.paths.run_log)?;
            let memories = load_memory_log(&config.paths.memory_log)?;
            let bundle = ExportBundle {
                persons: &persons,
                ticks: &ticks,
                memories: &memories,
                gap_threshold: config.gap_threshold,
            };
            JsonSink::new(config.paths.exports.clone()).export(&bundle)?;
            CsvSink::new(config.paths.exports.clone()).export(&bundle)?;
            println!("내보내기 완료: {}", config.paths.exports.display());
        }
    }
    Ok(())
}

fn build_oracle(config: &SimConfig) -> Result<Arc<dyn Oracle>> {
    Ok(match config.provider {
        Provider::Http => Arc::new(HttpOracle::from_env(config.models.clone())?),
        Provider::Scripted => Arc::new(ScriptedOracle::new(config.scripted_seed)),
    })
}
