mod analytics;
mod config;
mod engine;
mod error;
mod features;
mod history;
mod ml;
mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::prelude::ToPrimitive;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use analytics::PredictionAudit;
use config::{load_config, EngineConfig};
use engine::{backfill_from_csv, DecisionEngine, ReplayFeed};
use history::{read_log, HistoryStore, StoreAlert};
use ml::EnsemblePredictor;
use types::EngineMode;

#[derive(Parser)]
#[command(name = "crashpilot")]
#[command(version = "0.1.0")]
#[command(about = "Crash-game round observation and betting decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "crashpilot.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the engine from a recorded rounds file (round_id,multiplier CSV)
    Replay {
        /// Recorded rounds file
        #[arg(short, long)]
        rounds: PathBuf,

        /// Override the configured mode (betting|observation)
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Append historical rounds through the normal store path
    Backfill {
        /// CSV file of round_id,multiplier[,rfc3339_timestamp] lines
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Prediction-accuracy report over the durable round log
    Audit,
    /// Export the round history with time-decay sample weights for the
    /// offline training job
    ExportTraining {
        /// Output CSV file path
        #[arg(short, long, default_value = "training_data.csv")]
        output: PathBuf,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Crashpilot v0.1.0");
    let config = load_config(Some(Path::new(&cli.config)))?;

    match cli.command {
        Commands::Replay { rounds, mode } => {
            run_replay(config, &rounds, mode.as_deref()).await?;
        }
        Commands::Backfill { input } => {
            run_backfill(config, &input).await?;
        }
        Commands::Audit => {
            run_audit(&config)?;
        }
        Commands::ExportTraining { output } => {
            run_export_training(&config, &output)?;
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_replay(mut config: EngineConfig, rounds: &Path, mode: Option<&str>) -> Result<()> {
    if let Some(raw) = mode {
        config.mode = EngineMode::from_str(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown mode '{}'", raw))?;
    }

    let ensemble = match &config.model_bundle {
        Some(path) => EnsemblePredictor::load_from_bundle(path)?,
        None => {
            warn!("No model bundle configured; every round will be skipped");
            EnsemblePredictor::new()
        }
    };

    let store = HistoryStore::open(config.store.clone())?;
    let mut alerts = store.alerts();
    tokio::spawn(async move {
        while let Ok(StoreAlert::Fatal { round_id, message }) = alerts.recv().await {
            error!("FATAL: round {} lost durability: {}", round_id, message);
        }
    });

    let target = config
        .betting
        .default_target
        .to_f64()
        .unwrap_or(2.0);
    let mut engine = DecisionEngine::new(config, store, ensemble);

    let mut decisions = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(decision) = decisions.recv().await {
            println!(
                "{} round {}: {} ({})",
                decision.timestamp.format("%H:%M:%S"),
                decision.round_id,
                decision.action,
                decision.reason
            );
        }
    });

    let mut feed = ReplayFeed::from_path(rounds)?;
    engine.run(&mut feed).await;

    let audit = PredictionAudit::from_records(engine.store().all(), target);
    println!("{}", audit);

    engine.shutdown().await;
    Ok(())
}

async fn run_backfill(config: EngineConfig, input: &Path) -> Result<()> {
    let mut store = HistoryStore::open(config.store.clone())?;
    let report = backfill_from_csv(&mut store, input).await?;
    info!("Backfill: {}", report);
    store.close().await;
    Ok(())
}

fn run_export_training(config: &EngineConfig, output: &Path) -> Result<()> {
    use std::io::Write;

    let records = read_log(&config.store.log_path)?;
    if records.is_empty() {
        warn!("Nothing to export from {}", config.store.log_path.display());
        return Ok(());
    }

    let now = chrono::Utc::now();
    let weighted = ml::weighted_training_set(&records, now, config.training.decay_hours);

    // Every record is exported; age scales the weight, never membership.
    let mut file = std::fs::File::create(output)?;
    writeln!(file, "timestamp,round_id,multiplier,bet_placed,profit_loss,predicted_value,predicted_confidence,weight")?;
    for (obs, weight) in &weighted {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{:.6}",
            obs.timestamp.to_rfc3339(),
            obs.round_id,
            obs.multiplier,
            obs.bet_placed,
            obs.profit_loss,
            obs.predicted_value,
            obs.predicted_confidence,
            weight
        )?;
    }

    info!(
        "Exported {} weighted training rows to {} (decay {}h)",
        weighted.len(),
        output.display(),
        config.training.decay_hours
    );
    Ok(())
}

fn run_audit(config: &EngineConfig) -> Result<()> {
    let records = read_log(&config.store.log_path)?;
    if records.is_empty() {
        warn!("No rounds recorded yet at {}", config.store.log_path.display());
        return Ok(());
    }
    let target = config
        .betting
        .default_target
        .to_f64()
        .unwrap_or(2.0);
    println!("{}", PredictionAudit::from_records(&records, target));
    Ok(())
}
