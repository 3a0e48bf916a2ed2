//! Reclaim - lost & found matching and ownership verification CLI

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reclaim_core::{evaluate, extract_signals, score_pair, Report};
use reclaim_engine::cli::{Args, Command};
use reclaim_engine::service::{build_backends, question_generator};
use reclaim_engine::verification::parse_answers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reclaim={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.load_config()?;

    match &args.command {
        Command::Signals { report } => {
            let report: Report = read_json(report).await?;
            print_json(&extract_signals(&report))?;
        }
        Command::Score { lost, found } => {
            let lost: Report = read_json(lost).await?;
            let found: Report = read_json(found).await?;
            print_json(&score_pair(&lost, &found))?;
        }
        Command::Grade { report, answers } => {
            let report: Report = read_json(report).await?;
            let answers: BTreeMap<String, String> = read_json(answers).await?;
            let verdict = evaluate(
                &extract_signals(&report),
                &parse_answers(&answers),
                report.sensitive,
                &config.verification.policy,
                config.verification.containment,
            );
            print_json(&verdict)?;
        }
        Command::Questions { report } => {
            let report: Report = read_json(report).await?;
            let generator = question_generator(&config, build_backends(&config.agent)?);
            info!(models = ?config.agent.models(), "Generating verification questions");

            let questions = generator.generate(&extract_signals(&report)).await?;
            print_json(&questions)?;
        }
        Command::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
