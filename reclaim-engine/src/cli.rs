//! Command-line arguments for the `reclaim` binary.
//!
//! Every flag can also come from the environment (or a `.env` file).

use clap::{Parser, Subcommand};
use reclaim_core::DecisionPolicy;
use std::path::{Path, PathBuf};

use crate::config::ReclaimConfig;
use crate::error::{ReclaimError, Result};

/// Reclaim - campus lost & found matching and ownership verification
#[derive(Parser, Debug, Clone)]
#[command(name = "reclaim")]
#[command(about = "Lost & found matching and ownership verification")]
pub struct Args {
    /// YAML configuration file
    #[arg(long, env = "RECLAIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// API key for the text-generation endpoint (overrides the config file)
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the signals derived from a report
    Signals {
        /// Report JSON file
        report: PathBuf,
    },
    /// Score a lost report against a found report
    Score { lost: PathBuf, found: PathBuf },
    /// Grade an answer map against a found report with the configured policy
    Grade {
        /// Found report JSON file
        report: PathBuf,
        /// JSON object of signal key to answer
        answers: PathBuf,
    },
    /// Generate verification questions for a found report
    Questions {
        /// Found report JSON file
        report: PathBuf,
    },
    /// Print the effective configuration as YAML
    Config,
}

impl Args {
    /// Load the configuration file (or defaults) and apply flag overrides.
    pub fn load_config(&self) -> Result<ReclaimConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ReclaimConfig::default(),
        };

        if let Some(key) = &self.api_key {
            config.agent.api_key = Some(key.clone());
        }

        validate(&config)?;
        Ok(config)
    }
}

fn read_config(path: &Path) -> Result<ReclaimConfig> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| ReclaimError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    ReclaimConfig::from_yaml(&yaml)
        .map_err(|e| ReclaimError::Config(format!("Invalid config {}: {}", path.display(), e)))
}

/// Reject configurations the service cannot run with.
pub fn validate(config: &ReclaimConfig) -> Result<()> {
    let verification = &config.verification;
    if verification.min_questions == 0 || verification.min_questions > verification.max_questions {
        return Err(ReclaimError::Config(format!(
            "question bounds {}..{} are invalid",
            verification.min_questions, verification.max_questions
        )));
    }
    if config.matching.strong_match_threshold < config.matching.match_threshold {
        return Err(ReclaimError::Config(
            "strong_match_threshold must not be below match_threshold".to_string(),
        ));
    }
    validate_policy(&verification.policy)?;
    if config.agent.primary_model.trim().is_empty() {
        return Err(ReclaimError::Config("agent.primary_model is required".to_string()));
    }
    Ok(())
}

fn validate_policy(policy: &DecisionPolicy) -> Result<()> {
    match *policy {
        DecisionPolicy::Threshold {
            sensitive_high,
            sensitive_mid,
            open_threshold,
        } => {
            let ratios = [
                ("sensitive_high", sensitive_high),
                ("sensitive_mid", sensitive_mid),
                ("open_threshold", open_threshold),
            ];
            for (name, value) in ratios {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ReclaimError::Config(format!(
                        "verification.policy.{name} must be within 0..=1, got {value}"
                    )));
                }
            }
            if sensitive_mid > sensitive_high {
                return Err(ReclaimError::Config(
                    "verification.policy.sensitive_mid must not exceed sensitive_high".to_string(),
                ));
            }
        }
        DecisionPolicy::ExactCount { min_questions } => {
            if min_questions == 0 {
                return Err(ReclaimError::Config(
                    "verification.policy.min_questions must be at least 1".to_string(),
                ));
            }
        }
    }
    Ok(())
}
