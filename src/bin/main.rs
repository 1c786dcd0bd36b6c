use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flagwatch::{run_scenario, settings, DetectorConfig, Scenario};

#[derive(Parser)]
#[command(name = "flagwatch")]
#[command(about = "Flagwatch anomaly flag validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default detector configuration as JSON
    Defaults,

    /// Replay a JSON scenario against a fresh in-memory detector
    Simulate {
        scenario: PathBuf,

        /// TOML file overriding the default configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&DetectorConfig::default())?);
        }
        Commands::Simulate { scenario, config } => {
            let config = settings::load(config.as_deref()).context("failed to load configuration")?;
            let text = std::fs::read_to_string(&scenario)
                .with_context(|| format!("failed to read {}", scenario.display()))?;
            let script: Scenario = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", scenario.display()))?;

            info!("Replaying {} steps from {}", script.steps.len(), scenario.display());
            let report = run_scenario(&script, config)?;
            for outcome in &report.outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            println!("{}", serde_json::to_string(&report.summary)?);

            if report.summary.failed > 0 {
                warn!("{} of {} steps failed", report.summary.failed, report.summary.steps);
            }
        }
    }

    Ok(())
}
