use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use machinewatch::config::{Config, LoggingConfig};
use machinewatch::pipeline::Pipeline;
use machinewatch::simulator::{self, SensorSimulator};

#[derive(Parser)]
#[command(
    name = "machinewatch",
    about = "Machine telemetry ingestion and threshold anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (overrides MACHINEWATCH_CONFIG discovery)
    #[arg(long, global = true, env = "MACHINEWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (ingestion pipeline + API server)
    Serve {
        /// Bind address (defaults to [api] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Feed a simulated fleet through an in-process pipeline
    Simulate {
        /// Number of machines to provision
        #[arg(long, default_value = "3")]
        machines: usize,

        /// Reading rounds to emit (one reading per machine per round)
        #[arg(long, default_value = "10")]
        rounds: usize,

        /// Delay between rounds (defaults to [simulator] interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Per-reading fault probability (defaults to [simulator] anomaly_chance)
        #[arg(long)]
        anomaly_chance: Option<f64>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting machinewatch daemon");
            machinewatch::serve(config).await?;
        }
        Commands::Simulate {
            machines,
            rounds,
            interval_ms,
            anomaly_chance,
            seed,
            json,
        } => {
            let mut sim_config = config.simulator.clone();
            if let Some(ms) = interval_ms {
                sim_config.interval_ms = ms;
            }
            if let Some(chance) = anomaly_chance {
                sim_config.anomaly_chance = chance;
            }
            if seed.is_some() {
                sim_config.seed = seed;
            }

            let pipeline = Pipeline::start(&config);
            let fleet = simulator::provision_fleet(&pipeline, machines)
                .await
                .context("failed to provision simulated fleet")?;
            let mut sim = SensorSimulator::new(&sim_config, &fleet);

            tracing::info!(machines, rounds, interval_ms = sim_config.interval_ms, "Running simulation");
            let report = simulator::run(&pipeline, &mut sim, rounds).await;
            pipeline.shutdown().await;

            let summary = pipeline.fleet_summary().await;
            let at_risk = pipeline.most_at_risk().await;

            if json {
                let out = serde_json::json!({
                    "report": report,
                    "summary": summary,
                    "most_at_risk": at_risk,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("\n=== machinewatch simulation ===");
                println!("Rounds:             {}", report.rounds);
                println!("Readings accepted:  {}", report.readings_accepted);
                println!("Readings rejected:  {}", report.readings_rejected);
                println!("Evaluations dropped: {}", report.evaluations_dropped);
                println!("\n{:<12} | Unresolved alerts", "Severity");
                println!("{:-<12}-|-{:-<17}", "", "");
                println!("{:<12} | {}", "Warning", summary.unresolved_warning);
                println!("{:<12} | {}", "Critical", summary.unresolved_critical);
                println!("{:<12} | {}", "Emergency", summary.unresolved_emergency);
                match at_risk {
                    Some(entry) => println!(
                        "\nMost at risk: {} ({}) score {} across {} alert(s)",
                        entry.name, entry.machine_id, entry.risk_score, entry.unresolved_alerts
                    ),
                    None => println!("\nMost at risk: none"),
                }
                println!();
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
