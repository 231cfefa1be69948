use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use evolab_app::{Simulation, apply_overrides};
use evolab_core::EvolabConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "evolab",
    version,
    about = "Run the evolab genetics core headless and report on the population"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON configuration file; missing fields take their defaults.
    #[arg(short, long, env = "EVOLAB_CONFIG")]
    config: Option<PathBuf>,
    /// Dot-delimited override applied after the file (e.g. species.distance_threshold=0.25).
    #[arg(long = "set", value_name = "PATH=VALUE")]
    overrides: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate for a number of ticks and print a JSON run summary.
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Ticks to simulate.
        #[arg(long, default_value_t = 1_000)]
        ticks: u64,
        /// RNG seed; overrides the configured seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Founder count; overrides simulation.founders.
        #[arg(long)]
        founders: Option<usize>,
        /// Write the species records as JSON to this file.
        #[arg(long)]
        species_out: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON.
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            ticks,
            seed,
            founders,
            species_out,
        } => {
            let mut config = load_config(&config)?;
            if seed.is_some() {
                config.rng_seed = seed;
            }
            if let Some(founders) = founders {
                config.simulation.founders = founders;
            }
            run_command(config, ticks, species_out.as_deref())
        }
        Command::Config { config } => {
            let config = load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &ConfigArgs) -> Result<EvolabConfig> {
    let base = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let mut de = serde_json::Deserializer::from_str(&text);
            serde_path_to_error::deserialize::<_, EvolabConfig>(&mut de)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => EvolabConfig::default(),
    };
    let config = apply_overrides(&base, &args.overrides).context("failed to apply --set overrides")?;
    config.validate().context("configuration rejected")?;
    Ok(config)
}

fn run_command(config: EvolabConfig, ticks: u64, species_out: Option<&Path>) -> Result<()> {
    let mut sim = Simulation::new(config).context("failed to start simulation")?;
    let summary = sim.run(ticks);
    info!(
        ticks = summary.ticks,
        population = summary.population,
        species = summary.species_count,
        speciations = summary.speciations,
        "run complete"
    );
    if let Some(path) = species_out {
        let data = sim
            .species_tracker()
            .serialize_species_data()
            .context("failed to serialize species records")?;
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
