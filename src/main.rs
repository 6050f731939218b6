use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use simctl::core::configuration::{ConfigOptions, LogLevel};
use simctl::core::controller::Controller;
use simctl::core::logger::BufferedLogger;

#[derive(Parser)]
#[command(name = "simctl", about = "Run a discrete-event network simulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation to completion.
    Run {
        /// Path to the YAML configuration file.
        config: PathBuf,

        /// Path to the GML network topology (overrides the config's network.graph_path).
        #[arg(long)]
        graph: Option<PathBuf>,

        /// Override the configured PRNG seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warning => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let Commands::Run { config: config_path, graph, seed } = cli.command;

    let config_text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("could not read config file '{}'", config_path.display()))?;
    let mut config = ConfigOptions::from_yaml_str(&config_text)?;
    if let Some(seed) = seed {
        config.general.seed = Some(seed);
    }

    let logger =
        BufferedLogger::init(level_filter(config.general.log_level)).context("could not install logger")?;

    let graph_path = graph.unwrap_or_else(|| config.network.graph_path.clone());
    let graph_text = std::fs::read_to_string(&graph_path)
        .with_context(|| format!("could not read network graph '{}'", graph_path.display()))?;

    let controller = Controller::new(config, &graph_text)
        .context("controller initialization failed")?
        .with_logger(logger);

    controller.run()
}
