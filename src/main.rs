//! wirecast - Main Entry Point
//!
//! Reads a circuit file in one of the three textual forms, evaluates it over
//! the broker and prints the requested answers.

use anyhow::{bail, ensure, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wirecast::circuits::{adder, gates, transfer};
use wirecast::config::{DeliveryPolicy, EngineConfig, LoggingConfig};
use wirecast::Evaluator;

#[derive(Parser, Debug)]
#[command(name = "wirecast")]
#[command(about = "Evaluate wire circuits by message passing", version)]
struct Args {
    /// Engine config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Deadline for one evaluation in milliseconds (0 waits forever)
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,

    /// Use unbounded mailboxes instead of best-effort delivery
    #[arg(long, global = true)]
    reliable: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a gate circuit and print the signal on a wire
    Gates {
        file: PathBuf,

        /// Wire to read
        #[arg(long, default_value = "a")]
        wire: String,

        /// Run again with this wire driven by the first result
        #[arg(long = "override-from-first")]
        override_from_first: Option<String>,
    },

    /// Run a chip transfer network
    Transfer {
        file: PathBuf,

        /// Chip pair whose comparing bot is reported
        #[arg(long, value_delimiter = ',', default_value = "17,61")]
        compare: Vec<u16>,

        /// Output bins whose chips are multiplied
        #[arg(long, value_delimiter = ',', default_value = "0,1,2")]
        outputs: Vec<u32>,
    },

    /// Evaluate a boolean adder and print the number on its z wires
    Adder { file: PathBuf },

    /// Write the default engine config as TOML
    ConfigInit {
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct GatesAnswer {
    wire: String,
    signal: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    rewired: Option<u16>,
}

#[derive(Serialize)]
struct TransferAnswer {
    compared: (u16, u16),
    comparator: Option<u32>,
    outputs: Vec<u32>,
    product: Option<u64>,
}

#[derive(Serialize)]
struct AdderAnswer {
    z: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.evaluation.timeout_ms = timeout_ms;
    }
    if args.reliable {
        config.broker.delivery = DeliveryPolicy::Reliable;
    }
    config.validate()?;

    let _guard = init_logging(&config.logging)?;
    tracing::info!(
        "wirecast {} ({} delivery)",
        env!("CARGO_PKG_VERSION"),
        config.broker.delivery
    );

    let evaluator = Evaluator::new(&config);
    match args.command {
        Command::Gates {
            file,
            wire,
            override_from_first,
        } => {
            let text = read_input(&file)?;
            let instructions = gates::parse::<u16>(&text)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let signal = gates::signal_on(&evaluator, instructions.clone(), &wire)?;
            let rewired = match override_from_first {
                Some(target) => {
                    let mut instructions = instructions;
                    gates::override_wire(&mut instructions, &target, signal)?;
                    Some(gates::signal_on(&evaluator, instructions, &wire)?)
                }
                None => None,
            };

            let answer = GatesAnswer {
                wire,
                signal,
                rewired,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("Signal on {}: {}", answer.wire, answer.signal);
                if let Some(rewired) = answer.rewired {
                    println!("Signal on {} after rewiring: {}", answer.wire, rewired);
                }
            }
        }
        Command::Transfer {
            file,
            compare,
            outputs,
        } => {
            ensure!(
                compare.len() == 2,
                "--compare takes exactly two chip values, got {}",
                compare.len()
            );
            let text = read_input(&file)?;
            let instructions = transfer::parse::<u16>(&text)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let outcome = transfer::run(&evaluator, instructions)?;
            let answer = TransferAnswer {
                compared: (compare[0], compare[1]),
                comparator: outcome.comparator(compare[0], compare[1]),
                product: outcome.product(&outputs),
                outputs,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                match answer.comparator {
                    Some(bot) => println!("Bot comparing {:?}: {}", answer.compared, bot),
                    None => println!("No bot compared {:?}", answer.compared),
                }
                match answer.product {
                    Some(product) => {
                        println!("Product of outputs {:?}: {}", answer.outputs, product)
                    }
                    None => println!("Outputs {:?} are not all filled", answer.outputs),
                }
            }
        }
        Command::Adder { file } => {
            let text = read_input(&file)?;
            let instructions = adder::parse::<u8>(&text)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let answer = AdderAnswer {
                z: adder::z_number(&evaluator, instructions)?,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("Number on z wires: {}", answer.z);
            }
        }
        Command::ConfigInit { path, force } => config_init(path.as_deref(), force)?,
    }

    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match explicit {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default_path()
            .map(|path| EngineConfig::load_or_default(path))
            .unwrap_or_default()),
    }
}

fn config_init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => EngineConfig::default_path().context("No platform config directory")?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    EngineConfig::default().save(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Console logging on stderr, plus an optional non-blocking log file. The
/// returned guard flushes the file writer when dropped.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let name = path
                .file_name()
                .with_context(|| format!("Log file {} has no file name", path.display()))?;
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
