//! tlsmatrix CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use tlsmatrix::{Config, ParameterCatalog, Reporter, RunSummary};

#[derive(Debug, Parser)]
#[command(name = "tlsmatrix")]
#[command(about = "parameter models, variant expansion and verdicts for TLS compliance tests")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "tlsmatrix.toml")]
    config: PathBuf,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every parameter type with its kind and links
    Catalog,

    /// Show the parameter model a scope declaration yields for a target
    Plan {
        /// JSON capability snapshot; defaults to `capabilities` from the config.
        #[arg(long)]
        capabilities: Option<PathBuf>,

        /// JSON scope declaration.
        #[arg(long)]
        declaration: PathBuf,

        /// Coverage strength override.
        #[arg(long)]
        strength: Option<usize>,
    },

    /// Render a JSON-lines verdict file
    Report {
        verdicts: PathBuf,

        #[arg(long, default_value = "pretty")]
        reporter: Reporter,

        /// Target label for the report header.
        #[arg(long, default_value = "unknown")]
        target: String,
    },

    /// Show version and effective configuration
    Env,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(&cli.log) {
        return print_error_and_exit(&cli, err);
    }
    let config = Config::load_optional(&cli.config);
    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    let catalog = ParameterCatalog::standard()?;
    match &cli.command {
        Command::Catalog => {
            let listing = tlsmatrix::catalog_listing(&catalog);
            if cli.json {
                print_json_or_text(cli, &listing)?;
            } else {
                println!("{}", listing.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Plan {
            capabilities,
            declaration,
            strength,
        } => {
            let capabilities = capabilities
                .clone()
                .or_else(|| config.capabilities.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!("no capability snapshot given (--capabilities or config)")
                })?;
            let mut config = config.clone();
            if let Some(strength) = strength {
                config.strength = *strength;
            }
            let report = tlsmatrix::plan_command(&config, &catalog, &capabilities, declaration)?;
            if cli.json {
                print_json_or_text(cli, &report)?;
            } else {
                println!("{}", report.pretty());
            }
            Ok(if report.disabled.is_some() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Report {
            verdicts,
            reporter,
            target,
        } => {
            let verdicts = tlsmatrix::read_verdict_lines(verdicts)?;
            let run_id = uuid::Uuid::new_v4().to_string();
            let summary = RunSummary::from_verdicts(run_id, target.clone(), verdicts);
            match reporter {
                Reporter::Pretty if !cli.json => println!("{}", summary.pretty()),
                Reporter::Junit => print!("{}", tlsmatrix::render_junit_xml(&summary)),
                _ => print_json_or_text(cli, &summary)?,
            }
            Ok(if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Env => {
            let info = tlsmatrix::env_info(config, &catalog);
            print_json_or_text(cli, &info)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json_or_text<T: serde::Serialize>(cli: &Cli, value: &T) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}
