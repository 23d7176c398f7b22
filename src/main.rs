use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod generation;
mod models;
mod output;
mod rate_limit;
mod repair;
mod runner;
mod slice;
mod summary;
mod validation;

use crate::config::Config;
use crate::generation::OpenAiGenerator;
use crate::output::OutputFormat;
use crate::runner::Runner;
use crate::validation::SparqlEndpoint;

/// Text-to-SPARQL batch evaluation - generate queries for benchmark questions and validate them against an endpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain", global = true)]
    output: OutputFormat,

    /// Verbose output - log progress for each request
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a query for every question in the input CSV files
    Generate {
        /// Path to the TOML run file
        run_file: PathBuf,
    },
    /// Repair generated queries into the configured repaired_dir
    Repair {
        /// Path to the TOML run file
        run_file: PathBuf,
    },
    /// Validate generated queries against the endpoint and write the summary
    Validate {
        /// Path to the TOML run file
        run_file: PathBuf,
    },
    /// Generate, repair (when configured) and validate in one go
    Run {
        /// Path to the TOML run file
        run_file: PathBuf,
    },
    /// Split large JSON array files into size-bounded parts
    Slice {
        /// JSON files holding one top-level array each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Maximum bytes of single-line JSON per part
        #[arg(long, default_value_t = slice::DEFAULT_MAX_BYTES)]
        max_bytes: usize,
        /// Directory for the parts, defaults to each input's directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Generate { run_file } => {
            let config = Config::from_file(&run_file)?;
            let generator = OpenAiGenerator::new(config.generation.clone())?;
            let output_dir = config.paths.generated_dir.clone();

            let rows = Runner::new(config).generate_all(&generator).await?;
            println!("Wrote {} row(s) to {}", rows, output_dir.display());
        }
        Command::Repair { run_file } => {
            let config = Config::from_file(&run_file)?;

            let changed = Runner::new(config).repair_all()?;
            println!("Repaired {} query(ies)", changed);
        }
        Command::Validate { run_file } => {
            let config = Config::from_file(&run_file)?;
            let endpoint = SparqlEndpoint::new(config.endpoint.clone())?;

            let report = Runner::new(config).validate_all(&endpoint).await?;
            output::print_summary(&report, args.output);
        }
        Command::Run { run_file } => {
            let config = Config::from_file(&run_file)?;
            let generator = OpenAiGenerator::new(config.generation.clone())?;
            let endpoint = SparqlEndpoint::new(config.endpoint.clone())?;

            let report = Runner::new(config).run(&generator, &endpoint).await?;
            output::print_summary(&report, args.output);
        }
        Command::Slice {
            inputs,
            max_bytes,
            output_dir,
        } => {
            for input in &inputs {
                let target = match &output_dir {
                    Some(dir) => dir.clone(),
                    None => input
                        .parent()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_default(),
                };
                let report = slice::slice_json_array(input, &target, max_bytes)?;
                println!(
                    "Sliced {} into {} part(s) ({} total entries)",
                    input.display(),
                    report.parts.len(),
                    report.items
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_file_documented_on_every_subcommand() {
        let mut cmd = Args::command();
        for name in ["generate", "repair", "validate", "run"] {
            let sub = cmd.find_subcommand_mut(name).unwrap();
            let help = sub.render_help().to_string();
            assert!(help.contains("Path to the TOML run file"), "{}: {}", name, help);
        }
    }

    #[test]
    fn test_parse_slice_defaults() {
        let args = Args::try_parse_from(["text2sparql-eval", "slice", "big.json"]).unwrap();
        match args.command {
            Command::Slice {
                inputs,
                max_bytes,
                output_dir,
            } => {
                assert_eq!(inputs, vec![PathBuf::from("big.json")]);
                assert_eq!(max_bytes, slice::DEFAULT_MAX_BYTES);
                assert!(output_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
