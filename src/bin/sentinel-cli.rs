use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use connection_sentinel::config::validation::validate_against;
use connection_sentinel::config::{load_options, parse_duration};
use connection_sentinel::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "sentinel-cli")]
#[command(about = "Management CLI for connection-sentinel options", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate an options file, then print it as JSON
    Validate {
        path: PathBuf,

        /// Connection names the options will be used with; enables failover checks
        #[arg(short, long = "connection")]
        connections: Vec<String>,
    },
    /// Parse a duration string (e.g. 30s, 5m) and print it in milliseconds
    Duration { value: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Validate { path, connections } => {
            let options = load_options(&path)?;
            tracing::debug!(path = %path.display(), "Options loaded");

            if !connections.is_empty() {
                if let Err(errors) = validate_against(&options, connections.iter().map(String::as_str)) {
                    for e in &errors {
                        eprintln!("  - {}", e);
                    }
                    return Err(format!("{} validation error(s)", errors.len()).into());
                }
            }

            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Commands::Duration { value } => {
            let duration = parse_duration(&value)?;
            println!("{}", duration.as_millis());
        }
    }
    Ok(())
}
