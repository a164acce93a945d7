use std::process::ExitCode;

use clap::Parser;

use sanetree::cli::{run, Cli};
use sanetree::observability::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose.then_some("sanetree=debug"));

    match run(&cli) {
        Ok(value) => {
            let text = if cli.pretty {
                serde_json::to_string_pretty(&value)
            } else {
                serde_json::to_string(&value)
            };
            match text {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!("failed to encode output: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("sanetree: {e}");
            ExitCode::FAILURE
        }
    }
}
