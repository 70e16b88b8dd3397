//! pushrun - push a recipe or a single resource to remote hosts

use std::process::ExitCode;

use clap::Parser;

use pushrun_cli::cli::Cli;
use pushrun_cli::output::json::format_error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            let message = format!("{e:#}");
            match format_error(&message, "error") {
                Ok(body) if json => println!("{body}"),
                _ => eprintln!("Error: {message}"),
            }
            ExitCode::FAILURE
        }
    }
}
