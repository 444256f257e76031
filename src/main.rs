//! stegotriage CLI entry point.

use clap::error::ErrorKind;
use clap::Parser;
use stegotriage::cli::{self, Cli, Commands, EXIT_SUCCESS, EXIT_USAGE};
use stegotriage::logging;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    logging::init_tracing(cli.verbose, cli.log_json);

    let exit_code = match cli.command {
        Commands::Analyze(args) => match cli::run_analyze(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_USAGE
            }
        },
        Commands::Tools(args) => match cli::run_tools(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_USAGE
            }
        },
    };

    std::process::exit(exit_code);
}
