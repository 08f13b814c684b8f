mod cli;
mod execute;

use std::process::ExitCode;
use clap::Parser;
use luaupdate::error::EXIT_USAGE;
use crate::cli::CLI;

fn main() -> ExitCode {
    let cli = match CLI::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if let Err(e) = err.print() {
                eprintln!("{e}");
            }
            // --help and --version arrive here too
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();
    execute::execute(cli)
}
