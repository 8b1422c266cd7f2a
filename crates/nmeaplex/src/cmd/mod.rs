use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod check;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open the interfaces and multiplex sentences until all inputs end.
    Run(RunArgs),
    /// Validate interface declarations without opening them.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Interface declarations (`kind:name=value,...`).
    #[arg(value_name = "INTERFACE", required = true)]
    pub interfaces: Vec<String>,
    /// Capacity of the shared input queue.
    #[arg(long, value_name = "N", default_value_t = nmeaplex_core::DEFAULT_MUX_QSIZE, value_parser = parse_qsize_arg)]
    pub qsize: usize,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Interface declarations (`kind:name=value,...`).
    #[arg(value_name = "INTERFACE", required = true)]
    pub interfaces: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_qsize_arg(value: &str) -> Result<usize, String> {
    nmeaplex_core::parse_qsize(value).map_err(|err| err.to_string())
}
