mod commands;
mod helpers;

use clap::Parser;
use gmadconv_core::domain::LatticeError;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let lattice_error = error.as_lattice_error();
            eprintln!("{}", lattice_error.diagnostic_line());
            lattice_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("gmadconv".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();

    match Cli::try_parse_from(&full_args) {
        Ok(cli) => {
            init_tracing(cli.verbose);
            dispatch_parsed(cli.command, cli.verbose)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Logs go to stderr so stdout stays reserved for summaries.
fn init_tracing(verbose: bool) {
    TRACING.get_or_init(|| {
        let filter = if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

#[derive(Parser)]
#[command(
    name = "gmadconv",
    version,
    about = "Convert MAD8 savelines and MAD-X twiss tables to BDSIM GMAD and compare tracking output"
)]
struct Cli {
    /// Log every per-element decision
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Convert a saveline file to a GMAD lattice
    Convert(commands::ConvertArgs),
    /// Convert a MAD-X twiss table to a GMAD lattice
    ConvertTfs(commands::ConvertTfsArgs),
    /// Compare MAD-X optics against BDSIM optics
    CompareOptics(commands::CompareOpticsArgs),
    /// Compare reference and candidate particle distributions
    CompareTracks(commands::CompareTracksArgs),
    /// Run MAD-X and BDSIM on a lattice and compare the results
    Test(commands::TestArgs),
    /// Remove generated files from a lattice folder
    Clean(commands::CleanArgs),
}

fn dispatch_parsed(command: CliCommand, verbose: bool) -> Result<i32, CliError> {
    match command {
        CliCommand::Convert(args) => commands::run_convert_command(args, verbose),
        CliCommand::ConvertTfs(args) => commands::run_convert_tfs_command(args, verbose),
        CliCommand::CompareOptics(args) => commands::run_compare_optics_command(args),
        CliCommand::CompareTracks(args) => commands::run_compare_tracks_command(args),
        CliCommand::Test(args) => commands::run_test_command(args, verbose),
        CliCommand::Clean(args) => commands::run_clean_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Lattice(#[from] LatticeError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_lattice_error(&self) -> LatticeError {
        match self {
            Self::Usage(message) => {
                LatticeError::input_validation("INPUT.CLI_USAGE", message.trim_end().to_string())
            }
            Self::Lattice(error) => error.clone(),
            Self::Internal(error) => LatticeError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
