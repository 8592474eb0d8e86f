//! Command-line surface for the `yascheduler` daemon.

use std::path::PathBuf;

use clap::{crate_authors, crate_description, crate_name, crate_version, Parser};

#[derive(Parser)]
#[command(disable_version_flag = true)]
#[clap(name = crate_name!(), about = crate_description!())]
#[clap(version = crate_version!(), author = crate_authors!())]
pub struct Opts {
    /// Configuration file.
    #[clap(short = 'c', long, default_value = "/etc/yascheduler/yascheduler.conf")]
    pub config: PathBuf,
    /// Verbose mode (can be repeated: -v for debug, -vv for trace).
    /// Ignored when `RUST_LOG` is set.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// Run the scheduler controller loop until a termination signal arrives.
    Run(RunOpts),
    /// Submit a task described by a JSON metadata file.
    Submit(SubmitOpts),
    /// Display the parsed configuration.
    Config,
    /// Print version information.
    Version,
}

#[derive(Debug, Parser)]
pub struct RunOpts {
    /// Seconds between scheduler passes.
    #[clap(short = 'i', long, default_value_t = 60)]
    pub interval: u64,
}

#[derive(Debug, Parser)]
pub struct SubmitOpts {
    /// Free-form label for the task.
    pub label: String,
    /// Engine name to run this task with.
    pub engine: String,
    /// Path to a JSON file with the task metadata (input file contents
    /// keyed by name, plus any extra fields the submitter wants kept).
    pub metadata: PathBuf,
}
