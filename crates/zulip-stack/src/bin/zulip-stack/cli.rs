//! zulip-stack cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; zulip-stack ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the template and print it
    #[command(alias = "synthesize")]
    Synth(SynthCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct SynthCommand {
    #[clap(flatten)]
    pub stack: StackArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct StackArgs {
    /// Name of the stack
    #[clap(long = "stack-name", default_value = "zulip")]
    pub stack_name: String,

    /// Build for a region
    ///
    /// The machine image is selected while building and the build fails
    /// when the region has no image. Without a region the image is looked
    /// up at deploy time.
    #[clap(long = "region")]
    pub region: Option<String>,

    /// Account to build for, requires --region
    #[clap(long = "account", requires("region"))]
    pub account: Option<String>,

    /// Supply a parameter value as KEY=VALUE
    ///
    /// Can be specified multiple times. Applied after parameter files.
    #[clap(short = 'p', long = "parameter")]
    pub parameters: Vec<String>,

    /// Load parameter values from a .json, .yaml/.yml or .hcl file
    ///
    /// Can be specified multiple times, later files win.
    #[clap(short = 'f', long = "parameters-file")]
    pub parameter_files: Vec<PathBuf>,

    /// Instance bootstrap script
    #[clap(long = "user-data", default_value = "zulip/launch_config_user_data.sh")]
    pub user_data: PathBuf,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Nodes and their dependencies
    Graph(StackArgs),
    /// Declared parameters and their effective values
    Parameters(StackArgs),
    /// Regions with a machine image
    Regions,
}
