use clap::{Args, Parser, Subcommand, ValueEnum};
use linmu_rs::EpochKey;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "linmu",
    version,
    about = "Linearized position and multiunit dataset builder",
    long_about = "Build per-epoch datasets of linearized position, multiunit spike features and\n\
                  population firing rate from animal data directories.\n\
                  The configuration is read from --config, $LINMU_CONFIG or the user config\n\
                  directory (linmu/config.json), falling back to built-in defaults."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the dataset for one epoch
    Build(BuildArgs),
    /// Build many epochs in parallel
    Batch(BatchArgs),
    /// Show the track graph and its linear layout
    Graph(GraphArgs),
    /// List the configured animals
    Animals(AnimalsArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
    /// Check a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Default)]
pub struct ConfigSource {
    /// Pipeline configuration file (JSON)
    #[arg(long, env = "LINMU_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecoderArg {
    /// Nearest edge per sample
    Greedy,
    /// Hidden Markov model over edges
    Hmm,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Epoch as animal:day:epoch, e.g. CH105:3:2
    #[arg(long)]
    pub epoch: EpochKey,

    #[command(flatten)]
    pub source: ConfigSource,

    /// Override the configured linearization decoder
    #[arg(long, value_enum)]
    pub decoder: Option<DecoderArg>,

    /// Print a summary instead of the full dataset
    #[arg(long, default_value_t = false)]
    pub summary: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Epochs as animal:day:epoch (default: every epoch found for --animals)
    #[arg(long, num_args = 1..)]
    pub epochs: Option<Vec<EpochKey>>,

    /// Animals to scan for epochs (default: all configured animals)
    #[arg(long, num_args = 1..)]
    pub animals: Option<Vec<String>>,

    #[command(flatten)]
    pub source: ConfigSource,

    /// Override the configured linearization decoder
    #[arg(long, value_enum)]
    pub decoder: Option<DecoderArg>,

    /// Write one full dataset per epoch into this directory instead of
    /// summary lines on stdout
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads (default: one per core)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Keep going after a failed epoch
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List the epochs that would be built and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct AnimalsArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Print the built-in defaults, ignoring any configuration file
    #[arg(long, default_value_t = false)]
    pub defaults: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Configuration file to check
    #[arg(long)]
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
