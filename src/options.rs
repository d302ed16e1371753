//! Options for the synthesis procedure.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

/// The strategy for choosing the next product state to explore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExplorationStrategy {
    /// Explore states in breadth-first order.
    #[default]
    #[value(name = "bfs")]
    Bfs,
    /// Explore states guided by their scores, alternating between the
    /// maximal and minimal score.
    #[value(name = "pq")]
    Pq,
}

/// The output format for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Machine controller in KISS format.
    #[value(name = "kiss")]
    Kiss,
    /// Machine controller as a DOT digraph.
    #[value(name = "dot")]
    Dot,
    /// Controller as an aiger circuit in ASCII format.
    #[default]
    #[value(name = "aag")]
    Aag,
    /// Parity game dump.
    #[value(name = "pg")]
    Pg,
}

/// Simplification applied to the LTL formula before translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Simplification {
    /// No simplification.
    #[value(name = "none")]
    None,
    /// Realizability-preserving simplification, fixing propositions of
    /// pure polarity to constants.
    #[default]
    #[value(name = "realizability")]
    Realizability,
}

/// Options of the synthesis procedure, independent of the CLI.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub exploration_strategy: ExplorationStrategy,
    /// Solve the game in parallel with the construction of the arena.
    pub onthefly: bool,
    /// Prune the exploration queue with winning verdicts of the solver.
    pub clear_queue: bool,
    /// Only decide realizability, do not construct a controller.
    pub only_realizability: bool,
    /// Label machine states with packed product states.
    pub labels: bool,
    /// Minimize the machine before output.
    pub machine_minimization: bool,
    /// Compact the colors of the game before solving.
    pub compact_colors: bool,
    pub ltl_simplification: Simplification,
    pub output_format: OutputFormat,
    /// Transform an LTLf input formula with this alive proposition.
    pub from_ltlf: Option<String>,
    /// Number of solver threads; zero selects automatically.
    pub threads: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            exploration_strategy: ExplorationStrategy::default(),
            onthefly: true,
            clear_queue: true,
            only_realizability: false,
            labels: false,
            machine_minimization: true,
            compact_colors: true,
            ltl_simplification: Simplification::default(),
            output_format: OutputFormat::default(),
            from_ltlf: None,
            threads: 0,
        }
    }
}

/// A tool for reactive synthesis of controllers from LTL specifications.
#[derive(Debug, Parser)]
#[command(name = "arbiter", version, about)]
pub struct CliOptions {
    /// The LTL formula to synthesize.
    #[arg(short = 'f', long = "formula", group = "input")]
    pub formula: Option<String>,

    /// Read the LTL formula from a file.
    #[arg(
        short = 'F',
        long = "input-file",
        group = "input",
        required_unless_present = "formula"
    )]
    pub input_file: Option<PathBuf>,

    /// Comma-separated list of input propositions.
    #[arg(long = "ins", value_delimiter = ',', num_args = 0..)]
    pub inputs: Vec<String>,

    /// Comma-separated list of output propositions.
    #[arg(long = "outs", value_delimiter = ',', num_args = 0..)]
    pub outputs: Vec<String>,

    /// Exploration strategy for the arena construction.
    #[arg(short = 'e', long = "exploration", value_enum, default_value_t)]
    pub exploration: ExplorationStrategy,

    /// Construct the arena completely before solving the game.
    #[arg(long = "no-onthefly")]
    pub no_onthefly: bool,

    /// Do not prune the exploration queue with solver verdicts.
    #[arg(long = "no-clear-queue")]
    pub no_clear_queue: bool,

    /// Only check realizability, do not construct a controller.
    #[arg(short = 'r', long = "realizability")]
    pub realizability: bool,

    /// Label machine states with the product states they represent.
    #[arg(long = "labels")]
    pub labels: bool,

    /// Do not minimize the machine before output.
    #[arg(long = "no-minimize")]
    pub no_minimize: bool,

    /// Do not compact the colors of the parity game.
    #[arg(long = "no-compact-colors")]
    pub no_compact_colors: bool,

    /// Simplification of the LTL formula.
    #[arg(long = "simplification", value_enum, default_value_t)]
    pub simplification: Simplification,

    /// Output format for the controller.
    #[arg(short = 'o', long = "output-format", value_enum, default_value_t)]
    pub output_format: OutputFormat,

    /// Write the controller to this file instead of stdout.
    #[arg(short = 'O', long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Transform LTLf (finite LTL) to LTL by introducing an alive
    /// proposition with the given name.
    #[arg(
        long = "from-ltlf",
        value_name = "ALIVE",
        num_args = 0..=1,
        default_missing_value = "alive"
    )]
    pub from_ltlf: Option<String>,

    /// Number of threads for the parity game solver; 0 selects
    /// automatically.
    #[arg(long = "threads", default_value_t = 0)]
    pub threads: usize,

    /// Increase verbosity; may be given multiple times.
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

impl From<&CliOptions> for SynthesisOptions {
    fn from(cli: &CliOptions) -> Self {
        Self {
            exploration_strategy: cli.exploration,
            onthefly: !cli.no_onthefly,
            clear_queue: !cli.no_clear_queue,
            only_realizability: cli.realizability,
            labels: cli.labels,
            machine_minimization: !cli.no_minimize,
            compact_colors: !cli.no_compact_colors,
            ltl_simplification: cli.simplification,
            output_format: cli.output_format,
            from_ltlf: cli.from_ltlf.clone(),
            threads: cli.threads,
        }
    }
}

impl CliOptions {
    /// The log level filter derived from the verbosity flags.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
