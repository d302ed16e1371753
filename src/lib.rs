//! Arbiter library crate for reactive synthesis of controllers from LTL
//! specifications.
//!
//! The pipeline translates the specification into a decomposed
//! deterministic parity automaton, lazily composes the decomposition into a
//! single parity condition over product states, constructs a two-player
//! parity game on the fly and solves it with a distance-based strategy
//! iteration running concurrently with the construction. When one side
//! wins, a Mealy or Moore machine is extracted and written as KISS, DOT or
//! an AIGER circuit.

pub mod automaton;
pub mod ltl;
pub mod options;
pub mod translator;
pub mod util;

mod arena;
mod machine;
mod solver;

pub use machine::aiger::AigerCircuit;
pub use machine::Machine;

use std::fmt;
use std::io;
use std::thread;

use log::{debug, info, warn};

use arena::{Arena, ArenaBuilder, ProductStates};
use automaton::tree::AutomatonTreeStructure;
use automaton::Player;
use ltl::AtomicPropositionStatus;
use machine::extract::extract_machine;
use options::{OutputFormat, Simplification, SynthesisOptions};
use solver::SiSolver;
use translator::fragment;

/// The realizability status for a specification.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    /// The specification is realizable.
    Realizable,
    /// The specification is unrealizable.
    Unrealizable,
    /// Realizability of the specification could not be determined.
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Realizable => "REALIZABLE",
                Self::Unrealizable => "UNREALIZABLE",
                Self::Unknown => "UNKNOWN",
            }
        )
    }
}

impl From<Player> for Status {
    fn from(player: Player) -> Self {
        match player {
            Player::Sys => Self::Realizable,
            Player::Env => Self::Unrealizable,
        }
    }
}

/// An error of the synthesis procedure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration of the procedure is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// The formula could not be parsed.
    #[error(transparent)]
    Parse(#[from] ltl::ParseError),
    /// The formula lies outside the supported fragment.
    #[error(transparent)]
    Unsupported(#[from] translator::fragment::UnsupportedError),
    /// The decomposed automaton could not be composed.
    #[error(transparent)]
    Tree(#[from] automaton::tree::TreeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A controller for a specification.
pub enum Controller {
    /// The parity game from which realizability was determined, rendered in
    /// the parity-game dump format.
    ParityGame(String),
    /// A controller in form of a Mealy or Moore machine.
    Machine(Machine),
    /// A controller in form of an aiger circuit.
    Aiger(AigerCircuit),
}

impl Controller {
    /// Writes the controller to the given writer in the format selected by
    /// the options.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs during the write operation.
    pub fn write<W: io::Write>(&self, mut writer: W, format: OutputFormat) -> io::Result<()> {
        match self {
            Self::ParityGame(dump) => writer.write_all(dump.as_bytes()),
            Self::Machine(machine) => match format {
                OutputFormat::Dot => machine.write_dot(&mut writer),
                _ => machine.write_kiss(&mut writer),
            },
            Self::Aiger(circuit) => circuit.write_ascii(&mut writer),
        }
    }
}

/// A result of the synthesis procedure.
pub struct SynthesisResult {
    status: Status,
    controller: Option<Controller>,
}

impl SynthesisResult {
    /// Returns the realizability status for the specification.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the controller for the specification, if one was produced.
    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    fn only_status(status: Status) -> Self {
        Self {
            status,
            controller: None,
        }
    }

    fn with_controller(status: Status, controller: Controller) -> Self {
        Self {
            status,
            controller: Some(controller),
        }
    }
}

/// Synthesizes an LTL specification with the given formula, input
/// propositions and output propositions, using default options.
///
/// # Errors
///
/// Returns an error for configuration problems, unparsable formulas and
/// formulas outside the supported fragment.
pub fn synthesize(ltl: &str, ins: &[&str], outs: &[&str]) -> Result<SynthesisResult, Error> {
    synthesize_with(ltl, ins, outs, &SynthesisOptions::default())
}

/// Synthesizes an LTL specification with the given options.
///
/// # Errors
///
/// Returns an error for configuration problems, unparsable formulas and
/// formulas outside the supported fragment.
pub fn synthesize_with(
    ltl: &str,
    ins: &[&str],
    outs: &[&str],
    options: &SynthesisOptions,
) -> Result<SynthesisResult, Error> {
    let num_inputs = ins.len();

    let mut aps: Vec<String> = Vec::with_capacity(ins.len() + outs.len() + 1);
    aps.extend(ins.iter().map(|s| s.to_string()));
    aps.extend(outs.iter().map(|s| s.to_string()));
    for (i, ap) in aps.iter().enumerate() {
        if aps[..i].contains(ap) {
            return Err(Error::Config(format!(
                "proposition '{}' occurs more than once",
                ap
            )));
        }
    }

    let mut formula = {
        let ap_refs: Vec<&str> = aps.iter().map(String::as_str).collect();
        ltl::parse(ltl, &ap_refs)?
    };
    debug!("parsed formula: {}", formula);

    if let Some(alive) = &options.from_ltlf {
        if aps.iter().any(|ap| ap == alive) {
            return Err(Error::Config(format!(
                "proposition '{}' for the LTLf transformation already appears in the list of \
                 propositions; rename it with a different argument to '--from-ltlf'",
                alive
            )));
        }
        // the alive proposition becomes an additional output
        let alive_index = aps.len();
        aps.push(alive.clone());
        formula = ltl::from_ltlf(&formula, alive_index);
        debug!("transformed LTLf formula: {}", formula);
    }
    let num_aps = aps.len();

    let (formula, statuses) = match options.ltl_simplification {
        Simplification::Realizability => {
            info!("applying realizability simplifications");
            formula.simplify_realizability(num_inputs, num_aps)
        }
        Simplification::None => (formula, vec![AtomicPropositionStatus::Used; num_aps]),
    };
    for (status, ap) in statuses.iter().zip(aps.iter()) {
        match status {
            AtomicPropositionStatus::Unused => {
                warn!("proposition {} not used in formula", ap)
            }
            AtomicPropositionStatus::True => {
                warn!("proposition {} can be fixed to true", ap)
            }
            AtomicPropositionStatus::False => {
                warn!("proposition {} can be fixed to false", ap)
            }
            AtomicPropositionStatus::Used => {}
        }
    }

    info!("creating decomposed automaton");
    let dpa = fragment::create_decomposed_automaton(&formula, statuses)?;
    let structure = AutomatonTreeStructure::new(dpa)?;
    debug!("product state tree:\n{}", structure);

    let inputs: Vec<String> = aps[..num_inputs].to_vec();
    let outputs: Vec<String> = aps[num_inputs..].to_vec();

    let arena = Arena::new(
        num_inputs,
        num_aps - num_inputs,
        &structure,
        options.clear_queue,
    );

    info!("exploring automaton and solving game");
    let builder = ArenaBuilder::new(
        &arena,
        &structure,
        options.exploration_strategy,
        options.only_realizability,
    );
    let mut solver = SiSolver::new(&arena, options.onthefly, options.threads, options.compact_colors);

    let product_states;
    if options.onthefly {
        product_states = thread::scope(|scope| {
            let solver_handle = scope.spawn(|| {
                solver.solve();
            });
            let product_states = builder.construct();
            solver_handle.join().expect("solver thread panicked");
            product_states
        });
    } else {
        product_states = builder.construct();
        solver.solve();
    }

    construct_result(&arena, solver, product_states, &inputs, &outputs, options)
}

fn construct_result(
    arena: &Arena,
    solver: SiSolver<'_>,
    product_states: ProductStates,
    inputs: &[String],
    outputs: &[String],
    options: &SynthesisOptions,
) -> Result<SynthesisResult, Error> {
    let (winner, strategy) = solver.into_strategy();
    let status = match winner {
        Some(player) => Status::from(player),
        None => Status::Unknown,
    };
    info!("game solved, status is {}", status);

    if options.output_format == OutputFormat::Pg {
        let mut dump = Vec::new();
        arena.write_parity_game(&mut dump, winner)?;
        let dump = String::from_utf8(dump).expect("dump is valid utf-8");
        return Ok(SynthesisResult::with_controller(
            status,
            Controller::ParityGame(dump),
        ));
    }

    let Some(winner) = winner else {
        return Ok(SynthesisResult::only_status(status));
    };
    if options.only_realizability {
        return Ok(SynthesisResult::only_status(status));
    }

    let labelled_states = options.labels.then_some(&product_states);
    let mut machine = extract_machine(arena, &strategy, winner, inputs, outputs, labelled_states);
    info!("machine has {} states", machine.num_states());

    if options.machine_minimization {
        machine.minimize();
    }
    machine.determinize();

    match options.output_format {
        OutputFormat::Kiss | OutputFormat::Dot => Ok(SynthesisResult::with_controller(
            status,
            Controller::Machine(machine),
        )),
        OutputFormat::Aag => {
            let circuit = AigerCircuit::from_machine(&machine);
            Ok(SynthesisResult::with_controller(
                status,
                Controller::Aiger(circuit),
            ))
        }
        OutputFormat::Pg => unreachable!("handled above"),
    }
}
