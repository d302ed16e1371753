//! Mealy and Moore machines extracted from solved games.

pub(crate) mod aiger;
pub(crate) mod extract;
mod minimize;

use std::collections::HashMap;
use std::fmt;
use std::io;

use log::info;

use crate::automaton::Letter;
use crate::util::specseq::{Bits, SpecSeq};

/// The type for an index of a machine state.
pub type StateId = u32;

/// Marker for the synthetic top state before it is materialized.
pub(crate) const TOP_STATE: StateId = StateId::MAX;
/// Marker for an unmapped state.
pub(crate) const NONE_STATE: StateId = StateId::MAX - 1;

/// Whether the machine implements the system (Mealy) or the environment
/// (Moore) strategy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Semantic {
    Mealy,
    Moore,
}

/// One alternative of a transition: an output-letter cover together with
/// the successor state reached under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransitionOutput {
    pub output: Vec<SpecSeq<Letter>>,
    pub successor: StateId,
}

impl TransitionOutput {
    pub(crate) fn new(output: Vec<SpecSeq<Letter>>, successor: StateId) -> Self {
        Self { output, successor }
    }
}

/// A transition: for the inputs covered by `input`, any of the alternatives
/// in `outputs` implements the strategy. The preferred alternative comes
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transition {
    pub input: Vec<SpecSeq<Letter>>,
    pub outputs: Vec<TransitionOutput>,
}

impl Transition {
    pub(crate) fn new(input: Vec<SpecSeq<Letter>>) -> Self {
        Self {
            input,
            outputs: Vec::new(),
        }
    }
}

/// Packed product-state labels of the machine states.
#[derive(Debug, Clone)]
pub struct MachineLabels {
    labels: Vec<SpecSeq<u32>>,
    accumulated_bits: Vec<usize>,
}

/// A Mealy or Moore machine with letters as partially-specified bit-vectors.
#[derive(Debug, Clone)]
pub struct Machine {
    inputs: Vec<String>,
    outputs: Vec<String>,
    semantic: Semantic,
    states: Vec<Vec<Transition>>,
    labels: Option<MachineLabels>,
}

impl Machine {
    pub(crate) fn new(
        inputs: Vec<String>,
        outputs: Vec<String>,
        semantic: Semantic,
        states: Vec<Vec<Transition>>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            semantic,
            states,
            labels: None,
        }
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    pub fn output_names(&self) -> &[String] {
        &self.outputs
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    pub(crate) fn set_labels(&mut self, labels: Vec<SpecSeq<u32>>, accumulated_bits: Vec<usize>) {
        assert_eq!(labels.len(), self.states.len());
        self.labels = Some(MachineLabels {
            labels,
            accumulated_bits,
        });
    }

    pub(crate) fn states(&self) -> &[Vec<Transition>] {
        &self.states
    }

    /// A machine is deterministic if every transition has exactly one
    /// remaining alternative with a single output letter.
    pub(crate) fn is_deterministic(&self) -> bool {
        !self.states.is_empty()
            && self.states.iter().flatten().all(|transition| {
                transition.outputs.len() == 1 && transition.outputs[0].output.len() == 1
            })
    }

    /// Resolves all remaining non-determinism: among the alternatives of
    /// each transition the most used successor is kept, then the most used
    /// output letter, so that common shapes share circuit structure.
    pub(crate) fn determinize(&mut self) {
        info!("determinizing machine with {} states", self.num_states());

        let mut output_count: HashMap<SpecSeq<Letter>, usize> = HashMap::new();
        let mut successor_count: HashMap<StateId, usize> = HashMap::new();
        for transition in self.states.iter().flatten() {
            for alternative in &transition.outputs {
                *successor_count.entry(alternative.successor).or_insert(0) += 1;
                for &cube in &alternative.output {
                    *output_count.entry(cube).or_insert(0) += 1;
                }
            }
        }

        for transition in self.states.iter_mut().flatten() {
            let best = transition
                .outputs
                .iter()
                .enumerate()
                .max_by_key(|(index, alternative)| {
                    (
                        successor_count[&alternative.successor],
                        std::cmp::Reverse(*index),
                    )
                })
                .map(|(index, _)| index)
                .expect("transition without alternatives");
            transition.outputs.swap(0, best);
            transition.outputs.truncate(1);
            let alternative = &mut transition.outputs[0];
            let best_cube = alternative
                .output
                .iter()
                .copied()
                .max_by_key(|cube| output_count[cube])
                .expect("alternative without output letters");
            alternative.output = vec![best_cube];
        }

        let reachable = self.reachable_states();
        if reachable.iter().any(|&r| !r) {
            *self = self.remove_states(&reachable);
        }
        info!("determinized machine has {} states", self.num_states());
    }

    pub(crate) fn reachable_states(&self) -> Vec<bool> {
        let n = self.num_states();
        let mut reachable = vec![false; n];
        let mut queue = std::collections::VecDeque::with_capacity(n);
        reachable[0] = true;
        queue.push_back(0_usize);
        while let Some(state) = queue.pop_front() {
            for transition in &self.states[state] {
                for alternative in &transition.outputs {
                    let successor = alternative.successor as usize;
                    if !reachable[successor] {
                        reachable[successor] = true;
                        queue.push_back(successor);
                    }
                }
            }
        }
        reachable
    }

    /// Returns a copy of the machine without the states not marked in
    /// `keep`, dropping alternatives into removed states.
    pub(crate) fn remove_states(&self, keep: &[bool]) -> Self {
        let n = self.num_states();
        let mut state_mapping = vec![0_usize; n];
        let mut next = 0;
        for (index, &kept) in keep.iter().enumerate() {
            if kept {
                state_mapping[index] = next;
                next += 1;
            }
        }
        assert!(keep[0], "initial state must be kept");

        let mut new_states = Vec::with_capacity(next);
        let mut new_labels = self.labels.as_ref().map(|labels| MachineLabels {
            labels: Vec::with_capacity(next),
            accumulated_bits: labels.accumulated_bits.clone(),
        });
        for (index, transitions) in self.states.iter().enumerate() {
            if !keep[index] {
                continue;
            }
            let mut new_transitions = Vec::with_capacity(transitions.len());
            for transition in transitions {
                let mut new_transition = Transition::new(transition.input.clone());
                for alternative in &transition.outputs {
                    if keep[alternative.successor as usize] {
                        new_transition.outputs.push(TransitionOutput::new(
                            alternative.output.clone(),
                            state_mapping[alternative.successor as usize] as StateId,
                        ));
                    }
                }
                match self.semantic {
                    Semantic::Mealy => {
                        assert!(!new_transition.outputs.is_empty());
                        new_transitions.push(new_transition);
                    }
                    Semantic::Moore => {
                        // in a Moore machine the adversary picks the input,
                        // so a transition must keep all its alternatives
                        if new_transition.outputs.len() == transition.outputs.len() {
                            new_transitions.push(new_transition);
                        }
                    }
                }
            }
            assert!(transitions.is_empty() || !new_transitions.is_empty());
            new_states.push(new_transitions);
            if let (Some(new_labels), Some(labels)) = (new_labels.as_mut(), self.labels.as_ref())
            {
                new_labels.labels.push(labels.labels[index]);
            }
        }

        Machine {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            semantic: self.semantic,
            states: new_states,
            labels: new_labels,
        }
    }

    /// Minimizes the machine, falling back to the unminimized machine if
    /// the SAT-based minimization fails.
    pub fn minimize(&mut self) {
        match self.minimize_with_nondeterminism() {
            Some(minimized) => *self = minimized,
            None => info!("minimization failed, keeping the unminimized machine"),
        }
    }

    fn state_name(&self, state: usize) -> String {
        match &self.labels {
            Some(labels) => labels.labels[state].display_vector(&labels.accumulated_bits),
            None => format!("S{}", state),
        }
    }

    /// Writes the machine in KISS format.
    pub fn write_kiss<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, ".inputs")?;
        for input in &self.inputs {
            write!(writer, " {}", input)?;
        }
        writeln!(writer)?;
        write!(writer, ".outputs")?;
        for output in &self.outputs {
            write!(writer, " {}", output)?;
        }
        writeln!(writer)?;
        writeln!(writer, ".i {}", self.num_inputs())?;
        writeln!(writer, ".o {}", self.num_outputs())?;
        let n_transitions: usize = self
            .states
            .iter()
            .flatten()
            .map(|transition| transition.input.len())
            .sum();
        writeln!(writer, ".p {}", n_transitions)?;
        writeln!(writer, ".s {}", self.num_states())?;
        writeln!(writer, ".r {}", self.state_name(0))?;
        for (state, transitions) in self.states.iter().enumerate() {
            for transition in transitions {
                let alternative = &transition.outputs[0];
                for input in &transition.input {
                    write!(
                        writer,
                        "{} {} {} ",
                        input.display(self.num_inputs() as u32),
                        self.state_name(state),
                        self.state_name(alternative.successor as usize),
                    )?;
                    for (i, output) in alternative.output.iter().enumerate() {
                        if i > 0 {
                            write!(writer, " + ")?;
                        }
                        write!(writer, "{}", output.display(self.num_outputs() as u32))?;
                    }
                    writeln!(writer)?;
                }
            }
        }
        Ok(())
    }

    /// Writes the machine as a DOT digraph.
    pub fn write_dot<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "digraph \"\" {{")?;
        writeln!(writer, "graph [rankdir=LR,ranksep=0.8,nodesep=0.2];")?;
        writeln!(writer, "node [shape=circle];")?;
        writeln!(writer, "edge [fontname=mono];")?;
        writeln!(writer, "init [shape=point,style=invis];")?;
        for state in 0..self.num_states() {
            writeln!(writer, "{} [label=\"{}\"];", state, self.state_name(state))?;
        }
        writeln!(writer, "init -> 0;")?;
        for (state, transitions) in self.states.iter().enumerate() {
            // group transition letters by successor
            let mut grouped: std::collections::BTreeMap<StateId, Vec<String>> = Default::default();
            for transition in transitions {
                let alternative = &transition.outputs[0];
                for input in &transition.input {
                    let mut label = input.display(self.num_inputs() as u32);
                    label.push('/');
                    for (i, output) in alternative.output.iter().enumerate() {
                        if i > 0 {
                            label.push('+');
                        }
                        label.push_str(&output.display(self.num_outputs() as u32));
                    }
                    grouped
                        .entry(alternative.successor)
                        .or_default()
                        .push(label);
                }
            }
            for (successor, labels) in grouped {
                writeln!(
                    writer,
                    "{} -> {} [label=\"{}\\l\"];",
                    state,
                    successor,
                    labels.join("\\l")
                )?;
            }
        }
        writeln!(writer, "}}")
    }

    /// Runs the deterministic machine on a sequence of input letters and
    /// returns the emitted output letters.
    pub fn simulate(&self, input_letters: &[Letter]) -> Vec<SpecSeq<Letter>> {
        assert!(self.is_deterministic(), "can only simulate deterministic machines");
        let mask = Letter::low_mask(self.num_inputs() as u32);
        let mut state = 0_usize;
        let mut result = Vec::with_capacity(input_letters.len());
        for &letter in input_letters {
            let letter = letter & mask;
            let transition = self.states[state]
                .iter()
                .find(|transition| {
                    transition
                        .input
                        .iter()
                        .any(|cube| (letter ^ cube.number) & !cube.unspecified & mask == 0)
                })
                .expect("no transition for input letter");
            let alternative = &transition.outputs[0];
            result.push(alternative.output[0]);
            state = alternative.successor as usize;
        }
        result
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_kiss(&mut buffer).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8(buffer).map_err(|_| fmt::Error)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(number: Letter, unspecified: Letter) -> SpecSeq<Letter> {
        SpecSeq::with_unspecified(number, unspecified)
    }

    /// A two-state machine over one input and one output that echoes the
    /// input with one step of nondeterministic slack in state 0.
    fn example_machine() -> Machine {
        let states = vec![
            vec![Transition {
                input: vec![cube(0, 1)],
                outputs: vec![
                    TransitionOutput::new(vec![cube(1, 0)], 1),
                    TransitionOutput::new(vec![cube(0, 0), cube(1, 0)], 0),
                ],
            }],
            vec![Transition {
                input: vec![cube(0, 1)],
                outputs: vec![TransitionOutput::new(vec![cube(1, 0)], 1)],
            }],
        ];
        Machine::new(
            vec!["r".to_string()],
            vec!["g".to_string()],
            Semantic::Mealy,
            states,
        )
    }

    #[test]
    fn determinize_keeps_most_used_successor() {
        let mut machine = example_machine();
        assert!(!machine.is_deterministic());
        machine.determinize();
        assert!(machine.is_deterministic());
        // successor 1 is used twice, so state 0 now moves to state 1
        assert_eq!(machine.states()[0][0].outputs[0].successor, 1);
    }

    #[test]
    fn simulate_emits_outputs() {
        let mut machine = example_machine();
        machine.determinize();
        let outputs = machine.simulate(&[0, 1, 0]);
        assert_eq!(outputs.len(), 3);
        for output in outputs {
            assert_eq!(output, cube(1, 0));
        }
    }

    #[test]
    fn kiss_output_shape() {
        let mut machine = example_machine();
        machine.determinize();
        let text = machine.to_string();
        assert!(text.contains(".inputs r"));
        assert!(text.contains(".outputs g"));
        assert!(text.contains(".s 2"));
        assert!(text.contains(".r S0"));
    }
}
