//! AIGER circuit construction from a deterministic machine.
//!
//! States are encoded in binary into latches; the next-state and output
//! functions are built as sums of products over the transition cubes, with
//! a prime-implicant pass to shrink the covers and structural hashing of
//! the AND gates.

use std::collections::HashMap;
use std::io;

use log::info;

use crate::automaton::Letter;
use crate::util::quine::prime_implicants;
use crate::util::specseq::{Bits, SpecSeq};

use super::Machine;

/// An AIGER literal: twice the variable index, plus one when negated.
type Literal = u32;

const FALSE_LITERAL: Literal = 0;
const TRUE_LITERAL: Literal = 1;

/// Cover widths up to which the prime-implicant pass is run.
const MAX_QUINE_BITS: u32 = 16;

/// An and-inverter circuit for a machine.
pub struct AigerCircuit {
    input_names: Vec<String>,
    output_names: Vec<String>,
    num_latches: usize,
    latch_next: Vec<Literal>,
    output_literals: Vec<Literal>,
    /// And gates as `(literal, left, right)`, in definition order.
    ands: Vec<(Literal, Literal, Literal)>,
    and_cache: HashMap<(Literal, Literal), Literal>,
    next_var: u32,
}

impl AigerCircuit {
    fn input_literal(&self, input: usize) -> Literal {
        2 * (1 + input as u32)
    }

    fn latch_literal(&self, latch: usize) -> Literal {
        2 * (1 + self.input_names.len() as u32 + latch as u32)
    }

    fn and(&mut self, lhs: Literal, rhs: Literal) -> Literal {
        let (lhs, rhs) = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
        if lhs == FALSE_LITERAL || lhs ^ 1 == rhs {
            return FALSE_LITERAL;
        }
        if lhs == TRUE_LITERAL || lhs == rhs {
            return rhs;
        }
        if let Some(&literal) = self.and_cache.get(&(lhs, rhs)) {
            return literal;
        }
        let literal = 2 * self.next_var;
        self.next_var += 1;
        self.ands.push((literal, lhs, rhs));
        self.and_cache.insert((lhs, rhs), literal);
        literal
    }

    fn or(&mut self, lhs: Literal, rhs: Literal) -> Literal {
        self.and(lhs ^ 1, rhs ^ 1) ^ 1
    }

    /// The conjunction of the literals of a cube over inputs and latches.
    fn cube_literal(&mut self, cube: SpecSeq<Letter>, num_bits: u32) -> Literal {
        let num_inputs = self.input_names.len();
        let mut result = TRUE_LITERAL;
        for b in 0..num_bits {
            if cube.unspecified.bit(b) {
                continue;
            }
            let var = if (b as usize) < num_inputs {
                self.input_literal(b as usize)
            } else {
                self.latch_literal(b as usize - num_inputs)
            };
            let literal = if cube.number.bit(b) { var } else { var ^ 1 };
            result = self.and(result, literal);
        }
        result
    }

    /// The disjunction over a cube cover.
    fn cover_literal(&mut self, mut cover: Vec<SpecSeq<Letter>>, num_bits: u32) -> Literal {
        if cover.is_empty() {
            return FALSE_LITERAL;
        }
        cover.sort();
        cover.dedup();
        let cover = if num_bits > 0 && num_bits <= MAX_QUINE_BITS {
            prime_implicants(num_bits, &cover)
        } else {
            cover
        };
        let mut result = FALSE_LITERAL;
        for cube in cover {
            let cube_literal = self.cube_literal(cube, num_bits);
            result = self.or(result, cube_literal);
        }
        result
    }

    /// Builds the circuit for a deterministic machine.
    pub(crate) fn from_machine(machine: &Machine) -> Self {
        assert!(
            machine.is_deterministic(),
            "can only construct a circuit from a deterministic machine"
        );
        let num_inputs = machine.input_names().len();
        let num_outputs = machine.output_names().len();
        let num_states = machine.num_states();
        let num_latches = if num_states > 1 {
            (u32::BITS - (num_states as u32 - 1).leading_zeros()) as usize
        } else {
            0
        };
        info!(
            "constructing aiger circuit with {} inputs and {} latches",
            num_inputs, num_latches
        );

        let mut circuit = Self {
            input_names: machine.input_names().to_vec(),
            output_names: machine.output_names().to_vec(),
            num_latches,
            latch_next: Vec::new(),
            output_literals: Vec::new(),
            ands: Vec::new(),
            and_cache: HashMap::new(),
            next_var: 1 + num_inputs as u32 + num_latches as u32,
        };

        let width = num_inputs as u32 + num_latches as u32;

        // one cover of (input, state) cubes per target bit
        let mut output_covers: Vec<Vec<SpecSeq<Letter>>> = vec![Vec::new(); num_outputs];
        let mut latch_covers: Vec<Vec<SpecSeq<Letter>>> = vec![Vec::new(); num_latches];

        for (state, transitions) in machine.states().iter().enumerate() {
            let state_cube = SpecSeq::with_unspecified((state as Letter) << num_inputs, 0);
            for transition in transitions {
                let alternative = &transition.outputs[0];
                let output = alternative.output[0];
                let successor = alternative.successor as Letter;
                for &input in &transition.input {
                    debug_assert_eq!(input.number >> num_inputs, 0);
                    let term = SpecSeq::with_unspecified(
                        input.number | state_cube.number,
                        input.unspecified & Letter::low_mask(num_inputs as u32),
                    );
                    for o in 0..num_outputs {
                        // unspecified output bits default to zero
                        if output.number.bit(o as u32) {
                            output_covers[o].push(term);
                        }
                    }
                    for l in 0..num_latches {
                        if successor.bit(l as u32) {
                            latch_covers[l].push(term);
                        }
                    }
                }
            }
        }

        let output_literals: Vec<Literal> = output_covers
            .into_iter()
            .map(|cover| circuit.cover_literal(cover, width))
            .collect();
        let latch_next: Vec<Literal> = latch_covers
            .into_iter()
            .map(|cover| circuit.cover_literal(cover, width))
            .collect();
        circuit.output_literals = output_literals;
        circuit.latch_next = latch_next;
        circuit
    }

    pub fn num_ands(&self) -> usize {
        self.ands.len()
    }

    pub fn num_latches(&self) -> usize {
        self.num_latches
    }

    /// Writes the circuit in ASCII AIGER (aag) format.
    pub fn write_ascii<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        let num_inputs = self.input_names.len();
        let max_var = self.next_var - 1;
        writeln!(
            writer,
            "aag {} {} {} {} {}",
            max_var,
            num_inputs,
            self.num_latches,
            self.output_literals.len(),
            self.ands.len()
        )?;
        for input in 0..num_inputs {
            writeln!(writer, "{}", self.input_literal(input))?;
        }
        for latch in 0..self.num_latches {
            writeln!(
                writer,
                "{} {}",
                self.latch_literal(latch),
                self.latch_next[latch]
            )?;
        }
        for &output in &self.output_literals {
            writeln!(writer, "{}", output)?;
        }
        for &(literal, lhs, rhs) in &self.ands {
            writeln!(writer, "{} {} {}", literal, lhs, rhs)?;
        }
        for (i, name) in self.input_names.iter().enumerate() {
            writeln!(writer, "i{} {}", i, name)?;
        }
        for latch in 0..self.num_latches {
            writeln!(writer, "l{} state{}", latch, latch)?;
        }
        for (o, name) in self.output_names.iter().enumerate() {
            writeln!(writer, "o{} {}", o, name)?;
        }
        writeln!(writer, "c")?;
        writeln!(writer, "{}", env!("CARGO_PKG_NAME"))?;
        Ok(())
    }
}

impl std::fmt::Display for AigerCircuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buffer = Vec::new();
        self.write_ascii(&mut buffer).map_err(|_| std::fmt::Error)?;
        f.write_str(&String::from_utf8(buffer).map_err(|_| std::fmt::Error)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Semantic, Transition, TransitionOutput};
    use super::*;

    #[test]
    fn constant_true_output_without_latches() {
        // one state, no inputs, output p always set
        let mut transition = Transition::new(vec![SpecSeq::any(0)]);
        transition
            .outputs
            .push(TransitionOutput::new(vec![SpecSeq::new(1)], 0));
        let machine = Machine::new(
            vec![],
            vec!["p".to_string()],
            Semantic::Mealy,
            vec![vec![transition]],
        );
        let circuit = AigerCircuit::from_machine(&machine);
        assert_eq!(circuit.num_latches(), 0);
        assert_eq!(circuit.num_ands(), 0);

        let mut out = Vec::new();
        circuit.write_ascii(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("aag 0 0 0 1 0\n1\n"));
    }

    #[test]
    fn echo_machine_circuit() {
        // one state, one input, output follows the input
        let mut high = Transition::new(vec![SpecSeq::new(1)]);
        high.outputs
            .push(TransitionOutput::new(vec![SpecSeq::new(1)], 0));
        let mut low = Transition::new(vec![SpecSeq::new(0)]);
        low.outputs
            .push(TransitionOutput::new(vec![SpecSeq::new(0)], 0));
        let machine = Machine::new(
            vec!["r".to_string()],
            vec!["g".to_string()],
            Semantic::Mealy,
            vec![vec![high, low]],
        );
        let circuit = AigerCircuit::from_machine(&machine);
        assert_eq!(circuit.num_latches(), 0);

        let mut out = Vec::new();
        circuit.write_ascii(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        // the output is the input literal itself
        assert!(text.contains("aag 1 1 0 1 0"));
        assert!(text.lines().nth(2).unwrap() == "2");
    }
}
