//! SAT-based machine minimization.
//!
//! The successor alternatives left in the machine by the extractor form a
//! non-deterministic strategy. A minimal subset of states that contains the
//! initial state and is closed under some choice of alternatives is found
//! with an incremental cardinality encoding; dropping all other states
//! preserves the strategy.

use log::{debug, error, info};
use varisat::{ExtendFormula, Lit, Solver};

use super::{Machine, Semantic};

/// Adds one row of the removal ladder to the solver and asserts it.
///
/// The ladder is a sequential-counter cardinality encoding (in the style of
/// Ben-Haim et al.): entry `i` of the row for `bound` implies that at least
/// `bound` of `state_vars[..=i + bound - 1]` are false, and each row is
/// chained to the previous one, so asserting the final entry demands one
/// removal more than the row before. Returns the row for the next chaining
/// step.
fn tighten_removals(
    solver: &mut Solver,
    state_vars: &[Lit],
    bound: usize,
    previous: Option<&[Lit]>,
) -> Vec<Lit> {
    let width = state_vars.len() - bound + 1;
    let row: Vec<Lit> = (0..width).map(|_| solver.new_lit()).collect();
    solver.add_clause(&[!row[0], !state_vars[bound - 1]]);
    for i in 1..width {
        solver.add_clause(&[!row[i], row[i - 1], !state_vars[i + bound - 1]]);
    }
    if let Some(previous) = previous {
        for i in 0..width {
            solver.add_clause(&[!row[i], previous[i]]);
        }
    }
    solver.add_clause(&[row[width - 1]]);
    row
}

/// Finds an assignment of the constraints already in the solver that sets
/// as few of the given state vars as possible, by demanding one removal
/// more per round until the solver gives up.
///
/// Assumes the constraints are satisfiable with every state kept. Returns
/// the keep flag per state; solver failures simply stop the descent, so
/// the best assignment found so far survives.
fn fewest_states(solver: &mut Solver, state_vars: &[Lit]) -> Vec<bool> {
    let n = state_vars.len();
    let mut keep = vec![true; n];
    let mut removed = 0;

    let mut ladder: Option<Vec<Lit>> = None;
    for bound in 1..=n {
        let row = tighten_removals(solver, state_vars, bound, ladder.as_deref());
        ladder = Some(row);

        if bound <= removed {
            // a solution below this bound was already found along the way
            continue;
        }
        match solver.solve() {
            Ok(true) => {
                let model = solver.model().unwrap();
                for (flag, var) in keep.iter_mut().zip(state_vars) {
                    *flag = model[var.index()].is_positive();
                }
                removed = keep.iter().filter(|&&kept| !kept).count();
                debug_assert!(removed >= bound);
            }
            Ok(false) => break,
            Err(err) => {
                error!("sat solver failed: {}", err);
                break;
            }
        }
    }
    keep
}

impl Machine {
    /// Minimizes the machine by removing states that no choice of successor
    /// alternatives needs to reach. Returns `None` if nothing was removed.
    pub(crate) fn minimize_with_nondeterminism(&self) -> Option<Machine> {
        info!(
            "minimizing machine with {} states using successor non-determinism",
            self.num_states()
        );

        let mut solver = Solver::new();
        let state_vars: Vec<_> = (0..self.num_states()).map(|_| solver.new_lit()).collect();
        // the initial state is reachable
        solver.add_clause(&[state_vars[0]]);
        for (index, transitions) in self.states().iter().enumerate() {
            let state_var = state_vars[index];
            for transition in transitions {
                match self.semantic {
                    Semantic::Mealy => {
                        // a reachable state keeps some alternative per input
                        let mut clause = Vec::with_capacity(1 + transition.outputs.len());
                        clause.push(!state_var);
                        clause.extend(
                            transition
                                .outputs
                                .iter()
                                .map(|alternative| state_vars[alternative.successor as usize]),
                        );
                        solver.add_clause(&clause);
                    }
                    Semantic::Moore => {
                        // the adversary picks the input, every successor of a
                        // reachable state stays reachable
                        for alternative in &transition.outputs {
                            solver.add_clause(&[
                                !state_var,
                                state_vars[alternative.successor as usize],
                            ]);
                        }
                    }
                }
            }
        }

        let keep = fewest_states(&mut solver, &state_vars);
        let removed = keep.iter().filter(|&&kept| !kept).count();
        if removed == 0 {
            debug!("no states could be removed");
            return None;
        }

        let minimized = self.remove_states(&keep);
        info!("minimized machine has {} states", minimized.num_states());
        Some(minimized)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{StateId, Transition, TransitionOutput};
    use super::*;
    use crate::util::specseq::SpecSeq;

    fn transition(successors: &[StateId]) -> Transition {
        let mut transition = Transition::new(vec![SpecSeq::any(1)]);
        for &successor in successors {
            transition
                .outputs
                .push(TransitionOutput::new(vec![SpecSeq::any(1)], successor));
        }
        transition
    }

    #[test]
    fn removes_avoidable_states() {
        // state 0 may stay in 0 or go to the chain 1 -> 2 -> 1; staying is
        // enough, so the minimal closed machine is the single state 0
        let states = vec![
            vec![transition(&[0, 1])],
            vec![transition(&[2])],
            vec![transition(&[1])],
        ];
        let machine = Machine::new(
            vec!["i".to_string()],
            vec!["o".to_string()],
            Semantic::Mealy,
            states,
        );
        let minimized = machine.minimize_with_nondeterminism().unwrap();
        assert_eq!(minimized.num_states(), 1);
    }

    #[test]
    fn keeps_required_states() {
        let states = vec![vec![transition(&[1])], vec![transition(&[0])]];
        let machine = Machine::new(
            vec!["i".to_string()],
            vec!["o".to_string()],
            Semantic::Mealy,
            states,
        );
        assert!(machine.minimize_with_nondeterminism().is_none());
    }

    #[test]
    fn ladder_counts_removals() {
        // three free vars: each round must drop one more of them
        let mut solver = Solver::new();
        let vars: Vec<Lit> = (0..3).map(|_| solver.new_lit()).collect();
        let keep = fewest_states(&mut solver, &vars);
        assert!(keep.iter().all(|&kept| !kept));
    }
}
