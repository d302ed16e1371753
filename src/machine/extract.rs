//! Strategy extraction: from a solved arena to a Mealy or Moore machine.

use std::collections::{BTreeMap, VecDeque};

use biodivine_lib_bdd::Bdd;
use log::{debug, info};
use ordered_float::NotNan;

use crate::arena::{compute_state_labels, Arena, ArenaData, ProductStates};
use crate::automaton::{Letter, NodeId, NODE_NONE, NODE_TOP};
use crate::solver::Strategy;
use crate::util::specseq::{bdd_to_cubes, SpecSeq};

use super::{Machine, Semantic, StateId, Transition, TransitionOutput, NONE_STATE, TOP_STATE};

/// Extracts the machine implementing the winning strategy: a Mealy machine
/// for the system or a Moore machine for the environment.
pub(crate) struct MachineExtractor<'a> {
    arena: &'a Arena,
    data: &'a ArenaData,
    strategy: &'a Strategy,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl<'a> MachineExtractor<'a> {
    pub(crate) fn new(
        arena: &'a Arena,
        data: &'a ArenaData,
        strategy: &'a Strategy,
        inputs: &[String],
        outputs: &[String],
    ) -> Self {
        Self {
            arena,
            data,
            strategy,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }
    }

    fn input_cubes(&self, bdd: &Bdd) -> Vec<SpecSeq<Letter>> {
        bdd_to_cubes(bdd, self.arena.input_vars(), self.arena.n_inputs as u32)
    }

    fn output_cubes(&self, bdd: &Bdd) -> Vec<SpecSeq<Letter>> {
        bdd_to_cubes(bdd, self.arena.output_vars(), self.arena.n_outputs as u32)
    }

    /// Sorts output letters by the number of ones, then by the number of
    /// unspecified bits descending, for reproducible and simple choices.
    fn sort_letters(letters: &mut [SpecSeq<Letter>]) {
        letters.sort_by(|lhs, rhs| {
            lhs.number
                .count_ones()
                .cmp(&rhs.number.count_ones())
                .then_with(|| rhs.unspecified.count_ones().cmp(&lhs.unspecified.count_ones()))
                .then_with(|| lhs.number.cmp(&rhs.number))
        });
    }

    /// Constructs the Mealy machine for the winning system player from the
    /// active edges of the strategy.
    pub(crate) fn construct_mealy(
        &self,
        product_states: Option<&ProductStates>,
    ) -> Machine {
        info!("constructing Mealy machine");
        let arena = self.arena;
        let data = self.data;
        let n_env_nodes = arena.n_env_nodes();
        let any_output = self.arena.add_realizable_output_mask(SpecSeq::any(
            arena.n_outputs as u32,
        ));

        let mut state_map: Vec<StateId> = vec![NONE_STATE; n_env_nodes as usize];
        let mut machine: Vec<Vec<Transition>> = Vec::new();
        let mut queue = VecDeque::new();

        state_map[arena.initial_node as usize] = 0;
        machine.push(Vec::new());
        queue.push_back(arena.initial_node);

        while let Some(env_node) = queue.pop_front() {
            let state = state_map[env_node as usize];

            for env_edge in data.env_succs_begin(env_node)..data.env_succs_end(env_node) {
                let sys_node = data.env_edge(env_edge);

                // group the active edges by concrete successor
                let mut successor_list: BTreeMap<NodeId, Bdd> = BTreeMap::new();
                for sys_edge in data.sys_succs_begin(sys_node)..data.sys_succs_end(sys_node) {
                    if !self.strategy.sys_active[sys_edge as usize] {
                        continue;
                    }
                    let edge = data.sys_edge(sys_edge);
                    let output = data.sys_output(sys_edge);
                    successor_list
                        .entry(edge.successor)
                        .and_modify(|bdd| *bdd = bdd.or(output))
                        .or_insert_with(|| output.clone());
                }
                if successor_list.is_empty() {
                    continue;
                }

                // alternatives ordered by preference: the top node first,
                // then already visited successors, then by output coverage
                let mut alternatives: Vec<(NodeId, Bdd)> = successor_list.into_iter().collect();
                alternatives.sort_by_key(|(successor, bdd)| {
                    if *successor == NODE_TOP {
                        (0, NotNan::new(0.0).unwrap())
                    } else {
                        let visited = state_map[*successor as usize] != NONE_STATE;
                        (
                            if visited { 1 } else { 2 },
                            NotNan::new(-bdd.cardinality()).unwrap_or_else(|_| {
                                NotNan::new(0.0).unwrap()
                            }),
                        )
                    }
                });

                let mut transition = Transition::new(Vec::new());
                for (successor, bdd) in alternatives {
                    let mut outputs = self.output_cubes(&bdd);
                    for output in outputs.iter_mut() {
                        *output = arena.add_realizable_output_mask(*output);
                    }
                    Self::sort_letters(&mut outputs);

                    let mealy_successor = if successor == NODE_TOP {
                        TOP_STATE
                    } else {
                        if state_map[successor as usize] == NONE_STATE {
                            state_map[successor as usize] = machine.len() as StateId;
                            machine.push(Vec::new());
                            queue.push_back(successor);
                        }
                        state_map[successor as usize]
                    };

                    if mealy_successor != TOP_STATE || outputs[0] != any_output {
                        transition
                            .outputs
                            .push(TransitionOutput::new(outputs, mealy_successor));
                    }
                }

                if !transition.outputs.is_empty() {
                    transition.input = self.input_cubes(data.env_input(env_edge));
                    machine[state as usize].push(transition);
                }
            }
        }

        let top_state = self.patch_top_state(&mut machine, Semantic::Mealy);
        let mut machine = Machine::new(
            self.inputs.clone(),
            self.outputs.clone(),
            Semantic::Mealy,
            machine,
        );
        if let Some(product_states) = product_states {
            self.add_product_labels(&mut machine, product_states, &state_map, top_state);
        }
        machine
    }

    /// Constructs the Moore machine for the winning environment player from
    /// the chosen edges of the strategy.
    pub(crate) fn construct_moore(
        &self,
        product_states: Option<&ProductStates>,
    ) -> Machine {
        info!("constructing Moore machine");
        let arena = self.arena;
        let data = self.data;
        let n_env_nodes = arena.n_env_nodes();
        let any_input = arena.add_unrealizable_input_mask(SpecSeq::any(arena.n_inputs as u32));

        let mut state_map: Vec<StateId> = vec![NONE_STATE; n_env_nodes as usize];
        let mut machine: Vec<Vec<Transition>> = Vec::new();
        let mut queue = VecDeque::new();

        state_map[arena.initial_node as usize] = 0;
        machine.push(Vec::new());
        queue.push_back(arena.initial_node);

        while let Some(env_node) = queue.pop_front() {
            let state = state_map[env_node as usize];

            let env_edge = self.strategy.env_choice[env_node as usize];
            debug_assert!(env_edge < arena.n_env_edges());

            // the environment letters of the chosen move
            let mut env_letters = self.input_cubes(data.env_input(env_edge));
            for letter in env_letters.iter_mut() {
                *letter = arena.add_unrealizable_input_mask(*letter);
            }
            Self::sort_letters(&mut env_letters);

            let sys_node = data.env_edge(env_edge);
            let mut covered_outputs = arena.no_output();

            for sys_edge in data.sys_succs_begin(sys_node)..data.sys_succs_end(sys_node) {
                let edge = data.sys_edge(sys_edge);
                let output = data.sys_output(sys_edge);
                covered_outputs = covered_outputs.or(output);

                debug_assert!(edge.successor < n_env_nodes);
                if state_map[edge.successor as usize] == NONE_STATE {
                    state_map[edge.successor as usize] = machine.len() as StateId;
                    machine.push(Vec::new());
                    queue.push_back(edge.successor);
                }
                let successor = state_map[edge.successor as usize];

                let mut transition = Transition::new(self.output_cubes(output));
                transition
                    .outputs
                    .push(TransitionOutput::new(env_letters.clone(), successor));
                machine[state as usize].push(transition);
            }

            if covered_outputs != arena.any_output() && env_letters[0] != any_input {
                // the system would die on the remaining outputs; give the
                // environment a free successor there
                let uncovered = covered_outputs.not();
                let mut transition = Transition::new(self.output_cubes(&uncovered));
                transition
                    .outputs
                    .push(TransitionOutput::new(env_letters.clone(), TOP_STATE));
                machine[state as usize].push(transition);
            }
        }

        let top_state = self.patch_top_state(&mut machine, Semantic::Moore);
        // in the Moore machine, the system outputs are read and the
        // environment inputs are produced
        let mut machine = Machine::new(
            self.outputs.clone(),
            self.inputs.clone(),
            Semantic::Moore,
            machine,
        );
        if let Some(product_states) = product_states {
            self.add_product_labels(&mut machine, product_states, &state_map, top_state);
        }
        machine
    }

    /// Materializes the synthetic top state if any transition refers to it.
    fn patch_top_state(
        &self,
        machine: &mut Vec<Vec<Transition>>,
        semantic: Semantic,
    ) -> StateId {
        let top_state = machine.len() as StateId;
        let mut has_top_state = false;
        for transitions in machine.iter_mut() {
            for transition in transitions.iter_mut() {
                for alternative in transition.outputs.iter_mut() {
                    if alternative.successor == TOP_STATE {
                        has_top_state = true;
                        alternative.successor = top_state;
                    }
                }
            }
        }
        if !has_top_state {
            return NONE_STATE;
        }
        let arena = self.arena;
        let (input, output) = match semantic {
            Semantic::Mealy => (
                SpecSeq::any(arena.n_inputs as u32),
                arena.add_realizable_output_mask(SpecSeq::any(arena.n_outputs as u32)),
            ),
            Semantic::Moore => (
                SpecSeq::any(arena.n_outputs as u32),
                arena.add_unrealizable_input_mask(SpecSeq::any(arena.n_inputs as u32)),
            ),
        };
        let mut transition = Transition::new(vec![input]);
        transition
            .outputs
            .push(TransitionOutput::new(vec![output], top_state));
        machine.push(vec![transition]);
        top_state
    }

    /// Attaches packed product-state labels to the machine states, if the
    /// label width fits.
    fn add_product_labels(
        &self,
        machine: &mut Machine,
        product_states: &ProductStates,
        state_map: &[StateId],
        top_state: StateId,
    ) {
        // translate the machine-state map into the env-node indexed map
        let mut visited_map = vec![NODE_NONE; state_map.len()];
        for (env_node, &state) in state_map.iter().enumerate() {
            if state != NONE_STATE {
                visited_map[env_node] = state;
            }
        }
        match compute_state_labels(product_states, &visited_map) {
            Some((env_labels, accumulated_bits, bits)) => {
                let mut labels =
                    vec![SpecSeq::with_unspecified(0, 0); machine.num_states()];
                for (env_node, &state) in state_map.iter().enumerate() {
                    if state != NONE_STATE {
                        labels[state as usize] = env_labels[env_node];
                    }
                }
                if top_state != NONE_STATE {
                    labels[top_state as usize] =
                        SpecSeq::with_unspecified(0, ((1_u64 << bits) - 1) as u32);
                }
                machine.set_labels(labels, accumulated_bits);
            }
            None => {
                debug!("product labels exceed the node-id width, skipping labels");
            }
        }
    }
}

/// Extracts the controller machine for the given winner. Inputs and outputs
/// are the proposition names of the specification.
pub(crate) fn extract_machine(
    arena: &Arena,
    strategy: &Strategy,
    winner: crate::automaton::Player,
    inputs: &[String],
    outputs: &[String],
    product_states: Option<&ProductStates>,
) -> Machine {
    let data = arena.read();
    let extractor = MachineExtractor::new(arena, &data, strategy, inputs, outputs);
    match winner {
        crate::automaton::Player::Sys => extractor.construct_mealy(product_states),
        crate::automaton::Player::Env => extractor.construct_moore(product_states),
    }
}
