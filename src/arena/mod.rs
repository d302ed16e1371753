//! The parity-game arena and its on-the-fly construction.
//!
//! Environment nodes are canonical product states of the automaton tree;
//! system nodes are introduced per environment node and relevant input
//! action and hold the colored edges reached by the relevant output actions.
//! The builder appends to the arena while the solver reads a prefix of it;
//! the two meet through a reader-writer lock over the edge vectors,
//! release/acquire size counters and a condition variable.

pub(crate) mod queue;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use biodivine_lib_bdd::{Bdd, BddVariableSet};
use crossbeam_channel::{Receiver, Sender};
use fixedbitset::FixedBitSet;
use log::{info, trace};
use ordered_float::NotNan;

use crate::automaton::tree::AutomatonTreeStructure;
use crate::automaton::{
    Color, EdgeId, Letter, NodeId, Parity, Player, ProductState, NODE_BOTTOM, NODE_NONE,
    NODE_NONE_BOTTOM, NODE_NONE_TOP, NODE_TOP,
};
use crate::ltl::AtomicPropositionStatus;
use crate::options::ExplorationStrategy;
use crate::util::specseq::SpecSeq;
use queue::{Frontier, ScoredProductState};

/// An edge of a system node. The successor is a product-state reference
/// which [`ArenaData::sys_edge`] resolves through the node map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub successor: NodeId,
    pub color: Color,
}

impl Edge {
    pub fn new(successor: NodeId, color: Color) -> Self {
        Self { successor, color }
    }
}

/// The shared vectors of the arena. Only the builder appends; rows that
/// have been published through the size counters are never mutated again.
pub struct ArenaData {
    sys_output: Vec<Bdd>,
    sys_succs_begin: Vec<EdgeId>,
    sys_succs: Vec<Edge>,

    env_input: Vec<Bdd>,
    env_succs_begin: Vec<EdgeId>,
    env_succs: Vec<NodeId>,

    env_node_map: Vec<AtomicU32>,

    sys_winner: Vec<AtomicI8>,
    env_winner: Vec<AtomicI8>,
}

impl ArenaData {
    pub fn sys_succs_begin(&self, sys_node: NodeId) -> EdgeId {
        self.sys_succs_begin[sys_node as usize]
    }
    pub fn sys_succs_end(&self, sys_node: NodeId) -> EdgeId {
        self.sys_succs_begin[sys_node as usize + 1]
    }
    /// The edge with its successor resolved to an environment node id,
    /// [`NODE_TOP`], [`NODE_BOTTOM`] or [`NODE_NONE`].
    pub fn sys_edge(&self, sys_edge: EdgeId) -> Edge {
        let raw = self.sys_succs[sys_edge as usize];
        Edge::new(
            self.env_node_map[raw.successor as usize].load(Ordering::Acquire),
            raw.color,
        )
    }
    /// The edge with the raw product-state reference as successor.
    pub fn sys_edge_raw(&self, sys_edge: EdgeId) -> Edge {
        self.sys_succs[sys_edge as usize]
    }
    pub fn sys_output(&self, sys_edge: EdgeId) -> &Bdd {
        &self.sys_output[sys_edge as usize]
    }

    pub fn env_succs_begin(&self, env_node: NodeId) -> EdgeId {
        self.env_succs_begin[env_node as usize]
    }
    pub fn env_succs_end(&self, env_node: NodeId) -> EdgeId {
        self.env_succs_begin[env_node as usize + 1]
    }
    pub fn env_edge(&self, env_edge: EdgeId) -> NodeId {
        self.env_succs[env_edge as usize]
    }
    pub fn env_input(&self, env_edge: EdgeId) -> &Bdd {
        &self.env_input[env_edge as usize]
    }

    pub fn sys_winner(&self, sys_node: NodeId) -> Option<Player> {
        Player::from_sign(self.sys_winner[sys_node as usize].load(Ordering::Acquire))
    }
    pub fn env_winner(&self, env_node: NodeId) -> Option<Player> {
        Player::from_sign(self.env_winner[env_node as usize].load(Ordering::Acquire))
    }
    pub fn set_sys_winner(&self, sys_node: NodeId, winner: Player) {
        self.sys_winner[sys_node as usize].store(winner.sign(), Ordering::Release);
    }
}

/// The parity-game arena shared between the builder and the solver.
pub struct Arena {
    pub n_inputs: usize,
    pub n_outputs: usize,

    relevant_inputs: Vec<usize>,
    relevant_outputs: Vec<usize>,

    true_inputs_mask: Letter,
    true_outputs_mask: Letter,
    false_inputs_mask: Letter,
    false_outputs_mask: Letter,
    irrelevant_inputs_mask: Letter,
    irrelevant_outputs_mask: Letter,

    input_vars: BddVariableSet,
    output_vars: BddVariableSet,

    data: RwLock<ArenaData>,

    n_env_nodes: AtomicU32,
    n_sys_nodes: AtomicU32,
    n_sys_edges: AtomicU32,
    n_env_edges: AtomicU32,

    /// Guards the size counters for the rendezvous with the solver.
    size_mutex: Mutex<()>,
    /// Signalled on changes of the arena size and on completion.
    pub(crate) change: Condvar,

    complete: AtomicBool,
    solved: AtomicBool,

    clear_queue: bool,
    verdict_tx: Sender<(NodeId, Player)>,
    verdict_rx: Receiver<(NodeId, Player)>,

    pub parity_type: Parity,
    pub n_colors: usize,
    pub initial_node: NodeId,
}

impl Arena {
    pub fn new(
        n_inputs: usize,
        n_outputs: usize,
        structure: &AutomatonTreeStructure,
        clear_queue: bool,
    ) -> Self {
        let statuses = structure.variable_statuses();
        let status_of = |index: usize| {
            statuses
                .get(index)
                .copied()
                .unwrap_or(AtomicPropositionStatus::Unused)
        };

        let mut relevant_inputs = Vec::with_capacity(n_inputs);
        let mut relevant_outputs = Vec::with_capacity(n_outputs);
        let mut true_inputs_mask = 0;
        let mut false_inputs_mask = 0;
        let mut irrelevant_inputs_mask = 0;
        let mut true_outputs_mask = 0;
        let mut false_outputs_mask = 0;
        let mut irrelevant_outputs_mask = 0;

        for a in 0..n_inputs {
            let bit = 1 << a;
            match status_of(a) {
                AtomicPropositionStatus::Used => relevant_inputs.push(a),
                AtomicPropositionStatus::Unused => irrelevant_inputs_mask |= bit,
                AtomicPropositionStatus::True => {
                    irrelevant_inputs_mask |= bit;
                    true_inputs_mask |= bit;
                }
                AtomicPropositionStatus::False => {
                    irrelevant_inputs_mask |= bit;
                    false_inputs_mask |= bit;
                }
            }
        }
        for a in 0..n_outputs {
            let bit = 1 << a;
            match status_of(a + n_inputs) {
                AtomicPropositionStatus::Used => relevant_outputs.push(a),
                AtomicPropositionStatus::Unused => irrelevant_outputs_mask |= bit,
                AtomicPropositionStatus::True => {
                    irrelevant_outputs_mask |= bit;
                    true_outputs_mask |= bit;
                }
                AtomicPropositionStatus::False => {
                    irrelevant_outputs_mask |= bit;
                    false_outputs_mask |= bit;
                }
            }
        }

        let (verdict_tx, verdict_rx) = crossbeam_channel::unbounded();

        Self {
            n_inputs,
            n_outputs,
            relevant_inputs,
            relevant_outputs,
            true_inputs_mask,
            true_outputs_mask,
            false_inputs_mask,
            false_outputs_mask,
            irrelevant_inputs_mask,
            irrelevant_outputs_mask,
            input_vars: BddVariableSet::new_anonymous(n_inputs.max(1) as u16),
            output_vars: BddVariableSet::new_anonymous(n_outputs.max(1) as u16),
            data: RwLock::new(ArenaData {
                sys_output: Vec::with_capacity(4096),
                sys_succs_begin: vec![0],
                sys_succs: Vec::with_capacity(4096),
                env_input: Vec::with_capacity(4096),
                env_succs_begin: vec![0],
                env_succs: Vec::with_capacity(4096),
                env_node_map: Vec::with_capacity(4096),
                sys_winner: Vec::with_capacity(4096),
                env_winner: Vec::with_capacity(4096),
            }),
            n_env_nodes: AtomicU32::new(0),
            n_sys_nodes: AtomicU32::new(0),
            n_sys_edges: AtomicU32::new(0),
            n_env_edges: AtomicU32::new(0),
            size_mutex: Mutex::new(()),
            change: Condvar::new(),
            complete: AtomicBool::new(false),
            solved: AtomicBool::new(false),
            clear_queue,
            verdict_tx,
            verdict_rx,
            parity_type: structure.parity_type(),
            n_colors: structure.max_color() + 1,
            initial_node: 0,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ArenaData> {
        self.data.read().unwrap()
    }

    pub fn n_env_nodes(&self) -> NodeId {
        self.n_env_nodes.load(Ordering::Acquire)
    }
    pub fn n_sys_nodes(&self) -> NodeId {
        self.n_sys_nodes.load(Ordering::Acquire)
    }
    pub fn n_sys_edges(&self) -> EdgeId {
        self.n_sys_edges.load(Ordering::Acquire)
    }
    pub fn n_env_edges(&self) -> EdgeId {
        self.n_env_edges.load(Ordering::Acquire)
    }
    pub fn n_env_actions(&self) -> Letter {
        1 << self.relevant_inputs.len()
    }
    pub fn n_sys_actions(&self) -> Letter {
        1 << self.relevant_outputs.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
    pub fn is_solved(&self) -> bool {
        self.solved.load(Ordering::Acquire)
    }
    pub(crate) fn mark_solved(&self) {
        self.solved.store(true, Ordering::Release);
        self.change.notify_all();
    }

    /// Blocks until the arena has grown past the given number of
    /// environment nodes or construction is complete.
    pub(crate) fn wait_for_change(&self, known_env_nodes: NodeId) {
        let mut guard = self.size_mutex.lock().unwrap();
        while !self.is_complete() && !self.is_solved() && self.n_env_nodes() == known_env_nodes {
            guard = self.change.wait(guard).unwrap();
        }
    }

    /// Declares the winner of an environment node, forwarding the verdict
    /// to the builder for queue pruning.
    pub(crate) fn set_env_winner(&self, data: &ArenaData, env_node: NodeId, winner: Player) {
        data.env_winner[env_node as usize].store(winner.sign(), Ordering::Release);
        if self.clear_queue {
            // the builder may already have shut down
            let _ = self.verdict_tx.send((env_node, winner));
        }
    }

    pub fn any_output(&self) -> Bdd {
        self.output_vars.mk_true()
    }
    pub fn no_output(&self) -> Bdd {
        self.output_vars.mk_false()
    }
    pub fn input_vars(&self) -> &BddVariableSet {
        &self.input_vars
    }
    pub fn output_vars(&self) -> &BddVariableSet {
        &self.output_vars
    }

    /// Folds the constant-input bits into a letter for the environment.
    pub fn add_unrealizable_input_mask(&self, input: SpecSeq<Letter>) -> SpecSeq<Letter> {
        SpecSeq::with_unspecified(
            input.number | self.true_inputs_mask,
            input.unspecified & !(self.true_inputs_mask | self.false_inputs_mask),
        )
    }

    /// Folds the constant-output bits into a letter for the system.
    pub fn add_realizable_output_mask(&self, output: SpecSeq<Letter>) -> SpecSeq<Letter> {
        SpecSeq::with_unspecified(
            output.number | self.true_outputs_mask,
            output.unspecified & !(self.true_outputs_mask | self.false_outputs_mask),
        )
    }
}

/// Summary counters of one exploration run.
#[derive(Debug, Default, Clone)]
pub struct ExplorationStats {
    states: usize,
    queried_nodes: usize,
    unreachable_nodes_found: usize,
    winning_nodes_found: usize,
    losing_nodes_found: usize,
    time: Duration,
}

impl fmt::Display for ExplorationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|Q| = {}, queried: {}, unreachable: {}, winning: {}, losing: {}, exploration time: {:.2}",
            self.states,
            self.queried_nodes,
            self.unreachable_nodes_found,
            self.winning_nodes_found,
            self.losing_nodes_found,
            self.time.as_secs_f32(),
        )
    }
}

/// The result of exploration that outlives the builder: the product state
/// of every environment node, for labelling and diagnostics.
pub struct ProductStates {
    pub states: Vec<ProductState>,
    pub state_size: usize,
}

/// Score range of a product state seen so far, for frontier updates.
struct MinMaxState {
    min_score: f64,
    max_score: f64,
    ref_id: NodeId,
}

impl MinMaxState {
    fn new(score: f64, ref_id: NodeId) -> Self {
        Self {
            min_score: score,
            max_score: score,
            ref_id,
        }
    }
}

/// Mixing factor that decreases priority-queue scores of nodes discovered
/// later, blending a breadth-first aspect into the exploration.
const PQ_BFS_FACTOR: f64 = 1.0 - 1.0 / 64.0;

/// On-the-fly constructor of the arena.
pub struct ArenaBuilder<'a> {
    arena: &'a Arena,
    structure: &'a AutomatonTreeStructure,
    exploration: ExplorationStrategy,
    only_realizability: bool,

    frontier: Frontier,
    /// Product states by reference id.
    states: Vec<ProductState>,
    state_map: HashMap<ProductState, MinMaxState>,
    env_node_to_ref: HashMap<NodeId, NodeId>,
    /// Builder-side mirror of the shared node map.
    node_map: Vec<NodeId>,
    reachable: Vec<bool>,
    sys_node_map: HashMap<Vec<(Edge, Bdd)>, NodeId>,
    already_queried: FixedBitSet,

    top_node_ref: NodeId,
    initial_node_ref: NodeId,
    product_state_size: usize,

    n_env_nodes: NodeId,
    n_sys_nodes: NodeId,
    n_sys_edges: EdgeId,
    n_env_edges: EdgeId,

    stats: ExplorationStats,
}

impl<'a> ArenaBuilder<'a> {
    pub fn new(
        arena: &'a Arena,
        structure: &'a AutomatonTreeStructure,
        exploration: ExplorationStrategy,
        only_realizability: bool,
    ) -> Self {
        let initial_state = structure.initial_state();
        let product_state_size = initial_state.len();

        let frontier = match exploration {
            ExplorationStrategy::Bfs => Frontier::bfs(),
            ExplorationStrategy::Pq => Frontier::pq(),
        };

        let mut builder = Self {
            arena,
            structure,
            exploration,
            only_realizability,
            frontier,
            states: Vec::with_capacity(4096),
            state_map: HashMap::with_capacity(4096),
            env_node_to_ref: HashMap::with_capacity(4096),
            node_map: Vec::with_capacity(4096),
            reachable: Vec::with_capacity(4096),
            sys_node_map: HashMap::with_capacity(4096),
            already_queried: FixedBitSet::new(),
            top_node_ref: 0,
            initial_node_ref: 1,
            product_state_size,
            n_env_nodes: 0,
            n_sys_nodes: 0,
            n_sys_edges: 0,
            n_env_edges: 0,
            stats: ExplorationStats::default(),
        };

        // reference for the shared top node
        builder.states.push(ProductState::default());
        builder.node_map.push(NODE_TOP);
        builder.reachable.push(true);

        // reference for the initial node
        builder.node_map.push(NODE_NONE);
        builder.reachable.push(true);
        builder
            .state_map
            .insert(initial_state.clone(), MinMaxState::new(1.0, builder.initial_node_ref));
        builder
            .frontier
            .push(ScoredProductState::new(1.0, builder.initial_node_ref));
        builder.states.push(initial_state);

        {
            let mut data = arena.data.write().unwrap();
            data.env_node_map.push(AtomicU32::new(NODE_TOP));
            data.env_node_map.push(AtomicU32::new(NODE_NONE));
        }

        builder
    }

    /// Runs the exploration until the arena is complete or solved, and
    /// returns the product states of the materialized environment nodes.
    pub fn construct(mut self) -> ProductStates {
        let start = Instant::now();
        let mut new_winning_nodes = false;
        let mut new_declared_nodes = false;

        while !self.arena.is_solved() && !self.frontier.is_empty() {
            // drain the verdicts the solver has pushed since the last round
            if self.arena.clear_queue {
                while let Ok((env_node, winner)) = self.arena.verdict_rx.try_recv() {
                    new_winning_nodes = true;
                    let ref_id = self.env_node_to_ref[&env_node];
                    if ref_id == self.initial_node_ref {
                        self.arena.mark_solved();
                        break;
                    } else if self
                        .structure
                        .declare_winning(&self.states[ref_id as usize], winner)
                    {
                        new_declared_nodes = true;
                    }
                }
                if self.arena.is_solved() {
                    break;
                }
            }

            if self.arena.clear_queue && new_winning_nodes {
                self.reachability_analysis();
                if new_declared_nodes {
                    self.already_queried.clear();
                }
                self.filter_frontier(new_declared_nodes);
                new_winning_nodes = false;
                new_declared_nodes = false;
            }

            let Some(scored_state) = self.frontier.pop() else {
                continue;
            };
            let ref_id = scored_state.ref_id;
            if self.node_map[ref_id as usize] != NODE_NONE {
                // node already explored
                continue;
            }
            self.explore_node(ref_id);
            self.stats.states += 1;
        }

        self.stats.time = start.elapsed();
        info!("arena construction finished: {}", self.stats);

        self.arena.complete.store(true, Ordering::Release);
        self.arena.change.notify_all();

        // hand out the product state of every environment node
        let mut product_states = vec![ProductState::default(); self.n_env_nodes as usize];
        for (state, entry) in self.state_map {
            let node_id = self.node_map[entry.ref_id as usize];
            if node_id != NODE_NONE && node_id != NODE_BOTTOM && node_id != NODE_TOP {
                product_states[node_id as usize] = state;
            }
        }
        ProductStates {
            states: product_states,
            state_size: self.product_state_size,
        }
    }

    /// Explores one product state: materializes its environment node, all
    /// system nodes reached by relevant input actions and their edges.
    fn explore_node(&mut self, ref_id: NodeId) {
        let arena = self.arena;
        let env_node = self.n_env_nodes;
        self.node_map[ref_id as usize] = env_node;
        self.env_node_to_ref.insert(env_node, ref_id);
        trace!("exploring node {} for reference {}", env_node, ref_id);

        let current_state = self.states[ref_id as usize].clone();

        // rows assembled locally and appended under one write acquisition
        let mut new_refs: Vec<NodeId> = Vec::new();
        let mut new_sys_rows: Vec<Vec<(Edge, Bdd)>> = Vec::new();
        let mut env_successors: BTreeMap<NodeId, Bdd> = BTreeMap::new();

        let mut cur_n_sys_nodes = 0;

        for i in 0..arena.n_env_actions() {
            let mut relevant_input: Letter = 0;
            for (b, &bit) in arena.relevant_inputs.iter().enumerate() {
                relevant_input |= ((i >> b) & 1) << bit;
            }
            let input_letter =
                SpecSeq::with_unspecified(relevant_input, arena.irrelevant_inputs_mask);

            let mut sys_successors: BTreeMap<Edge, Bdd> = BTreeMap::new();

            for o in 0..arena.n_sys_actions() {
                let mut relevant_output: Letter = 0;
                for (b, &bit) in arena.relevant_outputs.iter().enumerate() {
                    relevant_output |= ((o >> b) & 1) << bit;
                }
                let output_letter =
                    SpecSeq::with_unspecified(relevant_output, arena.irrelevant_outputs_mask);

                let letter = input_letter.number | (output_letter.number << arena.n_inputs);

                let mut new_state = ProductState::default();
                new_state.resize(self.product_state_size, 0);
                let cs = self
                    .structure
                    .successor(&current_state, &mut new_state, letter);
                let color = cs.color;

                if self.structure.is_bottom_state(&new_state) {
                    // losing successor, no edge
                    continue;
                }

                let succ = if self.structure.is_top_state(&new_state) {
                    self.top_node_ref
                } else {
                    self.successor_reference(new_state, cs.score, env_node, &mut new_refs)
                };

                if self.node_map[succ as usize] == NODE_BOTTOM {
                    // successor known losing, no edge
                    continue;
                }

                let edge = Edge::new(succ, color);
                let output_bdd = output_letter.to_bdd(&arena.output_vars, arena.n_outputs as u32);
                sys_successors
                    .entry(edge)
                    .and_modify(|bdd| *bdd = bdd.or(&output_bdd))
                    .or_insert(output_bdd);
            }

            // canonicalize the system node by its outgoing edge set
            let key: Vec<(Edge, Bdd)> = sys_successors.into_iter().collect();
            let sys_node = match self.sys_node_map.get(&key) {
                Some(&existing) => existing,
                None => {
                    let sys_node = self.n_sys_nodes + cur_n_sys_nodes;
                    cur_n_sys_nodes += 1;
                    self.sys_node_map.insert(key.clone(), sys_node);
                    new_sys_rows.push(key);
                    sys_node
                }
            };

            let input_bdd = input_letter.to_bdd(&arena.input_vars, arena.n_inputs as u32);
            env_successors
                .entry(sys_node)
                .and_modify(|bdd| *bdd = bdd.or(&input_bdd))
                .or_insert(input_bdd);
        }

        // publish the new rows; the counters are bumped only afterwards so
        // that the solver never observes half-written nodes
        let cur_n_sys_edges: EdgeId = new_sys_rows.iter().map(|row| row.len() as EdgeId).sum();
        let cur_n_env_edges = env_successors.len() as EdgeId;
        {
            let mut data = arena.data.write().unwrap();
            for _ in &new_refs {
                data.env_node_map.push(AtomicU32::new(NODE_NONE));
            }
            for row in new_sys_rows {
                for (edge, bdd) in row {
                    data.sys_succs.push(edge);
                    data.sys_output.push(bdd);
                }
                let sys_succs_len = data.sys_succs.len() as EdgeId;
                data.sys_succs_begin.push(sys_succs_len);
                data.sys_winner.push(AtomicI8::new(0));
            }
            for (sys_node, bdd) in env_successors {
                data.env_succs.push(sys_node);
                data.env_input.push(bdd);
            }
            let env_succs_len = data.env_succs.len() as EdgeId;
            data.env_succs_begin.push(env_succs_len);
            data.env_winner.push(AtomicI8::new(0));
            data.env_node_map[ref_id as usize].store(env_node, Ordering::Release);
        }

        self.n_sys_nodes += cur_n_sys_nodes;
        self.n_sys_edges += cur_n_sys_edges;
        self.n_env_edges += cur_n_env_edges;
        self.n_env_nodes += 1;

        {
            let _guard = arena.size_mutex.lock().unwrap();
            arena.n_sys_nodes.store(self.n_sys_nodes, Ordering::Release);
            arena.n_sys_edges.store(self.n_sys_edges, Ordering::Release);
            arena.n_env_edges.store(self.n_env_edges, Ordering::Release);
            arena.n_env_nodes.store(self.n_env_nodes, Ordering::Release);
        }
        arena.change.notify_all();
    }

    /// Resolves the reference of a successor product state, queueing it for
    /// exploration or rescuing it if it had become unreachable.
    fn successor_reference(
        &mut self,
        new_state: ProductState,
        base_score: f64,
        env_node: NodeId,
        new_refs: &mut Vec<NodeId>,
    ) -> NodeId {
        let prospective = self.states.len() as NodeId;
        let score = match self.exploration {
            ExplorationStrategy::Pq => {
                // decrease the score of nodes discovered later
                base_score * PQ_BFS_FACTOR.powi((env_node / 100) as i32)
            }
            ExplorationStrategy::Bfs => -(prospective as f64),
        };

        match self.state_map.entry(new_state.clone()) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(MinMaxState::new(score, prospective));
                self.node_map.push(NODE_NONE);
                self.reachable.push(true);
                self.states.push(new_state);
                new_refs.push(prospective);
                self.frontier.push(ScoredProductState::new(score, prospective));
                prospective
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                let succ = entry.ref_id;
                if self.arena.clear_queue
                    && self.node_map[succ as usize] == NODE_NONE
                    && !self.reachable[succ as usize]
                {
                    // the node was filtered from the frontier, re-add it
                    self.reachable[succ as usize] = true;
                    let score = match self.exploration {
                        ExplorationStrategy::Bfs => -(succ as f64),
                        ExplorationStrategy::Pq => score,
                    };
                    self.frontier.push(ScoredProductState::new(score, succ));
                } else if self.exploration == ExplorationStrategy::Pq {
                    if score > entry.max_score {
                        entry.max_score = score;
                        self.frontier.push(ScoredProductState::new(score, succ));
                    } else if score < entry.min_score {
                        entry.min_score = score;
                        self.frontier.push(ScoredProductState::new(score, succ));
                    }
                }
                succ
            }
        }
    }

    /// Marks environment-node references unreachable that no play from the
    /// initial node can visit through undecided nodes any more.
    fn reachability_analysis(&mut self) {
        let data = self.arena.read();
        let mut env_visited = FixedBitSet::with_capacity(self.n_env_nodes as usize);
        let mut sys_visited = FixedBitSet::with_capacity(self.n_sys_nodes as usize);
        let mut queue = std::collections::VecDeque::with_capacity(self.n_env_nodes as usize);

        for u in 0..self.n_env_nodes {
            for i in data.env_succs_begin(u)..data.env_succs_end(u) {
                let v = data.env_edge(i);
                for j in data.sys_succs_begin(v)..data.sys_succs_end(v) {
                    let ref_id = data.sys_edge_raw(j).successor;
                    self.reachable[ref_id as usize] = false;
                }
            }
        }

        self.reachable[self.initial_node_ref as usize] = true;
        env_visited.insert(self.arena.initial_node as usize);
        queue.push_back(self.arena.initial_node);

        while let Some(u) = queue.pop_front() {
            if data.env_winner(u).is_some() {
                continue;
            }
            for i in data.env_succs_begin(u)..data.env_succs_end(u) {
                let v = data.env_edge(i);
                if sys_visited.put(v as usize) {
                    continue;
                }
                if data.sys_winner(v).is_some() {
                    continue;
                }
                for j in data.sys_succs_begin(v)..data.sys_succs_end(v) {
                    let ref_id = data.sys_edge_raw(j).successor;
                    self.reachable[ref_id as usize] = true;
                    let w = self.node_map[ref_id as usize];
                    if w < self.n_env_nodes && !env_visited.put(w as usize) {
                        queue.push_back(w);
                    }
                }
            }
        }
    }

    /// Discards frontier entries that are already explored or unreachable,
    /// and uses the translator to short-circuit entries whose winner is
    /// already known.
    fn filter_frontier(&mut self, query_translator: bool) {
        let arena = self.arena;
        let only_realizability = self.only_realizability;
        let node_map = &mut self.node_map;
        let reachable = &self.reachable;
        let states = &self.states;
        let structure = self.structure;
        let already_queried = &mut self.already_queried;
        let stats = &mut self.stats;
        already_queried.grow(states.len());

        let data = arena.read();
        self.frontier.filter(|entry| {
            let ref_id = entry.ref_id as usize;
            if node_map[ref_id] != NODE_NONE {
                // node already explored
                return None;
            }
            if !reachable[ref_id] {
                stats.unreachable_nodes_found += 1;
                return None;
            }
            if query_translator && !already_queried.put(ref_id) {
                stats.queried_nodes += 1;
                match structure.query_winner(&states[ref_id]) {
                    Some(Player::Env) => {
                        stats.losing_nodes_found += 1;
                        if only_realizability {
                            node_map[ref_id] = NODE_BOTTOM;
                            data.env_node_map[ref_id].store(NODE_BOTTOM, Ordering::Release);
                            return None;
                        }
                        return Some(entry.score * 0.1);
                    }
                    Some(Player::Sys) => {
                        stats.winning_nodes_found += 1;
                        if only_realizability {
                            node_map[ref_id] = NODE_TOP;
                            data.env_node_map[ref_id].store(NODE_TOP, Ordering::Release);
                            return None;
                        }
                        let score = entry.score.into_inner();
                        let mixed = if score >= 0.0 {
                            0.9 + 0.1 * score
                        } else {
                            -0.9 + 0.1 * score
                        };
                        return Some(NotNan::new(mixed).expect("score is not a number"));
                    }
                    None => {}
                }
            }
            Some(entry.score)
        });
    }
}

/// Computes packed product-state labels for the environment nodes that are
/// mapped in `visited_map`. Returns the labels per environment node, the
/// accumulated bit offsets per product-state slot, and the total width, or
/// `None` if the total width exceeds the node-id width.
pub fn compute_state_labels(
    product_states: &ProductStates,
    visited_map: &[NodeId],
) -> Option<(Vec<SpecSeq<u32>>, Vec<usize>, usize)> {
    let state_size = product_states.state_size;

    // collect the concrete local states per slot; none markers are don't-care
    let mut visited_states: Vec<std::collections::BTreeSet<NodeId>> =
        vec![Default::default(); state_size];
    for (i, &mapped) in visited_map.iter().enumerate() {
        if mapped == NODE_NONE {
            continue;
        }
        for (j, &local_state) in product_states.states[i].iter().enumerate() {
            if local_state != NODE_NONE
                && local_state != NODE_NONE_BOTTOM
                && local_state != NODE_NONE_TOP
            {
                visited_states[j].insert(local_state);
            }
        }
    }

    // bijective renaming per slot for a minimal-width field
    let inner_state_map: Vec<HashMap<NodeId, u32>> = visited_states
        .iter()
        .map(|states| {
            states
                .iter()
                .enumerate()
                .map(|(new_id, &old_id)| (old_id, new_id as u32))
                .collect()
        })
        .collect();

    let mut accumulated_bits = vec![0; state_size + 1];
    let mut state_label_bits = 0_usize;
    for (i, states) in visited_states.iter().enumerate() {
        accumulated_bits[i] = state_label_bits;
        if states.len() > 1 {
            let max_value = states.len() as u32 - 1;
            state_label_bits += (u32::BITS - max_value.leading_zeros()) as usize;
        }
    }
    accumulated_bits[state_size] = state_label_bits;
    if state_label_bits > u32::BITS as usize {
        return None;
    }

    let mut labels = vec![SpecSeq::default(); visited_map.len()];
    for (i, &mapped) in visited_map.iter().enumerate() {
        if mapped == NODE_NONE {
            continue;
        }
        let mut number: u32 = 0;
        let mut dontcare: u32 = 0;
        for (j, &local_state) in product_states.states[i].iter().enumerate() {
            let width = accumulated_bits[j + 1] - accumulated_bits[j];
            if width == 0 {
                continue;
            }
            if local_state != NODE_NONE
                && local_state != NODE_NONE_BOTTOM
                && local_state != NODE_NONE_TOP
            {
                number |= inner_state_map[j][&local_state] << accumulated_bits[j];
            } else {
                let mask = ((1_u64 << width) - 1) as u32;
                dontcare |= mask << accumulated_bits[j];
            }
        }
        labels[i] = SpecSeq::with_unspecified(number, dontcare);
    }

    Some((labels, accumulated_bits, state_label_bits))
}

impl Arena {
    /// Writes the arena in the parity-game dump format: a `parity N;`
    /// header followed by one `id color owner successors "label";` line per
    /// node, with owner 0 for the system and 1 for the environment.
    pub fn write_parity_game<W: io::Write>(
        &self,
        writer: &mut W,
        winner: Option<Player>,
    ) -> io::Result<()> {
        let data = self.read();
        let n_env_nodes = self.n_env_nodes();
        let n_sys_nodes = self.n_sys_nodes();
        let n_sys_edges = self.n_sys_edges();

        let total_nodes = (n_env_nodes + n_sys_nodes + n_sys_edges + 3) as usize;
        let boundary_node = total_nodes - 1;
        let bottom_node = total_nodes - 2;
        let top_node = total_nodes - 3;
        let mut max_color = self.n_colors - 1;
        if max_color % 2 != 0 {
            max_color += 1;
        }
        let neutral_color = 0;
        let parity = self.parity_type.color();

        writeln!(writer, "parity {};", total_nodes)?;

        // environment nodes
        for i in 0..n_env_nodes {
            write!(writer, "{} {} {} ", i, neutral_color, 1 - parity)?;
            for j in data.env_succs_begin(i)..data.env_succs_end(i) {
                if j > data.env_succs_begin(i) {
                    write!(writer, ",")?;
                }
                write!(writer, "{}", data.env_edge(j) + n_env_nodes)?;
            }
            writeln!(writer, " \"env {}\";", i)?;
        }

        // system nodes, with one auxiliary node per edge carrying its color
        for i in 0..n_sys_nodes {
            write!(writer, "{} {} {} ", i + n_env_nodes, neutral_color, parity)?;
            if data.sys_succs_begin(i) == data.sys_succs_end(i) {
                write!(writer, "{}", bottom_node)?;
            } else {
                for j in data.sys_succs_begin(i)..data.sys_succs_end(i) {
                    if j > data.sys_succs_begin(i) {
                        write!(writer, ",")?;
                    }
                    write!(writer, "{}", j as usize + (n_env_nodes + n_sys_nodes) as usize)?;
                }
            }
            writeln!(writer, " \"sys {}\";", i)?;

            for j in data.sys_succs_begin(i)..data.sys_succs_end(i) {
                let edge = data.sys_edge(j);
                write!(
                    writer,
                    "{} {} {} ",
                    j as usize + (n_env_nodes + n_sys_nodes) as usize,
                    max_color - edge.color,
                    parity
                )?;
                if edge.successor == NODE_TOP {
                    write!(writer, "{}", top_node)?;
                } else if edge.successor == NODE_BOTTOM {
                    write!(writer, "{}", bottom_node)?;
                } else if edge.successor >= n_env_nodes {
                    write!(writer, "{}", boundary_node)?;
                } else {
                    write!(writer, "{}", edge.successor)?;
                }
                writeln!(writer, " \"sys edge\";")?;
            }
        }

        // top, bottom and unexplored boundary
        writeln!(
            writer,
            "{} {} {} {} \"top\";",
            top_node, parity, parity, top_node
        )?;
        writeln!(
            writer,
            "{} {} {} {} \"bottom\";",
            bottom_node,
            1 - parity,
            1 - parity,
            bottom_node
        )?;
        match winner {
            Some(Player::Sys) => writeln!(
                writer,
                "{} {} {} {} \"unexplored\";",
                boundary_node,
                1 - parity,
                1 - parity,
                boundary_node
            )?,
            Some(Player::Env) => writeln!(
                writer,
                "{} {} {} {} \"unexplored\";",
                boundary_node, parity, parity, boundary_node
            )?,
            None => writeln!(writer, "{} - - {} \"unexplored\";", boundary_node, boundary_node)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltl::parse;
    use crate::translator::fragment::create_decomposed_automaton;

    fn build_arena(
        text: &str,
        aps: &[&str],
        n_inputs: usize,
    ) -> (Arena, AutomatonTreeStructure) {
        let formula = parse(text, aps).unwrap();
        let statuses = vec![AtomicPropositionStatus::Used; aps.len()];
        let dpa = create_decomposed_automaton(&formula, statuses).unwrap();
        let structure = AutomatonTreeStructure::new(dpa).unwrap();
        let arena = Arena::new(n_inputs, aps.len() - n_inputs, &structure, true);
        (arena, structure)
    }

    fn explore_fully(arena: &Arena, structure: &AutomatonTreeStructure) -> ProductStates {
        let builder = ArenaBuilder::new(arena, structure, ExplorationStrategy::Bfs, false);
        builder.construct()
    }

    #[test]
    fn constructs_request_response_arena() {
        let (arena, structure) = build_arena("G (r -> F g)", &["r", "g"], 1);
        let states = explore_fully(&arena, &structure);

        assert!(arena.is_complete());
        let n_env = arena.n_env_nodes();
        assert!(n_env >= 2);
        assert_eq!(states.states.len(), n_env as usize);

        // every system edge leads to top, bottom or a valid node
        let data = arena.read();
        for v in 0..arena.n_sys_nodes() {
            for j in data.sys_succs_begin(v)..data.sys_succs_end(v) {
                let edge = data.sys_edge(j);
                assert!(
                    edge.successor == NODE_TOP
                        || edge.successor == NODE_BOTTOM
                        || edge.successor < n_env
                );
            }
        }
        // every environment node has at least one successor
        for u in 0..n_env {
            assert!(data.env_succs_begin(u) < data.env_succs_end(u));
        }
    }

    #[test]
    fn deduplicates_system_nodes() {
        // with no inputs, both environment actions collapse into one system
        // node per environment node
        let (arena, structure) = build_arena("G F g", &["g"], 0);
        let _ = explore_fully(&arena, &structure);
        assert_eq!(arena.n_env_actions(), 1);
        assert_eq!(arena.n_sys_nodes(), arena.n_env_nodes());
    }

    #[test]
    fn state_labels_fit_for_small_arenas() {
        let (arena, structure) = build_arena("G (r -> F g)", &["r", "g"], 1);
        let states = explore_fully(&arena, &structure);
        let visited: Vec<NodeId> = (0..arena.n_env_nodes()).collect();
        let (labels, accumulated, bits) =
            compute_state_labels(&states, &visited).expect("labels must fit");
        assert_eq!(labels.len(), arena.n_env_nodes() as usize);
        assert_eq!(*accumulated.last().unwrap(), bits);
    }

    #[test]
    fn parity_dump_has_header_and_sinks() {
        let (arena, structure) = build_arena("G F g", &["g"], 0);
        let _ = explore_fully(&arena, &structure);
        let mut out = Vec::new();
        arena.write_parity_game(&mut out, Some(Player::Sys)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&format!(
            "parity {};",
            arena.n_env_nodes() + arena.n_sys_nodes() + arena.n_sys_edges() + 3
        )));
        assert!(text.contains("\"top\""));
        assert!(text.contains("\"bottom\""));
    }
}
