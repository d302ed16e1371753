//! The parity automaton tree: lazy composition of the decomposed automaton
//! into a single parity condition over product states.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::translator::{
    DecomposedDpa, LabelledTree, RealizabilityStatus, Reference, Tag, SINK_BOTTOM, SINK_TOP,
};

use super::{
    Automaton, Color, ColorScore, Letter, NodeId, NodeType, Parity, Player, ProductState,
    NODE_BOTTOM, NODE_NONE, NODE_NONE_BOTTOM, NODE_NONE_TOP, NODE_TOP,
};

/// An error during construction of the automaton tree.
#[derive(Debug, thiserror::Error)]
#[error("unsupported automaton tree: {0}")]
pub struct TreeError(String);

const LOG_ONE_HALF: f64 = -std::f64::consts::LN_2;

struct Leaf {
    automaton: Arc<Automaton>,
    reference: Reference,
    /// Position of this leaf in the structure of the decomposed automaton.
    /// Child sorting permutes the tree, so this is recorded at construction.
    position: usize,
    state_index: usize,
}

struct Inner {
    tag: Tag,
    children: Vec<AutomatonTree>,
    round_robin_size: NodeId,
    parity_child: bool,
    /// Base value of the tracked minimal parity color.
    dp: Color,
    state_index: usize,
}

struct Biconditional {
    children: Vec<AutomatonTree>,
    parity_child: bool,
    parity_child_index: usize,
    d1: Color,
    d2: Color,
    round_robin_size: NodeId,
    state_index: usize,
}

enum TreeKind {
    Leaf(Leaf),
    Inner(Inner),
    Biconditional(Biconditional),
}

/// A node of the parity automaton tree.
pub struct AutomatonTree {
    pub node_type: NodeType,
    pub parity_type: Parity,
    pub max_color: Color,
    kind: TreeKind,
}

impl AutomatonTree {
    /// Assigns product-state slots and appends the initial local states.
    fn init_state(&mut self, state: &mut ProductState) {
        match &mut self.kind {
            TreeKind::Leaf(leaf) => {
                leaf.state_index = state.len();
                state.push(0);
            }
            TreeKind::Inner(node) => {
                node.state_index = state.len();
                if node.round_robin_size > 1 {
                    // round-robin counter
                    state.push(0);
                }
                if node.round_robin_size > 0 && node.parity_child {
                    // inverse minimal parity seen
                    state.push(0);
                }
                for child in &mut node.children {
                    child.init_state(state);
                }
            }
            TreeKind::Biconditional(node) => {
                node.state_index = state.len();
                for _ in 0..node.round_robin_size {
                    // inverse minimal parity seen per color of the first child
                    state.push(0);
                }
                for child in &mut node.children {
                    child.init_state(state);
                }
            }
        }
    }

    fn min_index(&self) -> usize {
        match &self.kind {
            TreeKind::Leaf(leaf) => leaf.reference.index,
            TreeKind::Inner(Inner { children, .. })
            | TreeKind::Biconditional(Biconditional { children, .. }) => {
                children.iter().map(Self::min_index).min().unwrap()
            }
        }
    }

    fn max_alphabet_size(&self) -> Letter {
        match &self.kind {
            TreeKind::Leaf(leaf) => leaf.automaton.alphabet_size(),
            TreeKind::Inner(Inner { children, .. })
            | TreeKind::Biconditional(Biconditional { children, .. }) => children
                .iter()
                .map(Self::max_alphabet_size)
                .max()
                .unwrap_or(0),
        }
    }

    fn alphabet(&self) -> BTreeSet<usize> {
        match &self.kind {
            TreeKind::Leaf(leaf) => leaf
                .reference
                .alphabet_mapping
                .iter()
                .map(|&(global, _)| global)
                .collect(),
            TreeKind::Inner(Inner { children, .. })
            | TreeKind::Biconditional(Biconditional { children, .. }) => children
                .iter()
                .flat_map(|child| child.alphabet())
                .collect(),
        }
    }

    fn set_state(&self, new_state: &mut [NodeId], value: NodeId) {
        match &self.kind {
            TreeKind::Leaf(leaf) => new_state[leaf.state_index] = value,
            TreeKind::Inner(node) => {
                let mut index = node.state_index;
                if node.round_robin_size > 1 {
                    new_state[index] = value;
                    index += 1;
                }
                if node.round_robin_size > 0 && node.parity_child {
                    new_state[index] = value;
                }
                for child in &node.children {
                    child.set_state(new_state, value);
                }
            }
            TreeKind::Biconditional(node) => {
                for i in 0..node.round_robin_size as usize {
                    new_state[node.state_index + i] = value;
                }
                for child in &node.children {
                    child.set_state(new_state, value);
                }
            }
        }
    }

    fn set_top_state(&self, new_state: &mut [NodeId]) {
        match &self.kind {
            TreeKind::Leaf(leaf) => new_state[leaf.state_index] = NODE_TOP,
            TreeKind::Inner(node) => {
                if node.tag == Tag::Disjunction {
                    self.set_state(new_state, NODE_NONE_TOP);
                    new_state[node.state_index] = NODE_TOP;
                } else {
                    let mut index = node.state_index;
                    if node.round_robin_size > 1 {
                        new_state[index] = NODE_NONE;
                        index += 1;
                    }
                    if node.round_robin_size > 0 && node.parity_child {
                        new_state[index] = NODE_NONE;
                    }
                    for child in &node.children {
                        child.set_top_state(new_state);
                    }
                }
            }
            TreeKind::Biconditional(node) => {
                if node.round_robin_size > 0 {
                    self.set_state(new_state, NODE_NONE_TOP);
                    new_state[node.state_index] = NODE_TOP;
                } else {
                    node.children[0].set_top_state(new_state);
                    node.children[1].set_top_state(new_state);
                }
            }
        }
    }

    fn set_bottom_state(&self, new_state: &mut [NodeId]) {
        match &self.kind {
            TreeKind::Leaf(leaf) => new_state[leaf.state_index] = NODE_BOTTOM,
            TreeKind::Inner(node) => {
                if node.tag == Tag::Conjunction {
                    self.set_state(new_state, NODE_NONE_BOTTOM);
                    new_state[node.state_index] = NODE_BOTTOM;
                } else {
                    let mut index = node.state_index;
                    if node.round_robin_size > 1 {
                        new_state[index] = NODE_NONE;
                        index += 1;
                    }
                    if node.round_robin_size > 0 && node.parity_child {
                        new_state[index] = NODE_NONE;
                    }
                    for child in &node.children {
                        child.set_bottom_state(new_state);
                    }
                }
            }
            TreeKind::Biconditional(node) => {
                if node.round_robin_size > 0 {
                    self.set_state(new_state, NODE_NONE_BOTTOM);
                    new_state[node.state_index] = NODE_BOTTOM;
                } else {
                    // one child rejecting, the other accepting
                    node.children[0].set_bottom_state(new_state);
                    node.children[1].set_top_state(new_state);
                }
            }
        }
    }

    fn is_top_state(&self, state: &[NodeId]) -> bool {
        match &self.kind {
            TreeKind::Leaf(leaf) => state[leaf.state_index] == NODE_TOP,
            TreeKind::Inner(node) => {
                if node.tag == Tag::Disjunction {
                    // check both slots in case of nested disjunction/conjunction
                    state[node.state_index] == NODE_TOP
                        && state[node.state_index + 1] == NODE_NONE_TOP
                } else {
                    node.children.iter().all(|child| child.is_top_state(state))
                }
            }
            TreeKind::Biconditional(node) => {
                if node.round_robin_size > 0 {
                    state[node.state_index] == NODE_TOP
                } else {
                    node.children[0].is_top_state(state) && node.children[1].is_top_state(state)
                }
            }
        }
    }

    fn is_bottom_state(&self, state: &[NodeId]) -> bool {
        match &self.kind {
            TreeKind::Leaf(leaf) => state[leaf.state_index] == NODE_BOTTOM,
            TreeKind::Inner(node) => {
                if node.tag == Tag::Conjunction {
                    state[node.state_index] == NODE_BOTTOM
                        && state[node.state_index + 1] == NODE_NONE_BOTTOM
                } else {
                    node.children
                        .iter()
                        .all(|child| child.is_bottom_state(state))
                }
            }
            TreeKind::Biconditional(node) => {
                if node.round_robin_size > 0 {
                    state[node.state_index] == NODE_BOTTOM
                } else {
                    node.children[0].is_bottom_state(state)
                        && node.children[1].is_top_state(state)
                }
            }
        }
    }

    fn successor(
        &self,
        state: &[NodeId],
        new_state: &mut [NodeId],
        letter: Letter,
    ) -> ColorScore {
        if self.is_bottom_state(state) {
            self.set_bottom_state(new_state);
            return ColorScore::new(1 - self.parity_type.color(), 0.0, 1.0);
        } else if self.is_top_state(state) {
            self.set_top_state(new_state);
            return ColorScore::new(self.parity_type.color(), 1.0, 1.0);
        }

        match &self.kind {
            TreeKind::Leaf(leaf) => {
                let local_state = state[leaf.state_index];
                let mut local_letter: Letter = 0;
                for &(global, local) in &leaf.reference.alphabet_mapping {
                    local_letter |= ((letter >> global) & 1) << local;
                }
                let edge = leaf.automaton.successor(local_state, local_letter);
                new_state[leaf.state_index] = edge.successor;
                edge.cs
            }
            TreeKind::Inner(node) => self.inner_successor(node, state, new_state, letter),
            TreeKind::Biconditional(node) => {
                self.biconditional_successor(node, state, new_state, letter)
            }
        }
    }

    fn inner_successor(
        &self,
        node: &Inner,
        state: &[NodeId],
        new_state: &mut [NodeId],
        letter: Letter,
    ) -> ColorScore {
        let parity = self.parity_type.color();
        let round_robin_index = node.state_index;
        let mut min_parity_index = node.state_index;
        let mut round_robin_counter: NodeId = 0;
        if node.round_robin_size > 1 {
            round_robin_counter = state[round_robin_index];
            min_parity_index += 1;
        }
        let mut min_parity = node.dp;
        if node.round_robin_size > 0 && node.parity_child {
            min_parity -= state[min_parity_index] as Color;
        }

        let mut buchi_index: NodeId = 0;
        let mut active_children = 0_usize;

        let mut max_weak_color: Color = 0;
        let mut min_weak_color: Color = 1;
        let mut min_buchi_color: Color = 1;

        let mut score = 0.0;
        let mut weights = 0.0;

        for child in &node.children {
            let cs = child.successor(state, new_state, letter);
            let child_color = cs.color;
            let mut child_score = cs.score;
            let mut child_weight = cs.weight;

            if child.is_bottom_state(new_state) {
                if node.tag == Tag::Conjunction {
                    self.set_bottom_state(new_state);
                    return ColorScore::new(1 - parity, 0.0, 1.0);
                }
            } else if child.is_top_state(new_state) {
                if node.tag == Tag::Disjunction {
                    self.set_top_state(new_state);
                    return ColorScore::new(parity, 1.0, 1.0);
                }
            } else {
                active_children += 1;
                if node.tag == Tag::Conjunction {
                    child_weight *= child_score.ln();
                } else {
                    child_weight *= (1.0 - child_score).ln();
                }
                child_weight /= LOG_ONE_HALF;
            }

            let mut increase_score = false;
            let mut decrease_score = false;
            match child.node_type {
                NodeType::Weak => {
                    max_weak_color = max_weak_color.max(child_color);
                    min_weak_color = min_weak_color.min(child_color);
                }
                NodeType::Buchi | NodeType::CoBuchi => {
                    if (node.tag == Tag::Conjunction && child.node_type == NodeType::Buchi)
                        || (node.tag == Tag::Disjunction && child.node_type == NodeType::CoBuchi)
                    {
                        if child_color == 0 && round_robin_counter == buchi_index {
                            if child.node_type == NodeType::Buchi {
                                increase_score = true;
                            } else {
                                decrease_score = true;
                            }
                            round_robin_counter += 1;
                        }
                        buchi_index += 1;
                    } else {
                        min_buchi_color = min_buchi_color.min(child_color);
                    }
                }
                NodeType::Parity => {
                    if self.parity_type == child.parity_type {
                        if child_color < min_parity {
                            min_parity = child_color;
                            if min_parity % 2 == parity {
                                increase_score = true;
                            } else {
                                decrease_score = true;
                            }
                        }
                    } else if child_color + 1 < min_parity {
                        min_parity = child_color + 1;
                        if min_parity % 2 == parity {
                            increase_score = true;
                        } else {
                            decrease_score = true;
                        }
                    }
                }
            }

            if increase_score {
                child_score = 0.75 + 0.25 * child_score;
                child_weight *= 2.0;
            } else if decrease_score {
                child_score = 0.25 * child_score;
                child_weight *= 2.0;
            }
            score += child_score * child_weight;
            weights += child_weight;
        }

        if active_children == 0 {
            // all children have collapsed
            if node.tag == Tag::Conjunction {
                self.set_top_state(new_state);
                return ColorScore::new(parity, 1.0, 1.0);
            } else {
                self.set_bottom_state(new_state);
                return ColorScore::new(1 - parity, 0.0, 1.0);
            }
        }

        score /= weights;

        let color;
        let mut reset = false;

        if node.tag == Tag::Conjunction && max_weak_color != 0 {
            reset = true;
            color = 1 - parity;
        } else if node.tag == Tag::Disjunction && min_weak_color == 0 {
            reset = true;
            color = parity;
        } else if min_buchi_color == 0 {
            reset = true;
            color = 0;
        } else if round_robin_counter == node.round_robin_size {
            reset = true;
            if node.parity_child {
                color = min_parity;
            } else if node.tag == Tag::Conjunction {
                color = parity;
            } else {
                color = 1 - parity;
            }
        } else {
            // neutral color: rejecting for a conjunction, accepting for a
            // disjunction
            color = self.max_color;
        }

        if reset {
            round_robin_counter = 0;
            min_parity = node.dp;
        }
        if node.round_robin_size > 1 {
            new_state[round_robin_index] = round_robin_counter;
        }
        if node.round_robin_size > 0 && node.parity_child {
            new_state[min_parity_index] = (node.dp - min_parity) as NodeId;
        }
        ColorScore::new(color, score, weights)
    }

    fn biconditional_successor(
        &self,
        node: &Biconditional,
        state: &[NodeId],
        new_state: &mut [NodeId],
        letter: Letter,
    ) -> ColorScore {
        let parity = self.parity_type.color();

        let mut min_parity = node.d2;
        for i in 0..node.round_robin_size as usize {
            min_parity = min_parity.min(node.d2 - state[node.state_index + i] as Color);
        }

        let mut active_children = 0_usize;
        let mut bottom = false;
        let mut top = false;
        let mut child_colors = [0_usize; 2];

        let mut score = 0.0;
        let mut weights = 0.0;

        for (child_index, child) in node.children.iter().enumerate() {
            let cs = child.successor(state, new_state, letter);
            let child_color = cs.color;
            let mut child_score = cs.score;
            let mut child_weight = cs.weight;
            let mut increase_score = false;
            let mut decrease_score = false;

            child_colors[child_index] = child_color;

            if child.is_bottom_state(new_state) {
                bottom = true;
            } else if child.is_top_state(new_state) {
                top = true;
            } else {
                active_children += 1;
                child_weight *= child_score.ln().min((1.0 - child_score).ln()) / LOG_ONE_HALF;
            }

            if child_index == node.parity_child_index && child_color < min_parity {
                min_parity = child_color;
                if min_parity % 2 == parity {
                    increase_score = true;
                } else {
                    decrease_score = true;
                }
            }

            if increase_score {
                child_score = 0.75 + 0.25 * child_score;
                child_weight *= 2.0;
            }
            if decrease_score {
                child_score = 0.25 * child_score;
                child_weight *= 2.0;
            }
            score += child_score * child_weight;
            weights += child_weight;
        }

        if active_children == 0 {
            if bottom && top {
                self.set_bottom_state(new_state);
                return ColorScore::new(1 - parity, 0.0, 1.0);
            } else {
                // both children collapsed the same way
                self.set_top_state(new_state);
                return ColorScore::new(parity, 1.0, 1.0);
            }
        }

        score /= weights;

        if node.parity_child {
            let c1 = child_colors[1 - node.parity_child_index];
            let c2 = child_colors[node.parity_child_index];
            let color;
            if node.children[1 - node.parity_child_index].node_type == NodeType::Weak {
                // one weak child
                color = c1 + c2;
            } else {
                if c1 < node.d1 {
                    let lar = node.d2 - state[node.state_index + c1] as Color;
                    color = c1 + c2.min(lar);
                } else {
                    color = c1 + c2;
                }
                for i in 0..node.round_robin_size as usize {
                    if c1 <= i {
                        new_state[node.state_index + i] = 0;
                    } else {
                        let lar = node.d2 - state[node.state_index + i] as Color;
                        new_state[node.state_index + i] = (node.d2 - c2.min(lar)) as NodeId;
                    }
                }
            }
            ColorScore::new(color, score, weights)
        } else {
            // only weak children
            if child_colors[0] == child_colors[1] {
                ColorScore::new(parity, score, weights)
            } else {
                ColorScore::new(1 - parity, score, weights)
            }
        }
    }

    fn collect_leaf_indices(&self, indices: &mut Vec<(usize, usize)>) {
        match &self.kind {
            TreeKind::Leaf(leaf) => indices.push((leaf.position, leaf.state_index)),
            TreeKind::Inner(Inner { children, .. })
            | TreeKind::Biconditional(Biconditional { children, .. }) => {
                for child in children {
                    child.collect_leaf_indices(indices);
                }
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = 2 * indent)?;
        match &self.kind {
            TreeKind::Leaf(leaf) => writeln!(
                f,
                "{}) A[{}] ({} {}) {}",
                leaf.state_index,
                leaf.reference.index,
                self.node_type,
                self.parity_type,
                leaf.reference.formula,
            ),
            TreeKind::Inner(node) => {
                let tag = match node.tag {
                    Tag::Conjunction => "Conjunction",
                    Tag::Disjunction => "Disjunction",
                    Tag::Biconditional => "Biconditional",
                };
                writeln!(f, "*) {} ({} {})", tag, self.node_type, self.parity_type)?;
                for child in &node.children {
                    child.fmt_indented(f, indent + 1)?;
                }
                Ok(())
            }
            TreeKind::Biconditional(node) => {
                writeln!(
                    f,
                    "*) Biconditional ({} {})",
                    self.node_type, self.parity_type
                )?;
                for child in &node.children {
                    child.fmt_indented(f, indent + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Sorts children from small and simple to large and complex, as a
/// heuristic for more efficient product construction.
fn tree_order(a: &AutomatonTree, b: &AutomatonTree) -> std::cmp::Ordering {
    (a.node_type, a.max_alphabet_size())
        .cmp(&(b.node_type, b.max_alphabet_size()))
        .then_with(|| a.alphabet().cmp(&b.alphabet()))
        .then_with(|| a.min_index().cmp(&b.min_index()))
}

/// The automaton tree structure over the decomposed automaton, owning the
/// leaf adapters and the realizability interface of the translator.
pub struct AutomatonTreeStructure {
    dpa: DecomposedDpa,
    tree: AutomatonTree,
    leaf_state_indices: Vec<usize>,
    initial_state: ProductState,
}

impl AutomatonTreeStructure {
    pub fn new(mut dpa: DecomposedDpa) -> Result<Self, TreeError> {
        let automata: Vec<Arc<Automaton>> = std::mem::take(&mut dpa.automata)
            .into_iter()
            .enumerate()
            .map(|(index, leaf)| {
                let alphabet_size = alphabet_size_of(&dpa.structure, index);
                Arc::new(Automaton::new(leaf, alphabet_size))
            })
            .collect();

        let mut position = 0;
        let mut tree = construct_tree(&dpa.structure, &automata, &mut position)?;
        let mut initial_state = ProductState::default();
        tree.init_state(&mut initial_state);
        let mut leaf_slots = Vec::new();
        tree.collect_leaf_indices(&mut leaf_slots);
        leaf_slots.sort_unstable();
        let leaf_state_indices = leaf_slots.into_iter().map(|(_, index)| index).collect();

        Ok(Self {
            dpa,
            tree,
            leaf_state_indices,
            initial_state,
        })
    }

    pub fn parity_type(&self) -> Parity {
        self.tree.parity_type
    }

    pub fn max_color(&self) -> Color {
        self.tree.max_color
    }

    pub fn initial_state(&self) -> ProductState {
        self.initial_state.clone()
    }

    pub fn successor(
        &self,
        state: &[NodeId],
        new_state: &mut [NodeId],
        letter: Letter,
    ) -> ColorScore {
        self.tree.successor(state, new_state, letter)
    }

    pub fn is_top_state(&self, state: &[NodeId]) -> bool {
        self.tree.is_top_state(state)
    }

    pub fn is_bottom_state(&self, state: &[NodeId]) -> bool {
        self.tree.is_bottom_state(state)
    }

    /// The per-leaf automaton states of a product state, in translator
    /// encoding.
    fn automaton_states(&self, state: &[NodeId]) -> Vec<i32> {
        self.leaf_state_indices
            .iter()
            .map(|&index| {
                let local_state = state[index];
                assert_ne!(local_state, NODE_NONE, "local state should never be none");
                if local_state == NODE_BOTTOM || local_state == NODE_NONE_BOTTOM {
                    SINK_BOTTOM
                } else if local_state == NODE_TOP || local_state == NODE_NONE_TOP {
                    SINK_TOP
                } else {
                    local_state as i32
                }
            })
            .collect()
    }

    /// Declares the product state as won by the given player. Returns true
    /// if the translator recorded new information.
    pub fn declare_winning(&self, state: &[NodeId], winner: Player) -> bool {
        let states = self.automaton_states(state);
        let status = match winner {
            Player::Sys => RealizabilityStatus::Realizable,
            Player::Env => RealizabilityStatus::Unrealizable,
        };
        self.dpa.declare(status, &states)
    }

    /// Queries the winner of the product state, if known to the translator.
    pub fn query_winner(&self, state: &[NodeId]) -> Option<Player> {
        let states = self.automaton_states(state);
        match self.dpa.query(&states) {
            RealizabilityStatus::Realizable => Some(Player::Sys),
            RealizabilityStatus::Unrealizable => Some(Player::Env),
            RealizabilityStatus::Unknown => None,
        }
    }

    pub fn variable_statuses(&self) -> &[crate::ltl::AtomicPropositionStatus] {
        self.dpa.variable_statuses()
    }
}

impl fmt::Display for AutomatonTreeStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.tree.fmt_indented(f, 0)
    }
}

fn alphabet_size_of(structure: &LabelledTree<Tag, Reference>, index: usize) -> Letter {
    match structure {
        LabelledTree::Leaf(reference) => {
            if reference.index == index {
                reference.alphabet_mapping.len() as Letter
            } else {
                0
            }
        }
        LabelledTree::Node(_, children) => children
            .iter()
            .map(|child| alphabet_size_of(child, index))
            .max()
            .unwrap_or(0),
    }
}

fn construct_tree(
    structure: &LabelledTree<Tag, Reference>,
    automata: &[Arc<Automaton>],
    position: &mut usize,
) -> Result<AutomatonTree, TreeError> {
    match structure {
        LabelledTree::Leaf(reference) => {
            let automaton = Arc::clone(&automata[reference.index]);
            let leaf_position = *position;
            *position += 1;
            Ok(AutomatonTree {
                node_type: automaton.node_type(),
                parity_type: automaton.parity_type(),
                max_color: automaton.max_color(),
                kind: TreeKind::Leaf(Leaf {
                    automaton,
                    reference: reference.clone(),
                    position: leaf_position,
                    state_index: 0,
                }),
            })
        }
        LabelledTree::Node(tag, tree_children) => {
            // defaults for weak nodes
            let mut node_type = NodeType::Weak;
            let mut parity_type = Parity::Even;
            let mut max_color: Color = 1;
            let mut round_robin_size: NodeId = 0;

            let mut parity_child = false;
            let mut parity_child_max_color: Color = 0;
            let mut parity_child_parity_type = Parity::Even;
            let mut parity_child_index = 0;

            let mut children = Vec::with_capacity(tree_children.len());
            for tree_child in tree_children {
                let child = construct_tree(tree_child, automata, position)?;
                match child.node_type {
                    NodeType::Parity => {
                        if *tag == Tag::Biconditional {
                            parity_child = true;
                        } else if parity_child {
                            return Err(TreeError(
                                "more than one parity child".to_string(),
                            ));
                        } else {
                            parity_child = true;
                            parity_child_parity_type = child.parity_type;
                            parity_child_max_color = child.max_color;
                        }
                    }
                    NodeType::Buchi => {
                        if *tag == Tag::Conjunction {
                            round_robin_size += 1;
                        } else if *tag == Tag::Biconditional {
                            parity_child = true;
                        }
                    }
                    NodeType::CoBuchi => {
                        if *tag == Tag::Disjunction {
                            round_robin_size += 1;
                        } else if *tag == Tag::Biconditional {
                            parity_child = true;
                        }
                    }
                    NodeType::Weak => {}
                }
                node_type = node_type.join(child.node_type);
                children.push(child);
            }

            children.sort_by(tree_order);

            if *tag == Tag::Biconditional {
                if children.len() != 2 {
                    return Err(TreeError(
                        "biconditional must have exactly two children".to_string(),
                    ));
                }
                let t1 = children[0].node_type;
                let t2 = children[1].node_type;
                node_type = t1.join_biconditional(t2);

                if parity_child {
                    // one child drives the parity, the other updates the record
                    if t1 == NodeType::Weak {
                        parity_child_index = 1;
                    } else if t2 == NodeType::Weak {
                        parity_child_index = 0;
                    } else if children[0].max_color < children[1].max_color {
                        parity_child_index = 1;
                    } else {
                        parity_child_index = 0;
                    }
                }
            }

            if node_type == NodeType::Parity {
                match tag {
                    Tag::Conjunction | Tag::Disjunction => {
                        parity_type = if *tag == Tag::Conjunction {
                            Parity::Odd
                        } else {
                            Parity::Even
                        };
                        if parity_child {
                            if parity_type != parity_child_parity_type {
                                parity_child_max_color += 1;
                            }
                            max_color = parity_child_max_color;
                            if round_robin_size > 0 && max_color % 2 != 0 {
                                max_color += 1;
                            }
                        } else {
                            // needs both Büchi and co-Büchi children
                            max_color = 2;
                        }
                    }
                    Tag::Biconditional => {
                        if parity_child {
                            let d1 = children[1 - parity_child_index].max_color;
                            let d2 = children[parity_child_index].max_color;
                            let p1 = children[1 - parity_child_index].parity_type;
                            let p2 = children[parity_child_index].parity_type;

                            if children[1 - parity_child_index].node_type == NodeType::Weak {
                                max_color = d2 + 1;
                                parity_type = p2;
                                round_robin_size = 0;
                            } else {
                                max_color = d1 + d2;
                                parity_type = Parity::of(p1.color() + p2.color());
                                round_robin_size = d1 as NodeId;
                            }
                            parity_child_max_color = d2;
                        }
                    }
                }
            } else if node_type == NodeType::Buchi {
                parity_type = Parity::Even;
            } else if node_type == NodeType::CoBuchi {
                parity_type = Parity::Odd;
            }

            if *tag == Tag::Biconditional {
                let d1 = children[1 - parity_child_index].max_color;
                let d2 = children[parity_child_index].max_color;
                Ok(AutomatonTree {
                    node_type,
                    parity_type,
                    max_color,
                    kind: TreeKind::Biconditional(Biconditional {
                        children,
                        parity_child,
                        parity_child_index,
                        d1,
                        d2,
                        round_robin_size,
                        state_index: 0,
                    }),
                })
            } else {
                Ok(AutomatonTree {
                    node_type,
                    parity_type,
                    max_color,
                    kind: TreeKind::Inner(Inner {
                        tag: *tag,
                        children,
                        round_robin_size,
                        parity_child,
                        dp: parity_child_max_color,
                        state_index: 0,
                    }),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltl::parse;
    use crate::translator::fragment::create_decomposed_automaton;

    fn structure_for(text: &str, aps: &[&str]) -> AutomatonTreeStructure {
        let formula = parse(text, aps).unwrap();
        let dpa = create_decomposed_automaton(&formula, vec![]).unwrap();
        AutomatonTreeStructure::new(dpa).unwrap()
    }

    /// Steps the structure, returning the new state and color.
    fn step(
        structure: &AutomatonTreeStructure,
        state: &ProductState,
        letter: Letter,
    ) -> (ProductState, Color) {
        let mut new_state = state.clone();
        let cs = structure.successor(state, &mut new_state, letter);
        (new_state, cs.color)
    }

    #[test]
    fn conjunction_of_buchi_round_robin() {
        // G F a and G F b with a = bit 0, b = bit 1
        let structure = structure_for("(G F a) & (G F b)", &["a", "b"]);
        assert_eq!(structure.parity_type(), Parity::Even);
        assert_eq!(structure.max_color(), 1);

        let initial = structure.initial_state();
        // both seen: the round robin completes and emits an accepting color
        let (state, color) = step(&structure, &initial, 0b11);
        assert_eq!(color, 0);
        assert_eq!(state, initial);

        // only a seen: counter advances, neutral color
        let (state, color) = step(&structure, &initial, 0b01);
        assert_eq!(color, 1);
        // now b completes the round
        let (state, color) = step(&structure, &state, 0b10);
        assert_eq!(color, 0);
        assert_eq!(state, initial);

        // nothing seen: neutral color forever
        let (_, color) = step(&structure, &initial, 0b00);
        assert_eq!(color, 1);
    }

    #[test]
    fn top_bottom_absorption() {
        let structure = structure_for("G a", &["a"]);
        let initial = structure.initial_state();

        let (bottom, _) = step(&structure, &initial, 0b0);
        assert!(structure.is_bottom_state(&bottom));
        // from bottom, every letter stays bottom with the rejecting color
        for letter in 0..2 {
            let (next, color) = step(&structure, &bottom, letter);
            assert!(structure.is_bottom_state(&next));
            assert_eq!(color, 1);
        }

        let structure = structure_for("F a", &["a"]);
        let initial = structure.initial_state();
        let (top, _) = step(&structure, &initial, 0b1);
        assert!(structure.is_top_state(&top));
        for letter in 0..2 {
            let (next, color) = step(&structure, &top, letter);
            assert!(structure.is_top_state(&next));
            assert_eq!(color, 0);
        }
    }

    #[test]
    fn buchi_cobuchi_disjunction_is_parity() {
        // (F G !r) | (G F g): a Rabin-shaped pair over disjoint alphabets
        let structure = structure_for("(F G !r) | (G F g)", &["r", "g"]);
        assert_eq!(structure.parity_type(), Parity::Even);
        assert_eq!(structure.max_color(), 2);

        let initial = structure.initial_state();
        // r and g: the Büchi disjunct accepts and forces an accepting color
        let (_, color) = step(&structure, &initial, 0b11);
        assert_eq!(color, 0);

        // r without g: the co-Büchi disjunct records a bad visit
        let (state, color) = step(&structure, &initial, 0b01);
        assert_eq!(color, 1);
        let _ = state;
    }

    #[test]
    fn weak_biconditional_colors() {
        let structure = structure_for("(G a) <-> (G b)", &["a", "b"]);
        assert_eq!(structure.tree.node_type, NodeType::Weak);

        let initial = structure.initial_state();
        // both hold: equal colors, accepting
        let (_, color) = step(&structure, &initial, 0b11);
        assert_eq!(color, structure.parity_type().color());
        // only one fails: different verdicts, rejecting
        let (_, color) = step(&structure, &initial, 0b01);
        assert_eq!(color, 1 - structure.parity_type().color());
    }

    #[test]
    fn declares_and_queries_winner() {
        let structure = structure_for("(G F a) & (G F b)", &["a", "b"]);
        let initial = structure.initial_state();
        assert_eq!(structure.query_winner(&initial), None);
        assert!(structure.declare_winning(&initial, Player::Sys));
        assert_eq!(structure.query_winner(&initial), Some(Player::Sys));
    }
}
