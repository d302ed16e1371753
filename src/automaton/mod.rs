//! Parity automata over letters: shared definitions and the leaf adapter.

pub mod tree;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tinyvec::TinyVec;

use crate::translator::{Acceptance, EdgeTree, LeafDpa, SINK_BOTTOM, SINK_TOP};

/// The type for an index of a node in the arena.
pub type NodeId = u32;
/// The type for an index of an edge in the arena.
pub type EdgeId = u32;
/// The color of an edge.
pub type Color = usize;
/// A letter: one assignment of all propositions as a bit-vector.
pub type Letter = u64;

/// Marker for the rejecting sink.
pub const NODE_BOTTOM: NodeId = NodeId::MAX - 1;
/// Marker for the accepting sink.
pub const NODE_TOP: NodeId = NodeId::MAX - 2;
/// Marker for an unexplored node.
pub const NODE_NONE: NodeId = NodeId::MAX - 3;
/// Marker for a component of a product state that is don't-care because the
/// product is already rejecting.
pub const NODE_NONE_BOTTOM: NodeId = NodeId::MAX - 4;
/// Marker for a component of a product state that is don't-care because the
/// product is already accepting.
pub const NODE_NONE_TOP: NodeId = NodeId::MAX - 5;

/// Marker for a missing edge.
pub const EDGE_BOTTOM: EdgeId = EdgeId::MAX;

/// A product state: one slot per tree node, plus LAR slots of inner nodes.
pub type ProductState = TinyVec<[NodeId; 8]>;

/// A parity value: either even (0) or odd (1).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parity {
    Even = 0,
    Odd = 1,
}

impl std::ops::Not for Parity {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}

impl Parity {
    /// Returns the parity of the given color.
    pub fn of(color: Color) -> Self {
        if color % 2 == 0 {
            Self::Even
        } else {
            Self::Odd
        }
    }

    /// The smallest color of this parity.
    pub fn color(self) -> Color {
        self as Color
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Even => write!(f, "even"),
            Self::Odd => write!(f, "odd"),
        }
    }
}

/// A player of the parity game.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Player {
    /// The system player, choosing output letters.
    Sys,
    /// The environment player, choosing input letters.
    Env,
}

impl std::ops::Not for Player {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Sys => Self::Env,
            Self::Env => Self::Sys,
        }
    }
}

impl Player {
    pub(crate) fn sign(self) -> i8 {
        match self {
            Self::Sys => 1,
            Self::Env => -1,
        }
    }

    pub(crate) fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            1 => Some(Self::Sys),
            -1 => Some(Self::Env),
            _ => None,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sys => write!(f, "system"),
            Self::Env => write!(f, "environment"),
        }
    }
}

/// The acceptance type of a node of the automaton tree. The discriminants
/// are chosen so that joining two types is a bitwise or.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeType {
    Weak = 0,
    Buchi = 1,
    CoBuchi = 2,
    Parity = 3,
}

impl NodeType {
    pub fn join(self, other: Self) -> Self {
        match (self as u8) | (other as u8) {
            0 => Self::Weak,
            1 => Self::Buchi,
            2 => Self::CoBuchi,
            _ => Self::Parity,
        }
    }

    pub fn join_biconditional(self, other: Self) -> Self {
        if self.join(other) == Self::Weak {
            Self::Weak
        } else {
            Self::Parity
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weak => write!(f, "weak"),
            Self::Buchi => write!(f, "Büchi"),
            Self::CoBuchi => write!(f, "co-Büchi"),
            Self::Parity => write!(f, "parity"),
        }
    }
}

/// The color of an edge together with its exploration heuristic.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColorScore {
    pub color: Color,
    /// A soft hint in `[0, 1]` how "true" the successor looks.
    pub score: f64,
    pub weight: f64,
}

impl ColorScore {
    pub fn new(color: Color, score: f64, weight: f64) -> Self {
        Self {
            color,
            score,
            weight,
        }
    }
}

/// A successor of a leaf automaton state with its color and score.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoredEdge {
    pub successor: NodeId,
    pub cs: ColorScore,
}

/// Cached successor function of one leaf automaton state: a decision tree
/// over the local alphabet bits, optionally flattened to a direct table.
#[derive(Debug, Default)]
struct SuccessorCache {
    tree: Vec<i32>,
    leaves: Vec<ScoredEdge>,
    direct: Vec<ScoredEdge>,
}

impl SuccessorCache {
    fn tree_lookup(&self, letter: Letter) -> ScoredEdge {
        let mut i = 0_i32;
        if !self.tree.is_empty() {
            loop {
                if letter & (1 << self.tree[i as usize]) == 0 {
                    i = self.tree[i as usize + 1];
                } else {
                    i = self.tree[i as usize + 2];
                }
                if i <= 0 {
                    break;
                }
            }
        }
        self.leaves[(-i) as usize]
    }

    fn direct_lookup(&self, letter: Letter) -> ScoredEdge {
        self.direct[letter as usize]
    }

    fn lookup(&self, letter: Letter) -> ScoredEdge {
        if self.direct.is_empty() {
            self.tree_lookup(letter)
        } else {
            self.direct_lookup(letter)
        }
    }

    fn flatten_tree(&mut self, max_letter: Letter) {
        self.direct.reserve(max_letter as usize);
        for letter in 0..max_letter {
            self.direct.push(self.tree_lookup(letter));
        }
    }
}

/// Alphabet sizes up to which the decision tree is flattened into a
/// direct-addressed table.
const MAX_DIRECT_ALPHABET: Letter = 1 << 12;

struct AdapterState {
    /// Queue of states whose successors still need to be computed.
    queries: Mutex<VecDeque<u32>>,
    /// Computed successor caches, indexed by local state.
    successors: Mutex<Vec<Option<SuccessorCache>>>,
    /// Signalled on new queries or on shutdown.
    change: Condvar,
    /// Signalled when new successors have been committed.
    new_successors: Condvar,
    /// Set when no further queries will be answered.
    complete: AtomicBool,
}

/// Adapter around one leaf automaton of the translator.
///
/// Successor computation is delegated to a background consumer thread;
/// [`Automaton::successor`] blocks until the queried state has been
/// committed. The alphabet of the leaf is already remapped by the caller.
pub struct Automaton {
    state: Arc<AdapterState>,
    worker: Option<JoinHandle<()>>,
    node_type: NodeType,
    parity_type: Parity,
    max_color: Color,
    default_color: Color,
    alphabet_size: Letter,
}

impl Automaton {
    pub fn new(leaf: Box<dyn LeafDpa>, alphabet_size: Letter) -> Self {
        let (node_type, parity_type, max_color, default_color) = match leaf.acceptance() {
            Acceptance::Safety => (NodeType::Weak, Parity::Even, 1, 0),
            Acceptance::CoSafety => (NodeType::Weak, Parity::Even, 1, 1),
            Acceptance::Buchi => (NodeType::Buchi, Parity::Even, 1, 1),
            Acceptance::CoBuchi => (NodeType::CoBuchi, Parity::Odd, 1, 1),
            Acceptance::ParityMinEven { max_color } => {
                (NodeType::Parity, Parity::Even, max_color, max_color)
            }
            Acceptance::ParityMinOdd { max_color } => {
                (NodeType::Parity, Parity::Odd, max_color, max_color)
            }
        };

        let state = Arc::new(AdapterState {
            queries: Mutex::new(VecDeque::new()),
            successors: Mutex::new(Vec::new()),
            change: Condvar::new(),
            new_successors: Condvar::new(),
            complete: AtomicBool::new(false),
        });

        let worker_state = Arc::clone(&state);
        let worker = std::thread::spawn(move || {
            Self::consume_queries(&worker_state, leaf.as_ref(), default_color, alphabet_size);
        });

        Self {
            state,
            worker: Some(worker),
            node_type,
            parity_type,
            max_color,
            default_color,
            alphabet_size,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn parity_type(&self) -> Parity {
        self.parity_type
    }

    pub fn max_color(&self) -> Color {
        self.max_color
    }

    pub fn alphabet_size(&self) -> Letter {
        self.alphabet_size
    }

    /// Converts a raw edge tree of the translator into a successor cache,
    /// flattening it for small alphabets.
    fn convert(
        raw: EdgeTree,
        default_color: Color,
        alphabet_size: Letter,
    ) -> SuccessorCache {
        let leaves = raw
            .edges
            .into_iter()
            .map(|edge| {
                let successor = match edge.successor {
                    SINK_TOP => NODE_TOP,
                    SINK_BOTTOM => NODE_BOTTOM,
                    s => {
                        debug_assert!(s >= 0);
                        s as NodeId
                    }
                };
                let color = if edge.color == usize::MAX {
                    default_color
                } else {
                    edge.color
                };
                ScoredEdge {
                    successor,
                    cs: ColorScore::new(color, edge.score, 1.0),
                }
            })
            .collect();
        let mut cache = SuccessorCache {
            tree: raw.tree,
            leaves,
            direct: Vec::new(),
        };
        let max_letter = 1_u64.checked_shl(alphabet_size.min(63) as u32).unwrap_or(u64::MAX);
        if max_letter <= MAX_DIRECT_ALPHABET {
            cache.flatten_tree(max_letter);
        }
        cache
    }

    fn consume_queries(
        state: &AdapterState,
        leaf: &dyn LeafDpa,
        default_color: Color,
        alphabet_size: Letter,
    ) {
        loop {
            // wait for a query or shutdown
            let mut query = {
                let mut queries = state.queries.lock().unwrap();
                loop {
                    if let Some(query) = queries.pop_front() {
                        break query;
                    }
                    if state.complete.load(Ordering::Acquire) {
                        return;
                    }
                    queries = state.change.wait(queries).unwrap();
                }
            };

            // commit successors, draining further queries under one lock
            let mut guard = None;
            loop {
                let cache = Self::convert(leaf.edge_tree(query), default_color, alphabet_size);
                let successors =
                    guard.get_or_insert_with(|| state.successors.lock().unwrap());
                let index = query as usize;
                if index >= successors.len() {
                    successors.resize_with(index + 1, || None);
                }
                successors[index] = Some(cache);
                state.new_successors.notify_all();

                match state.queries.lock().unwrap().pop_front() {
                    Some(next) => query = next,
                    None => break,
                }
            }
        }
    }

    /// Looks up the successor edge of a local state under a local letter,
    /// blocking until the successor cache of the state is available.
    pub fn successor(&self, local_state: NodeId, letter: Letter) -> ScoredEdge {
        let index = local_state as usize;
        let mut successors = self.state.successors.lock().unwrap();
        let mut queried = false;
        loop {
            if let Some(Some(cache)) = successors.get(index) {
                return cache.lookup(letter);
            }
            if !queried {
                self.state.queries.lock().unwrap().push_back(local_state);
                self.state.change.notify_all();
                queried = true;
            }
            successors = self.state.new_successors.wait(successors).unwrap();
        }
    }
}

impl Drop for Automaton {
    fn drop(&mut self) {
        self.state.complete.store(true, Ordering::Release);
        self.state.change.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::LeafEdge;

    /// A two-state automaton alternating on bit 0, accepting on state change.
    struct Toggle;
    impl LeafDpa for Toggle {
        fn acceptance(&self) -> Acceptance {
            Acceptance::Buchi
        }
        fn edge_tree(&self, state: u32) -> EdgeTree {
            let stay = LeafEdge {
                successor: state as i32,
                color: 1,
                score: 0.25,
            };
            let toggle = LeafEdge {
                successor: (1 - state) as i32,
                color: 0,
                score: 0.75,
            };
            EdgeTree {
                tree: vec![0, 0, -1],
                edges: vec![stay, toggle],
            }
        }
    }

    #[test]
    fn blocking_lookup_and_flattening() {
        let automaton = Automaton::new(Box::new(Toggle), 1);
        assert_eq!(automaton.node_type(), NodeType::Buchi);
        assert_eq!(automaton.max_color(), 1);

        let edge = automaton.successor(0, 1);
        assert_eq!(edge.successor, 1);
        assert_eq!(edge.cs.color, 0);

        let edge = automaton.successor(1, 0);
        assert_eq!(edge.successor, 1);
        assert_eq!(edge.cs.color, 1);
    }

    #[test]
    fn node_type_join_is_bitwise() {
        assert_eq!(NodeType::Weak.join(NodeType::Buchi), NodeType::Buchi);
        assert_eq!(NodeType::Buchi.join(NodeType::CoBuchi), NodeType::Parity);
        assert_eq!(
            NodeType::Weak.join_biconditional(NodeType::Weak),
            NodeType::Weak
        );
        assert_eq!(
            NodeType::Weak.join_biconditional(NodeType::Buchi),
            NodeType::Parity
        );
    }
}
