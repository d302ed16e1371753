//! Interface to the LTL-to-DPA translation.
//!
//! The game pipeline consumes a *decomposed* deterministic parity automaton:
//! a tree of boolean connectives whose leaves are deterministic parity
//! automata over disjoint sub-alphabets. This module defines the interface
//! the pipeline relies on, together with the realizability store through
//! which solved product states are declared back to the translator and
//! queried during exploration. The built-in implementation for a pragmatic
//! LTL fragment lives in [`fragment`].

pub mod fragment;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ltl::AtomicPropositionStatus;

/// The label of an inner node of the decomposed automaton structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Tag {
    Conjunction,
    Disjunction,
    Biconditional,
}

/// A tree with labelled inner nodes and labelled leaves.
#[derive(Debug, Clone)]
pub enum LabelledTree<L1, L2> {
    Node(L1, Vec<LabelledTree<L1, L2>>),
    Leaf(L2),
}

/// A reference to a leaf automaton of the decomposed structure.
#[derive(Debug, Clone)]
pub struct Reference {
    /// The index of the automaton in [`DecomposedDpa::automata`].
    pub index: usize,
    /// Mapping from global proposition indices to local alphabet bits.
    pub alphabet_mapping: Vec<(usize, usize)>,
    /// A printable rendering of the formula the automaton was built from.
    pub formula: String,
}

/// The realizability status of a (partial) product state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RealizabilityStatus {
    Realizable,
    Unrealizable,
    Unknown,
}

/// The acceptance condition of a leaf automaton.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Acceptance {
    /// Accepting iff the bottom sink is never reached.
    Safety,
    /// Accepting iff the top sink is reached.
    CoSafety,
    /// Accepting iff an edge of color 0 is seen infinitely often.
    Buchi,
    /// Accepting iff edges of color 0 are seen only finitely often.
    CoBuchi,
    /// Accepting iff the minimal color seen infinitely often is even.
    ParityMinEven { max_color: usize },
    /// Accepting iff the minimal color seen infinitely often is odd.
    ParityMinOdd { max_color: usize },
}

/// The local state index of the accepting sink in translator encoding.
pub const SINK_TOP: i32 = -2;
/// The local state index of the rejecting sink in translator encoding.
pub const SINK_BOTTOM: i32 = -1;

/// A raw successor edge of a leaf automaton, in translator encoding:
/// non-negative successors are ordinary local states, [`SINK_TOP`] and
/// [`SINK_BOTTOM`] are the sinks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LeafEdge {
    pub successor: i32,
    pub color: usize,
    pub score: f64,
}

/// The successor function of one leaf state, as a decision tree over the
/// local alphabet bits.
///
/// `tree` stores one `(bit, left, right)` triple per inner node in three
/// consecutive entries, with the root at offset 0. A strictly positive
/// child entry is the offset of another inner node; an entry `e <= 0`
/// refers to `edges[-e]`. An empty `tree` means the state has the single
/// unconditional successor `edges[0]`.
#[derive(Debug, Clone, Default)]
pub struct EdgeTree {
    pub tree: Vec<i32>,
    pub edges: Vec<LeafEdge>,
}

/// A deterministic parity automaton leaf produced by the translator.
///
/// State `0` is the initial state. Implementations are queried from a
/// single background thread per adapter and must therefore be [`Send`].
pub trait LeafDpa: Send {
    /// The acceptance condition of this automaton.
    fn acceptance(&self) -> Acceptance;
    /// Computes the successor edges of the given local state.
    fn edge_tree(&self, state: u32) -> EdgeTree;
}

/// A deterministic parity automaton decomposed into a boolean combination
/// of leaf automata over disjoint sub-alphabets.
pub struct DecomposedDpa {
    /// The leaf automata, indexed by [`Reference::index`].
    pub automata: Vec<Box<dyn LeafDpa>>,
    /// The boolean structure over the leaves.
    pub structure: LabelledTree<Tag, Reference>,
    /// Per-proposition statuses from realizability simplification.
    pub statuses: Vec<AtomicPropositionStatus>,
    /// Realizability knowledge per automaton: local state to verdict.
    store: Mutex<Vec<HashMap<i32, bool>>>,
}

impl DecomposedDpa {
    pub fn new(
        automata: Vec<Box<dyn LeafDpa>>,
        structure: LabelledTree<Tag, Reference>,
        statuses: Vec<AtomicPropositionStatus>,
    ) -> Self {
        let store = Mutex::new(vec![HashMap::new(); automata.len()]);
        Self {
            automata,
            structure,
            statuses,
            store,
        }
    }

    pub fn variable_statuses(&self) -> &[AtomicPropositionStatus] {
        &self.statuses
    }

    /// Declares the given vector of per-leaf automaton states (in leaf
    /// order of the structure) as realizable or unrealizable. Returns true
    /// if new knowledge was recorded.
    ///
    /// Verdicts are pushed down the boolean structure only where the
    /// disjointness of the sub-alphabets makes this sound: a realizable
    /// conjunction makes every conjunct realizable, an unrealizable
    /// conjunction with all siblings known realizable pins the remaining
    /// child, and dually for disjunctions. Biconditionals are opaque.
    pub fn declare(&self, status: RealizabilityStatus, states: &[i32]) -> bool {
        let target = match status {
            RealizabilityStatus::Realizable => true,
            RealizabilityStatus::Unrealizable => false,
            RealizabilityStatus::Unknown => return false,
        };
        let mut store = self.store.lock().unwrap();
        let mut leaf = 0;
        Self::declare_rec(&self.structure, states, target, &mut store, &mut leaf)
    }

    fn declare_rec(
        tree: &LabelledTree<Tag, Reference>,
        states: &[i32],
        target: bool,
        store: &mut [HashMap<i32, bool>],
        leaf: &mut usize,
    ) -> bool {
        match tree {
            LabelledTree::Leaf(reference) => {
                let state = states[*leaf];
                *leaf += 1;
                if state < 0 {
                    // already a sink, nothing to learn
                    return false;
                }
                match store[reference.index].insert(state, target) {
                    Some(old) => {
                        debug_assert_eq!(old, target);
                        false
                    }
                    None => true,
                }
            }
            LabelledTree::Node(tag, children) => {
                let push_all = match (tag, target) {
                    (Tag::Conjunction, true) | (Tag::Disjunction, false) => true,
                    (Tag::Conjunction, false) | (Tag::Disjunction, true) => false,
                    (Tag::Biconditional, _) => {
                        Self::skip_leaves(tree, leaf);
                        return false;
                    }
                };
                if push_all {
                    let mut change = false;
                    for child in children {
                        change |= Self::declare_rec(child, states, target, store, leaf);
                    }
                    change
                } else {
                    // find the unique child that is not already decided the
                    // other way; only then is the verdict forced on it
                    let start = *leaf;
                    let mut unknown = 0;
                    let mut forced = true;
                    for child in children {
                        match Self::evaluate_rec(child, states, store, leaf) {
                            Some(v) if v == !target => {}
                            Some(_) => forced = false,
                            None => unknown += 1,
                        }
                    }
                    if !forced || unknown != 1 {
                        return false;
                    }
                    // replay to locate the undecided child
                    let mut change = false;
                    *leaf = start;
                    for child in children {
                        let mut probe = *leaf;
                        let value = Self::evaluate_rec(child, states, store, &mut probe);
                        if value.is_none() {
                            change |= Self::declare_rec(child, states, target, store, leaf);
                        } else {
                            *leaf = probe;
                        }
                    }
                    change
                }
            }
        }
    }

    fn skip_leaves(tree: &LabelledTree<Tag, Reference>, leaf: &mut usize) {
        match tree {
            LabelledTree::Leaf(_) => *leaf += 1,
            LabelledTree::Node(_, children) => {
                for child in children {
                    Self::skip_leaves(child, leaf);
                }
            }
        }
    }

    fn evaluate_rec(
        tree: &LabelledTree<Tag, Reference>,
        states: &[i32],
        store: &[HashMap<i32, bool>],
        leaf: &mut usize,
    ) -> Option<bool> {
        match tree {
            LabelledTree::Leaf(reference) => {
                let state = states[*leaf];
                *leaf += 1;
                if state == SINK_TOP {
                    Some(true)
                } else if state == SINK_BOTTOM {
                    Some(false)
                } else {
                    store[reference.index].get(&state).copied()
                }
            }
            LabelledTree::Node(tag, children) => {
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    values.push(Self::evaluate_rec(child, states, store, leaf));
                }
                match tag {
                    Tag::Conjunction => {
                        if values.iter().any(|v| *v == Some(false)) {
                            Some(false)
                        } else if values.iter().all(|v| *v == Some(true)) {
                            Some(true)
                        } else {
                            None
                        }
                    }
                    Tag::Disjunction => {
                        if values.iter().any(|v| *v == Some(true)) {
                            Some(true)
                        } else if values.iter().all(|v| *v == Some(false)) {
                            Some(false)
                        } else {
                            None
                        }
                    }
                    // only the jointly realizable case is conclusive
                    Tag::Biconditional => {
                        if values.iter().all(|v| *v == Some(true)) {
                            Some(true)
                        } else {
                            None
                        }
                    }
                }
            }
        }
    }

    /// Queries the realizability of the given vector of per-leaf automaton
    /// states.
    pub fn query(&self, states: &[i32]) -> RealizabilityStatus {
        let store = self.store.lock().unwrap();
        let mut leaf = 0;
        match Self::evaluate_rec(&self.structure, states, &store, &mut leaf) {
            Some(true) => RealizabilityStatus::Realizable,
            Some(false) => RealizabilityStatus::Unrealizable,
            None => RealizabilityStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyLeaf;
    impl LeafDpa for DummyLeaf {
        fn acceptance(&self) -> Acceptance {
            Acceptance::Buchi
        }
        fn edge_tree(&self, _state: u32) -> EdgeTree {
            EdgeTree::default()
        }
    }

    fn reference(index: usize) -> Reference {
        Reference {
            index,
            alphabet_mapping: vec![],
            formula: String::new(),
        }
    }

    fn conjunction_of_two() -> DecomposedDpa {
        DecomposedDpa::new(
            vec![Box::new(DummyLeaf), Box::new(DummyLeaf)],
            LabelledTree::Node(
                Tag::Conjunction,
                vec![
                    LabelledTree::Leaf(reference(0)),
                    LabelledTree::Leaf(reference(1)),
                ],
            ),
            vec![],
        )
    }

    #[test]
    fn conjunction_declares_children_realizable() {
        let dpa = conjunction_of_two();
        assert_eq!(dpa.query(&[0, 0]), RealizabilityStatus::Unknown);
        assert!(dpa.declare(RealizabilityStatus::Realizable, &[0, 0]));
        assert_eq!(dpa.query(&[0, 0]), RealizabilityStatus::Realizable);
        // no new knowledge the second time
        assert!(!dpa.declare(RealizabilityStatus::Realizable, &[0, 0]));
    }

    #[test]
    fn conjunction_forces_single_unknown_child() {
        let dpa = conjunction_of_two();
        // leaf 0 in state 1 realizable, conjunction with leaf 1 state 5 not
        assert!(dpa.declare(RealizabilityStatus::Realizable, &[1, SINK_TOP]));
        assert!(dpa.declare(RealizabilityStatus::Unrealizable, &[1, 5]));
        assert_eq!(dpa.query(&[7, 5]), RealizabilityStatus::Unrealizable);
        assert_eq!(dpa.query(&[1, 3]), RealizabilityStatus::Unknown);
    }

    #[test]
    fn sinks_answer_directly() {
        let dpa = conjunction_of_two();
        assert_eq!(
            dpa.query(&[SINK_TOP, SINK_TOP]),
            RealizabilityStatus::Realizable
        );
        assert_eq!(
            dpa.query(&[SINK_TOP, SINK_BOTTOM]),
            RealizabilityStatus::Unrealizable
        );
    }
}
