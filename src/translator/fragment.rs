//! Built-in LTL-to-DPA translation for a pragmatic fragment.
//!
//! The decomposition splits conjunctions, disjunctions and biconditionals
//! whose operands use pairwise disjoint propositions; every other subformula
//! must be one of the directly supported patterns below and becomes a leaf
//! automaton over its own sub-alphabet. Anything else is rejected with an
//! [`UnsupportedError`] rather than translated approximately.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::ltl::{AtomicPropositionStatus, Formula};

use super::{
    Acceptance, DecomposedDpa, EdgeTree, LabelledTree, LeafDpa, LeafEdge, Reference, Tag,
    SINK_BOTTOM, SINK_TOP,
};

/// An error returned for formulas outside the supported fragment.
#[derive(Debug, thiserror::Error)]
#[error("formula not supported by the built-in LTL translator: {formula}")]
pub struct UnsupportedError {
    formula: String,
}

impl UnsupportedError {
    fn new(formula: &Formula) -> Self {
        Self {
            formula: formula.to_string(),
        }
    }
}

/// Largest leaf alphabet the tabulating leaf construction accepts.
const MAX_LEAF_PROPS: usize = 16;

/// The automaton pattern backing one leaf, over local propositions.
#[derive(Debug, Clone)]
enum LeafKind {
    /// A propositional constraint on the first letter.
    Prop(Formula),
    /// `G body`.
    Safety(Formula),
    /// `F body`.
    CoSafety(Formula),
    /// `hold U goal`.
    Until { hold: Formula, goal: Formula },
    /// `release R hold`.
    Release { release: Formula, hold: Formula },
    /// `G F body`.
    Buchi(Formula),
    /// `F G body`.
    CoBuchi(Formula),
    /// `G (ok | F goal)`, with the pending obligation in state 1.
    Response { ok: Formula, goal: Formula },
}

/// A leaf automaton of the built-in translator.
pub struct FragmentLeaf {
    kind: LeafKind,
    num_props: u32,
}

impl FragmentLeaf {
    /// The successor edge for a concrete local letter.
    fn step(&self, state: u32, letter: u64) -> LeafEdge {
        let eval = |f: &Formula| eval_propositional(f, letter);
        let edge = |successor: i32, color: usize, score: f64| LeafEdge {
            successor,
            color,
            score,
        };
        match &self.kind {
            LeafKind::Prop(body) => {
                if eval(body) {
                    edge(SINK_TOP, 0, 1.0)
                } else {
                    edge(SINK_BOTTOM, 1, 0.0)
                }
            }
            LeafKind::Safety(body) => {
                if eval(body) {
                    edge(0, 0, 0.6)
                } else {
                    edge(SINK_BOTTOM, 1, 0.0)
                }
            }
            LeafKind::CoSafety(body) => {
                if eval(body) {
                    edge(SINK_TOP, 0, 1.0)
                } else {
                    edge(0, 1, 0.4)
                }
            }
            LeafKind::Until { hold, goal } => {
                if eval(goal) {
                    edge(SINK_TOP, 0, 1.0)
                } else if eval(hold) {
                    edge(0, 1, 0.4)
                } else {
                    edge(SINK_BOTTOM, 1, 0.0)
                }
            }
            LeafKind::Release { release, hold } => {
                if !eval(hold) {
                    edge(SINK_BOTTOM, 1, 0.0)
                } else if eval(release) {
                    edge(SINK_TOP, 0, 1.0)
                } else {
                    edge(0, 0, 0.6)
                }
            }
            LeafKind::Buchi(body) => {
                if eval(body) {
                    edge(0, 0, 0.75)
                } else {
                    edge(0, 1, 0.25)
                }
            }
            LeafKind::CoBuchi(body) => {
                if eval(body) {
                    edge(0, 1, 0.75)
                } else {
                    edge(0, 0, 0.25)
                }
            }
            LeafKind::Response { ok, goal } => {
                if eval(goal) {
                    edge(0, 0, 0.75)
                } else if state == 0 && eval(ok) {
                    edge(0, 0, 0.6)
                } else {
                    edge(1, 1, 0.25)
                }
            }
        }
    }
}

impl LeafDpa for FragmentLeaf {
    fn acceptance(&self) -> Acceptance {
        match self.kind {
            LeafKind::Prop(_) | LeafKind::Safety(_) | LeafKind::Release { .. } => {
                Acceptance::Safety
            }
            LeafKind::CoSafety(_) | LeafKind::Until { .. } => Acceptance::CoSafety,
            LeafKind::Buchi(_) | LeafKind::Response { .. } => Acceptance::Buchi,
            LeafKind::CoBuchi(_) => Acceptance::CoBuchi,
        }
    }

    fn edge_tree(&self, state: u32) -> EdgeTree {
        build_edge_tree(self.num_props, |letter| self.step(state, letter))
    }
}

/// Evaluates a propositional formula on a letter.
fn eval_propositional(formula: &Formula, letter: u64) -> bool {
    match formula {
        Formula::True => true,
        Formula::False => false,
        Formula::Ap(index) => letter & (1 << index) != 0,
        Formula::Not(inner) => !eval_propositional(inner, letter),
        Formula::And(operands) => operands.iter().all(|f| eval_propositional(f, letter)),
        Formula::Or(operands) => operands.iter().any(|f| eval_propositional(f, letter)),
        Formula::Implies(lhs, rhs) => {
            !eval_propositional(lhs, letter) || eval_propositional(rhs, letter)
        }
        Formula::Biconditional(lhs, rhs) => {
            eval_propositional(lhs, letter) == eval_propositional(rhs, letter)
        }
        _ => unreachable!("temporal operator in propositional formula"),
    }
}

/// In-memory decision tree used while constructing the flat encoding.
enum TreeNode {
    Leaf(usize),
    Inner(u32, Box<TreeNode>, Box<TreeNode>),
}

/// Builds the flat decision tree over `num_props` letter bits by tabulating
/// `step`, collapsing don't-care bits bottom-up.
fn build_edge_tree(num_props: u32, step: impl Fn(u64) -> LeafEdge) -> EdgeTree {
    fn leaf_id(edges: &mut Vec<LeafEdge>, ids: &mut HashMap<(i32, usize, u64), usize>, edge: LeafEdge) -> usize {
        let key = (edge.successor, edge.color, edge.score.to_bits());
        *ids.entry(key).or_insert_with(|| {
            edges.push(edge);
            edges.len() - 1
        })
    }

    fn equal(a: &TreeNode, b: &TreeNode) -> bool {
        match (a, b) {
            (TreeNode::Leaf(x), TreeNode::Leaf(y)) => x == y,
            (TreeNode::Inner(va, la, ra), TreeNode::Inner(vb, lb, rb)) => {
                va == vb && equal(la, lb) && equal(ra, rb)
            }
            _ => false,
        }
    }

    fn build(
        bit: u32,
        num_props: u32,
        prefix: u64,
        step: &impl Fn(u64) -> LeafEdge,
        edges: &mut Vec<LeafEdge>,
        ids: &mut HashMap<(i32, usize, u64), usize>,
    ) -> TreeNode {
        if bit == num_props {
            TreeNode::Leaf(leaf_id(edges, ids, step(prefix)))
        } else {
            let left = build(bit + 1, num_props, prefix, step, edges, ids);
            let right = build(bit + 1, num_props, prefix | (1 << bit), step, edges, ids);
            if equal(&left, &right) {
                left
            } else {
                TreeNode::Inner(bit, Box::new(left), Box::new(right))
            }
        }
    }

    // pre-order serialization keeps the root at offset 0
    fn serialize(node: &TreeNode, tree: &mut Vec<i32>) -> i32 {
        match node {
            TreeNode::Leaf(id) => -(*id as i32),
            TreeNode::Inner(bit, left, right) => {
                let offset = tree.len() as i32;
                tree.extend_from_slice(&[*bit as i32, 0, 0]);
                let left = serialize(left, tree);
                let right = serialize(right, tree);
                tree[offset as usize + 1] = left;
                tree[offset as usize + 2] = right;
                offset
            }
        }
    }

    let mut edges = Vec::new();
    let mut ids = HashMap::new();
    let root = build(0, num_props, 0, &step, &mut edges, &mut ids);
    let mut tree = Vec::new();
    match &root {
        TreeNode::Leaf(id) => {
            debug_assert_eq!(*id, 0);
        }
        inner => {
            serialize(inner, &mut tree);
        }
    }
    EdgeTree { tree, edges }
}

fn propositions(formula: &Formula, set: &mut BTreeSet<usize>) {
    match formula {
        Formula::True | Formula::False => {}
        Formula::Ap(index) => {
            set.insert(*index);
        }
        Formula::Not(inner)
        | Formula::Next(inner)
        | Formula::Finally(inner)
        | Formula::Globally(inner) => propositions(inner, set),
        Formula::And(operands) | Formula::Or(operands) => {
            for operand in operands {
                propositions(operand, set);
            }
        }
        Formula::Implies(lhs, rhs)
        | Formula::Biconditional(lhs, rhs)
        | Formula::Until(lhs, rhs)
        | Formula::Release(lhs, rhs) => {
            propositions(lhs, set);
            propositions(rhs, set);
        }
    }
}

fn is_propositional(formula: &Formula) -> bool {
    match formula {
        Formula::True | Formula::False | Formula::Ap(_) => true,
        Formula::Not(inner) => is_propositional(inner),
        Formula::And(operands) | Formula::Or(operands) => {
            operands.iter().all(is_propositional)
        }
        Formula::Implies(lhs, rhs) | Formula::Biconditional(lhs, rhs) => {
            is_propositional(lhs) && is_propositional(rhs)
        }
        _ => false,
    }
}

/// Rewrites global proposition indices into local alphabet bits.
fn localize(formula: &Formula, mapping: &HashMap<usize, usize>) -> Formula {
    match formula {
        Formula::True | Formula::False => formula.clone(),
        Formula::Ap(index) => Formula::Ap(mapping[index]),
        Formula::Not(inner) => Formula::Not(Box::new(localize(inner, mapping))),
        Formula::And(operands) => {
            Formula::And(operands.iter().map(|f| localize(f, mapping)).collect())
        }
        Formula::Or(operands) => {
            Formula::Or(operands.iter().map(|f| localize(f, mapping)).collect())
        }
        Formula::Implies(lhs, rhs) => Formula::Implies(
            Box::new(localize(lhs, mapping)),
            Box::new(localize(rhs, mapping)),
        ),
        Formula::Biconditional(lhs, rhs) => Formula::Biconditional(
            Box::new(localize(lhs, mapping)),
            Box::new(localize(rhs, mapping)),
        ),
        Formula::Next(inner) => Formula::Next(Box::new(localize(inner, mapping))),
        Formula::Finally(inner) => Formula::Finally(Box::new(localize(inner, mapping))),
        Formula::Globally(inner) => Formula::Globally(Box::new(localize(inner, mapping))),
        Formula::Until(lhs, rhs) => Formula::Until(
            Box::new(localize(lhs, mapping)),
            Box::new(localize(rhs, mapping)),
        ),
        Formula::Release(lhs, rhs) => Formula::Release(
            Box::new(localize(lhs, mapping)),
            Box::new(localize(rhs, mapping)),
        ),
    }
}

/// Classifies a formula in negation normal form as a leaf pattern over
/// local propositions.
fn classify(formula: &Formula) -> Result<LeafKind, UnsupportedError> {
    if is_propositional(formula) {
        return Ok(LeafKind::Prop(formula.clone()));
    }
    match formula {
        Formula::Globally(inner) => match inner.as_ref() {
            body if is_propositional(body) => Ok(LeafKind::Safety(body.clone())),
            Formula::Finally(body) if is_propositional(body) => {
                Ok(LeafKind::Buchi((**body).clone()))
            }
            Formula::Or(operands) => {
                // G (c | F d) with c, d propositional
                let mut ok = Vec::new();
                let mut goal = None;
                for operand in operands {
                    match operand {
                        Formula::Finally(body) if is_propositional(body) && goal.is_none() => {
                            goal = Some((**body).clone());
                        }
                        op if is_propositional(op) => ok.push(op.clone()),
                        _ => return Err(UnsupportedError::new(formula)),
                    }
                }
                match goal {
                    Some(goal) => Ok(LeafKind::Response {
                        ok: Formula::Or(ok),
                        goal,
                    }),
                    None => Err(UnsupportedError::new(formula)),
                }
            }
            _ => Err(UnsupportedError::new(formula)),
        },
        Formula::Finally(inner) => match inner.as_ref() {
            body if is_propositional(body) => Ok(LeafKind::CoSafety(body.clone())),
            Formula::Globally(body) if is_propositional(body) => {
                Ok(LeafKind::CoBuchi((**body).clone()))
            }
            _ => Err(UnsupportedError::new(formula)),
        },
        Formula::Until(lhs, rhs) if is_propositional(lhs) && is_propositional(rhs) => {
            Ok(LeafKind::Until {
                hold: (**lhs).clone(),
                goal: (**rhs).clone(),
            })
        }
        Formula::Release(lhs, rhs) if is_propositional(lhs) && is_propositional(rhs) => {
            Ok(LeafKind::Release {
                release: (**lhs).clone(),
                hold: (**rhs).clone(),
            })
        }
        _ => Err(UnsupportedError::new(formula)),
    }
}

struct Decomposition {
    automata: Vec<Box<dyn LeafDpa>>,
}

impl Decomposition {
    fn leaf(&mut self, formula: &Formula) -> Result<LabelledTree<Tag, Reference>, UnsupportedError> {
        let mut props = BTreeSet::new();
        propositions(formula, &mut props);
        if props.len() > MAX_LEAF_PROPS {
            return Err(UnsupportedError::new(formula));
        }
        let alphabet_mapping: Vec<(usize, usize)> =
            props.iter().enumerate().map(|(local, &global)| (global, local)).collect();
        let local_map: HashMap<usize, usize> =
            alphabet_mapping.iter().map(|&(global, local)| (global, local)).collect();
        let kind = classify(&localize(formula, &local_map))?;
        let index = self.automata.len();
        self.automata.push(Box::new(FragmentLeaf {
            kind,
            num_props: props.len() as u32,
        }));
        Ok(LabelledTree::Leaf(Reference {
            index,
            alphabet_mapping,
            formula: formula.to_string(),
        }))
    }

    fn split(&mut self, formula: &Formula) -> Result<LabelledTree<Tag, Reference>, UnsupportedError> {
        let disjoint = |operands: &[Formula]| {
            let sets: Vec<BTreeSet<usize>> = operands
                .iter()
                .map(|f| {
                    let mut set = BTreeSet::new();
                    propositions(f, &mut set);
                    set
                })
                .collect();
            sets.iter().enumerate().all(|(i, a)| {
                sets.iter()
                    .skip(i + 1)
                    .all(|b| a.intersection(b).next().is_none())
            })
        };
        match formula {
            Formula::And(operands) if operands.len() > 1 && disjoint(operands) => {
                let children = operands
                    .iter()
                    .map(|f| self.split(f))
                    .collect::<Result<_, _>>()?;
                Ok(LabelledTree::Node(Tag::Conjunction, children))
            }
            Formula::Or(operands) if operands.len() > 1 && disjoint(operands) => {
                let children = operands
                    .iter()
                    .map(|f| self.split(f))
                    .collect::<Result<_, _>>()?;
                Ok(LabelledTree::Node(Tag::Disjunction, children))
            }
            Formula::Biconditional(lhs, rhs)
                if disjoint(&[(**lhs).clone(), (**rhs).clone()])
                    && !(is_propositional(lhs) && is_propositional(rhs)) =>
            {
                let children = vec![self.split(lhs)?, self.split(rhs)?];
                Ok(LabelledTree::Node(Tag::Biconditional, children))
            }
            _ => self.leaf(formula),
        }
    }
}

/// Creates the decomposed deterministic parity automaton for the formula,
/// which must already be simplified. The statuses are attached for the
/// consumer of [`DecomposedDpa::variable_statuses`].
pub fn create_decomposed_automaton(
    formula: &Formula,
    statuses: Vec<AtomicPropositionStatus>,
) -> Result<DecomposedDpa, UnsupportedError> {
    let nnf = formula.nnf();
    debug!("decomposing formula {}", nnf);
    let mut decomposition = Decomposition {
        automata: Vec::new(),
    };
    let structure = decomposition.split(&nnf)?;
    Ok(DecomposedDpa::new(
        decomposition.automata,
        structure,
        statuses,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltl::parse;

    #[test]
    fn decision_tree_lookup_matches_table() {
        let leaf = FragmentLeaf {
            kind: LeafKind::Buchi(Formula::And(vec![Formula::Ap(0), Formula::Ap(2)])),
            num_props: 3,
        };
        let tree = leaf.edge_tree(0);
        // the middle bit is irrelevant, the tree must skip it
        assert_eq!(tree.tree.len(), 2 * 3);
        for letter in 0..8_u64 {
            let expected = leaf.step(0, letter);
            let mut i = 0_i32;
            let edge = if tree.tree.is_empty() {
                tree.edges[0]
            } else {
                loop {
                    let bit = tree.tree[i as usize];
                    i = if letter & (1 << bit) == 0 {
                        tree.tree[i as usize + 1]
                    } else {
                        tree.tree[i as usize + 2]
                    };
                    if i <= 0 {
                        break tree.edges[(-i) as usize];
                    }
                }
            };
            assert_eq!(edge.successor, expected.successor);
            assert_eq!(edge.color, expected.color);
        }
    }

    #[test]
    fn splits_disjoint_conjunction() {
        let aps = ["a", "b"];
        let formula = parse("(G a) & (G F b)", &aps).unwrap();
        let dpa = create_decomposed_automaton(&formula, vec![]).unwrap();
        assert_eq!(dpa.automata.len(), 2);
        assert!(matches!(
            dpa.structure,
            LabelledTree::Node(Tag::Conjunction, _)
        ));
    }

    #[test]
    fn rejects_overlapping_temporal_combination() {
        let aps = ["a"];
        let formula = parse("(G F a) & (F G a)", &aps).unwrap();
        assert!(create_decomposed_automaton(&formula, vec![]).is_err());
    }

    #[test]
    fn implication_of_buchi_becomes_disjunction() {
        let aps = ["r", "g"];
        let formula = parse("(G F r) -> (G F g)", &aps).unwrap();
        let dpa = create_decomposed_automaton(&formula, vec![]).unwrap();
        assert_eq!(dpa.automata.len(), 2);
        match &dpa.structure {
            LabelledTree::Node(Tag::Disjunction, children) => assert_eq!(children.len(), 2),
            other => panic!("unexpected structure: {:?}", other),
        }
    }
}
