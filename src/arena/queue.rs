//! Exploration frontier over product-state references.

use std::collections::VecDeque;

use min_max_heap::MinMaxHeap;
use ordered_float::NotNan;

use crate::automaton::NodeId;

/// A frontier entry: a product-state reference with its heuristic score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScoredProductState {
    pub score: NotNan<f64>,
    pub ref_id: NodeId,
}

impl ScoredProductState {
    pub fn new(score: f64, ref_id: NodeId) -> Self {
        Self {
            score: NotNan::new(score).expect("score is not a number"),
            ref_id,
        }
    }
}

/// The frontier of unexplored product states: either a plain FIFO queue or
/// a double-ended priority queue from which the entries with maximal and
/// minimal score are popped alternatingly.
pub enum Frontier {
    Bfs(VecDeque<ScoredProductState>),
    Pq {
        heap: MinMaxHeap<ScoredProductState>,
        use_max: bool,
    },
}

impl Frontier {
    pub fn bfs() -> Self {
        Self::Bfs(VecDeque::with_capacity(4096))
    }

    pub fn pq() -> Self {
        Self::Pq {
            heap: MinMaxHeap::with_capacity(4096),
            use_max: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bfs(queue) => queue.is_empty(),
            Self::Pq { heap, .. } => heap.is_empty(),
        }
    }

    pub fn push(&mut self, state: ScoredProductState) {
        match self {
            Self::Bfs(queue) => queue.push_back(state),
            Self::Pq { heap, .. } => heap.push(state),
        }
    }

    pub fn pop(&mut self) -> Option<ScoredProductState> {
        match self {
            Self::Bfs(queue) => queue.pop_front(),
            Self::Pq { heap, use_max } => {
                let next = if *use_max {
                    heap.pop_max()
                } else {
                    heap.pop_min()
                };
                *use_max = !*use_max;
                next
            }
        }
    }

    /// Rebuilds the frontier, keeping and possibly rescoring entries.
    /// The filter returns the new score of an entry, or `None` to drop it.
    pub fn filter(&mut self, mut keep: impl FnMut(&ScoredProductState) -> Option<NotNan<f64>>) {
        match self {
            Self::Bfs(queue) => {
                let mut filtered = VecDeque::with_capacity(queue.len());
                for mut entry in queue.drain(..) {
                    if let Some(score) = keep(&entry) {
                        entry.score = score;
                        filtered.push_back(entry);
                    }
                }
                *queue = filtered;
            }
            Self::Pq { heap, .. } => {
                let mut filtered = MinMaxHeap::with_capacity(heap.len());
                let drained = std::mem::replace(heap, MinMaxHeap::new());
                for mut entry in drained.into_vec() {
                    if let Some(score) = keep(&entry) {
                        entry.score = score;
                        filtered.push(entry);
                    }
                }
                *heap = filtered;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfs_is_fifo() {
        let mut frontier = Frontier::bfs();
        frontier.push(ScoredProductState::new(0.1, 1));
        frontier.push(ScoredProductState::new(0.9, 2));
        frontier.push(ScoredProductState::new(0.5, 3));
        let order: Vec<_> = std::iter::from_fn(|| frontier.pop().map(|s| s.ref_id)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn pq_alternates_max_min() {
        let mut frontier = Frontier::pq();
        frontier.push(ScoredProductState::new(0.1, 1));
        frontier.push(ScoredProductState::new(0.9, 2));
        frontier.push(ScoredProductState::new(0.5, 3));
        let order: Vec<_> = std::iter::from_fn(|| frontier.pop().map(|s| s.ref_id)).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn filter_rescores_and_drops() {
        let mut frontier = Frontier::pq();
        frontier.push(ScoredProductState::new(0.1, 1));
        frontier.push(ScoredProductState::new(0.9, 2));
        frontier.filter(|entry| {
            if entry.ref_id == 1 {
                Some(entry.score * 0.5)
            } else {
                None
            }
        });
        let next = frontier.pop().unwrap();
        assert_eq!(next.ref_id, 1);
        assert!(frontier.pop().is_none());
    }
}
