//! Parity-game solving.

mod si;

use std::fmt;
use std::time::Duration;

use crate::automaton::{Color, EdgeId};

pub use si::SiSolver;

/// The strategy computed by the solver: the active outgoing edges of the
/// system nodes and the chosen outgoing edge of the environment nodes.
pub struct Strategy {
    pub sys_active: Vec<bool>,
    pub env_choice: Vec<EdgeId>,
}

/// Compacts a color sequence: colors without any occurrence are removed
/// while consecutive occupied colors of equal parity collapse into one.
/// Returns the mapping from old to new colors and the new color count.
pub(crate) fn compact_color_map(color_count: &[usize]) -> (Vec<Color>, usize) {
    let mut color_map = vec![0; color_count.len()];
    let mut cur_color = 0;
    for (c, &count) in color_count.iter().enumerate() {
        if count != 0 {
            if c % 2 != cur_color % 2 {
                cur_color += 1;
            }
            color_map[c] = cur_color;
        }
    }
    (color_map, cur_color + 1)
}

/// Summary counters of one solver run.
#[derive(Debug, Default, Clone)]
pub struct SolvingStats {
    pub nodes: usize,
    pub nodes_won_sys: usize,
    pub nodes_won_env: usize,
    pub time: Duration,
}

impl fmt::Display for SolvingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|V| = {}, |W_sys| = {}, |W_env| = {}, solver time: {:.2}",
            self.nodes,
            self.nodes_won_sys,
            self.nodes_won_env,
            self.time.as_secs_f32(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_preserves_parity_and_collapses() {
        // colors 1 and 3 are both odd and used, 2 is unused
        let counts = [0, 3, 0, 4, 1];
        let (map, n) = compact_color_map(&counts);
        assert_eq!(map[1], 1);
        assert_eq!(map[3], 1);
        assert_eq!(map[4], 2);
        assert_eq!(n, 3);
    }

    #[test]
    fn compaction_is_idempotent() {
        let counts = [5, 0, 2, 1];
        let (map, n) = compact_color_map(&counts);
        // re-count under the compacted colors
        let mut new_counts = vec![0; n];
        for (c, &count) in counts.iter().enumerate() {
            if count != 0 {
                new_counts[map[c]] += count;
            }
        }
        let (second_map, second_n) = compact_color_map(&new_counts);
        assert_eq!(second_n, n);
        for c in 0..n {
            if new_counts[c] != 0 {
                assert_eq!(second_map[c], c);
            }
        }
    }
}
