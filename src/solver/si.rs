//! Distance-based strategy iteration.
//!
//! Every node owns a vector of signed counters, one per compacted color,
//! ordered most significant first. The vectors move monotonically in the
//! lexicographic order of the current player until a Bellman-Ford fixed
//! point is reached; strategy improvement then re-selects edges and nodes
//! whose first counter reached the player's infinity are declared won.
//! The passes are data-parallel over node ids.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use log::{debug, info, trace};
use rayon::prelude::*;

use crate::arena::{Arena, ArenaData};
use crate::automaton::{
    Color, EdgeId, NodeId, Player, EDGE_BOTTOM, NODE_BOTTOM, NODE_TOP,
};

use super::{compact_color_map, SolvingStats, Strategy};

type Distance = i32;

const DISTANCE_INFINITY: Distance = Distance::MAX - 1;
const DISTANCE_MINUS_INFINITY: Distance = -DISTANCE_INFINITY;

fn infinity(player: Player) -> Distance {
    match player {
        Player::Sys => DISTANCE_INFINITY,
        Player::Env => DISTANCE_MINUS_INFINITY,
    }
}

/// The distance-based strategy-iteration solver over a shared arena.
pub struct SiSolver<'a> {
    arena: &'a Arena,
    onthefly: bool,
    compact_colors: bool,
    pool: rayon::ThreadPool,
    parallel: bool,

    winner: Option<Player>,

    n_env_nodes: NodeId,
    n_sys_nodes: NodeId,
    n_sys_edges: EdgeId,
    n_env_edges: EdgeId,

    n_colors: usize,
    color_map: Vec<Color>,

    sys_distances: Vec<Distance>,
    env_distances: Vec<Distance>,

    /// Active outgoing edges of the system player.
    sys_successors: Vec<AtomicBool>,
    /// Chosen outgoing edge per environment node.
    env_successors: Vec<AtomicU32>,

    stats: SolvingStats,
}

impl<'a> SiSolver<'a> {
    pub fn new(
        arena: &'a Arena,
        onthefly: bool,
        num_threads: usize,
        compact_colors: bool,
    ) -> Self {
        let mut max_threads = if num_threads > 0 {
            num_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };
        if onthefly && max_threads > 1 {
            // leave one thread for the construction of the arena
            max_threads -= 1;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads)
            .build()
            .expect("could not build solver thread pool");

        Self {
            arena,
            onthefly,
            compact_colors,
            pool,
            parallel: max_threads > 1,
            winner: None,
            n_env_nodes: 0,
            n_sys_nodes: 0,
            n_sys_edges: 0,
            n_env_edges: 0,
            n_colors: arena.n_colors,
            color_map: Vec::new(),
            sys_distances: Vec::new(),
            env_distances: Vec::new(),
            sys_successors: Vec::new(),
            env_successors: Vec::new(),
            stats: SolvingStats::default(),
        }
    }

    /// Consumes the solver, returning the winner and the strategy arrays
    /// for machine extraction.
    pub fn into_strategy(self) -> (Option<Player>, Strategy) {
        let sys_active = self
            .sys_successors
            .iter()
            .map(|flag| flag.load(Ordering::Acquire))
            .collect();
        let env_choice = self
            .env_successors
            .iter()
            .map(|edge| edge.load(Ordering::Acquire))
            .collect();
        (
            self.winner,
            Strategy {
                sys_active,
                env_choice,
            },
        )
    }

    /// Solves the game, in lock-step with the builder when running
    /// on-the-fly.
    pub fn solve(&mut self) {
        let start = Instant::now();
        if self.onthefly {
            while !self.arena.is_solved() {
                self.arena.wait_for_change(self.n_env_nodes);
                self.load_sizes();
                {
                    let data = self.arena.read();
                    self.preprocess_and_solve(&data);
                }
                if self.winner.is_some() {
                    info!("game solved, winner is {:?}", self.winner);
                    self.arena.mark_solved();
                } else if self.arena.is_complete()
                    && self.n_env_nodes == self.arena.n_env_nodes()
                {
                    // the arena is final and the initial node is undecided
                    break;
                }
            }
        } else {
            self.load_sizes();
            let data = self.arena.read();
            self.preprocess_and_solve(&data);
            drop(data);
            if self.winner.is_some() {
                self.arena.mark_solved();
            }
        }
        self.stats.time += start.elapsed();
        self.stats.nodes = (self.n_env_nodes + self.n_sys_nodes) as usize;
        debug!("solver done: {}", self.stats);
    }

    fn load_sizes(&mut self) {
        self.n_env_nodes = self.arena.n_env_nodes();
        self.n_sys_nodes = self.arena.n_sys_nodes();
        self.n_sys_edges = self.arena.n_sys_edges();
        self.n_env_edges = self.arena.n_env_edges();
        trace!(
            "solving prefix with {} + {} nodes and {} + {} edges",
            self.n_env_nodes,
            self.n_sys_nodes,
            self.n_env_edges,
            self.n_sys_edges
        );
    }

    fn preprocess_and_solve(&mut self, data: &ArenaData) {
        if self.compact_colors {
            self.reduce_colors(data);
        } else {
            self.n_colors = self.arena.n_colors;
            self.color_map = (0..self.n_colors).collect();
        }
        self.solve_game(data);
    }

    /// Compacts the colors that actually occur on materialized edges.
    fn reduce_colors(&mut self, data: &ArenaData) {
        let mut color_count = vec![0_usize; self.arena.n_colors];
        for j in 0..self.n_sys_edges {
            color_count[data.sys_edge_raw(j).color] += 1;
        }
        let (color_map, n_colors) = compact_color_map(&color_count);
        self.color_map = color_map;
        self.n_colors = n_colors;
        trace!("compacted {} colors to {}", self.arena.n_colors, n_colors);
    }

    fn solve_game(&mut self, data: &ArenaData) {
        self.sys_distances = vec![0; self.n_sys_nodes as usize * self.n_colors];
        self.env_distances = vec![0; self.n_env_nodes as usize * self.n_colors];

        // freshly materialized edges start inactive, freshly materialized
        // environment nodes start without a chosen edge
        while self.sys_successors.len() < self.n_sys_edges as usize {
            self.sys_successors.push(AtomicBool::new(false));
        }
        while self.env_successors.len() < self.n_env_nodes as usize {
            self.env_successors.push(AtomicU32::new(EDGE_BOTTOM));
        }

        debug!("starting strategy iteration for the system player");
        self.strategy_iteration(data, Player::Sys);
        debug!("starting strategy iteration for the environment player");
        self.strategy_iteration(data, Player::Env);
    }

    fn strategy_iteration(&mut self, data: &ArenaData, player: Player) {
        let mut change = true;
        while change && self.winner.is_none() && !self.arena.is_solved() {
            self.bellman_ford(data, player);
            change = self.strategy_improvement(data, player);
            self.update_nodes(data, player);
        }
    }

    fn bellman_ford(&mut self, data: &ArenaData, player: Player) {
        self.bellman_ford_init(data, player);
        loop {
            let change = match player {
                Player::Sys => {
                    self.bellman_ford_sys_iteration(data, player);
                    self.bellman_ford_env_iteration(data, player)
                }
                Player::Env => {
                    self.bellman_ford_env_iteration(data, player);
                    self.bellman_ford_sys_iteration(data, player)
                }
            };
            if !change {
                break;
            }
        }
    }

    fn bellman_ford_init(&mut self, data: &ArenaData, player: Player) {
        let init = infinity(player);
        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.sys_distances,
            self.n_colors,
            |i, dist| {
                let winner = data.sys_winner(i as NodeId);
                if winner == Some(player) || (player == Player::Env && winner.is_none()) {
                    dist[0] = init;
                } else {
                    dist.fill(0);
                }
            },
        );
        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.env_distances,
            self.n_colors,
            |i, dist| {
                let winner = data.env_winner(i as NodeId);
                if winner == Some(player) || (player == Player::Sys && winner.is_none()) {
                    dist[0] = init;
                } else {
                    dist.fill(0);
                }
            },
        );
    }

    fn bellman_ford_sys_iteration(&mut self, data: &ArenaData, player: Player) -> bool {
        let change = AtomicBool::new(false);
        let n_env_nodes = self.n_env_nodes;
        let n_colors = self.n_colors;
        let env_distances = &self.env_distances;
        let sys_successors = &self.sys_successors;
        let color_map = &self.color_map;
        let parity = self.arena.parity_type.color();

        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.sys_distances,
            n_colors,
            |i, dist| {
                if data.sys_winner(i as NodeId).is_some() {
                    return;
                }
                if player == Player::Sys {
                    // compare against zero for non-deterministic strategies
                    dist.fill(0);
                }
                for j in data.sys_succs_begin(i as NodeId)..data.sys_succs_end(i as NodeId) {
                    if player == Player::Env || sys_successors[j as usize].load(Ordering::Relaxed)
                    {
                        let edge = data.sys_edge(j);
                        if edge.successor == NODE_BOTTOM {
                            continue;
                        } else if edge.successor == NODE_TOP {
                            if dist[0] != DISTANCE_INFINITY {
                                change.store(true, Ordering::Relaxed);
                                dist[0] = DISTANCE_INFINITY;
                            }
                            break;
                        }
                        let explored = edge.successor < n_env_nodes;
                        let m = edge.successor as usize * n_colors;
                        if explored {
                            if env_distances[m] == DISTANCE_INFINITY {
                                if dist[0] != DISTANCE_INFINITY {
                                    change.store(true, Ordering::Relaxed);
                                    dist[0] = DISTANCE_INFINITY;
                                }
                                break;
                            } else if env_distances[m] == DISTANCE_MINUS_INFINITY {
                                // skip successor
                                continue;
                            }
                        }

                        let cur_color = color_map[edge.color];
                        let delta = 1 - (((parity + cur_color) as Distance & 1) << 1);
                        dist[cur_color] -= delta;

                        let mut local_change = false;
                        for l in 0..n_colors {
                            let d = dist[l];
                            let d_succ = if explored { env_distances[m + l] } else { 0 };
                            if local_change || d_succ > d {
                                dist[l] = d_succ;
                                local_change = true;
                            } else if d_succ != d {
                                break;
                            }
                        }
                        dist[cur_color] += delta;

                        if local_change {
                            change.store(true, Ordering::Relaxed);
                        }
                    }
                }
            },
        );
        change.into_inner()
    }

    fn bellman_ford_env_iteration(&mut self, data: &ArenaData, player: Player) -> bool {
        let change = AtomicBool::new(false);
        let n_colors = self.n_colors;
        let sys_distances = &self.sys_distances;
        let env_successors = &self.env_successors;

        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.env_distances,
            n_colors,
            |i, dist| {
                if data.env_winner(i as NodeId).is_some() {
                    return;
                }
                match player {
                    Player::Sys => {
                        for j in
                            data.env_succs_begin(i as NodeId)..data.env_succs_end(i as NodeId)
                        {
                            let successor = data.env_edge(j);
                            let m = successor as usize * n_colors;
                            if sys_distances[m] < DISTANCE_INFINITY {
                                let mut local_change = false;
                                for l in 0..n_colors {
                                    let d = dist[l];
                                    let d_succ = sys_distances[m + l];
                                    if local_change || d_succ < d {
                                        dist[l] = d_succ;
                                        local_change = true;
                                    } else if d_succ != d {
                                        break;
                                    }
                                }
                                if local_change {
                                    change.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                    }
                    Player::Env => {
                        let j = env_successors[i].load(Ordering::Relaxed);
                        if j != EDGE_BOTTOM {
                            let successor = data.env_edge(j);
                            let m = successor as usize * n_colors;
                            dist.copy_from_slice(&sys_distances[m..m + n_colors]);
                        }
                    }
                }
            },
        );
        change.into_inner()
    }

    fn strategy_improvement(&mut self, data: &ArenaData, player: Player) -> bool {
        match player {
            Player::Sys => self.strategy_improvement_sys(data),
            Player::Env => self.strategy_improvement_env(data),
        }
    }

    fn strategy_improvement_sys(&mut self, data: &ArenaData) -> bool {
        let change = AtomicBool::new(false);
        let n_env_nodes = self.n_env_nodes;
        let n_colors = self.n_colors;
        let env_distances = &self.env_distances;
        let sys_successors = &self.sys_successors;
        let color_map = &self.color_map;
        let parity = self.arena.parity_type.color();

        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.sys_distances,
            n_colors,
            |i, dist| {
                if data.sys_winner(i as NodeId).is_some() || dist[0] >= DISTANCE_INFINITY {
                    return;
                }
                for j in data.sys_succs_begin(i as NodeId)..data.sys_succs_end(i as NodeId) {
                    sys_successors[j as usize].store(false, Ordering::Relaxed);
                    let edge = data.sys_edge(j);

                    if edge.successor == NODE_TOP {
                        sys_successors[j as usize].store(true, Ordering::Relaxed);
                        change.store(true, Ordering::Relaxed);
                    } else if edge.successor < n_env_nodes
                        && data.env_winner(edge.successor) != Some(Player::Env)
                    {
                        let mut improvement = true;
                        let m = edge.successor as usize * n_colors;

                        let cur_color = color_map[edge.color];
                        let delta = 1 - (((parity + cur_color) as Distance & 1) << 1);
                        dist[cur_color] -= delta;

                        for l in 0..n_colors {
                            let d = dist[l];
                            let d_succ = env_distances[m + l];
                            if d_succ > d {
                                // strict improvement
                                change.store(true, Ordering::Relaxed);
                                break;
                            } else if d_succ != d {
                                improvement = false;
                                break;
                            }
                        }
                        dist[cur_color] += delta;

                        if improvement {
                            sys_successors[j as usize].store(true, Ordering::Relaxed);
                        }
                    }
                }
            },
        );
        change.into_inner()
    }

    fn strategy_improvement_env(&mut self, data: &ArenaData) -> bool {
        let change = AtomicBool::new(false);
        let n_colors = self.n_colors;
        let sys_distances = &self.sys_distances;
        let env_successors = &self.env_successors;

        Self::for_each_chunk(
            &self.pool,
            self.parallel,
            &mut self.env_distances,
            n_colors,
            |i, dist| {
                if data.env_winner(i as NodeId).is_some() || dist[0] <= DISTANCE_MINUS_INFINITY {
                    return;
                }
                for j in data.env_succs_begin(i as NodeId)..data.env_succs_end(i as NodeId) {
                    let successor = data.env_edge(j);
                    if data.sys_winner(successor) == Some(Player::Sys) {
                        continue;
                    }
                    let m = successor as usize * n_colors;
                    let mut improvement = false;
                    if sys_distances[m] == DISTANCE_MINUS_INFINITY {
                        improvement = true;
                    } else {
                        for l in 0..n_colors {
                            let d = dist[l];
                            let d_succ = sys_distances[m + l];
                            if d_succ < d {
                                // strict improvement
                                improvement = true;
                                break;
                            } else if d_succ != d {
                                break;
                            }
                        }
                    }
                    if improvement {
                        change.store(true, Ordering::Relaxed);
                        env_successors[i].store(j, Ordering::Relaxed);
                        break;
                    }
                }
            },
        );
        change.into_inner()
    }

    fn update_nodes(&mut self, data: &ArenaData, player: Player) {
        let won = infinity(player);
        let n_env_nodes = self.n_env_nodes;
        let n_sys_nodes = self.n_sys_nodes;
        let n_colors = self.n_colors;
        let env_distances = &self.env_distances;
        let sys_distances = &self.sys_distances;
        let sys_successors = &self.sys_successors;
        let arena = self.arena;

        let won_env = AtomicU32::new(0);
        let won_sys = AtomicU32::new(0);

        Self::for_each_node(&self.pool, self.parallel, n_env_nodes as usize, |i| {
            if data.env_winner(i as NodeId).is_none()
                && env_distances[i * n_colors] == won
            {
                arena.set_env_winner(data, i as NodeId, player);
                won_env.fetch_add(1, Ordering::Relaxed);
            }
        });
        Self::for_each_node(&self.pool, self.parallel, n_sys_nodes as usize, |i| {
            if data.sys_winner(i as NodeId).is_none()
                && sys_distances[i * n_colors] == won
            {
                data.set_sys_winner(i as NodeId, player);
                won_sys.fetch_add(1, Ordering::Relaxed);
                if player == Player::Sys {
                    // deactivate edges leaving the winning region, so that
                    // the non-deterministic strategy stays winning
                    for j in data.sys_succs_begin(i as NodeId)..data.sys_succs_end(i as NodeId) {
                        if sys_successors[j as usize].load(Ordering::Relaxed) {
                            let edge = data.sys_edge(j);
                            if edge.successor < n_env_nodes
                                && data.env_winner(edge.successor).is_none()
                                && env_distances[edge.successor as usize * n_colors]
                                    < DISTANCE_INFINITY
                            {
                                sys_successors[j as usize].store(false, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
        });

        let declared = (won_env.into_inner() + won_sys.into_inner()) as usize;
        match player {
            Player::Sys => self.stats.nodes_won_sys += declared,
            Player::Env => self.stats.nodes_won_env += declared,
        }

        self.winner = if self.n_env_nodes > 0 {
            data.env_winner(self.arena.initial_node)
        } else {
            None
        };
    }

    fn for_each_chunk(
        pool: &rayon::ThreadPool,
        parallel: bool,
        distances: &mut [Distance],
        n_colors: usize,
        f: impl Fn(usize, &mut [Distance]) + Sync + Send,
    ) {
        if parallel {
            pool.install(|| {
                distances
                    .par_chunks_mut(n_colors)
                    .enumerate()
                    .for_each(|(i, chunk)| f(i, chunk));
            });
        } else {
            for (i, chunk) in distances.chunks_mut(n_colors).enumerate() {
                f(i, chunk);
            }
        }
    }

    fn for_each_node(
        pool: &rayon::ThreadPool,
        parallel: bool,
        n: usize,
        f: impl Fn(usize) + Sync + Send,
    ) {
        if parallel {
            pool.install(|| (0..n).into_par_iter().for_each(f));
        } else {
            for i in 0..n {
                f(i);
            }
        }
    }
}
