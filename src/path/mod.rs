//! Structural Pathfinder
//!
//! Finds short paths between two node identifiers over edges virtualized
//! from the fact graph. An edge `u → v` exists when any of these holds
//! for the configured traversal predicates:
//!
//! - a fact `(u, P, v)` exists (outbound, labelled `P`)
//! - a fact `(v, defines, u)` exists (symbol → file lift, labelled
//!   `parent_defines`)
//! - the portal table maps route `u` to handler `v` (teleport)
//!
//! ## Strategy
//!
//! Bidirectional BFS with a balanced-frontier policy is the default; a
//! Dijkstra variant takes over when the caller asks for weighted search
//! or portals exist. Both honor the same caps: depth per side, total
//! visited nodes, and branching per node after a stable priority sort by
//! predicate weight. Exhausting a cap, cancellation, and plain "no path"
//! all yield an empty path; only backend failures surface as errors.

pub(crate) mod portals;

use crate::cancel::CancelToken;
use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::value::Value;
use portals::PortalTable;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Edge label for the symbol → file lift
pub const PARENT_DEFINES: &str = "parent_defines";

/// Predicate backing the lift
const DEFINES: &str = "defines";

/// Edges heavier than this are noise near the search roots
const NOISE_WEIGHT: u32 = 3;

/// Depth below which noisy edges are pruned
const SHALLOW_PRUNE_DEPTH: usize = 5;

/// Frontier size from which neighbor expansion fans out across threads
const PARALLEL_FRONTIER_MIN: usize = 8;

/// Weight of a traversal predicate; lower is better
pub fn predicate_weight(predicate: &str) -> u32 {
    match predicate {
        "calls" | "calls_api" | "handled_by" | "references" | "exports" => 1,
        "imports" | "defines" | "in_package" => 10,
        _ => 5,
    }
}

/// Caller-tunable search options; `None` falls back to the configured cap
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    /// Force the cost-ordered Dijkstra variant
    pub weighted: bool,
    pub max_depth: Option<usize>,
    pub max_visited: Option<usize>,
    pub max_branching: Option<usize>,
}

/// One hop of a found path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEdge {
    pub src: String,
    pub dst: String,
    pub predicate: String,
}

/// Search result: ordered nodes plus per-hop labels. An empty node list
/// means no path (or a cap/cancellation cut the search short).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub nodes: Vec<String>,
    pub edges: Vec<PathEdge>,
}

impl Path {
    fn not_found() -> Self {
        Path::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

struct Caps {
    max_depth: usize,
    max_visited: usize,
    max_branching: usize,
}

/// Pathfinder over one store's fact graph
pub struct PathFinder<'a> {
    store: &'a Store,
}

impl<'a> PathFinder<'a> {
    pub fn new(store: &'a Store) -> Self {
        PathFinder { store }
    }

    /// Find a path from `start` to `end`
    ///
    /// Never fails on "no path": cancellation, timeouts and cap
    /// exhaustion all come back as an empty path with a diagnostic in
    /// the logs. Only backend failures are errors.
    pub fn find(
        &self,
        start: &str,
        end: &str,
        options: &PathOptions,
        token: &CancelToken,
    ) -> Result<Path> {
        match self.search(start, end, options, token, true) {
            Ok(path) => Ok(path),
            Err(StoreError::Cancelled { elapsed_ms }) => {
                warn!(start, end, elapsed_ms, "path search cancelled");
                Ok(Path::not_found())
            }
            Err(e) => Err(e),
        }
    }

    fn search(
        &self,
        start: &str,
        end: &str,
        options: &PathOptions,
        token: &CancelToken,
        allow_fallback: bool,
    ) -> Result<Path> {
        if start.is_empty() || end.is_empty() {
            return Err(StoreError::InvalidInput(
                "path endpoints must be non-empty".to_string(),
            ));
        }
        if start == end {
            return Ok(Path {
                nodes: vec![start.to_string()],
                edges: Vec::new(),
            });
        }

        let portals = self.store.portals().snapshot(self.store, token)?;
        let config = self.store.pathfinder_config();
        let caps = Caps {
            max_depth: options.max_depth.unwrap_or(config.max_depth),
            max_visited: options.max_visited.unwrap_or(config.max_visited),
            max_branching: options.max_branching.unwrap_or(config.max_branching),
        };

        let path = if options.weighted || !portals.is_empty() {
            self.dijkstra(start, end, &portals, &caps, token)?
        } else {
            self.bidirectional(start, end, &portals, &caps, token)?
        };

        if path.is_empty() && allow_fallback {
            if let Some((file_start, file_end)) = file_fallback(start, end) {
                debug!(
                    start,
                    end,
                    file_start,
                    file_end,
                    "no symbol-level path, retrying at file level"
                );
                return self.search(&file_start, &file_end, options, token, false);
            }
        }
        Ok(path)
    }

    // ------------------------------------------------------------------
    // Bidirectional BFS
    // ------------------------------------------------------------------

    fn bidirectional(
        &self,
        start: &str,
        end: &str,
        portals: &Arc<PortalTable>,
        caps: &Caps,
        token: &CancelToken,
    ) -> Result<Path> {
        let mut fwd = Side::new(start);
        let mut bwd = Side::new(end);

        loop {
            token.check()?;
            if fwd.parents.len() + bwd.parents.len() > caps.max_visited {
                warn!(start, end, cap = caps.max_visited, "visited cap exhausted");
                return Ok(Path::not_found());
            }

            // Balanced frontier policy: expand the smaller live side
            let fwd_live = !fwd.frontier.is_empty() && fwd.depth < caps.max_depth;
            let bwd_live = !bwd.frontier.is_empty() && bwd.depth < caps.max_depth;
            let (side, other, direction) = match (fwd_live, bwd_live) {
                (false, false) => return Ok(Path::not_found()),
                (true, false) => (&mut fwd, &mut bwd, Direction::Forward),
                (false, true) => (&mut bwd, &mut fwd, Direction::Backward),
                (true, true) => {
                    if fwd.frontier.len() <= bwd.frontier.len() {
                        (&mut fwd, &mut bwd, Direction::Forward)
                    } else {
                        (&mut bwd, &mut fwd, Direction::Backward)
                    }
                }
            };

            let depth = side.depth;
            let level: Vec<String> = side.frontier.drain(..).collect();
            side.depth += 1;

            // Neighbors of distinct frontier nodes may be computed in
            // parallel; parent-map updates stay on this thread
            let expansions: Vec<(String, Vec<Neighbor>)> =
                if level.len() >= PARALLEL_FRONTIER_MIN && num_cpus::get() > 1 {
                    level
                        .par_iter()
                        .map(|node| {
                            Ok((
                                node.clone(),
                                self.neighbors(node, direction, depth, portals, caps, token)?,
                            ))
                        })
                        .collect::<Result<_>>()?
                } else {
                    level
                        .iter()
                        .map(|node| {
                            Ok((
                                node.clone(),
                                self.neighbors(node, direction, depth, portals, caps, token)?,
                            ))
                        })
                        .collect::<Result<_>>()?
                };

            for (node, neighbors) in expansions {
                for neighbor in neighbors {
                    if side.parents.contains_key(&neighbor.node) {
                        continue;
                    }
                    side.parents.insert(
                        neighbor.node.clone(),
                        Some((node.clone(), neighbor.predicate.clone())),
                    );
                    side.frontier.push_back(neighbor.node.clone());
                    if other.parents.contains_key(&neighbor.node) {
                        let meeting = neighbor.node;
                        let (fwd, bwd) = match direction {
                            Direction::Forward => (&*side, &*other),
                            Direction::Backward => (&*other, &*side),
                        };
                        return Ok(reconstruct_bidirectional(&meeting, fwd, bwd));
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Weighted variant
    // ------------------------------------------------------------------

    fn dijkstra(
        &self,
        start: &str,
        end: &str,
        portals: &Arc<PortalTable>,
        caps: &Caps,
        token: &CancelToken,
    ) -> Result<Path> {
        let mut heap: BinaryHeap<Reverse<(u64, usize, String)>> = BinaryHeap::new();
        let mut best: HashMap<String, u64> = HashMap::new();
        let mut prev: HashMap<String, (String, String)> = HashMap::new();

        heap.push(Reverse((0, 0, start.to_string())));
        best.insert(start.to_string(), 0);

        while let Some(Reverse((cost, hops, node))) = heap.pop() {
            token.check()?;
            if node == end {
                return Ok(reconstruct_weighted(start, end, &prev));
            }
            if best.get(&node).is_some_and(|&known| cost > known) {
                continue; // stale heap entry
            }
            if best.len() > caps.max_visited {
                warn!(start, end, cap = caps.max_visited, "visited cap exhausted");
                return Ok(Path::not_found());
            }
            if hops >= caps.max_depth * 2 {
                continue;
            }
            for neighbor in self.neighbors(&node, Direction::Forward, hops, portals, caps, token)? {
                let next_cost = cost + u64::from(neighbor.weight);
                if best
                    .get(&neighbor.node)
                    .is_none_or(|&known| next_cost < known)
                {
                    best.insert(neighbor.node.clone(), next_cost);
                    prev.insert(
                        neighbor.node.clone(),
                        (node.clone(), neighbor.predicate.clone()),
                    );
                    heap.push(Reverse((next_cost, hops + 1, neighbor.node)));
                }
            }
        }
        Ok(Path::not_found())
    }

    // ------------------------------------------------------------------
    // Edge virtualization
    // ------------------------------------------------------------------

    /// Neighbors of `node` in the virtualized graph, priority-sorted and
    /// capped
    fn neighbors(
        &self,
        node: &str,
        direction: Direction,
        depth: usize,
        portals: &PortalTable,
        caps: &Caps,
        token: &CancelToken,
    ) -> Result<Vec<Neighbor>> {
        let config = self.store.pathfinder_config();
        let mut out = Vec::new();

        match direction {
            Direction::Forward => {
                for predicate in &config.traversal_predicates {
                    let scan =
                        self.store
                            .scan(Some(node), Some(predicate.as_str()), None, None, token)?;
                    for fact in scan {
                        let fact = fact?;
                        if let Value::Str(object) = fact.object {
                            out.push(Neighbor {
                                node: object,
                                predicate: predicate.clone(),
                                weight: predicate_weight(predicate),
                            });
                        }
                    }
                }
                // Symbol → file lift: (v, defines, node) gives node → v
                let scan = self.store.scan(None, Some(DEFINES), Some(node), None, token)?;
                for fact in scan {
                    let fact = fact?;
                    out.push(Neighbor {
                        node: fact.subject,
                        predicate: PARENT_DEFINES.to_string(),
                        weight: predicate_weight(DEFINES),
                    });
                }
                if let Some(handler) = portals.handler(node) {
                    out.push(Neighbor {
                        node: handler.clone(),
                        predicate: config.portal_predicate.clone(),
                        weight: predicate_weight(&config.portal_predicate),
                    });
                }
            }
            Direction::Backward => {
                for predicate in &config.traversal_predicates {
                    let scan =
                        self.store
                            .scan(None, Some(predicate.as_str()), Some(node), None, token)?;
                    for fact in scan {
                        let fact = fact?;
                        out.push(Neighbor {
                            node: fact.subject,
                            predicate: predicate.clone(),
                            weight: predicate_weight(predicate),
                        });
                    }
                }
                // Reverse of the lift: (node, defines, v) gives v → node
                let scan = self.store.scan(Some(node), Some(DEFINES), None, None, token)?;
                for fact in scan {
                    let fact = fact?;
                    if let Value::Str(object) = fact.object {
                        out.push(Neighbor {
                            node: object,
                            predicate: PARENT_DEFINES.to_string(),
                            weight: predicate_weight(DEFINES),
                        });
                    }
                }
                for route in portals.routes(node) {
                    out.push(Neighbor {
                        node: route.clone(),
                        predicate: config.portal_predicate.clone(),
                        weight: predicate_weight(&config.portal_predicate),
                    });
                }
            }
        }

        // Near the roots, heavy edges are noise and are skipped outright
        if depth < SHALLOW_PRUNE_DEPTH {
            out.retain(|n| n.weight <= NOISE_WEIGHT);
        }

        // Stable on insertion order within one weight class
        out.sort_by_key(|n| n.weight);
        if out.len() > caps.max_branching {
            debug!(node, kept = caps.max_branching, dropped = out.len() - caps.max_branching, "branching cap applied");
            out.truncate(caps.max_branching);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
struct Neighbor {
    node: String,
    predicate: String,
    weight: u32,
}

/// One search side: FIFO frontier plus the parent map
struct Side {
    frontier: VecDeque<String>,
    /// node → (parent, predicate); the root maps to `None`
    parents: HashMap<String, Option<(String, String)>>,
    /// Levels expanded so far on this side
    depth: usize,
}

impl Side {
    fn new(root: &str) -> Self {
        let mut parents = HashMap::new();
        parents.insert(root.to_string(), None);
        let mut frontier = VecDeque::new();
        frontier.push_back(root.to_string());
        Side {
            frontier,
            parents,
            depth: 0,
        }
    }
}

fn reconstruct_bidirectional(meeting: &str, fwd: &Side, bwd: &Side) -> Path {
    // Forward half: meeting back to start, then reversed
    let mut nodes = vec![meeting.to_string()];
    let mut edges = Vec::new();
    let mut cursor = meeting.to_string();
    while let Some(Some((parent, predicate))) = fwd.parents.get(&cursor) {
        edges.push(PathEdge {
            src: parent.clone(),
            dst: cursor.clone(),
            predicate: predicate.clone(),
        });
        nodes.push(parent.clone());
        cursor = parent.clone();
    }
    nodes.reverse();
    edges.reverse();

    // Backward half: each parent hop is a real edge `cursor → next`
    let mut cursor = meeting.to_string();
    while let Some(Some((next, predicate))) = bwd.parents.get(&cursor) {
        edges.push(PathEdge {
            src: cursor.clone(),
            dst: next.clone(),
            predicate: predicate.clone(),
        });
        nodes.push(next.clone());
        cursor = next.clone();
    }

    let (nodes, edges) = strip_cycles(nodes, edges);
    Path { nodes, edges }
}

fn reconstruct_weighted(start: &str, end: &str, prev: &HashMap<String, (String, String)>) -> Path {
    let mut nodes = vec![end.to_string()];
    let mut edges = Vec::new();
    let mut cursor = end.to_string();
    while cursor != start {
        let Some((parent, predicate)) = prev.get(&cursor) else {
            return Path::not_found();
        };
        edges.push(PathEdge {
            src: parent.clone(),
            dst: cursor.clone(),
            predicate: predicate.clone(),
        });
        nodes.push(parent.clone());
        cursor = parent.clone();
    }
    nodes.reverse();
    edges.reverse();
    Path { nodes, edges }
}

/// Remove any cycle a meeting across frontiers may have introduced, so a
/// returned path never repeats a node
fn strip_cycles(mut nodes: Vec<String>, mut edges: Vec<PathEdge>) -> (Vec<String>, Vec<PathEdge>) {
    loop {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut duplicate = None;
        for (i, node) in nodes.iter().enumerate() {
            if let Some(&first) = seen.get(node.as_str()) {
                duplicate = Some((first, i));
                break;
            }
            seen.insert(node.as_str(), i);
        }
        match duplicate {
            Some((first, again)) => {
                nodes.drain(first + 1..=again);
                edges.drain(first..again);
            }
            None => return (nodes, edges),
        }
    }
}

/// Lift symbol-like endpoints (`file:symbol`) to their files for the
/// one-shot fallback retry
fn file_fallback(start: &str, end: &str) -> Option<(String, String)> {
    if !start.contains(':') && !end.contains(':') {
        return None;
    }
    let file = |s: &str| s.split(':').next().unwrap_or(s).to_string();
    let (file_start, file_end) = (file(start), file(end));
    if file_start == start && file_end == end {
        return None;
    }
    Some((file_start, file_end))
}
