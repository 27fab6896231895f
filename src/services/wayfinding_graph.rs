//! Floor-aware wayfinding graph with deterministic shortest-path search
//!
//! The graph is immutable after construction and shared as `Arc` between the
//! session and route workers. A venue refresh builds a new graph.

use crate::domain::route::RouteError;
use crate::domain::types::LatLngFloor;
use crate::domain::venue::{GraphEdge, Venue};
use crate::geometry::haversine_meters;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Distance under which an off-graph point is taken to be the node itself
const EXACT_MATCH_M: f64 = 0.01;
/// Costs closer than this are treated as equal for tie-breaking
const COST_EPS: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("edge {edge} references node {node}, graph has {node_count} nodes")]
    EdgeOutOfRange { edge: usize, node: usize, node_count: usize },

    #[error("edge {edge} has invalid weight {weight}")]
    InvalidWeight { edge: usize, weight: f64 },

    #[error("node {0} has a non-finite coordinate")]
    InvalidNode(usize),

    #[error("floor transition penalty must be finite and non-negative, got {0}")]
    InvalidPenalty(f64),
}

/// Search tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphConfig {
    /// Extra cost added to every floor-transition edge
    pub floor_transition_penalty: f64,
    /// Farthest an off-graph endpoint may be from its snap node, meters
    pub max_snap_distance_m: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { floor_transition_penalty: 10.0, max_snap_distance_m: 25.0 }
    }
}

/// Start or goal of a path query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Endpoint {
    /// A graph node by index
    Node(usize),
    /// An arbitrary position, snapped onto the graph
    Point(LatLngFloor),
}

impl From<usize> for Endpoint {
    fn from(index: usize) -> Self {
        Endpoint::Node(index)
    }
}

impl From<LatLngFloor> for Endpoint {
    fn from(p: LatLngFloor) -> Self {
        Endpoint::Point(p)
    }
}

/// One position along a found path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathStep {
    Graph(usize),
    /// Off-graph endpoint joined to its snap node
    Virtual(LatLngFloor),
}

/// Shortest path as graph steps plus virtual endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    pub steps: Vec<PathStep>,
    /// Edge traversed between `steps[i]` and `steps[i + 1]`; `None` for virtual hops
    pub edges: Vec<Option<usize>>,
    /// Total cost including snap distances and floor penalties
    pub cost: f64,
}

impl GraphPath {
    /// Indices of the graph nodes visited, in order
    pub fn node_indices(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PathStep::Graph(i) => Some(*i),
                PathStep::Virtual(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    begin: usize,
    end: usize,
    cost: f64,
    floor_transition: bool,
}

/// Priority queue entry
#[derive(Clone, Copy, Debug)]
struct SearchState {
    cost: f64,
    node: usize,
}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchState {}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; lower node index pops first on equal cost
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Endpoint resolved onto the graph
struct Anchor {
    node: usize,
    /// Off-graph position and its distance to `node`
    snap: Option<(LatLngFloor, f64)>,
}

#[derive(Debug, Clone)]
pub struct WayfindingGraph {
    nodes: Vec<LatLngFloor>,
    edges: Vec<Edge>,
    /// node -> [(neighbor, edge index)] in edge index order
    adjacency: Vec<Vec<(usize, usize)>>,
    config: GraphConfig,
}

impl WayfindingGraph {
    pub fn new(
        nodes: Vec<LatLngFloor>,
        edges: &[GraphEdge],
        config: GraphConfig,
    ) -> Result<Self, GraphError> {
        let penalty = config.floor_transition_penalty;
        if !penalty.is_finite() || penalty < 0.0 {
            return Err(GraphError::InvalidPenalty(penalty));
        }
        if let Some(i) = nodes.iter().position(|n| !n.coordinate.is_valid()) {
            return Err(GraphError::InvalidNode(i));
        }

        let node_count = nodes.len();
        let mut adjacency = vec![Vec::new(); node_count];
        let mut resolved = Vec::with_capacity(edges.len());

        for (idx, e) in edges.iter().enumerate() {
            for node in [e.begin, e.end] {
                if node >= node_count {
                    return Err(GraphError::EdgeOutOfRange { edge: idx, node, node_count });
                }
            }
            let (a, b) = (&nodes[e.begin], &nodes[e.end]);
            let weight = e.weight.unwrap_or_else(|| haversine_meters(&a.coordinate, &b.coordinate));
            if !weight.is_finite() || weight < 0.0 {
                return Err(GraphError::InvalidWeight { edge: idx, weight });
            }

            let floor_transition = e.floor_transition || a.floor != b.floor;
            let cost = if floor_transition { weight + penalty } else { weight };
            resolved.push(Edge { begin: e.begin, end: e.end, cost, floor_transition });

            adjacency[e.begin].push((e.end, idx));
            if e.bidirectional && e.begin != e.end {
                adjacency[e.end].push((e.begin, idx));
            }
        }

        Ok(Self { nodes, edges: resolved, adjacency, config })
    }

    pub fn from_venue(venue: &Venue, config: GraphConfig) -> Result<Self, GraphError> {
        Self::new(venue.graph_nodes.clone(), &venue.graph_edges, config)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&LatLngFloor> {
        self.nodes.get(index)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Traversal cost of an edge, penalty included
    pub fn edge_cost(&self, index: usize) -> Option<f64> {
        self.edges.get(index).map(|e| e.cost)
    }

    /// (begin, end) node indices of an edge as published
    pub fn edge_endpoints(&self, index: usize) -> Option<(usize, usize)> {
        self.edges.get(index).map(|e| (e.begin, e.end))
    }

    pub fn is_floor_transition(&self, index: usize) -> Option<bool> {
        self.edges.get(index).map(|e| e.floor_transition)
    }

    /// Nearest node on the same floor, with its distance in meters.
    /// Equidistant nodes resolve to the lowest index.
    pub fn nearest_node(&self, point: &LatLngFloor) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.floor != point.floor {
                continue;
            }
            let d = haversine_meters(&node.coordinate, &point.coordinate);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best
    }

    /// Lowest-index edge traversable from `a` to `b`
    pub fn edge_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency
            .get(a)?
            .iter()
            .filter(|(n, _)| *n == b)
            .map(|(_, e)| *e)
            .min()
    }

    fn anchor(&self, endpoint: &Endpoint) -> Result<Anchor, RouteError> {
        match endpoint {
            Endpoint::Node(i) if *i < self.nodes.len() => Ok(Anchor { node: *i, snap: None }),
            Endpoint::Node(_) => Err(RouteError::RoutingFailed),
            Endpoint::Point(p) => match self.nearest_node(p) {
                Some((i, d)) if d < EXACT_MATCH_M => Ok(Anchor { node: i, snap: None }),
                Some((i, d)) if d <= self.config.max_snap_distance_m => {
                    Ok(Anchor { node: i, snap: Some((*p, d)) })
                }
                _ => Err(RouteError::GraphNotAvailable),
            },
        }
    }

    /// Cheapest path between two endpoints.
    ///
    /// Equal-cost alternatives resolve to the lexicographically lowest
    /// sequence of node indices, so repeated queries return identical paths.
    pub fn shortest_path(&self, from: Endpoint, to: Endpoint) -> Result<GraphPath, RouteError> {
        if self.nodes.is_empty() {
            return Err(RouteError::GraphNotAvailable);
        }
        let start = self.anchor(&from)?;
        let goal = self.anchor(&to)?;

        let (nodes, hops, graph_cost) = self.search(start.node, goal.node).ok_or(RouteError::RoutingFailed)?;

        let mut steps = Vec::with_capacity(nodes.len() + 2);
        let mut edges = Vec::with_capacity(nodes.len() + 1);
        let mut cost = graph_cost;

        if let Some((p, d)) = start.snap {
            steps.push(PathStep::Virtual(p));
            edges.push(None);
            cost += d;
        }
        steps.extend(nodes.iter().map(|&i| PathStep::Graph(i)));
        edges.extend(hops.into_iter().map(Some));
        if let Some((p, d)) = goal.snap {
            steps.push(PathStep::Virtual(p));
            edges.push(None);
            cost += d;
        }

        Ok(GraphPath { steps, edges, cost })
    }

    /// Dijkstra between two graph nodes: (nodes, edges, cost)
    fn search(&self, start: usize, goal: usize) -> Option<(Vec<usize>, Vec<usize>, f64)> {
        let n = self.nodes.len();
        if start == goal {
            return Some((vec![start], Vec::new(), 0.0));
        }

        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut settled = vec![false; n];
        dist[start] = 0.0;

        let mut heap = BinaryHeap::new();
        heap.push(SearchState { cost: 0.0, node: start });

        while let Some(SearchState { cost, node }) = heap.pop() {
            if settled[node] || cost > dist[node] {
                continue;
            }
            settled[node] = true;
            if node == goal {
                break;
            }

            for &(neighbor, edge) in &self.adjacency[node] {
                let candidate = dist[node] + self.edges[edge].cost;
                let current = dist[neighbor];

                if candidate < current - COST_EPS {
                    dist[neighbor] = candidate;
                    prev[neighbor] = Some((node, edge));
                    heap.push(SearchState { cost: candidate, node: neighbor });
                } else if (candidate - current).abs() <= COST_EPS && neighbor != start {
                    // Equal cost: keep the lexicographically lower full sequence
                    // ending at `neighbor`; comparing the predecessor paths alone
                    // misorders them when one is a prefix of the other
                    let mut via_node = node_path(&prev, node);
                    if via_node.contains(&neighbor) {
                        continue;
                    }
                    via_node.push(neighbor);
                    let existing = prev[neighbor].map(|(p, _)| {
                        let mut path = node_path(&prev, p);
                        path.push(neighbor);
                        path
                    });
                    if existing.is_none_or(|e| via_node < e) {
                        prev[neighbor] = Some((node, edge));
                    }
                }
            }
        }

        if !settled[goal] {
            return None;
        }

        let mut nodes = vec![goal];
        let mut hops = Vec::new();
        let mut current = goal;
        while let Some((p, e)) = prev[current] {
            nodes.push(p);
            hops.push(e);
            current = p;
            if nodes.len() > n {
                return None;
            }
        }
        nodes.reverse();
        hops.reverse();
        Some((nodes, hops, dist[goal]))
    }
}

/// Node sequence from the search root to `node` following `prev`
fn node_path(prev: &[Option<(usize, usize)>], node: usize) -> Vec<usize> {
    let mut path = vec![node];
    let mut current = node;
    while let Some((p, _)) = prev[current] {
        path.push(p);
        current = p;
        if path.len() > prev.len() {
            break;
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{destination, Coordinate};
    use approx::assert_relative_eq;

    fn at(east_m: f64, floor: i32) -> LatLngFloor {
        let c = destination(&Coordinate::new(60.17, 24.94), 90.0, east_m);
        LatLngFloor { coordinate: c, floor }
    }

    fn penalty_config() -> GraphConfig {
        GraphConfig { floor_transition_penalty: 10.0, max_snap_distance_m: 20.0 }
    }

    /// A(f0) -5- B(f0) -5- C(f1)
    fn abc() -> WayfindingGraph {
        let nodes = vec![at(0.0, 0), at(5.0, 0), at(5.0, 1)];
        let edges = [GraphEdge::new(0, 1).with_weight(5.0), GraphEdge::new(1, 2).with_weight(5.0)];
        WayfindingGraph::new(nodes, &edges, penalty_config()).unwrap()
    }

    #[test]
    fn test_floor_transition_penalty() {
        let graph = abc();
        let path = graph.shortest_path(Endpoint::Node(0), Endpoint::Node(2)).unwrap();
        assert_eq!(path.node_indices(), vec![0, 1, 2]);
        assert_relative_eq!(path.cost, 20.0);
        assert_eq!(path.edges, vec![Some(0), Some(1)]);
        assert_eq!(graph.is_floor_transition(1), Some(true));
        assert_eq!(graph.is_floor_transition(0), Some(false));
    }

    #[test]
    fn test_shortest_path_is_idempotent() {
        let graph = abc();
        let a = graph.shortest_path(Endpoint::Node(0), Endpoint::Node(2));
        let b = graph.shortest_path(Endpoint::Node(0), Endpoint::Node(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_graph_not_available() {
        let graph = WayfindingGraph::new(Vec::new(), &[], GraphConfig::default()).unwrap();
        assert!(graph.is_empty());
        assert_eq!(
            graph.shortest_path(at(0.0, 0).into(), at(5.0, 0).into()),
            Err(RouteError::GraphNotAvailable)
        );
    }

    #[test]
    fn test_disconnected_routing_failed() {
        let nodes = vec![at(0.0, 0), at(5.0, 0), at(10.0, 0)];
        let edges = [GraphEdge::new(0, 1)];
        let graph = WayfindingGraph::new(nodes, &edges, GraphConfig::default()).unwrap();
        assert_eq!(graph.shortest_path(Endpoint::Node(0), Endpoint::Node(2)), Err(RouteError::RoutingFailed));
        assert_eq!(graph.shortest_path(Endpoint::Node(0), Endpoint::Node(7)), Err(RouteError::RoutingFailed));
    }

    #[test]
    fn test_one_way_edge() {
        let nodes = vec![at(0.0, 0), at(5.0, 0)];
        let edges = [GraphEdge::new(0, 1).one_way()];
        let graph = WayfindingGraph::new(nodes, &edges, GraphConfig::default()).unwrap();
        assert!(graph.shortest_path(Endpoint::Node(0), Endpoint::Node(1)).is_ok());
        assert_eq!(graph.shortest_path(Endpoint::Node(1), Endpoint::Node(0)), Err(RouteError::RoutingFailed));
        assert_eq!(graph.edge_between(1, 0), None);
        assert_eq!(graph.edge_between(0, 1), Some(0));
    }

    #[test]
    fn test_off_graph_endpoints_snap() {
        let graph = abc();
        // 3 m west of A on floor 0
        let from = at(-3.0, 0);
        let path = graph.shortest_path(from.into(), Endpoint::Node(1)).unwrap();
        assert_eq!(path.steps[0], PathStep::Virtual(from));
        assert_eq!(path.node_indices(), vec![0, 1]);
        assert_eq!(path.edges, vec![None, Some(0)]);
        assert_relative_eq!(path.cost, 8.0, max_relative = 1e-6);
    }

    #[test]
    fn test_exact_match_uses_node() {
        let graph = abc();
        let path = graph.shortest_path(at(0.0, 0).into(), at(5.0, 0).into()).unwrap();
        assert_eq!(path.steps, vec![PathStep::Graph(0), PathStep::Graph(1)]);
    }

    #[test]
    fn test_snap_limits() {
        let graph = abc();
        // Too far away
        assert_eq!(
            graph.shortest_path(at(-50.0, 0).into(), Endpoint::Node(1)),
            Err(RouteError::GraphNotAvailable)
        );
        // No nodes on floor 7
        assert_eq!(
            graph.shortest_path(at(0.0, 7).into(), Endpoint::Node(1)),
            Err(RouteError::GraphNotAvailable)
        );
    }

    #[test]
    fn test_ties_prefer_lowest_node_sequence() {
        // Diamond 0 -> {1, 2} -> 3 with equal costs; 0-2 listed first
        let nodes = vec![at(0.0, 0), at(5.0, 0), at(5.0, 0), at(10.0, 0)];
        let edges = [
            GraphEdge::new(0, 2).with_weight(1.0),
            GraphEdge::new(2, 3).with_weight(1.0),
            GraphEdge::new(0, 1).with_weight(1.0),
            GraphEdge::new(1, 3).with_weight(1.0),
        ];
        let graph = WayfindingGraph::new(nodes, &edges, GraphConfig::default()).unwrap();
        let path = graph.shortest_path(Endpoint::Node(0), Endpoint::Node(3)).unwrap();
        assert_eq!(path.node_indices(), vec![0, 1, 3]);
        assert_eq!(path.edges, vec![Some(2), Some(3)]);

        // Direct edge found first; the longer sequence through 1 is lower
        let nodes = vec![at(0.0, 0), at(5.0, 0), at(5.0, 0), at(10.0, 0)];
        let edges = [
            GraphEdge::new(0, 3).with_weight(2.0),
            GraphEdge::new(0, 1).with_weight(1.0),
            GraphEdge::new(1, 3).with_weight(1.0),
        ];
        let graph = WayfindingGraph::new(nodes, &edges, GraphConfig::default()).unwrap();
        let path = graph.shortest_path(Endpoint::Node(0), Endpoint::Node(3)).unwrap();
        assert_eq!(path.node_indices(), vec![0, 1, 3]);
        assert_eq!(path.edges, vec![Some(1), Some(2)]);
        assert_relative_eq!(path.cost, 2.0);
    }

    #[test]
    fn test_default_weight_is_geodesic_length() {
        let nodes = vec![at(0.0, 0), at(12.0, 0)];
        let graph = WayfindingGraph::new(nodes, &[GraphEdge::new(0, 1)], GraphConfig::default()).unwrap();
        assert_relative_eq!(graph.edge_cost(0).unwrap(), 12.0, max_relative = 1e-6);
    }

    #[test]
    fn test_construction_errors() {
        let nodes = vec![at(0.0, 0), at(5.0, 0)];
        assert!(matches!(
            WayfindingGraph::new(nodes.clone(), &[GraphEdge::new(0, 4)], GraphConfig::default()),
            Err(GraphError::EdgeOutOfRange { edge: 0, node: 4, node_count: 2 })
        ));
        assert!(matches!(
            WayfindingGraph::new(nodes.clone(), &[GraphEdge::new(0, 1).with_weight(-1.0)], GraphConfig::default()),
            Err(GraphError::InvalidWeight { edge: 0, .. })
        ));
        assert!(matches!(
            WayfindingGraph::new(nodes.clone(), &[GraphEdge::new(0, 1).with_weight(f64::NAN)], GraphConfig::default()),
            Err(GraphError::InvalidWeight { .. })
        ));
        let bad_penalty = GraphConfig { floor_transition_penalty: -1.0, ..GraphConfig::default() };
        assert_eq!(WayfindingGraph::new(nodes, &[], bad_penalty).err(), Some(GraphError::InvalidPenalty(-1.0)));
    }

    #[test]
    fn test_nearest_node_same_floor_only() {
        let graph = abc();
        let (idx, d) = graph.nearest_node(&at(4.0, 1)).unwrap();
        assert_eq!(idx, 2);
        assert_relative_eq!(d, 1.0, max_relative = 1e-6);
        assert!(graph.nearest_node(&at(0.0, 3)).is_none());
    }

    #[test]
    fn test_graph_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WayfindingGraph>();
    }
}
