//! Turns graph paths into routes with per-leg length and bearing

use crate::domain::route::{Route, RouteError, RouteLeg, RouteNode};
use crate::geometry::{bearing_degrees, haversine_meters};
use crate::services::wayfinding_graph::{Endpoint, GraphPath, PathStep, WayfindingGraph};

/// Build the legs for a path found in `graph`.
///
/// A step pointing outside the graph fails the route with `RoutingFailed`.
pub fn build_route(graph: &WayfindingGraph, path: &GraphPath) -> Route {
    let mut nodes = Vec::with_capacity(path.steps.len());
    for step in &path.steps {
        let node = match step {
            PathStep::Graph(i) => match graph.node(*i) {
                Some(position) => RouteNode::graph(*position, *i),
                None => return Route::failed(RouteError::RoutingFailed),
            },
            PathStep::Virtual(position) => RouteNode::virtual_node(*position),
        };
        nodes.push(node);
    }

    let legs = nodes
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (begin, end) = (pair[0], pair[1]);
            let edge_index = match (begin.node_index, end.node_index) {
                (Some(a), Some(b)) => path
                    .edges
                    .get(i)
                    .copied()
                    .flatten()
                    .filter(|&e| joins(graph, e, a, b))
                    .or_else(|| graph.edge_between(a, b)),
                _ => None,
            };
            let (a, b) = (&begin.position.coordinate, &end.position.coordinate);
            RouteLeg {
                begin,
                end,
                length: haversine_meters(a, b),
                direction: bearing_degrees(a, b),
                edge_index,
            }
        })
        .collect();

    Route::successful(legs)
}

/// True when edge `e` connects `a` and `b` in either direction
fn joins(graph: &WayfindingGraph, e: usize, a: usize, b: usize) -> bool {
    graph.edge_endpoints(e).is_some_and(|(x, y)| (x, y) == (a, b) || (x, y) == (b, a))
}

/// Fold a path query outcome into a route; graph errors pass through unchanged
pub fn route_from_result(graph: &WayfindingGraph, result: Result<GraphPath, RouteError>) -> Route {
    match result {
        Ok(path) => build_route(graph, &path),
        Err(e) => Route::failed(e),
    }
}

/// Shortest path plus leg construction in one call
pub fn compute_route(graph: &WayfindingGraph, from: Endpoint, to: Endpoint) -> Route {
    route_from_result(graph, graph.shortest_path(from, to))
}
