//! Route worker - computes routes off the session loop
//!
//! The session enqueues route jobs via an mpsc channel and keeps processing
//! fixes; the worker runs the graph search on the blocking pool and sends the
//! finished route back tagged with the generation and request id it was asked
//! for. The same worker serves one-shot `request_route` calls through a
//! oneshot reply.

use crate::domain::route::{Route, RouteError};
use crate::infra::metrics::Metrics;
use crate::services::route_builder::compute_route;
use crate::services::wayfinding_graph::{Endpoint, WayfindingGraph};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Current routing graph, swapped wholesale on venue refresh.
///
/// Jobs capture the inner `Arc` at submit time, so a swap never affects a
/// computation already queued.
pub type SharedGraph = Arc<RwLock<Arc<WayfindingGraph>>>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequestError {
    #[error("route queue full")]
    QueueFull,
    #[error("route worker stopped")]
    WorkerStopped,
}

/// Where a finished route goes
#[derive(Debug)]
pub enum RouteReply {
    /// Back into the session loop through the result channel
    Session { generation: u64, request_id: u64 },
    /// Straight to a one-shot caller
    OneShot(oneshot::Sender<Route>),
}

/// A route computation to be processed by the worker
#[derive(Debug)]
pub struct RouteJob {
    pub(crate) graph: Arc<WayfindingGraph>,
    pub(crate) from: Endpoint,
    pub(crate) to: Endpoint,
    /// When the job was enqueued (for queue delay measurement)
    pub(crate) enqueued_at: Instant,
    pub(crate) reply: RouteReply,
}

/// Route computed for a session request
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub generation: u64,
    pub request_id: u64,
    pub route: Arc<Route>,
}

/// Cloneable front end of the worker
#[derive(Clone)]
pub struct RouteClient {
    job_tx: mpsc::Sender<RouteJob>,
    graph: SharedGraph,
    metrics: Arc<Metrics>,
}

impl RouteClient {
    /// Snapshot of the current graph
    pub fn graph(&self) -> Arc<WayfindingGraph> {
        self.graph.read().clone()
    }

    /// Swap in a new graph; queued jobs keep the one they captured
    pub fn replace_graph(&self, graph: WayfindingGraph) {
        *self.graph.write() = Arc::new(graph);
    }

    fn job(&self, from: Endpoint, to: Endpoint, reply: RouteReply) -> RouteJob {
        RouteJob { graph: self.graph(), from, to, enqueued_at: Instant::now(), reply }
    }

    /// Enqueue a session route request without waiting
    pub fn submit(
        &self,
        from: Endpoint,
        to: Endpoint,
        generation: u64,
        request_id: u64,
    ) -> Result<(), RouteRequestError> {
        self.metrics.record_route_request();
        let job = self.job(from, to, RouteReply::Session { generation, request_id });
        self.job_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RouteRequestError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RouteRequestError::WorkerStopped,
        })
    }

    /// One-shot route query.
    ///
    /// Waits for queue capacity. A stopped worker yields a failed route with
    /// `RoutingFailed`.
    pub async fn request_route(&self, from: Endpoint, to: Endpoint) -> Route {
        self.metrics.record_route_request();
        let (tx, rx) = oneshot::channel();
        if self.job_tx.send(self.job(from, to, RouteReply::OneShot(tx))).await.is_err() {
            warn!("route_worker_unavailable");
            return Route::failed(RouteError::RoutingFailed);
        }
        rx.await.unwrap_or_else(|_| Route::failed(RouteError::RoutingFailed))
    }

    /// One-shot route query delivering the result to `callback` on a spawned task
    pub fn request_route_with<F>(&self, from: Endpoint, to: Endpoint, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Route) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let route = client.request_route(from, to).await;
            callback(route);
        })
    }
}

/// Worker that processes route jobs asynchronously
pub struct RouteWorker {
    pub(crate) job_rx: mpsc::Receiver<RouteJob>,
    result_tx: mpsc::Sender<RouteResult>,
    metrics: Arc<Metrics>,
}

impl RouteWorker {
    pub fn new(
        job_rx: mpsc::Receiver<RouteJob>,
        result_tx: mpsc::Sender<RouteResult>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { job_rx, result_tx, metrics }
    }

    /// Run the worker, processing jobs until every client is dropped
    pub async fn run(mut self) {
        info!("route_worker_started");

        while let Some(job) = self.job_rx.recv().await {
            let queue_delay_us = job.enqueued_at.elapsed().as_micros() as u64;

            let RouteJob { graph, from, to, reply, .. } = job;
            let compute_start = Instant::now();
            let route = match tokio::task::spawn_blocking(move || compute_route(&graph, from, to)).await
            {
                Ok(route) => route,
                Err(e) => {
                    warn!(error = %e, "route_task_failed");
                    Route::failed(RouteError::RoutingFailed)
                }
            };
            let compute_us = compute_start.elapsed().as_micros() as u64;
            self.metrics.record_route_computed(compute_us);

            info!(
                successful = %route.is_successful,
                legs = %route.legs.len(),
                length_m = %format!("{:.1}", route.length()),
                queue_delay_us = %queue_delay_us,
                compute_us = %compute_us,
                "route_computed"
            );

            match reply {
                RouteReply::Session { generation, request_id } => {
                    let result = RouteResult { generation, request_id, route: Arc::new(route) };
                    if self.result_tx.send(result).await.is_err() {
                        debug!(request_id = %request_id, "route_result_receiver_closed");
                    }
                }
                RouteReply::OneShot(tx) => {
                    // Caller may have given up waiting
                    let _ = tx.send(route);
                }
            }
        }

        info!("route_worker_stopped");
    }
}

/// Create the route job channel, worker and session result channel
///
/// Returns the client (for the session and one-shot callers), the worker (to
/// be spawned) and the receiver the session loop drains for results.
pub fn create_route_worker(
    graph: WayfindingGraph,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (RouteClient, RouteWorker, mpsc::Receiver<RouteResult>) {
    let (job_tx, job_rx) = mpsc::channel(buffer_size);
    let (result_tx, result_rx) = mpsc::channel(buffer_size);
    let client =
        RouteClient { job_tx, graph: Arc::new(RwLock::new(Arc::new(graph))), metrics: metrics.clone() };
    let worker = RouteWorker::new(job_rx, result_tx, metrics);
    (client, worker, result_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LatLngFloor;
    use crate::domain::venue::GraphEdge;
    use crate::geometry::{destination, Coordinate};
    use crate::services::wayfinding_graph::GraphConfig;

    fn line_graph(len: usize) -> WayfindingGraph {
        let mut coord = Coordinate::new(60.17, 24.94);
        let mut nodes = Vec::with_capacity(len);
        for _ in 0..len {
            nodes.push(LatLngFloor { coordinate: coord, floor: 0 });
            coord = destination(&coord, 90.0, 10.0);
        }
        let edges: Vec<GraphEdge> = (1..len).map(|i| GraphEdge::new(i - 1, i)).collect();
        WayfindingGraph::new(nodes, &edges, GraphConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_request_route_one_shot() {
        let metrics = Arc::new(Metrics::new());
        let (client, worker, _results) = create_route_worker(line_graph(3), metrics.clone(), 8);
        tokio::spawn(worker.run());

        let route = client.request_route(Endpoint::Node(0), Endpoint::Node(2)).await;
        assert!(route.is_successful);
        assert_eq!(route.legs.len(), 2);
        assert_eq!(metrics.route_requests(), 1);
    }

    #[tokio::test]
    async fn test_request_route_with_callback() {
        let (client, worker, _results) = create_route_worker(line_graph(3), Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        let (tx, rx) = oneshot::channel();
        client
            .request_route_with(Endpoint::Node(2), Endpoint::Node(0), move |route| {
                let _ = tx.send(route);
            })
            .await
            .unwrap();
        let route = rx.await.unwrap();
        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.legs[0].begin.node_index, Some(2));
    }

    #[tokio::test]
    async fn test_session_results_carry_tags_in_order() {
        let (client, worker, mut results) = create_route_worker(line_graph(4), Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        client.submit(Endpoint::Node(0), Endpoint::Node(3), 1, 1).unwrap();
        client.submit(Endpoint::Node(0), Endpoint::Node(1), 2, 2).unwrap();

        let first = results.recv().await.unwrap();
        let second = results.recv().await.unwrap();
        assert_eq!((first.generation, first.request_id), (1, 1));
        assert_eq!(first.route.legs.len(), 3);
        assert_eq!((second.generation, second.request_id), (2, 2));
        assert_eq!(second.route.legs.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_graph_applies_to_new_jobs() {
        let (client, worker, _results) = create_route_worker(line_graph(2), Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        let route = client.request_route(Endpoint::Node(0), Endpoint::Node(3)).await;
        assert_eq!(route.error, Some(RouteError::RoutingFailed));

        client.replace_graph(line_graph(4));
        assert_eq!(client.graph().node_count(), 4);
        let route = client.request_route(Endpoint::Node(0), Endpoint::Node(3)).await;
        assert!(route.is_successful);
    }

    #[tokio::test]
    async fn test_stopped_worker_fails_routes() {
        let (client, worker, _results) = create_route_worker(line_graph(2), Arc::new(Metrics::new()), 1);
        drop(worker);

        let route = client.request_route(Endpoint::Node(0), Endpoint::Node(1)).await;
        assert!(!route.is_successful);
        assert_eq!(client.submit(Endpoint::Node(0), Endpoint::Node(1), 1, 1), Err(RouteRequestError::WorkerStopped));
    }

    #[test]
    fn test_submit_reports_full_queue() {
        let (client, _worker, _results) = create_route_worker(line_graph(2), Arc::new(Metrics::new()), 1);
        client.submit(Endpoint::Node(0), Endpoint::Node(1), 1, 1).unwrap();
        assert_eq!(client.submit(Endpoint::Node(0), Endpoint::Node(1), 1, 2), Err(RouteRequestError::QueueFull));
    }
}
