//! Per-vertex task scheduler for the function graph (§4.5): every vertex runs its
//! `stream` coroutine as its own `tokio` task, wired to its upstreams' `watch` channels;
//! multiple downstreams fan out from a single upstream's channel for free.

use std::collections::{BTreeMap, HashMap};

use mgmt_graph::VertexId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::function::{ArgStream, FuncError};
use crate::graph::FGraphError;
use crate::graph::FuncGraph;
use crate::vertex::FuncId;

/// A running function graph: one task per vertex, plus a handle to every vertex's
/// current output for callers (e.g. Send/Recv wiring into the resource graph) that want
/// to read a value without participating in the stream directly.
pub struct Scheduled {
    pub outputs: HashMap<FuncId, watch::Receiver<Option<mgmt_resource::Value>>>,
    pub tasks: Vec<JoinHandle<Result<(), FuncError>>>,
    pub cancel: CancellationToken,
}

impl Scheduled {
    /// Requests every vertex's `stream` coroutine stop, then waits for all tasks to end.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Validates `graph`, then spawns every vertex's `stream` coroutine. The returned
/// [`Scheduled`] owns the cancellation token that stops every task together.
pub async fn schedule(graph: &FuncGraph) -> Result<Scheduled, FGraphError> {
    graph.validate()?;
    let cancel = CancellationToken::new();

    let mut senders: HashMap<VertexId, watch::Sender<Option<mgmt_resource::Value>>> = HashMap::new();
    let mut receivers: HashMap<VertexId, watch::Receiver<Option<mgmt_resource::Value>>> = HashMap::new();
    for (id, _vertex) in graph.vertices() {
        let (tx, rx) = watch::channel(None);
        senders.insert(id, tx);
        receivers.insert(id, rx);
    }

    let mut outputs = HashMap::new();
    let mut tasks = Vec::new();
    for (id, vertex) in graph.vertices() {
        let mut args: BTreeMap<String, ArgStream> = BTreeMap::new();
        for (_, from, edge) in graph.incoming_edges(id) {
            let rx = receivers
                .get(&from)
                .expect("every vertex has an entry in receivers")
                .clone();
            args.insert(edge.arg_name.clone(), rx);
        }
        outputs.insert(vertex.id.clone(), receivers[&id].clone());

        let out = senders.remove(&id).expect("one sender per vertex");
        let function = vertex.function.clone();
        let task_cancel = cancel.clone();
        let vertex_id = vertex.id.clone();
        tasks.push(tokio::spawn(async move {
            let mut guard = function.lock().await;
            guard.init().await.map_err(|e| {
                log::error!("function {vertex_id} init failed: {e}");
                e
            })?;
            guard.stream(args, out, task_cancel).await
        }));
    }

    Ok(Scheduled { outputs, tasks, cancel })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ArgEdge;
    use crate::test_support::{ConstFunc, IdentityFunc};
    use crate::vertex::FuncVertex;
    use mgmt_resource::{Value, ValueType};
    use std::time::Duration;

    #[tokio::test]
    async fn schedules_source_and_propagates_to_sink() {
        let mut graph = FuncGraph::new();
        let source = graph
            .add_function(FuncVertex::new("src", Box::new(ConstFunc::new_source(Value::Int(42)))))
            .unwrap();
        let sink = graph
            .add_function(FuncVertex::new("sink", Box::new(IdentityFunc::new(ValueType::Int))))
            .unwrap();
        graph.add_edge(source, sink, ArgEdge::new("x"));

        let scheduled = schedule(&graph).await.unwrap();
        let mut sink_rx = scheduled.outputs.get(&FuncId("sink".to_string())).unwrap().clone();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if *sink_rx.borrow() == Some(Value::Int(42)) {
                    return;
                }
                sink_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("sink should observe the source's value");

        scheduled.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_invalid_graph_missing_required_arg() {
        let mut graph = FuncGraph::new();
        graph
            .add_function(FuncVertex::new("sink", Box::new(IdentityFunc::new(ValueType::Int))))
            .unwrap();
        let err = schedule(&graph).await.unwrap_err();
        assert!(matches!(err, FGraphError::MissingArg(..)));
    }
}
