//! End-to-end engine scenarios (§8): bootstrapping an empty graph, a single resource
//! converging, Notify propagation across an edge, Send/Recv field wiring, and fast pause
//! interrupting an in-flight CheckApply.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mgmt_engine::Engine;
use mgmt_resource::{
    CmpMismatch, InitArgs, MetaParams, RecvSource, Resource, ResourceError, TestResource, Value, WatchEvent, WatchSender,
};
use mgmt_rgraph::{Edge, ResourceGraph};
use mgmt_world::world::InMemoryWorld;

/// A resource whose `CheckApply` counts invocations and reports "changed" exactly once,
/// so tests can assert both that it ran and that it only notified downstream once.
#[derive(Debug, Clone)]
struct CountingResource {
    name: String,
    meta: MetaParams,
    checks: Arc<AtomicUsize>,
    already_correct: bool,
}

impl CountingResource {
    fn new(name: impl Into<String>, checks: Arc<AtomicUsize>) -> Self {
        CountingResource {
            name: name.into(),
            meta: MetaParams::default(),
            checks,
            already_correct: false,
        }
    }
}

#[async_trait]
impl Resource for CountingResource {
    fn kind(&self) -> &str {
        "counting"
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn meta(&self) -> &MetaParams {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut MetaParams {
        &mut self.meta
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn cmp_config(&self, _other: &dyn Resource) -> Result<(), CmpMismatch> {
        Ok(())
    }
    async fn init(&mut self, _args: &InitArgs) -> Result<(), ResourceError> {
        Ok(())
    }
    async fn watch(&self, _args: &InitArgs, events: WatchSender) -> Result<(), ResourceError> {
        events.send(WatchEvent::Ready).await.ok();
        Ok(())
    }
    async fn check_apply(&mut self, _apply: bool) -> Result<bool, ResourceError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let unchanged = self.already_correct;
        self.already_correct = true;
        Ok(unchanged)
    }
}

fn test_engine() -> Engine {
    let world = Arc::new(InMemoryWorld::new("test-host", PathBuf::from("/tmp/mgmt-engine-tests")));
    Engine::new(world, PathBuf::from("/tmp/mgmt-engine-tests"), false, Duration::from_millis(50))
}

async fn wait_for<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn empty_graph_bootstraps_cleanly() {
    let mut engine = test_engine();
    engine.load(ResourceGraph::new());
    engine.validate().await.unwrap();
    engine.autoedge().await.unwrap();
    engine.autogroup().await.unwrap();
    engine.reversals().await.unwrap();
    engine.pause(false).await;
    engine.commit().await.unwrap();
    engine.resume().await.unwrap();
    assert_eq!(engine.counters().commits, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn single_resource_converges() {
    let mut engine = test_engine();
    let checks = Arc::new(AtomicUsize::new(0));

    let mut graph = ResourceGraph::new();
    graph.add_resource(Box::new(CountingResource::new("a", checks.clone()))).unwrap();

    engine.load(graph);
    engine.validate().await.unwrap();
    engine.pause(false).await;
    engine.commit().await.unwrap();
    engine.resume().await.unwrap();

    assert!(wait_for(|| checks.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);
    engine.shutdown().await;
}

#[tokio::test]
async fn notify_propagates_along_an_edge() {
    let mut engine = test_engine();
    let upstream_checks = Arc::new(AtomicUsize::new(0));
    let downstream_checks = Arc::new(AtomicUsize::new(0));

    let mut graph = ResourceGraph::new();
    let up = graph
        .add_resource(Box::new(CountingResource::new("up", upstream_checks.clone())))
        .unwrap();
    let down = graph
        .add_resource(Box::new(CountingResource::new("down", downstream_checks.clone())))
        .unwrap();
    graph.add_edge(up, down, Edge::new("notify").notify());

    engine.load(graph);
    engine.validate().await.unwrap();
    engine.pause(false).await;
    engine.commit().await.unwrap();
    engine.resume().await.unwrap();

    assert!(wait_for(|| upstream_checks.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);
    assert!(wait_for(|| downstream_checks.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);
    engine.shutdown().await;
}

#[tokio::test]
async fn send_recv_field_is_delivered_before_checking() {
    let mut engine = test_engine();

    let mut graph = ResourceGraph::new();
    let source = graph
        .add_resource(Box::new(TestResource::new("source").sending(Value::Int(42))))
        .unwrap();
    let sink = graph
        .add_resource(Box::new(TestResource::new("sink").receiving_from(RecvSource {
            source_kind: "test".to_string(),
            source_name: "source".to_string(),
            source_field: "out".to_string(),
        })))
        .unwrap();
    graph.add_edge(source, sink, Edge::new("wire").with_send_recv("out", "in"));
    // Grabbed before `load` hands the graph's ownership to the engine: GraphSync clones
    // `ResourceVertex`, which clones the `Arc` pointer, so this handle stays live.
    let sink_resource = graph.vertex(sink).unwrap().resource.clone();

    engine.load(graph);
    engine.validate().await.unwrap();
    engine.pause(false).await;
    engine.commit().await.unwrap();
    engine.resume().await.unwrap();

    let delivered = wait_for(
        || {
            sink_resource
                .try_lock()
                .ok()
                .and_then(|g| g.as_recvable().and_then(|r| r.get_recv("in")))
                == Some(Value::Int(42))
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(delivered, "recv field should be populated from the source's send field");
    engine.shutdown().await;
}

#[tokio::test]
async fn fast_pause_is_acknowledged_promptly() {
    let mut engine = test_engine();
    let checks = Arc::new(AtomicUsize::new(0));

    let mut graph = ResourceGraph::new();
    graph.add_resource(Box::new(CountingResource::new("a", checks.clone()))).unwrap();

    engine.load(graph);
    engine.validate().await.unwrap();
    engine.pause(false).await;
    engine.commit().await.unwrap();
    engine.resume().await.unwrap();

    assert!(wait_for(|| checks.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);

    let started = tokio::time::Instant::now();
    engine.pause(true).await;
    assert!(started.elapsed() < Duration::from_secs(1), "fast pause should ack quickly once idle");
    engine.shutdown().await;
}
