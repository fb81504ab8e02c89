//! The Graph Engine (§4.4): owns the live and staged resource graphs and drives
//! `Load/Validate/Apply/AutoEdge/AutoGroup/Reversals/Pause/Commit/Resume/Abort/Shutdown`.
//! Also wraps the function graph scheduler (§4.5) as a thin passenger, since the engine
//! is the natural place to start/stop it alongside the resource graph it feeds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mgmt_fgraph::{schedule, FuncGraph, Scheduled};
use mgmt_resource::{InitArgs, Resource};
use mgmt_rgraph::{
    autoedge, autogroup, graph_sync, inject_reversals, ReversalTable, ResourceGraph, ResourceId,
};
use mgmt_world::World;
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::converger::Converger;
use crate::counters::{Counters, CountersSnapshot};
use crate::error::{CommitError, ConfigError, EngineError};
use crate::semaphore::SemaphoreRegistry;
use crate::vertex::{spawn_vertex, PauseSignal, RecvLink, VertexConfig, VertexHandle};

const PAUSE_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything about a vertex's wiring the engine can update in place across a Commit
/// without tearing down its (possibly long-running) task.
#[derive(Clone, Default)]
struct VertexWiring {
    downstream: Arc<RwLock<Vec<tokio::sync::mpsc::Sender<()>>>>,
    recv_links: Arc<RwLock<Vec<RecvLink>>>,
}

pub struct Engine {
    world: Arc<dyn World>,
    prefix: PathBuf,
    debug: bool,
    live: Option<ResourceGraph>,
    staged: Option<ResourceGraph>,
    handles: HashMap<ResourceId, VertexHandle>,
    wiring: HashMap<ResourceId, VertexWiring>,
    pause_tx: watch::Sender<PauseSignal>,
    reversal_table: Arc<ReversalTable>,
    sema_registry: Arc<SemaphoreRegistry>,
    counters: Arc<Counters>,
    converger: Arc<Converger>,
    converger_cancel: CancellationToken,
    converger_task: Option<tokio::task::JoinHandle<()>>,
    fgraph: Option<Scheduled>,
    cancel: CancellationToken,
    destroyed: bool,
}

impl Engine {
    pub fn new(world: Arc<dyn World>, prefix: PathBuf, debug: bool, converger_timeout: Duration) -> Self {
        let (pause_tx, _) = watch::channel(PauseSignal::default());
        let reversal_table = Arc::new(ReversalTable::new(world.kv_arc()));
        let converger = Arc::new(Converger::new(converger_timeout));
        let converger_cancel = CancellationToken::new();
        let converger_task = {
            let converger = converger.clone();
            let cancel = converger_cancel.clone();
            Some(tokio::spawn(async move { converger.run(cancel).await }))
        };

        Engine {
            world,
            prefix,
            debug,
            live: None,
            staged: None,
            handles: HashMap::new(),
            wiring: HashMap::new(),
            pause_tx,
            reversal_table,
            sema_registry: Arc::new(SemaphoreRegistry::new()),
            counters: Arc::new(Counters::new()),
            converger,
            converger_cancel,
            converger_task,
            fgraph: None,
            cancel: CancellationToken::new(),
            destroyed: false,
        }
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn converger(&self) -> &Arc<Converger> {
        &self.converger
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Stages a new candidate graph, replacing any prior staged graph (§4.4's `Load`).
    pub fn load(&mut self, graph: ResourceGraph) {
        self.staged = Some(graph);
    }

    /// Discards the staged graph without touching the live one (§4.4's `Abort`).
    pub fn abort(&mut self) {
        self.counters.aborts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.staged = None;
    }

    fn staged_mut(&mut self) -> Result<&mut ResourceGraph, EngineError> {
        self.staged
            .as_mut()
            .ok_or_else(|| EngineError::Fatal("no staged graph; call Load first".to_string()))
    }

    fn staged_ref(&self) -> Result<&ResourceGraph, EngineError> {
        self.staged
            .as_ref()
            .ok_or_else(|| EngineError::Fatal("no staged graph; call Load first".to_string()))
    }

    /// Runs a mutator over every vertex of the staged graph — the mechanism for applying
    /// global overrides such as `--noop` or a global semaphore (§4.4's `Apply`).
    pub async fn apply<F>(&mut self, mut f: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut dyn Resource) + Send,
    {
        let staged = self.staged_ref()?;
        for (_, vertex) in staged.vertices() {
            let mut guard = vertex.resource.lock().await;
            f(&mut **guard);
        }
        Ok(())
    }

    /// Synthesizes dependency edges over the staged graph (§4.3).
    pub async fn autoedge(&mut self) -> Result<usize, EngineError> {
        Ok(autoedge(self.staged_mut()?).await)
    }

    /// Merges mergeable sibling vertices of the staged graph (§4.3).
    pub async fn autogroup(&mut self) -> Result<usize, EngineError> {
        Ok(autogroup(self.staged_mut()?).await)
    }

    /// Injects undo resources for anything the staged graph is about to drop relative to
    /// the current live graph (§4.3). A no-op before the first Commit, since there is no
    /// live graph yet to diff against.
    pub async fn reversals(&mut self) -> Result<Vec<ResourceId>, EngineError> {
        let Some(live) = self.live.as_ref() else {
            return Ok(Vec::new());
        };
        let staged = self.staged.as_mut().ok_or_else(|| EngineError::Fatal("no staged graph; call Load first".to_string()))?;
        let removed: Vec<ResourceId> = live
            .vertices()
            .map(|(_, v)| v.id.clone())
            .filter(|id| staged.find(id).is_none())
            .collect();
        let injected = inject_reversals(live, staged, &removed).await;
        for id in &injected {
            self.reversal_table.record_pending(id).await?;
        }
        Ok(injected)
    }

    /// Scans the reversal table for markers left pending by a previous process (§7's
    /// crash-recovery concern: the process stopped between a resource's removal and its
    /// undo's successful `CheckApply`). Call once at startup, before the first `Commit`.
    /// The concrete undo resource instance is never persisted to the table, only its id,
    /// so a stale marker can be reported here but not replayed automatically — this just
    /// makes the gap loud instead of leaving it silently stuck forever.
    pub async fn recover_reversals(&self) -> Result<Vec<ResourceId>, EngineError> {
        let pending = self.reversal_table.list_pending().await?;
        for id in &pending {
            log::error!(
                "reversal for {id} was still pending when this process last stopped; its undo never ran and cannot be replayed automatically"
            );
        }
        Ok(pending)
    }

    /// Checks the staged graph is acyclic and that every Recv wiring resolves to a
    /// Sendable field of a matching type (§4.4's `Validate`). This design has no fixed
    /// registry of resource kinds, so the "all kinds known" check from the distilled
    /// spec is vacuously true here — see DESIGN.md.
    pub async fn validate(&self) -> Result<(), EngineError> {
        let staged = self.staged_ref()?;
        staged.topological_sort().map_err(|_| ConfigError::Cyclic)?;

        for (_, vertex) in staged.vertices() {
            let guard = vertex.resource.lock().await;
            let Some(recvable) = guard.as_recvable() else { continue };
            for (field, source) in recvable.recv_fields() {
                let source_id = ResourceId {
                    kind: source.source_kind.clone(),
                    name: source.source_name.clone(),
                };
                let Some(source_vid) = staged.find(&source_id) else {
                    return Err(ConfigError::DanglingRecv(source_id.to_string()).into());
                };
                let source_vertex = staged.vertex(source_vid).expect("find returned a live id");
                let source_guard = source_vertex.resource.lock().await;
                let send_ty = source_guard.as_sendable().and_then(|s| s.send_field_type(&source.source_field));
                let recv_ty = recvable.recv_field_type(&field);
                match (send_ty, recv_ty) {
                    (Some(a), Some(b)) if a == b => {}
                    (a, b) => {
                        return Err(ConfigError::TypeMismatch {
                            resource: vertex.id.to_string(),
                            field,
                            expected: format!("{b:?}"),
                            actual: format!("{a:?}"),
                        }
                        .into())
                    }
                }
            }
        }
        Ok(())
    }

    /// Pauses every running vertex (§4.4's `Pause`). `fast` asks in-flight CheckApply
    /// calls to interrupt rather than run to completion; either way this returns only
    /// once every currently-live vertex has acknowledged pausing (or the ack times out,
    /// logged rather than propagated, since a stuck vertex must not wedge a deploy
    /// forever).
    pub async fn pause(&mut self, fast: bool) {
        let acks: Vec<Arc<Notify>> = self.handles.values().map(|h| h.paused_ack.clone()).collect();
        let waiters: Vec<_> = acks.iter().map(|n| n.notified()).collect();
        let _ = self.pause_tx.send(PauseSignal { paused: true, fast });
        if tokio::time::timeout(PAUSE_ACK_TIMEOUT, futures::future::join_all(waiters))
            .await
            .is_err()
        {
            log::warn!("pause: one or more vertices did not acknowledge within {PAUSE_ACK_TIMEOUT:?}");
        }
    }

    /// Runs GraphSync against the staged graph, closes removed vertices, Inits added
    /// ones (including reversal-injected undo resources), and installs the result as the
    /// new live graph (§4.4's `Commit`). The engine must already be paused; the caller
    /// resumes explicitly via [`Engine::resume`].
    pub async fn commit(&mut self) -> Result<(), EngineError> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| EngineError::Fatal("no staged graph; call Load first".to_string()))?;
        let old = self.live.take().unwrap_or_default();

        let (synced, report) = graph_sync(&old, &staged).await;

        for id in &report.removed {
            if let Some(vid) = old.find(id) {
                let vertex = old.vertex(vid).expect("find returned a live id");
                let mut guard = vertex.resource.lock().await;
                if let Err(e) = guard.close().await {
                    log::warn!("close failed for {id}: {e}");
                }
            }
            self.handles.remove(id);
            self.wiring.remove(id);
        }

        let added: std::collections::HashSet<ResourceId> = report.added.iter().cloned().collect();
        for (_, vertex) in synced.vertices() {
            if !added.contains(&vertex.id) {
                continue;
            }
            let args = InitArgs {
                world: self.world.clone(),
                prefix: self.prefix.clone(),
                debug: self.debug,
                cancel: self.cancel.child_token(),
            };
            let mut guard = vertex.resource.lock().await;
            if let Err(e) = guard.init(&args).await {
                drop(guard);
                self.destroyed = true;
                self.live = None;
                return Err(CommitError::Destroyed(format!("init failed for {}: {e}", vertex.id)).into());
            }
        }

        self.destroyed = false;
        self.live = Some(synced);
        self.counters.commits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Starts per-vertex loops for every vertex new to the live graph, rewires
    /// downstream wake fan-out and Recv links for every live vertex from the current
    /// edge set, and un-pauses everything (§4.4's `Resume`).
    pub async fn resume(&mut self) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(CommitError::Destroyed("engine refuses to resume after a failed commit".to_string()).into());
        }
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| EngineError::Fatal("no live graph; commit before resuming".to_string()))?;

        for (_, vertex) in live.vertices() {
            self.wiring.entry(vertex.id.clone()).or_default();
            if self.handles.contains_key(&vertex.id) {
                continue;
            }
            let wiring = self.wiring[&vertex.id].clone();
            let watch_args = InitArgs {
                world: self.world.clone(),
                prefix: self.prefix.clone(),
                debug: self.debug,
                cancel: self.cancel.child_token(),
            };
            let reversal_pending = self
                .reversal_table
                .is_pending(&vertex.id)
                .await?
                .then(|| self.reversal_table.clone());
            let config = VertexConfig {
                id: vertex.id.clone(),
                resource: vertex.resource.clone(),
                watch_args,
                downstream: wiring.downstream.clone(),
                recv_links: wiring.recv_links.clone(),
                counters: self.counters.clone(),
                converger: self.converger.clone(),
                sema_registry: self.sema_registry.clone(),
                pause_rx: self.pause_tx.subscribe(),
                cancel: self.cancel.clone(),
                reversal_pending,
            };
            let handle = spawn_vertex(config);
            self.handles.insert(vertex.id.clone(), handle);
        }

        for (vid, vertex) in live.vertices() {
            let mut downstream = Vec::new();
            for (_, target, _) in live.outgoing_edges(vid) {
                let target_id = &live.vertex(target).expect("edge target is live").id;
                if let Some(handle) = self.handles.get(target_id) {
                    downstream.push(handle.wake_tx.clone());
                }
            }
            *self.wiring[&vertex.id].downstream.write() = downstream;

            let mut recv_links = Vec::new();
            let resource_guard = vertex.resource.lock().await;
            if let Some(recvable) = resource_guard.as_recvable() {
                for (recv_field, source) in recvable.recv_fields() {
                    let source_id = ResourceId {
                        kind: source.source_kind.clone(),
                        name: source.source_name.clone(),
                    };
                    if let Some(source_vid) = live.find(&source_id) {
                        let source_vertex = live.vertex(source_vid).expect("find returned a live id");
                        recv_links.push(RecvLink {
                            source_id,
                            source: source_vertex.resource.clone(),
                            send_field: source.source_field.clone(),
                            recv_field,
                        });
                    }
                }
            }
            drop(resource_guard);
            *self.wiring[&vertex.id].recv_links.write() = recv_links;
        }

        let _ = self.pause_tx.send(PauseSignal { paused: false, fast: false });
        Ok(())
    }

    /// Starts the function graph's scheduler, replacing any previously running one
    /// (§4.5's integration point: the engine owns `Scheduled` as a thin passenger).
    pub async fn load_func_graph(&mut self, graph: &FuncGraph) -> Result<(), EngineError> {
        if let Some(prev) = self.fgraph.take() {
            prev.shutdown().await;
        }
        self.fgraph = Some(schedule(graph).await?);
        Ok(())
    }

    pub fn func_graph_outputs(&self) -> Option<&HashMap<mgmt_fgraph::FuncId, watch::Receiver<Option<mgmt_resource::Value>>>> {
        self.fgraph.as_ref().map(|s| &s.outputs)
    }

    /// Pauses, stops every vertex task and the function graph, closes every resource in
    /// the live graph, and stops the converger (§4.4's `Shutdown`).
    pub async fn shutdown(mut self) {
        self.pause(false).await;
        self.cancel.cancel();
        for (_, handle) in self.handles.drain() {
            let _ = handle.task.await;
        }
        if let Some(fgraph) = self.fgraph.take() {
            fgraph.shutdown().await;
        }
        if let Some(live) = self.live.take() {
            for (_, vertex) in live.vertices() {
                let mut guard = vertex.resource.lock().await;
                let _ = guard.close().await;
            }
        }
        self.converger_cancel.cancel();
        if let Some(task) = self.converger_task.take() {
            let _ = task.await;
        }
    }
}
