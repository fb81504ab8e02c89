//! The per-vertex state machine (§4.4): one tokio task per live resource, carrying Watch
//! events and upstream wake signals through rate-limiter/semaphore admission into
//! CheckApply, with retry, pause/fast-pause (Interrupt), and downstream wake propagation.
//!
//! States: `init -> watch-starting -> idle -> event-pending -> checking -> idle | failed`,
//! plus `paused` (reachable from any of the running states) and `interrupted` (a
//! transient stop on the way back to `paused`). `init`/`watch-starting` happen once,
//! before [`spawn_vertex`] is even called — the engine runs `Init` at Commit time and
//! only spawns the task once the resource is ready to be watched.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mgmt_resource::{type_check_recv, InitArgs, Resource, WatchEvent};
use mgmt_rgraph::{ResourceId, ReversalTable};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::converger::Converger;
use crate::counters::Counters;
use crate::ratelimiter::RateLimiter;
use crate::semaphore::SemaphoreRegistry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PauseSignal {
    pub paused: bool,
    pub fast: bool,
}

/// A Send->Recv wire, resolved to a live source at Resume time. Rather than push values
/// through a channel, the vertex task pulls the current value straight out of the live
/// source's `Sendable` fields immediately before each admission to `checking` (§4.4).
pub struct RecvLink {
    pub source_id: ResourceId,
    pub source: Arc<Mutex<Box<dyn Resource>>>,
    pub send_field: String,
    pub recv_field: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexOutcome {
    /// CheckApply exhausted its retries, or a received value failed its type check.
    Failed,
}

/// The engine's handle onto a running vertex task. `downstream`/`recv_links` are shared
/// with [`VertexConfig`]'s copies so the engine can rewire them in place across a Commit
/// without tearing down retained vertices' tasks.
pub struct VertexHandle {
    pub id: ResourceId,
    pub wake_tx: mpsc::Sender<()>,
    pub downstream: Arc<RwLock<Vec<mpsc::Sender<()>>>>,
    pub recv_links: Arc<RwLock<Vec<RecvLink>>>,
    pub paused_ack: Arc<Notify>,
    pub task: tokio::task::JoinHandle<Option<VertexOutcome>>,
}

pub struct VertexConfig {
    pub id: ResourceId,
    pub resource: Arc<Mutex<Box<dyn Resource>>>,
    /// Used only for the `watch` call; the engine already ran `Init` with its own copy.
    pub watch_args: InitArgs,
    pub downstream: Arc<RwLock<Vec<mpsc::Sender<()>>>>,
    pub recv_links: Arc<RwLock<Vec<RecvLink>>>,
    pub counters: Arc<Counters>,
    pub converger: Arc<Converger>,
    pub sema_registry: Arc<SemaphoreRegistry>,
    pub pause_rx: watch::Receiver<PauseSignal>,
    pub cancel: CancellationToken,
    /// Set when this vertex is a reversal-injected undo resource with a still-pending
    /// marker. Cleared from the table the first time `CheckApply` succeeds, so the undo
    /// is never re-run after a later restart (§4.3's GC requirement on the marker).
    pub reversal_pending: Option<Arc<ReversalTable>>,
}

/// Spawns the vertex's watch coroutine and its event loop. `config.resource` must already
/// be `Init`'d — this function only starts `watch` and begins admitting events.
pub fn spawn_vertex(config: VertexConfig) -> VertexHandle {
    let VertexConfig {
        id,
        resource,
        watch_args,
        downstream,
        recv_links,
        counters,
        converger,
        sema_registry,
        mut pause_rx,
        cancel,
        reversal_pending,
    } = config;

    let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
    let (events_tx, mut events_rx) = mpsc::channel::<WatchEvent>(16);
    let paused_ack = Arc::new(Notify::new());

    let watch_id = id.clone();
    let watch_resource = resource.clone();
    tokio::spawn(async move {
        let guard = watch_resource.lock().await;
        if let Err(e) = guard.watch(&watch_args, events_tx).await {
            log::error!("watch failed for {watch_id}: {e}");
        }
    });

    let downstream_handle = downstream.clone();
    let recv_links_handle = recv_links.clone();
    let task_id = id.clone();
    let task_paused_ack = paused_ack.clone();
    let task = tokio::spawn(async move {
        let mut reversal_pending = reversal_pending;
        let rate_limiter = {
            let guard = resource.lock().await;
            let meta = guard.meta();
            RateLimiter::new(meta.limit, meta.burst)
        };

        let mut event_pending = false;
        converger.report_idle(&task_id);

        'outer: loop {
            if pause_rx.borrow().paused {
                task_paused_ack.notify_one();
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'outer,
                        changed = pause_rx.changed() => {
                            if changed.is_err() {
                                break 'outer;
                            }
                            if !pause_rx.borrow().paused {
                                break;
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                    continue 'outer;
                }
                Some(_ev) = events_rx.recv() => {
                    event_pending = true;
                }
                Some(()) = wake_rx.recv() => {
                    event_pending = true;
                }
            }

            if !event_pending {
                continue 'outer;
            }

            rate_limiter.acquire().await;

            let sema_tokens: Vec<_> = {
                let guard = resource.lock().await;
                guard.meta().ordered_sema().into_iter().cloned().collect()
            };
            let _permits = sema_registry.acquire_all(&sema_tokens).await;

            converger.report_active(&task_id);
            counters.vertex_checks.fetch_add(1, Ordering::Relaxed);

            let links_snapshot: Vec<(String, String, Arc<Mutex<Box<dyn Resource>>>)> = recv_links_handle
                .read()
                .iter()
                .map(|l| (l.send_field.clone(), l.recv_field.clone(), l.source.clone()))
                .collect();
            let mut recv_failed = false;
            for (send_field, recv_field, source) in &links_snapshot {
                let value = {
                    let guard = source.lock().await;
                    guard.as_sendable().and_then(|s| s.send_fields().get(send_field).cloned())
                };
                if let Some(value) = value {
                    let mut guard = resource.lock().await;
                    if let Some(recvable) = guard.as_recvable_mut() {
                        let expected = recvable.recv_field_type(recv_field);
                        match type_check_recv(recv_field, expected, &value) {
                            Ok(()) => {
                                let _ = recvable.set_recv(recv_field, value);
                            }
                            Err(e) => {
                                log::error!("send/recv type mismatch on {task_id}.{recv_field}: {e}");
                                recv_failed = true;
                            }
                        }
                    }
                }
            }
            if recv_failed {
                converger.report_idle(&task_id);
                return Some(VertexOutcome::Failed);
            }

            let mut attempts: i64 = 0;
            loop {
                let mut guard = resource.lock().await;
                let apply = !guard.meta().noop;
                let outcome = tokio::select! {
                    biased;
                    _ = wait_for_fast_pause(&mut pause_rx) => None,
                    r = guard.check_apply(apply) => Some(r),
                };
                match outcome {
                    None => {
                        guard.interrupt();
                        drop(guard);
                        event_pending = true;
                        converger.report_idle(&task_id);
                        continue 'outer;
                    }
                    Some(Ok(unchanged)) => {
                        drop(guard);
                        counters.check_apply_ok.fetch_add(1, Ordering::Relaxed);
                        if let Some(table) = reversal_pending.take() {
                            if let Err(e) = table.clear_pending(&task_id).await {
                                log::warn!("failed to clear reversal marker for {task_id}: {e}");
                            }
                        }
                        if !unchanged {
                            for tx in downstream_handle.read().iter() {
                                let _ = tx.try_send(());
                            }
                        }
                        event_pending = false;
                        converger.report_idle(&task_id);
                        continue 'outer;
                    }
                    Some(Err(e)) => {
                        drop(guard);
                        counters.check_apply_err.fetch_add(1, Ordering::Relaxed);
                        attempts += 1;
                        let (may_retry, delay) = {
                            let guard = resource.lock().await;
                            (guard.meta().may_retry(attempts), guard.meta().delay)
                        };
                        if !may_retry {
                            log::error!("{task_id} exhausted retries: {e}");
                            converger.report_idle(&task_id);
                            return Some(VertexOutcome::Failed);
                        }
                        counters.retries.fetch_add(1, Ordering::Relaxed);
                        tokio::select! {
                            _ = cancel.cancelled() => break 'outer,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                }
            }
        }
        None
    });

    VertexHandle {
        id,
        wake_tx,
        downstream,
        recv_links,
        paused_ack,
        task,
    }
}

async fn wait_for_fast_pause(pause_rx: &mut watch::Receiver<PauseSignal>) {
    loop {
        if pause_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
            return;
        }
        let sig = *pause_rx.borrow();
        if sig.paused && sig.fast {
            return;
        }
    }
}
