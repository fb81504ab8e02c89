//! The Outer Loop (§4.9): `waiting -> installing -> compiling -> failed-compile -> exiting`.
//! Reads deploys from the Deploy Bus (or a single deploy supplied at startup), installs
//! the named GAPI from the registry, and on every `Next` tick recompiles the engine's
//! live graph: `Load -> Validate -> Apply(global overrides) -> AutoEdge -> AutoGroup ->
//! Reversals -> Pause(fast?) -> Commit -> Resume`.

use std::path::PathBuf;
use std::sync::Arc;

use mgmt_deploy::{Deploy, DeployBus};
use mgmt_engine::Engine;
use mgmt_gapi::{Gapi, NextEvent, Registry};
use mgmt_resource::SemaToken;
use mgmt_world::World;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::graphviz;

/// Global overrides the outer loop applies to every resource in the staged graph before
/// each commit (§4.4's `Apply`, §6's `--noop`/`--sema`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Overrides {
    pub noop: bool,
    pub sema: Option<i64>,
}

pub struct OuterLoop {
    world: Arc<dyn World>,
    registry: Registry,
    bus: DeployBus,
    overrides: Overrides,
    graphviz: Option<(PathBuf, Option<String>)>,
    last_deploy_id: u64,
}

impl OuterLoop {
    pub fn new(world: Arc<dyn World>, registry: Registry, overrides: Overrides) -> Self {
        let bus = DeployBus::new(world.kv_arc());
        OuterLoop {
            world,
            registry,
            bus,
            overrides,
            graphviz: None,
            last_deploy_id: 0,
        }
    }

    pub fn with_graphviz(mut self, path: PathBuf, filter: Option<String>) -> Self {
        self.graphviz = Some((path, filter));
        self
    }

    /// Runs until `cancel` fires (the signal handler's job) or a GAPI's `Next` stream
    /// closes with no deploy watch enabled to supply a replacement.
    pub async fn run(
        &mut self,
        engine: &mut Engine,
        initial: Deploy,
        watch_deploys: bool,
        cancel: CancellationToken,
    ) -> Result<(), RunnerError> {
        let mut deploy = initial;
        self.last_deploy_id = deploy.id;
        let mut deploy_activity = watch_deploys.then(|| self.bus.watch_deploy());

        'waiting: loop {
            // installing: build the named frontend and hand it the world.
            let mut gapi = self.install(&deploy).await?;

            // compiling: run once per Next tick until the stream closes or a new deploy
            // preempts it.
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        gapi.close().await.ok();
                        return Ok(());
                    }
                    tick = gapi.next() => {
                        match tick {
                            Some(event) => {
                                if let Err(e) = self.compile_tick(engine, gapi.as_ref(), event).await {
                                    log::error!("compile failed, aborting staged graph: {e}");
                                    engine.abort();
                                    // failed-compile: stay paused on the current live graph
                                    // and wait for a fresh deploy rather than retrying the
                                    // same broken tick.
                                }
                            }
                            None => break,
                        }
                    }
                    next = next_deploy(&mut deploy_activity, &self.bus, self.last_deploy_id), if deploy_activity.is_some() => {
                        if let Some(new_deploy) = next? {
                            gapi.close().await.ok();
                            deploy = new_deploy;
                            self.last_deploy_id = deploy.id;
                            continue 'waiting;
                        }
                    }
                }
            }

            // The GAPI's Next stream ended on its own. Without a deploy watch there is
            // nothing left to wait for.
            gapi.close().await.ok();
            if !watch_deploys {
                return Ok(());
            }
            let Some(new_deploy) = wait_for_next_deploy(&mut deploy_activity, &self.bus, self.last_deploy_id).await? else {
                return Ok(());
            };
            deploy = new_deploy;
            self.last_deploy_id = deploy.id;
        }
    }

    async fn install(&self, deploy: &Deploy) -> Result<Box<dyn Gapi>, RunnerError> {
        let mut gapi = if deploy.is_empty() {
            Box::new(mgmt_gapi::StaticGapi::new(mgmt_gapi::StaticSpec::default())) as Box<dyn Gapi>
        } else {
            self.registry.build(&deploy.name, &deploy.payload)?
        };
        gapi.init(self.world.clone()).await?;
        Ok(gapi)
    }

    async fn compile_tick(&self, engine: &mut Engine, gapi: &dyn Gapi, event: NextEvent) -> Result<(), RunnerError> {
        let graph = gapi.graph().await?;
        if let Some((path, filter)) = &self.graphviz {
            graphviz::dump(&graph, path, filter.as_deref()).await;
        }
        engine.load(graph);
        engine.validate().await?;
        let overrides = self.overrides;
        engine
            .apply(move |r| {
                if overrides.noop {
                    r.meta_mut().noop = true;
                }
                if let Some(n) = overrides.sema {
                    r.meta_mut().sema.push(SemaToken::anonymous(n));
                }
            })
            .await?;
        engine.autoedge().await?;
        engine.autogroup().await?;
        engine.reversals().await?;
        engine.pause(event.fast_pause).await;
        engine.commit().await?;
        engine.resume().await?;
        Ok(())
    }
}

/// Awaits the next activity event then re-polls the bus for a newer max id (§4.8: a
/// watch event never carries enough information on its own to trust).
async fn next_deploy(
    activity: &mut Option<tokio::sync::broadcast::Receiver<mgmt_world::WatchEvent>>,
    bus: &DeployBus,
    known: u64,
) -> Result<Option<Deploy>, RunnerError> {
    let rx = activity.as_mut().expect("guarded by is_some() in the caller's select!");
    match rx.recv().await {
        Ok(_) => fetch_if_newer(bus, known).await,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => fetch_if_newer(bus, known).await,
        Err(tokio::sync::broadcast::error::RecvError::Closed) => Ok(None),
    }
}

async fn wait_for_next_deploy(
    activity: &mut Option<tokio::sync::broadcast::Receiver<mgmt_world::WatchEvent>>,
    bus: &DeployBus,
    known: u64,
) -> Result<Option<Deploy>, RunnerError> {
    loop {
        let Some(found) = next_deploy(activity, bus, known).await? else {
            return Ok(None);
        };
        if found.is_some() {
            return Ok(found);
        }
    }
}

async fn fetch_if_newer(bus: &DeployBus, known: u64) -> Result<Option<Deploy>, RunnerError> {
    let max = bus.get_max_deploy_id().await?;
    if max <= known {
        return Ok(None);
    }
    Ok(bus.get_deploy(max).await?)
}
