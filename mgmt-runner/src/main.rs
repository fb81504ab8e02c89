//! `mgmtd`: the runner binary (§4.9, §6). Parses [`mgmt_runner::Cli`], builds the
//! in-process [`mgmt_world::world::InMemoryWorld`], wires a [`mgmt_gapi::Registry`]
//! pre-loaded with the reference `static` frontend, and drives the outer loop until a
//! signal or `--max-runtime` ends it.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mgmt_deploy::Deploy;
use mgmt_engine::Engine;
use mgmt_gapi::{static_gapi::StaticGapiFactory, Registry};
use mgmt_runner::{config::Command, outer_loop::Overrides, Cli, OuterLoop};
use mgmt_world::world::InMemoryWorld;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let prefix = match cli.resolve_prefix() {
        Ok(p) => p,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::create_dir_all(&prefix) {
        log::error!("failed to create prefix directory {}: {e}", prefix.display());
        return ExitCode::FAILURE;
    }

    let hostname = cli
        .hostname
        .clone()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());
    let world: Arc<dyn mgmt_world::World> = Arc::new(InMemoryWorld::new(hostname, prefix.clone()));

    let mut registry = Registry::new();
    registry.register(Box::new(StaticGapiFactory));

    let frontend = match &cli.command {
        Command::Run { frontend } | Command::Deploy { frontend } | Command::Get { frontend } => frontend.clone(),
    };

    if let Command::Get { .. } = &cli.command {
        return match registry.contains(&frontend) {
            true => {
                log::info!("gapi '{frontend}' is registered; no offline resolve step is needed for reference frontends");
                ExitCode::SUCCESS
            }
            false => {
                log::error!("no such gapi registered: {frontend}");
                ExitCode::FAILURE
            }
        };
    }

    let initial = if frontend.is_empty() || frontend == "empty" {
        Deploy::empty()
    } else {
        Deploy {
            id: 1,
            name: frontend.clone(),
            noop: cli.noop,
            sema: cli.sema.unwrap_or(0),
            payload: Vec::new(),
        }
    };

    if let Command::Deploy { .. } = &cli.command {
        let bus = mgmt_deploy::DeployBus::new(world.kv_arc());
        return match bus.add_deploy(initial, mgmt_deploy::DeployBus::genesis_hash(), false).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("failed to submit deploy: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let cancel = CancellationToken::new();
    let (mut shutdown_rx, _signal_task) = mgmt_runner::signal::install(cancel.clone());

    let mut engine = Engine::new(world.clone(), prefix, cli.debug, cli.converged_timeout());
    if let Err(e) = engine.recover_reversals().await {
        log::warn!("failed to scan for pending reversals at startup: {e}");
    }
    if let Some(status_file) = cli.converged_status_file.clone() {
        engine.converger().set_callback(move |converged| {
            let _ = std::fs::write(&status_file, if converged { "true" } else { "false" });
        });
    }

    let overrides = Overrides {
        noop: cli.noop,
        sema: cli.sema,
    };
    let mut outer_loop = OuterLoop::new(world, registry, overrides);
    if let Some(path) = cli.graphviz.clone() {
        outer_loop = outer_loop.with_graphviz(path, cli.graphviz_filter.clone());
    }

    let watch_deploys = !cli.no_watch && !cli.no_deploy_watch;
    let run_cancel = cancel.clone();
    let mut run_future = Box::pin(outer_loop.run(&mut engine, initial, watch_deploys, run_cancel));

    let max_runtime = cli.max_runtime();
    let result = tokio::select! {
        result = &mut run_future => result,
        _ = async {
            match max_runtime {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        } => {
            log::info!("max-runtime elapsed, shutting down");
            cancel.cancel();
            run_future.await
        }
        request = shutdown_rx.recv() => {
            log::info!("shutdown requested: {request:?}");
            run_future.await
        }
    };
    drop(run_future);

    engine.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("outer loop failed: {e}");
            ExitCode::FAILURE
        }
    }
}
