//! `RunConfig` (§10.3): the global run flags of the `run`/`deploy`/`get` CLI surface
//! (§6), parsed with `clap`'s derive API the way other standalone binaries in this
//! workspace's lineage parse their own options.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mgmtd", about = "Reactive resource graph engine runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Override host identity instead of reading it from the OS.
    #[arg(long, global = true)]
    pub hostname: Option<String>,

    /// Working directory for deploy payloads and per-resource state.
    #[arg(long, global = true)]
    pub prefix: Option<PathBuf>,

    /// Working directory to use if `--prefix` is unset and no environment override applies.
    #[arg(long, global = true)]
    pub tmp_prefix: Option<PathBuf>,

    /// Permit falling back to a temp-dir prefix rather than erroring when none was chosen.
    #[arg(long, global = true)]
    pub allow_tmp_prefix: bool,

    /// Disable all three reactive sources (equivalent to the other three `--no-*-watch` flags).
    #[arg(long, global = true)]
    pub no_watch: bool,

    /// Disable per-resource `Watch` coroutines; resources are only ever checked once per deploy.
    #[arg(long, global = true)]
    pub no_stream_watch: bool,

    /// Disable the Deploy Bus's cluster watch; only the deploy supplied at startup runs.
    #[arg(long, global = true)]
    pub no_deploy_watch: bool,

    /// Force every resource's Noop meta, overriding whatever the GAPI set.
    #[arg(long, global = true)]
    pub noop: bool,

    /// Passed through to every resource's `Init` (§4.1's `InitArgs.debug`) and to the
    /// GAPI's own `Init` Data per §6.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Append a `:N` anonymous semaphore to every resource.
    #[arg(long, global = true)]
    pub sema: Option<i64>,

    /// Converger idle timeout, in seconds, before a host is reported converged.
    #[arg(long, global = true, default_value_t = 5)]
    pub converged_timeout: u64,

    /// Keep running after convergence instead of exiting.
    #[arg(long, global = true)]
    pub converged_timeout_no_exit: bool,

    /// Write `true`/`false` to this file on every convergence state transition.
    #[arg(long, global = true)]
    pub converged_status_file: Option<PathBuf>,

    /// Hard self-exit after this many seconds, regardless of convergence.
    #[arg(long, global = true)]
    pub max_runtime: Option<u64>,

    /// Cluster peer seeds (accepted for interface compatibility; embedded etcd lifecycle
    /// is out of scope, so this configures the in-process KV's listen behavior instead).
    #[arg(long, global = true)]
    pub seeds: Vec<String>,

    #[arg(long, global = true)]
    pub client_urls: Vec<String>,

    #[arg(long, global = true)]
    pub server_urls: Vec<String>,

    #[arg(long, global = true)]
    pub advertise_client_urls: Vec<String>,

    #[arg(long, global = true)]
    pub advertise_server_urls: Vec<String>,

    #[arg(long, global = true)]
    pub ideal_cluster_size: Option<usize>,

    #[arg(long, global = true)]
    pub no_server: bool,

    #[arg(long, global = true)]
    pub no_network: bool,

    /// Dump the staged graph to this file, in graphviz dot format, on every commit.
    #[arg(long, global = true)]
    pub graphviz: Option<PathBuf>,

    #[arg(long, global = true)]
    pub graphviz_filter: Option<String>,

    /// Accepted for interface compatibility; no exporter is wired up (§2's Non-goals).
    #[arg(long, global = true)]
    pub prometheus: bool,

    #[arg(long, global = true)]
    pub prometheus_listen: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a GAPI frontend against the live engine.
    Run { frontend: String },
    /// Submit a deploy built by a GAPI frontend to the Deploy Bus and exit.
    Deploy { frontend: String },
    /// Download/resolve a GAPI frontend's offline artifacts.
    Get { frontend: String },
}

impl Cli {
    pub fn converged_timeout(&self) -> Duration {
        Duration::from_secs(self.converged_timeout)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime.map(Duration::from_secs)
    }

    /// Resolves the working-directory prefix per §6's Environment clause: an explicit
    /// `--prefix` wins, then `--tmp-prefix`, then `STATE_DIRECTORY`/`XDG_CACHE_HOME`, then
    /// a bare temp dir if `--allow-tmp-prefix` was given.
    pub fn resolve_prefix(&self) -> Result<PathBuf, String> {
        if let Some(p) = &self.prefix {
            return Ok(p.clone());
        }
        if std::env::var("STATE_DIRECTORY").is_ok() || std::env::var("XDG_CACHE_HOME").is_ok() {
            return Ok(mgmt_world::default_prefix());
        }
        if let Some(p) = &self.tmp_prefix {
            return Ok(p.clone());
        }
        if self.allow_tmp_prefix {
            return Ok(mgmt_world::default_prefix());
        }
        Err("no --prefix given and no STATE_DIRECTORY/XDG_CACHE_HOME set; pass --allow-tmp-prefix to fall back to a temp dir".to_string())
    }
}
