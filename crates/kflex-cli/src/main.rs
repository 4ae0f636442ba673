//! kflex-ctx - import control-plane credentials into the local kubeconfig.
//!
//! This is the entry point for the `kflex-ctx` binary.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kflex_core::{ControlPlaneIdentity, ControlPlaneName, ControlPlaneType};
use kflex_kubeconfig::{CancellationToken, KubeconfigConfig};
use tracing_subscriber::EnvFilter;

/// Merge kflex control-plane credentials into the local kubeconfig.
#[derive(Parser, Debug)]
#[command(name = "kflex-ctx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Aggregate kubeconfig to read and write.
    ///
    /// Defaults to the first entry of `KUBECONFIG`, then `$HOME/.kube/config`.
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

/// Identifies the control plane a command acts on.
#[derive(clap::Args, Debug)]
struct Target {
    /// Control plane name.
    name: ControlPlaneName,

    /// Control plane type (k8s, ocm, vcluster, host, external).
    #[arg(long = "type", short = 't', default_value = "k8s")]
    cp_type: ControlPlaneType,
}

impl Target {
    fn identity(&self) -> ControlPlaneIdentity {
        ControlPlaneIdentity::new(self.name.clone(), self.cp_type)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a control plane's kubeconfig and switch to its context.
    Merge {
        #[command(flatten)]
        target: Target,

        /// Wait for the credential bundle to be published first.
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this many seconds (0 waits forever).
        #[arg(long, env = "KFLEX_WAIT_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Print the merged kubeconfig instead of writing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Wait for a control plane's credential bundle to be published.
    Wait {
        #[command(flatten)]
        target: Target,

        /// Give up after this many seconds (0 waits forever).
        #[arg(long, env = "KFLEX_WAIT_TIMEOUT_SECS")]
        timeout: Option<u64>,
    },

    /// List the contexts of the aggregate kubeconfig.
    Contexts {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "info,kflex=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Build the effective configuration: environment first, flags on top.
fn load_config(kubeconfig: Option<PathBuf>, timeout: Option<u64>) -> KubeconfigConfig {
    let mut config = KubeconfigConfig::from_env();
    if let Some(path) = kubeconfig {
        config.aggregate_path = path;
    }
    if let Some(secs) = timeout {
        config.wait_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    config
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match args.command {
        Command::Merge {
            target,
            wait,
            timeout,
            dry_run,
        } => {
            let config = load_config(args.kubeconfig, timeout);
            let options = commands::MergeOptions { wait, dry_run };
            commands::merge(&config, &target.identity(), options, cancel).await
        }
        Command::Wait { target, timeout } => {
            let config = load_config(args.kubeconfig, timeout);
            commands::wait(&config, &target.identity(), cancel).await
        }
        Command::Contexts { json } => {
            let config = load_config(args.kubeconfig, None);
            commands::contexts(&config, json)
        }
    }
}
