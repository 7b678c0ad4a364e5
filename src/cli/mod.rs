//! Command-line interface for podspeed.
//!
//! Provides commands for benchmarking pod startup (and deletion) latency
//! and listing the available pod types.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::KubeCluster;
use crate::config::{self, Overrides};
use crate::core::Synchronizer;
use crate::templates::{self, PodFactory, TemplateRegistry};

pub mod report;

use report::RunDescription;

/// podspeed - Measure how fast pods get through their lifecycle
#[derive(Parser, Debug)]
#[command(name = "podspeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create pods, wait for them to become ready and report the timings
    Run(RunArgs),

    /// List the built-in pod types
    Types,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Namespace to create the pods in
    #[arg(short, long, env = "PODSPEED_NAMESPACE")]
    pub namespace: Option<String>,

    /// Pod type to create (see `podspeed types`)
    #[arg(long = "type", env = "PODSPEED_TYPE")]
    pub pod_type: Option<String>,

    /// Number of pods to create
    #[arg(short, long, env = "PODSPEED_PODS")]
    pub pods: Option<usize>,

    /// Pod manifest to use instead of a built-in type
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Leave the pods in place once they are ready
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub skip_delete: Option<bool>,

    /// Create pods one after another instead of all at once
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub sequential: Option<bool>,

    /// Wait for the pods to be gone and report deletion latency
    #[arg(
        long = "delete-timings",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub delete_timings: Option<bool>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Capacity of the internal event buffer
    #[arg(long, value_name = "EVENTS")]
    pub event_buffer: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Config file (defaults to .podspeed/config.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            namespace: self.namespace.clone(),
            pod_type: self.pod_type.clone(),
            pods: self.pods,
            template: self.template.clone(),
            skip_delete: self.skip_delete,
            sequential: self.sequential,
            collect_delete_timings: self.delete_timings,
            timeout_seconds: self.timeout,
            event_buffer: self.event_buffer,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_benchmark(args).await,
            Commands::Types => list_types().await,
        }
    }
}

/// Run one benchmark and print its report
async fn run_benchmark(args: RunArgs) -> Result<()> {
    let config = config::load(args.config.as_deref(), &args.overrides())?;
    if let Some(path) = &config.config_file {
        info!(path = %path.display(), "Loaded config file");
    }

    let constructor = match &config.template {
        Some(path) => templates::from_yaml_file(path)?,
        None => TemplateRegistry::builtin().get(&config.pod_type)?,
    };
    let factory = PodFactory::new(&config.namespace, &config.pod_type, constructor);

    let cluster = KubeCluster::connect(&config.namespace)
        .await?
        .with_selector(factory.selector());

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    info!(
        run_id = %factory.run_id(),
        namespace = %cluster.namespace(),
        pod_type = %config.pod_type,
        pods = config.pods,
        "Benchmark configured"
    );

    let mut synchronizer = Synchronizer::new(cluster, cancel);
    let report = synchronizer
        .run(config.pods, &factory, &config.options)
        .await
        .context("Benchmark run failed")?;

    let description = RunDescription {
        pod_type: config.pod_type.clone(),
        pods: config.pods,
        sequential: config.options.sequential,
    };
    let include_deleted = config.options.awaits_deletion();

    match args.output {
        OutputFormat::Table => {
            println!();
            print!("{}", report::render_table(&description, &report, include_deleted));
        }
        OutputFormat::Json => {
            println!("{}", report::render_json(&description, &report, include_deleted)?);
        }
    }

    Ok(())
}

/// List the built-in pod types
async fn list_types() -> Result<()> {
    for name in TemplateRegistry::builtin().names() {
        println!("{}", name);
    }
    Ok(())
}

/// Cancel the run on Ctrl-C or SIGTERM
fn cancel_on_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupted, cancelling run");
        cancel.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
