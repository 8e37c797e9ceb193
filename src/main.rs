// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use rpc_controller::{
    cli::{Cli, Command, RunArgs},
    controller::run_controller,
    health::{serve_health, HealthState},
    store::EtcdStore,
};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Completions { shell }) = cli.command {
        write_completions(shell, &mut std::io::stdout());
        return Ok(());
    }

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("rpc-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli.run))
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "rpc-controller", out);
}

fn init_logging() {
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT environment variable for output format (json|text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: RunArgs) -> Result<()> {
    init_logging();

    info!("Starting RPC service discovery controller");
    debug!("Logging initialized with file and line number tracking");

    // Configuration errors are fatal: never start partially configured
    let store_config = args
        .store_config()
        .context("invalid key-value store configuration")?;
    let controller_config = args
        .controller_config()
        .context("invalid controller configuration")?;

    debug!("Initializing Kubernetes client");
    let client = kube_client(&args).await?;
    debug!("Kubernetes client initialized successfully");

    let store = EtcdStore::connect(&store_config)
        .await
        .context("failed to connect to etcd")?;

    let cancel = CancellationToken::new();
    let health = HealthState::new();

    let health_task = tokio::spawn(serve_health(
        args.health_port,
        health.clone(),
        cancel.clone(),
    ));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let result = run_controller(
        client,
        Arc::new(store),
        &store_config,
        controller_config,
        health,
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    match health_task.await {
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    result?;
    info!("Shutdown complete");
    Ok(())
}

/// Build a client from `--kubeconfig`/`--master`, falling back to inference.
async fn kube_client(args: &RunArgs) -> Result<Client> {
    let mut config = match &args.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await?
        }
        None => kube::Config::infer().await?,
    };

    if let Some(master) = &args.master {
        config.cluster_url = master
            .parse()
            .with_context(|| format!("invalid --master address '{master}'"))?;
    }

    Ok(Client::try_from(config)?)
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
