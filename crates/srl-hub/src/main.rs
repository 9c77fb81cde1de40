// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use srl_hub::{Hub, router};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "srl-hub", version, about = "Scene-relay channel hub")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0:52702")]
    bind: String,

    /// Worker threads for the I/O pool.
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// Enable verbose debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("srl_hub=debug,srl_protocol=debug")
    } else {
        EnvFilter::new("srl_hub=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.workers)
        .thread_name("srl-hub-io")
        .enable_all()
        .build()
        .context("build hub runtime")?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&args.bind)
            .await
            .with_context(|| format!("bind {}", args.bind))?;
        info!(bind = %args.bind, workers = args.workers, "hub started");

        let hub = Arc::new(Hub::new());
        axum::serve(listener, router(hub))
            .await
            .context("serve hub")
    })
}
