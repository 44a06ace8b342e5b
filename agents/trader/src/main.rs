//! The trader claims, approves and trades on behalf of every account in its
//! wallet file, a bounded number of accounts at a time.

#![forbid(unsafe_code)]

use std::{future::Future, panic::AssertUnwindSafe};

use eyre::{eyre, Result};
use futures_util::FutureExt;
use tokio::signal;
use tracing::info;

use crate::{scheduler::panic_message, settings::TraderSettings, trader::Trader};

mod account;
mod contracts;
mod proof;
mod scheduler;
mod settings;
mod trace;
mod trader;
mod wallets;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // Logging is not initialised at this point, so, using `println!`
    println!("Trader starting up...");

    dotenvy::dotenv().ok();
    color_eyre::install()?;

    catch_panics(run()).await
}

async fn run() -> Result<()> {
    let settings = TraderSettings::load()?;
    settings.tracing.start_tracing()?;
    info!(
        rpc_url = %settings.rpc_url,
        chain_id = settings.chain_id,
        max_concurrency = settings.max_concurrency,
        rounds = settings.rounds,
        "Loaded settings"
    );

    let trader = Trader::from_settings(&settings)?;

    tokio::select! {
        summaries = trader.run() => {
            info!(rounds = summaries.len(), "Trader finished");
        }
        res = shutdown_signal() => {
            res?;
            info!("Received termination signal, shutting down");
        }
    }
    Ok(())
}

/// Turns a panic outside the worker pool into an error, so the process exits
/// with status 1.
async fn catch_panics<F>(fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(eyre!("Trader panicked: {}", panic_message(panic))))
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await?;
    Ok(())
}
