use crate::config::Config;
use crate::error::Error;
use clap::Args;
use mev_plus_aggregator::AggregatorService;
use mev_plus_api::ApiService;
use mev_plus_proxy::ProxyService;
use mev_plus_relay::RelayService;
use std::backtrace::Backtrace;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

/// Abort with a full stack dump after this many shutdown signals (spec,
/// external interfaces: "a tenth signal aborts with a full stack dump").
const ABORT_AFTER_SIGNALS: u32 = 10;

#[derive(Debug, Args)]
#[clap(about = "run the blockAggregator, relay, externalValidatorProxy and builderApi modules")]
pub struct Command {
    /// Path to an optional TOML config file, namespaced `[module] flag = "value"`.
    #[clap(long, env, default_value = "config.toml")]
    config_file: String,

    /// Require the config file to exist; without this, a missing file falls
    /// back to every module's defaults.
    #[clap(long)]
    require_config: bool,

    /// Repeatable `module.flag=value` override applied on top of the file.
    #[clap(long = "set", value_name = "MODULE.FLAG=VALUE")]
    overrides: Vec<String>,
}

impl Command {
    pub async fn execute(self) -> Result<(), Error> {
        let mut config = match Config::from_toml_file(self.config_file.clone()) {
            Ok(config) => config,
            Err(Error::Io(_)) if !self.require_config => {
                tracing::warn!("no config file at `{}`, using module defaults", self.config_file);
                Config::default()
            }
            Err(err) => return Err(err),
        };
        config.apply_overrides(&self.overrides)?;

        let mut registry = mev_plus_bus::ModuleRegistry::new();
        registry.register(Arc::new(AggregatorService::new()))?;
        registry.register(Arc::new(RelayService::new()))?;
        registry.register(Arc::new(ProxyService::new()))?;
        registry.register(Arc::new(ApiService::new()))?;

        registry.configure(&config.0).await?;
        registry.start_all().await?;
        tracing::info!("all modules started");

        spawn_shutdown_monitor().notified().await;

        registry.stop_all().await?;
        tracing::info!("clean shutdown");
        Ok(())
    }
}

/// Spawns a task that counts `SIGINT`/`SIGTERM` for the rest of the process's
/// life and returns a [`Notify`] that fires once, on the first signal. The
/// task keeps running underneath whatever graceful shutdown that first signal
/// triggers: a second signal warns that shutdown is already in progress, a
/// tenth captures a backtrace and aborts the process (spec, external
/// interfaces table).
fn spawn_shutdown_monitor() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let task_notify = notify.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        let mut count = 0u32;
        loop {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            count += 1;
            match count {
                1 => {
                    tracing::info!("received shutdown signal, beginning graceful shutdown");
                    task_notify.notify_one();
                }
                2..=9 => {
                    tracing::warn!(count, "shutdown already in progress, signal ignored");
                }
                _ => {
                    let backtrace = Backtrace::force_capture();
                    tracing::error!(%backtrace, "received {ABORT_AFTER_SIGNALS} shutdown signals, aborting");
                    std::process::abort();
                }
            }
        }
    });
    notify
}
