//! Server setup and lifecycle management

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_monitor::{
    CommandRouter, HttpCanvasClient, JsonFileBackend, LogNotifier, MemoryBackend, MonitorLoop,
    Notifier, StatsBackend, StatsStore, TemplateStore,
};

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::discord::DiscordClient;
use crate::error::{DaemonError, DaemonResult};
use crate::inbound::CommandPoller;

/// How the daemon was asked to run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log notifications instead of sending them and keep the ledger in memory
    pub dry_run: bool,
    /// Run a single cycle and exit
    pub once: bool,
}

/// Pixel Warden daemon
pub struct Server {
    config: DaemonConfig,
    options: RunOptions,
    monitor: MonitorLoop,
    poller: Option<CommandPoller>,
    state: AppState,
}

impl Server {
    /// Build every component from configuration
    pub async fn new(config: DaemonConfig, options: RunOptions) -> DaemonResult<Self> {
        config.validate(options.dry_run)?;

        let canvas = Arc::new(HttpCanvasClient::new(config.canvas_endpoints())?);
        let stats = Arc::new(StatsStore::open(open_backend(&config, options).await?).await?);
        info!(
            offenders = stats.len().await,
            path = %config.storage.stats_path.display(),
            "Ledger loaded"
        );

        let template = Arc::new(TemplateStore::from_path(&config.template.path));
        if let Err(e) = template.load().await {
            warn!(error = %e, "Template not readable yet, cycles will fail until it is");
        }

        let channels = config.notifier.channels.clone();
        let discord = match config.token() {
            Some(token) if !options.dry_run => Some(Arc::new(DiscordClient::new(
                config.notifier.api_base.clone(),
                token,
                channels.clone(),
                config.monitor_config().request_timeout,
            )?)),
            _ => None,
        };
        let notifier: Arc<dyn Notifier> = match &discord {
            Some(client) => client.clone(),
            None => Arc::new(LogNotifier::new(channels.clone())),
        };

        let monitor = MonitorLoop::new(
            config.monitor_config(),
            template,
            canvas.clone(),
            canvas,
            stats.clone(),
            notifier,
        )?;
        let handle = monitor.handle();

        let commands = CommandRouter::new(
            stats.clone(),
            handle.mismatches(),
            config.notifier.command_prefix.clone(),
        );

        let poller = discord.map(|client| {
            CommandPoller::new(
                client.clone(),
                client,
                commands.clone(),
                channels,
                config.command_poll_interval(),
            )
        });

        Ok(Self {
            state: AppState::new(stats, handle, commands),
            config,
            options,
            monitor,
            poller,
        })
    }

    /// Run until Ctrl+C / SIGTERM, or for a single cycle with `--once`
    pub async fn run(mut self) -> DaemonResult<()> {
        if self.options.once {
            return match self.monitor.tick().await {
                Some(outcome) => {
                    info!(?outcome, "Single cycle complete");
                    Ok(())
                }
                None => {
                    let status = self.monitor.handle().status().await;
                    Err(DaemonError::CycleFailed(
                        status.last_error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                }
            };
        }

        let signals = StopSignals::install()?;
        self.run_until(signals.recv()).await
    }

    /// Run the monitor, command poller and API until `shutdown` resolves,
    /// then let the in-flight cycle finish.
    pub async fn run_until<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks: Vec<JoinHandle<()>> = vec![tokio::spawn(self.monitor.run(shutdown_rx.clone()))];
        if let Some(poller) = self.poller {
            tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));
        } else {
            info!("Inbound commands disabled (no Discord client)");
        }

        if self.config.server.enabled {
            let addr = self.config.server.listen_addr;
            let listener = TcpListener::bind(addr).await?;
            info!("Operator API listening on {}", addr);

            axum::serve(listener, create_router(self.state))
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|e| DaemonError::Server(e.to_string()))?;
        } else {
            shutdown.await;
        }

        info!("Pixel Warden shutting down");
        let _ = shutdown_tx.send(true);

        // The monitor finishes its in-flight cycle before its task returns.
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        Ok(())
    }
}

async fn open_backend(
    config: &DaemonConfig,
    options: RunOptions,
) -> DaemonResult<Arc<dyn StatsBackend>> {
    let file = JsonFileBackend::new(&config.storage.stats_path);
    if !options.dry_run {
        return Ok(Arc::new(file));
    }

    // Dry runs start from the real ledger but never write it back.
    let ledger = file.load().await?;
    Ok(Arc::new(MemoryBackend::with_ledger(ledger)))
}

/// Process stop signals. Installed before any background task starts.
struct StopSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl StopSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Resolve on the first Ctrl+C or SIGTERM.
    async fn recv(self) {
        #[cfg(unix)]
        let terminate = {
            let mut terminate = self.terminate;
            async move { terminate.recv().await }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(e) => warn!(error = %e, "Ctrl+C listener failed, shutting down"),
            },
            _ = terminate => {
                info!("Received terminate signal, initiating graceful shutdown");
            }
        }
    }
}
