//! adwardend - The adwarden background service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization and shift seeding
//! - Graph API platform adapter
//! - Reconciliation engine (its own task, one tick at a time)
//! - Control plane behind the IPC server

use adwarden_api::{Event, EventPayload};
use adwarden_config::{load_config, Policy};
use adwarden_core::{ControlPlane, ControlSettings, EngineSettings, ReconcileEngine};
use adwarden_ipc::{IpcServer, ServerMessage};
use adwarden_platform_api::PlatformClient;
use adwarden_platform_graph::GraphPlatform;
use adwarden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use adwarden_util::{default_config_path, AccountClock, Clock};
use adwardend::{core_event_payload, handle_command};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// adwardend - Schedule and budget automation for ad campaigns
#[derive(Parser, Debug)]
#[command(name = "adwardend")]
#[command(about = "Schedule and budget automation for ad campaigns", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/adwarden/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set ADWARDEN_SOCKET env var)
    #[arg(short, long, env = "ADWARDEN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set ADWARDEN_DATA_DIR env var)
    #[arg(short, long, env = "ADWARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

/// Main service state
struct Service {
    engine: ReconcileEngine,
    control: Arc<ControlPlane>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    tick_interval: Duration,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            account = %policy.platform.account_id,
            level = %policy.platform.level,
            shift_count = policy.shifts.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("adwarden.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        info!(db_path = %db_path.display(), "Store initialized");

        let seeded = store
            .seed_shifts(&policy.shifts)
            .context("Failed to seed shifts")?;
        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;
        store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            shift_count: policy.shifts.len(),
            seeded,
        }))?;

        let platform = build_platform(&policy)?;

        let clock = AccountClock::new(policy.service.timezone);
        if clock.is_mocked() {
            warn!(now = %clock.now(), "Clock is mocked via environment");
        }
        let clock: Arc<dyn Clock> = Arc::new(clock);

        let engine = ReconcileEngine::new(
            store.clone(),
            platform.clone(),
            clock.clone(),
            EngineSettings::from_policy(&policy),
        );
        let control = Arc::new(ControlPlane::new(
            store.clone(),
            platform,
            clock,
            ControlSettings::from_policy(&policy),
        ));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;

        Ok(Self {
            engine,
            control,
            ipc: Arc::new(ipc),
            store,
            tick_interval: policy.service.tick_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_task = spawn_engine(self.engine, self.tick_interval, ipc.clone(), shutdown_rx);

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        info!(tick_interval_secs = self.tick_interval.as_secs(), "Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    handle_ipc_message(&self.control, &ipc, &self.store, msg).await;
                }
            }
        }

        info!("Shutting down adwardend");

        // Let an in-flight tick finish so its commands are audited
        let _ = shutdown_tx.send(true);
        if let Err(e) = engine_task.await {
            warn!(error = %e, "Engine task ended abnormally");
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn build_platform(policy: &Policy) -> Result<Arc<dyn PlatformClient>> {
    let token = policy.platform.access_token().with_context(|| {
        format!(
            "Access token not set (expected in ${})",
            policy.platform.access_token_env
        )
    })?;

    let platform = GraphPlatform::new(&policy.platform, token)
        .context("Failed to create platform client")?;

    info!(
        base_url = %policy.platform.base_url,
        api_version = %policy.platform.api_version,
        "Platform client initialized"
    );
    Ok(Arc::new(platform))
}

/// Run ticks until shutdown. A tick that overruns the interval delays the
/// next one; missed ticks are skipped, never queued.
fn spawn_engine(
    mut engine: ReconcileEngine,
    tick_interval: Duration,
    ipc: Arc<IpcServer>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    for event in engine.tick().await {
                        ipc.broadcast_event(Event::new(core_event_payload(event)));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Engine task stopping");
                        break;
                    }
                }
            }
        }
    })
}

async fn handle_ipc_message(
    control: &Arc<ControlPlane>,
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn Store>,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            let Some(info) = ipc.get_client_info(&client_id).await else {
                debug!(client_id = %client_id, "Request from departed client dropped");
                return;
            };

            // Platform calls can be slow; keep the accept loop responsive
            let control = control.clone();
            let ipc = ipc.clone();
            tokio::spawn(async move {
                let (response, events) = handle_command(
                    &control,
                    info.role,
                    &client_id,
                    request.request_id,
                    request.command,
                )
                .await;

                if let Err(e) = ipc.send_response(&client_id, response).await {
                    debug!(client_id = %client_id, error = %e, "Failed to send response");
                }
                for payload in events {
                    ipc.broadcast_event(Event::new(payload));
                }
            });
        }

        ServerMessage::ClientConnected { client_id, info } => {
            let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                client_id: client_id.to_string(),
                role: format!("{:?}", info.role),
                uid: info.uid,
            }));
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");

            let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                client_id: client_id.to_string(),
            }));
        }
    }
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "adwardend starting");

    let service = Service::new(&args).await?;
    service.run().await
}
