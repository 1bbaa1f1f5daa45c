// LED sync daemon: runs the group sync core over LAN UDP broadcast.

mod config;
mod listener;
mod storage;
mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use ledsync_core::{
    DeviceId, OutboundAction, PeerAddress, SyncListener, SyncManager, SyncMode,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::listener::LogListener;
use crate::storage::FileModeStore;
use crate::transport::UdpTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut mode_override = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ledsync-linux {}", VERSION);
                return Ok(());
            }
            "--mode" => {
                let value = args.next().context("--mode needs a value (solo|join|host)")?;
                mode_override = Some(value.parse::<SyncMode>()?);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledsync_linux=info,ledsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg, mode_override))
}

async fn run(cfg: config::Config, mode_override: Option<SyncMode>) -> anyhow::Result<()> {
    if cfg.tick_ms == 0 {
        bail!("tick_ms must be positive");
    }
    let device_id = DeviceId::derive(cfg.serial.as_deref());
    if cfg.serial.is_none() {
        tracing::warn!(%device_id, "no serial configured, using a random device id");
    }

    let transport = Arc::new(
        UdpTransport::bind(cfg.port, cfg.local_ip)
            .await
            .with_context(|| format!("bind UDP port {}", cfg.port))?,
    );
    let store = FileModeStore::new(cfg.state_path.clone());
    let mut manager = SyncManager::new(
        device_id,
        transport.local_address(),
        cfg.sync.clone(),
        Box::new(store),
    )
    .context("invalid [sync] configuration")?;
    let mut listener = LogListener::default();

    let epoch = Instant::now();
    let clock = move || epoch.elapsed().as_millis() as u64;

    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
    tokio::spawn(transport::recv_loop(transport.clone(), packet_tx));

    dispatch(&transport, &mut listener, manager.start(clock())).await;
    if let Some(mode) = mode_override {
        dispatch(&transport, &mut listener, manager.set_sync_mode(mode, clock())).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let actions = manager.tick(clock());
                dispatch(&transport, &mut listener, actions).await;
            }
            Some((from, bytes)) = packet_rx.recv() => {
                manager.enqueue_packet(from, bytes);
            }
            res = &mut shutdown => {
                res?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    // Tell the group before going quiet so peers don't wait out the timeout.
    dispatch(&transport, &mut listener, manager.leave_group(clock())).await;
    Ok(())
}

async fn dispatch(
    transport: &UdpTransport,
    listener: &mut dyn SyncListener,
    actions: Vec<OutboundAction>,
) {
    for action in actions {
        match action {
            OutboundAction::SendTo(to, frame) => transport.send(to, &frame).await,
            OutboundAction::Broadcast(frame) => {
                transport.send(PeerAddress::BROADCAST, &frame).await
            }
            OutboundAction::Notify(event) => event.dispatch(listener),
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
