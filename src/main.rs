pub mod mqtt;
pub mod persistence;
pub mod status;

use color_eyre::{eyre::eyre, Result};
use mqtt::observer::{ChannelObserver, IndicatorEvent};
use mqtt::supervisor::SupervisorHandle;
use mqtt::transport::RumqttcTransport;
use persistence::SettingsStore;
use status::Indicator;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let store = SettingsStore::from_env();

    // `reset` clears the stored broker settings, like the tray menu's reset entry
    if std::env::args().nth(1).as_deref() == Some("reset") {
        store.reset().await?;
        store.ensure_template().await?;
        info!("Settings reset, edit {} and restart", store.path().display());
        return Ok(());
    }

    let settings = store.load().await?;
    if !settings.is_complete() {
        if store.ensure_template().await? {
            info!("Wrote settings template to {}", store.path().display());
        }
        return Err(eyre!(
            "MQTT settings incomplete: set broker, port and topic in {}",
            store.path().display()
        ));
    }
    let config = settings.connection_config()?;

    let (observer, mut indicator_rx) = ChannelObserver::channel();
    let mut supervisor = SupervisorHandle::spawn(RumqttcTransport::default());
    supervisor.register_observer(&observer).await?;
    supervisor.start(config).await?;

    let mut reconnect_rx = spawn_reconnect_listener();
    let mut indicator = Indicator::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }

            Some(()) = reconnect_rx.recv() => {
                if let Err(e) = supervisor.reconnect().await {
                    warn!("Manual reconnect failed: {}", e);
                }
            }

            event = indicator_rx.recv() => match event {
                Some(event) => show(&mut indicator, event),
                None => break,
            },
        }
    }

    supervisor.shutdown().await;
    let status = supervisor.subscribe().borrow().clone();
    info!(
        "Received {} message(s) over {} connection attempt(s)",
        status.messages_received, status.connection_attempts
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    // stdout carries the indicator itself
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Applies an observer event to the indicator on the presentation task.
fn show(indicator: &mut Indicator, event: IndicatorEvent) {
    let next = event.display_state();
    debug!("{:?} -> {:?}", event, next);
    if let Some(rendered) = indicator.update(next) {
        println!("{}", rendered);
    }
}

/// SIGHUP requests an immediate reconnect.
fn spawn_reconnect_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reconnecting");
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    #[cfg(not(unix))]
    drop(tx);

    rx
}
