use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use spacecat_automation::{
    ActionRegistry, ChannelSink, EventScheduler, EventService, Notification, NotificationSink,
    Payload, ReminderRepository, ReminderScheduler, SchedulerSettings, Store,
};
use spacecat_core::{config::SpacecatConfig, Clock, SystemClock};
use tokio::sync::mpsc;
use tracing::{info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the SpaceCat reminder and event schedulers.
#[derive(Parser, Debug)]
#[command(name = "spacecat-daemon")]
#[command(version)]
struct Args {
    /// Config file path (defaults to ~/.spacecat/spacecat.toml).
    #[arg(short, long, env = "SPACECAT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spacecat_daemon=info,spacecat_automation=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = SpacecatConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        SpacecatConfig::default()
    });

    // single SQLite file for reminders, events and action payloads
    let store = Store::open(&config.database.path)?;
    info!("database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (sink, notifications) = ChannelSink::channel(config.automation.notification_buffer);
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);
    let settings = SchedulerSettings::from(&config.automation);

    let reminders = ReminderScheduler::new(
        ReminderRepository::new(store.clone()),
        Arc::clone(&sink),
        Arc::clone(&clock),
        settings.clone(),
    );
    let service = Arc::new(EventService::new(
        store.clone(),
        ActionRegistry::with_defaults(&store),
        sink,
        clock,
    ));
    let events = EventScheduler::new(service, settings);

    // Notification drain: stands in for the chat layer that performs side effects.
    let drain = tokio::spawn(drain_notifications(notifications));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reminder_loop = {
        let reminders = reminders.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { reminders.run(rx).await })
    };
    let event_loop = {
        let events = events.clone();
        tokio::spawn(async move { events.run(shutdown_rx).await })
    };
    info!(
        cache_release_secs = config.automation.cache_release_secs,
        sweep_interval_secs = config.automation.sweep_interval_secs,
        "SpaceCat automation running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal both schedulers to stop, then let the drain finish what is queued
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(reminder_loop, event_loop);
    drop(reminders);
    drop(events);
    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("notification drain ended abnormally: {e}"),
        Err(_) => warn!("notification drain did not finish in time"),
    }
    info!("SpaceCat automation stopped");
    Ok(())
}

/// Log every dispatched notification until all senders are gone.
async fn drain_notifications(mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let summary = match &notification.payload {
            Payload::Reminder(reminder) => {
                let due = chrono::DateTime::from_timestamp(reminder.dispatch_time, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| reminder.dispatch_time.to_string());
                format!("reminder for <@{}> due {due}: {}", reminder.user_id, reminder.message)
            }
            Payload::Action(action) => action.describe(),
        };
        let payload = serde_json::to_string(&notification.payload).unwrap_or_default();
        info!(kind = %notification.kind, %payload, "{summary}");
    }
}
