//! Queue subcommand handlers for reliq.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use reliq_config::Config;
use reliq_queue::{
    CancellationToken, EventKind, ListBroker, OlderThan, QueueClient, QueueEvent, QueueObserver,
    RecoverAll, RedisBroker, SweepPolicy, Sweeper, TracingObserver,
};

use crate::cli::Commands;

/// Handle queue subcommands.
pub(crate) async fn handle_queue_command(
    command: Commands,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker: Arc<dyn ListBroker> = Arc::new(RedisBroker::connect(&config.broker.url).await?);

    match command {
        Commands::Push { payload } => queue_push(broker, config, &payload).await,
        Commands::Work {
            manual,
            reject_with,
        } => queue_work(broker, config, manual, reject_with).await,
        Commands::Inspect { errors } => queue_inspect(broker, config, errors).await,
        Commands::Recover { all, older_than } => {
            queue_recover(broker, config, all, older_than).await
        }
    }
}

/// Push one payload.
async fn queue_push(
    broker: Arc<dyn ListBroker>,
    config: Config,
    payload: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let client = QueueClient::new(broker, config.queue);
    let job = client.push(&value).await?;

    println!(
        "Pushed to {} (checksum {:08x})",
        client.keys().pending,
        job.sys.checksum
    );
    Ok(())
}

/// How the worker settles each delivered job.
enum Settle {
    /// Auto-acknowledged by the client.
    Auto,
    Acknowledge,
    Reject(String),
}

/// Prints each delivered payload as a JSON line.
struct PrintObserver {
    client: QueueClient,
    settle: Settle,
}

#[async_trait]
impl QueueObserver for PrintObserver {
    fn events(&self) -> u32 {
        EventKind::Job as u32
    }

    async fn on_event(&self, event: &QueueEvent) {
        let QueueEvent::Job(lease) = event else {
            return;
        };
        println!("{}", lease.job().payload);

        let result = match &self.settle {
            Settle::Auto => return,
            Settle::Acknowledge => self.client.acknowledge(lease).await,
            Settle::Reject(message) => self.client.reject(lease, message.as_str()).await,
        };
        if let Err(e) = result {
            error!(queue = %self.client.keys().pending, error = %e, "Failed to settle job");
        }
    }
}

/// Consume until Ctrl+C.
async fn queue_work(
    broker: Arc<dyn ListBroker>,
    mut config: Config,
    manual: bool,
    reject_with: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settle = match reject_with {
        Some(message) => Settle::Reject(message),
        None if manual => Settle::Acknowledge,
        None => Settle::Auto,
    };
    if !matches!(settle, Settle::Auto) {
        config.queue.auto_acknowledge = false;
    }

    let token = CancellationToken::new();
    let sweeper_task = if config.sweeper.enabled {
        let policy = Arc::new(OlderThan::new(Duration::from_secs(
            config.sweeper.older_than_secs,
        )));
        let sweeper = Sweeper::new(broker.clone(), &config.queue, policy);
        let interval = Duration::from_secs(config.sweeper.interval_secs);
        let token = token.clone();
        Some(tokio::spawn(async move { sweeper.run(interval, token).await }))
    } else {
        None
    };

    let client = QueueClient::new(broker, config.queue);
    let namespace = client.keys().pending.clone();

    // The first job observer starts delivery, so the printer goes first.
    client.on(Arc::new(PrintObserver {
        client: client.clone(),
        settle,
    }));
    client.on(Arc::new(TracingObserver::new(namespace.clone())));
    info!(queue = %namespace, "Worker started, press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    info!(queue = %namespace, "Shutting down...");
    client.stop_auto_pop();
    token.cancel();
    if let Some(task) = sweeper_task {
        task.await?;
    }
    Ok(())
}

/// Print list sizes and the most recent rejections.
async fn queue_inspect(
    broker: Arc<dyn ListBroker>,
    config: Config,
    errors: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = QueueClient::new(broker, config.queue);
    let keys = client.keys();

    println!("{:<30} {:>10}", "LIST", "LENGTH");
    println!("{}", "-".repeat(41));
    println!("{:<30} {:>10}", keys.pending, client.pending_len().await?);
    println!("{:<30} {:>10}", keys.in_flight, client.in_flight_len().await?);
    println!("{:<30} {:>10}", keys.error, client.error_len().await?);

    let rejected = client.errors(errors).await?;
    if !rejected.is_empty() {
        println!("\nRecent rejections:");
        for job in rejected {
            println!(
                "  [{}] {} {}",
                job.sys.created_at.to_rfc3339(),
                job.error_message().unwrap_or("-"),
                job.payload
            );
        }
    }
    Ok(())
}

/// Run one sweep of the in-flight list.
async fn queue_recover(
    broker: Arc<dyn ListBroker>,
    config: Config,
    all: bool,
    older_than: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy: Arc<dyn SweepPolicy> = if all {
        Arc::new(RecoverAll)
    } else {
        let secs = older_than.unwrap_or(config.sweeper.older_than_secs);
        Arc::new(OlderThan::new(Duration::from_secs(secs)))
    };

    let report = Sweeper::new(broker, &config.queue, policy)
        .sweep_once()
        .await?;

    println!(
        "Scanned {}, recovered {}, skipped {}, quarantined {}",
        report.scanned, report.recovered, report.skipped, report.quarantined
    );
    Ok(())
}
