//! The runnable coordinator process: wires the Axum webhook surface, the queue worker
//! pool, and the session-TTL sweeper into one binary, following the usual
//! `config -> router -> TcpListener -> axum::serve` shape.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shift_coordinator::arbiter;
use shift_coordinator::config::CoordinatorConfigBuilder;
use shift_coordinator::logging::{self, LoggingConfig};
use shift_coordinator::queue::{self, JobHandler, JobPayload, JobQueue, SqlxJobQueue};
use shift_coordinator::repository::{Repository, SqlxRepository};
use shift_coordinator::server::{self, AppState};
use shift_coordinator::session_store::SessionStore;
use shift_coordinator::sms::{NullSmsAdapter, SmsAdapter};
use shift_coordinator::telephony::{NullTelephonyAdapter, TelephonyAdapter};

/// CLI flags for the coordinator process.
#[derive(Parser, Debug)]
#[command(author, version, about = "After-hours shift-coverage coordinator", long_about = None)]
struct Args {
    /// SQLite connection string, e.g. `sqlite://coordinator.db?mode=rwc` or `sqlite::memory:`.
    #[arg(long, env = "COORDINATOR_DATABASE_URL", default_value = "sqlite::memory:")]
    database_url: String,

    /// Address to bind the webhook HTTP server to.
    #[arg(long, env = "COORDINATOR_BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,

    /// Port to bind the webhook HTTP server to.
    #[arg(long, env = "COORDINATOR_BIND_PORT", default_value_t = 8080)]
    bind_port: u16,

    /// Number of concurrent job-queue worker tasks.
    #[arg(long, env = "COORDINATOR_QUEUE_WORKERS", default_value_t = 5)]
    queue_workers: usize,

    /// `trace`, `debug`, `info`, `warn`, or `error`.
    #[arg(long, env = "COORDINATOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit structured JSON log lines instead of the default human-readable format.
    #[arg(long, env = "COORDINATOR_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

/// Dispatches a dequeued job to W or O depending on its payload.
struct CoordinatorJobHandler {
    repository: Arc<dyn Repository>,
    queue: Arc<dyn JobQueue>,
    sms: Arc<dyn SmsAdapter>,
    telephony: Arc<dyn TelephonyAdapter>,
    arbiter: arbiter::ArbiterHandle,
}

#[async_trait::async_trait]
impl JobHandler for CoordinatorJobHandler {
    async fn handle(&self, payload: JobPayload) -> anyhow::Result<()> {
        match payload {
            JobPayload::Wave(job) => {
                shift_coordinator::wave::handle_wave_job(&*self.repository, &*self.queue, &*self.sms, &job).await
            }
            JobPayload::Outbound(job) => {
                shift_coordinator::outbound::handle_call_job(
                    &*self.repository,
                    &*self.queue,
                    &*self.telephony,
                    &*self.sms,
                    &self.arbiter,
                    &job,
                )
                .await
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = logging::parse_log_level(&args.log_level)?;
    let mut logging_config = LoggingConfig::new(log_level, "shift-coordinator");
    if args.log_json {
        logging_config = logging_config.with_json();
    }
    logging::setup_logging(logging_config)?;
    logging::log_welcome("shift-coordinator", env!("CARGO_PKG_VERSION"));

    let config = CoordinatorConfigBuilder::new()
        .with_database_url(args.database_url.clone())
        .with_bind_addr(args.bind_addr.clone(), args.bind_port)
        .with_queue_workers(args.queue_workers)
        .build();

    let repository = Arc::new(SqlxRepository::new(&config.database.url).await?);
    let queue = Arc::new(SqlxJobQueue::new(repository.pool().clone()));
    // T and M are left as no-op adapters at this seam, the same reason `crate::telephony`
    // and `crate::sms` ship Null adapters for tests. A deployment wires a real
    // `TelephonyAdapter`/`SmsAdapter` here.
    let telephony: Arc<dyn TelephonyAdapter> = Arc::new(NullTelephonyAdapter::default());
    let sms: Arc<dyn SmsAdapter> = Arc::new(NullSmsAdapter::default());

    let arbiter_handle = arbiter::spawn(repository.clone(), queue.clone(), sms.clone());

    let job_handler = Arc::new(CoordinatorJobHandler {
        repository: repository.clone(),
        queue: queue.clone(),
        sms: sms.clone(),
        telephony: telephony.clone(),
        arbiter: arbiter_handle.clone(),
    });
    let _queue_workers = queue::run_worker_pool(
        queue.clone(),
        job_handler,
        config.queue.worker_count,
        Duration::from_secs(2),
    )
    .await;
    info!("queue worker pool started with {} workers", config.queue.worker_count);

    let sessions = SessionStore::new();
    let _sweeper = sessions.spawn_sweeper(Duration::from_secs(60));

    let state = AppState::new(repository.clone(), sessions, arbiter_handle, sms.clone());
    let app = server::build_router(state);

    let addr = format!("{}:{}", config.server.bind_addr, config.server.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("webhook server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
