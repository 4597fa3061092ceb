mod adapters;
mod api;
mod processor;
mod queue;
mod reporter;
mod scheduler;
#[cfg(test)]
mod testutil;
mod traits;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing_subscriber::EnvFilter;

use crate::adapters::{PgJobQueue, PgRecordStore, ProviderCollector, SheetSource};
use crate::api::{build_app, ApiState};
use crate::processor::JobProcessor;
use crate::queue::{QueueWorker, QueueWorkerConfig};
use crate::reporter::{ReporterSettings, StatusReporter};
use crate::scheduler::{CollectionScheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(smpdb_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = smpdb_db::PoolConfig::from_app_config(&config);
    let pool = smpdb_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = smpdb_db::run_migrations(&pool).await?;
    if applied > 0 {
        tracing::info!(applied, "applied pending migrations");
    }

    let sources = smpdb_core::load_sources(&config.sources_path)?.sources;
    tracing::info!(sources = sources.len(), "loaded sheet sources");

    let state = Arc::new(smpdb_core::ProcessState::new());
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let sheets_client = smpdb_sheets::SheetsClient::new(smpdb_sheets::SheetsSettings {
        api_base: config.sheets_api_base.clone(),
        token: config.sheets_token.clone(),
        request_timeout_secs: config.request_timeout_secs,
    })?;
    let provider_client = smpdb_provider::ProviderClient::new(smpdb_provider::ProviderSettings {
        api_base: config.provider_api_base.clone(),
        token: config.provider_token.clone(),
        dataset_instagram: config.provider_dataset_instagram.clone(),
        dataset_tiktok: config.provider_dataset_tiktok.clone(),
        request_timeout_secs: config.request_timeout_secs,
        poll_interval_secs: config.poll_interval_secs,
        max_wait_secs: config.max_wait_secs,
    })?;

    // Scheduler and processor each get their own sheet adapter over a
    // shared HTTP client; the adapters themselves are stateless.
    let scheduler = Arc::new(CollectionScheduler::new(
        SheetSource::new(smpdb_sheets::SheetWorkItems::new(sheets_client.clone())),
        PgJobQueue::new(pool.clone(), config.job_max_attempts),
        Arc::clone(&state),
        sources,
        SchedulerConfig {
            batch_size: config.batch_size,
            stagger: Duration::from_secs(config.batch_stagger_secs),
            items_per_target: config.items_per_target,
        },
    ));

    let processor = Arc::new(JobProcessor::new(
        SheetSource::new(smpdb_sheets::SheetWorkItems::new(sheets_client)),
        ProviderCollector::new(provider_client),
        PgRecordStore::new(pool.clone()),
        Arc::clone(&state),
    ));

    let queue_worker = Arc::new(QueueWorker::new(
        pool.clone(),
        processor,
        QueueWorkerConfig {
            concurrency: config.worker_concurrency.max(1),
            poll_interval: Duration::from_secs(config.queue_poll_interval_secs),
            backoff_base_secs: config.retry_backoff_base_secs,
        },
    ));

    {
        let worker = Arc::clone(&queue_worker);
        tokio::spawn(async move { worker.run().await });
    }

    {
        let scheduler = Arc::clone(&scheduler);
        let grace = Duration::from_secs(config.startup_grace_secs);
        let interval = Duration::from_secs(config.cycle_interval_secs);
        tokio::spawn(async move { scheduler.run(grace, interval, command_rx).await });
    }

    let reporter = match &config.monitor_url {
        Some(endpoint) => Some(Arc::new(StatusReporter::new(
            ReporterSettings {
                endpoint: endpoint.clone(),
                secret: config.monitor_secret.clone(),
                request_timeout_secs: config.request_timeout_secs,
            },
            pool.clone(),
            Arc::clone(&state),
            command_tx.clone(),
        )?)),
        None => {
            tracing::info!("SMPDB_MONITOR_URL not set; status reporting disabled");
            None
        }
    };

    // Keep the cron scheduler handle alive for the life of the process;
    // dropping it stops the periodic push.
    let _report_scheduler = match &reporter {
        Some(reporter) => {
            Some(build_report_scheduler(Arc::clone(reporter), config.report_interval_secs).await?)
        }
        None => None,
    };

    let app = build_app(ApiState {
        pool: pool.clone(),
        state: Arc::clone(&state),
    });
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "status endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reporter) = &reporter {
        reporter.send_offline().await;
    }
    Ok(())
}

/// Registers the periodic status push on a cron scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process.
async fn build_report_scheduler(
    reporter: Arc<StatusReporter>,
    interval_secs: u64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let cron = report_cron(interval_secs);
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let reporter = Arc::clone(&reporter);
        Box::pin(async move { reporter.push().await })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Six-field cron firing every `secs` for sub-minute intervals, otherwise
/// on whole-minute boundaries.
fn report_cron(secs: u64) -> String {
    let secs = secs.clamp(1, 86_400);
    if secs < 60 {
        format!("*/{secs} * * * * *")
    } else {
        format!("0 */{} * * * *", (secs / 60).clamp(1, 59))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::report_cron;

    #[test]
    fn report_cron_sub_minute() {
        assert_eq!(report_cron(30), "*/30 * * * * *");
        assert_eq!(report_cron(10), "*/10 * * * * *");
    }

    #[test]
    fn report_cron_whole_minutes() {
        assert_eq!(report_cron(60), "0 */1 * * * *");
        assert_eq!(report_cron(300), "0 */5 * * * *");
    }

    #[test]
    fn report_cron_clamps_degenerate_values() {
        assert_eq!(report_cron(0), "*/1 * * * * *");
        assert_eq!(report_cron(u64::MAX), "0 */59 * * * *");
    }
}
