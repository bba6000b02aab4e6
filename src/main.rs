use std::sync::Arc;

use cutting_engine::config::EngineConfig;
use cutting_engine::consumer::{Consumer, ConsumeOutcome, OptimizationRequested};
use cutting_engine::db::Db;
use cutting_engine::engine::Engine;
use cutting_engine::events::EventEmitter;
use cutting_engine::feedback::{FeedbackHandler, ProductionCompleted};
use cutting_engine::logger::{init_tracing, root_span};
use cutting_engine::ml_client::MlAdvisoryClient;
use cutting_engine::repository::{PlanRepository, ScenarioRepository, SqlxPlanRepository, SqlxScenarioRepository};
use cutting_engine::service_clients::{
    CuttingJobClient, InMemoryCuttingJobClient, InMemoryStockClient, PlanClient, RepositoryPlanClient,
    StockClient,
};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Initializes the DB, runs migrations, and returns the Scenario/Plan
/// repositories wired to the same pool.
async fn init_repositories(
    cfg: &EngineConfig,
) -> anyhow::Result<(Arc<dyn ScenarioRepository>, Arc<SqlxPlanRepository>)> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let scenario_repo: Arc<dyn ScenarioRepository> = Arc::new(SqlxScenarioRepository::new(db.pool.clone()));
    let plan_repo = Arc::new(SqlxPlanRepository::new(db.pool.clone()));

    Ok((scenario_repo, plan_repo))
}

/// Starts the consumer loop reading `optimization.requested` messages off the
/// bus ingress channel and returns the sending half: a bounded mpsc channel
/// handed to a spawned task that owns the receiver for the rest of the
/// process's life.
fn start_consumer_loop(consumer: Arc<Consumer>, queue_capacity: usize) -> mpsc::Sender<OptimizationRequested> {
    let (tx, mut rx) = mpsc::channel::<OptimizationRequested>(queue_capacity);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let scenario_id = msg.scenario_id;
            let span = root_span("optimization.requested", &msg.correlation_id);
            async {
                match consumer.handle(msg).await {
                    Ok(ConsumeOutcome::Completed { plan_id }) => {
                        tracing::info!(%scenario_id, %plan_id, "optimization completed");
                    }
                    Ok(ConsumeOutcome::Failed) => {
                        tracing::warn!(%scenario_id, "optimization failed, scenario marked FAILED");
                    }
                    Ok(ConsumeOutcome::Deduplicated) => {
                        tracing::debug!(%scenario_id, "duplicate optimization request dropped");
                    }
                    Err(e) => {
                        tracing::error!(%scenario_id, error=?e, "failed to process optimization request; message will be redelivered");
                    }
                }
            }
            .instrument(span)
            .await;
        }

        tracing::warn!("optimization.requested channel closed; consumer loop stopped");
    });

    tx
}

/// Starts the feedback loop reading `production.completed` messages.
fn start_feedback_loop(handler: Arc<FeedbackHandler>, queue_capacity: usize) -> mpsc::Sender<ProductionCompleted> {
    let (tx, mut rx) = mpsc::channel::<ProductionCompleted>(queue_capacity);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let plan_id = event.plan_id;
            if let Err(e) = handler.handle(event).await {
                tracing::warn!(%plan_id, error=?e, "failed to forward production outcome to ML advisory client");
            }
        }

        tracing::warn!("production.completed channel closed; feedback loop stopped");
    });

    tx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting cutting-engine...");

    let cfg = EngineConfig::from_env();

    let (scenario_repo, plan_repo) = init_repositories(&cfg).await?;

    // §1: Cutting Job and Stock are external collaborators this core does
    // not own. The in-process stand-ins let the binary boot standalone;
    // swap these for real RPC/HTTP clients once those services are wired in.
    let job_client: Arc<dyn CuttingJobClient> = Arc::new(InMemoryCuttingJobClient::new());
    let stock_client: Arc<dyn StockClient> = Arc::new(InMemoryStockClient::new());

    let engine = Arc::new(Engine::new(job_client, stock_client, cfg.clone()));
    let events = EventEmitter::default();

    let consumer = Arc::new(Consumer::new(
        scenario_repo,
        plan_repo.clone() as Arc<dyn PlanRepository>,
        engine,
        events,
    ));
    let _optimization_tx = start_consumer_loop(consumer, cfg.worker_queue_capacity);

    let plan_client: Arc<dyn PlanClient> = Arc::new(RepositoryPlanClient::new(plan_repo));
    let ml_client = Arc::new(MlAdvisoryClient::new(
        cfg.ml_service_url.clone(),
        cutting_engine::circuit_breaker::BreakerConfig {
            timeout: std::time::Duration::from_millis(cfg.breaker_timeout_ms),
            error_threshold_pct: cfg.breaker_error_threshold_pct,
            volume_threshold: cfg.breaker_volume_threshold,
            reset_timeout: std::time::Duration::from_millis(cfg.breaker_reset_timeout_ms),
        },
    ));
    let feedback_handler = Arc::new(FeedbackHandler::new(plan_client, ml_client));
    let _feedback_tx = start_feedback_loop(feedback_handler, cfg.worker_queue_capacity);

    tracing::info!("cutting-engine started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
