//! Async consumer (§4.13): turns an `optimization.requested` bus message
//! into a scenario run, publishing lifecycle events as it goes.
//!
//! Mirrors the `tokio::sync::mpsc` channel handoff used elsewhere in this
//! crate, generalized into a bus-message handler: load, mark in-flight, do
//! the work, persist the outcome, emit. This handler never re-enqueues on
//! failure, though — a FAILED scenario is a terminal, retryable state the
//! caller re-submits explicitly, not something this crate auto-retries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{self, Engine, EngineInput};
use crate::events::{EventEmitter, OptimizationEvent};
use crate::logger::annotate_span;
use crate::model::{Algorithm, ScenarioStatus};
use crate::repository::{NewPlan, PlanRepository, ScenarioRepository};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequested {
    pub cutting_job_id: Uuid,
    pub scenario_id: Uuid,
    pub algorithm: Option<Algorithm>,
    pub kerf: Option<f64>,
    pub allow_rotation: Option<bool>,
    pub correlation_id: String,
}

/// Outcome of handling one message, for the caller's ack/metrics decision.
/// Every variant other than a load/transition failure represents a message
/// that was fully processed and should be acked.
#[derive(Debug, PartialEq)]
pub enum ConsumeOutcome {
    Completed { plan_id: Uuid },
    Failed,
    Deduplicated,
}

pub struct Consumer {
    scenario_repo: std::sync::Arc<dyn ScenarioRepository>,
    plan_repo: std::sync::Arc<dyn PlanRepository>,
    engine: std::sync::Arc<Engine>,
    events: EventEmitter,
}

impl Consumer {
    pub fn new(
        scenario_repo: std::sync::Arc<dyn ScenarioRepository>,
        plan_repo: std::sync::Arc<dyn PlanRepository>,
        engine: std::sync::Arc<Engine>,
        events: EventEmitter,
    ) -> Self {
        Self {
            scenario_repo,
            plan_repo,
            engine,
            events,
        }
    }

    /// Processes one `optimization.requested` message to completion. Only
    /// returns `Err` for failures that happen *before* the RUNNING status is
    /// durably persisted — those are not safe to ack and should be
    /// redelivered. Everything after that point (engine failure, plan
    /// creation) always resolves to a terminal scenario status and an `Ok`,
    /// since the scenario must never be left RUNNING (§8).
    #[tracing::instrument(
        skip(self, msg),
        fields(scenario_id = %msg.scenario_id, correlation_id = %msg.correlation_id, plan_id = tracing::field::Empty)
    )]
    pub async fn handle(&self, msg: OptimizationRequested) -> anyhow::Result<ConsumeOutcome> {
        let scenario = self
            .scenario_repo
            .find_by_id(msg.scenario_id, None)
            .await?
            .ok_or_else(|| anyhow::anyhow!("scenario {} not found", msg.scenario_id))?;

        if matches!(scenario.status, ScenarioStatus::Running | ScenarioStatus::Completed) {
            tracing::info!(status = ?scenario.status, "duplicate optimization.requested dropped");
            return Ok(ConsumeOutcome::Deduplicated);
        }

        self.scenario_repo
            .update_status(msg.scenario_id, scenario.tenant_id, ScenarioStatus::Running)
            .await?;

        self.events.publish(OptimizationEvent::Started {
            scenario_id: msg.scenario_id,
            correlation_id: msg.correlation_id.clone(),
        });

        let mut parameters = scenario.parameters.clone();
        if let Some(algorithm) = msg.algorithm {
            parameters.algorithm = Some(algorithm);
        }
        if let Some(kerf) = msg.kerf {
            parameters.kerf = kerf;
        }
        if let Some(allow_rotation) = msg.allow_rotation {
            parameters.allow_rotation = allow_rotation;
        }

        let output = self
            .engine
            .run(EngineInput {
                cutting_job_id: msg.cutting_job_id,
                parameters,
            })
            .await;

        match output.plan_data {
            Some(plan_data) => {
                let stocks = engine::layouts_to_plan_stocks(&plan_data.layouts)
                    .into_iter()
                    .map(|s| crate::repository::NewPlanStock {
                        stock_item_id: s.stock_item_id,
                        waste: s.waste,
                        waste_percentage: s.waste_percentage,
                        layout_data: s.layout_data,
                    })
                    .collect();

                let plan = self
                    .plan_repo
                    .create(
                        msg.scenario_id,
                        NewPlan {
                            total_waste: plan_data.total_waste,
                            waste_percentage: plan_data.waste_percentage,
                            estimated_time: None,
                            estimated_cost: None,
                            stocks,
                        },
                    )
                    .await?;

                self.scenario_repo
                    .update_status(msg.scenario_id, scenario.tenant_id, ScenarioStatus::Completed)
                    .await?;

                annotate_span(None, Some(&plan.id));

                self.events.publish(OptimizationEvent::Completed {
                    scenario_id: msg.scenario_id,
                    plan_id: plan.id,
                    plan_number: plan.plan_number.clone(),
                    total_waste: plan.total_waste,
                    waste_percentage: plan.waste_percentage,
                    stock_used_count: plan.stock_used_count,
                });

                Ok(ConsumeOutcome::Completed { plan_id: plan.id })
            }
            None => {
                let (code, error) = match output.error {
                    Some(e) => (e.code(), e.to_string()),
                    None => ("INTERNAL_ERROR", "unknown engine error".to_string()),
                };

                self.scenario_repo
                    .update_status(msg.scenario_id, scenario.tenant_id, ScenarioStatus::Failed)
                    .await?;

                self.events.publish(OptimizationEvent::Failed {
                    scenario_id: msg.scenario_id,
                    code,
                    error,
                });

                Ok(ConsumeOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{
        Algorithm, CuttingJob, CuttingJobItem, CuttingJobStatus, GeometryType, OrderItem,
        ScenarioParameters, StockItem, StockType,
    };
    use crate::repository::{NewScenario, SqlxPlanRepository, SqlxScenarioRepository};
    use crate::service_clients::{InMemoryCuttingJobClient, InMemoryStockClient};
    use sqlx::any::{AnyPool, AnyPoolOptions};

    async fn pool() -> std::sync::Arc<AnyPool> {
        sqlx::any::install_default_drivers();
        let url = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
        let pool = AnyPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
        crate::db::schema::migrate(&pool).await.unwrap();
        std::sync::Arc::new(pool)
    }

    fn params() -> ScenarioParameters {
        ScenarioParameters {
            algorithm: Some(Algorithm::Ffd1D),
            kerf: 0.0,
            min_usable_waste: 50.0,
            allow_rotation: true,
            use_warehouse_stock: true,
            use_standard_sizes: false,
            selected_stock_ids: vec![],
        }
    }

    fn job() -> CuttingJob {
        CuttingJob {
            id: Uuid::new_v4(),
            material_type_id: Uuid::new_v4(),
            thickness: 18.0,
            status: CuttingJobStatus::Pending,
            items: vec![CuttingJobItem {
                id: Uuid::new_v4(),
                order_item: OrderItem {
                    id: Uuid::new_v4(),
                    geometry_type: GeometryType::Bar1D,
                    length: 600.0,
                    width: 0.0,
                    can_rotate: false,
                },
                quantity: 3,
            }],
        }
    }

    async fn build_consumer(
        job: &CuttingJob,
        with_matching_stock: bool,
    ) -> (Consumer, std::sync::Arc<dyn ScenarioRepository>, Uuid) {
        let pool = pool().await;
        let scenario_repo: std::sync::Arc<dyn ScenarioRepository> =
            std::sync::Arc::new(SqlxScenarioRepository::new(pool.clone()));
        let plan_repo: std::sync::Arc<dyn PlanRepository> =
            std::sync::Arc::new(SqlxPlanRepository::new(pool));

        let scenario = scenario_repo
            .create(NewScenario {
                tenant_id: None,
                name: "s".into(),
                cutting_job_id: job.id,
                created_by_id: Uuid::new_v4(),
                parameters: params(),
                use_warehouse_stock: true,
                use_standard_sizes: false,
            })
            .await
            .unwrap();

        let job_client = std::sync::Arc::new(InMemoryCuttingJobClient::new());
        job_client.insert(job.clone());
        let stock_client = std::sync::Arc::new(InMemoryStockClient::new());
        if with_matching_stock {
            stock_client.set(vec![StockItem {
                id: Uuid::new_v4(),
                material_type_id: job.material_type_id,
                stock_type: StockType::Bar1D,
                length: Some(2000.0),
                width: None,
                height: None,
                thickness: job.thickness,
                quantity: 10,
                reserved_qty: 0,
                unit_price: 10.0,
                is_from_waste: false,
            }]);
        }

        let engine = std::sync::Arc::new(Engine::new(job_client, stock_client, EngineConfig::from_env()));
        let consumer = Consumer::new(scenario_repo.clone(), plan_repo, engine, EventEmitter::new(16));
        (consumer, scenario_repo, scenario.id)
    }

    #[tokio::test]
    async fn happy_path_completes_scenario_and_creates_plan() {
        let job = job();
        let (consumer, scenario_repo, scenario_id) = build_consumer(&job, true).await;

        let outcome = consumer
            .handle(OptimizationRequested {
                cutting_job_id: job.id,
                scenario_id,
                algorithm: None,
                kerf: None,
                allow_rotation: None,
                correlation_id: "corr-1".into(),
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ConsumeOutcome::Completed { .. }));
        let scenario = scenario_repo.find_by_id(scenario_id, None).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Completed);
    }

    #[tokio::test]
    async fn no_stock_marks_scenario_failed() {
        let job = job();
        let (consumer, scenario_repo, scenario_id) = build_consumer(&job, false).await;

        let outcome = consumer
            .handle(OptimizationRequested {
                cutting_job_id: job.id,
                scenario_id,
                algorithm: None,
                kerf: None,
                allow_rotation: None,
                correlation_id: "corr-2".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ConsumeOutcome::Failed);
        let scenario = scenario_repo.find_by_id(scenario_id, None).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Failed);
    }

    #[tokio::test]
    async fn duplicate_message_on_completed_scenario_is_dropped() {
        let job = job();
        let (consumer, _scenario_repo, scenario_id) = build_consumer(&job, true).await;

        let msg = OptimizationRequested {
            cutting_job_id: job.id,
            scenario_id,
            algorithm: None,
            kerf: None,
            allow_rotation: None,
            correlation_id: "corr-3".into(),
        };

        let first = consumer.handle(msg.clone()).await.unwrap();
        assert!(matches!(first, ConsumeOutcome::Completed { .. }));

        let second = consumer.handle(msg).await.unwrap();
        assert_eq!(second, ConsumeOutcome::Deduplicated);
    }
}
