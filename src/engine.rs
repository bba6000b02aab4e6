//! Engine orchestrator (§4.7): data load → dispatch → convert → return.
//!
//! Follows the same pipeline shape as a periodic scheduling loop (load →
//! derive → dispatch → persist → record counters): the same
//! `#[instrument]` + `warn_if_slow` wrapping around the expensive step, the
//! same "load, then bail with a typed error on absence" structure. This
//! orchestrator does not persist, though — §4.7 hands the caller a
//! `planData` to persist; persistence is the consumer's job (§4.13),
//! keeping orchestration and the repository cleanly separated.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use uuid::Uuid;

use crate::circuit_breaker::BreakerConfig;
use crate::config::EngineConfig;
use crate::convert;
use crate::error::EngineError;
use crate::logger::warn_if_slow;
use crate::ml_client::{self, MlAdvisoryClient};
use crate::model::{Algorithm, CuttingPlanStock, LayoutData, ScenarioParameters};
use crate::service_clients::{CuttingJobClient, StockClient, StockQuery};
use crate::strategies::{self, Options1D, Options2D};
use crate::worker_pool::{self, WorkerPool};

pub struct EngineInput {
    pub cutting_job_id: Uuid,
    pub parameters: ScenarioParameters,
}

pub struct PlanData {
    pub total_waste: f64,
    pub waste_percentage: f64,
    pub stock_used_count: u32,
    pub efficiency: f64,
    pub layouts: Vec<(Uuid, f64, f64, LayoutData)>,
    pub unplaced_count: usize,
}

pub struct EngineOutput {
    pub success: bool,
    pub plan_data: Option<PlanData>,
    pub error: Option<EngineError>,
}

pub struct Engine {
    job_client: Arc<dyn CuttingJobClient>,
    stock_client: Arc<dyn StockClient>,
    ml_client: Arc<MlAdvisoryClient>,
    worker_pool: WorkerPool,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        job_client: Arc<dyn CuttingJobClient>,
        stock_client: Arc<dyn StockClient>,
        config: EngineConfig,
    ) -> Self {
        let worker_pool = WorkerPool::new(config.worker_pool_size, config.worker_queue_capacity);
        let ml_client = Arc::new(MlAdvisoryClient::new(
            config.ml_service_url.clone(),
            BreakerConfig {
                timeout: Duration::from_millis(config.breaker_timeout_ms),
                error_threshold_pct: config.breaker_error_threshold_pct,
                volume_threshold: config.breaker_volume_threshold,
                reset_timeout: Duration::from_millis(config.breaker_reset_timeout_ms),
            },
        ));

        Self {
            job_client,
            stock_client,
            ml_client,
            worker_pool,
            config,
        }
    }

    #[instrument(skip(self, input), fields(cutting_job_id = %input.cutting_job_id))]
    pub async fn run(&self, input: EngineInput) -> EngineOutput {
        match self.run_inner(input).await {
            Ok(plan_data) => EngineOutput {
                success: true,
                plan_data: Some(plan_data),
                error: None,
            },
            Err(error) => EngineOutput {
                success: false,
                plan_data: None,
                error: Some(error),
            },
        }
    }

    async fn run_inner(&self, input: EngineInput) -> Result<PlanData, EngineError> {
        let client_timeout = Duration::from_millis(self.config.service_client_timeout_ms);

        // 1. Load cutting job with items.
        let job = worker_pool::with_timeout(
            "cutting_job_client.get_job_with_items",
            client_timeout,
            self.job_client.get_job_with_items(input.cutting_job_id),
        )
        .await??;

        // 2. Classify dimensionality.
        let is_1d = job.is_1d();

        // 3. Load available stock.
        let stock_type = if is_1d {
            crate::model::StockType::Bar1D
        } else {
            crate::model::StockType::Sheet2D
        };
        let selected = if input.parameters.selected_stock_ids.is_empty() {
            None
        } else {
            Some(input.parameters.selected_stock_ids.clone())
        };
        let stock = worker_pool::with_timeout(
            "stock_client.get_available_stock",
            client_timeout,
            self.stock_client.get_available_stock(StockQuery {
                material_type_id: job.material_type_id,
                thickness: job.thickness,
                stock_type,
                selected_stock_ids: selected,
            }),
        )
        .await??;

        // 4. No stock at all -> NO_STOCK.
        if stock.is_empty() {
            return Err(EngineError::NoStock);
        }

        // 5. Resolve the algorithm: caller-specified, or ask the ML advisor.
        let algorithm = match input.parameters.algorithm {
            Some(a) => a,
            None => self.suggest_algorithm(&job, is_1d).await,
        };

        if algorithm.is_1d() != is_1d {
            return Err(EngineError::AlgorithmMismatch {
                algorithm: algorithm.name().to_string(),
                dimension: if is_1d { "1D" } else { "2D" }.to_string(),
            });
        }

        // 6/7. Convert, dispatch to the worker pool, convert the result back.
        let timeout = Duration::from_millis(self.config.worker_task_timeout_ms);
        let (layouts, unplaced_count, waste_totals) = if is_1d {
            self.run_1d(&job, &stock, &input.parameters, algorithm, timeout).await?
        } else {
            self.run_2d(&job, &stock, &input.parameters, algorithm, timeout).await?
        };

        let (total_waste, total_stock_measure) = waste_totals;
        let waste_percentage = if total_stock_measure > 0.0 {
            (total_waste / total_stock_measure) * 100.0
        } else {
            0.0
        };
        let efficiency = 100.0 - waste_percentage;

        Ok(PlanData {
            total_waste,
            waste_percentage,
            stock_used_count: layouts.len() as u32,
            efficiency,
            layouts,
            unplaced_count,
        })
    }

    async fn suggest_algorithm(&self, job: &crate::model::CuttingJob, is_1d: bool) -> Algorithm {
        let lengths_or_areas: Vec<f64> = job
            .items
            .iter()
            .map(|i| {
                if is_1d {
                    i.order_item.length
                } else {
                    i.order_item.length * i.order_item.width
                }
            })
            .collect();
        let features = ml_client::build_features(&lengths_or_areas, 0, 0.0, is_1d);

        let suggestion = warn_if_slow(
            "ml.select_algorithm",
            Duration::from_millis(self.config.breaker_timeout_ms),
            self.ml_client.select_algorithm(&features, is_1d),
        )
        .await;

        Algorithm::parse(&suggestion.name).unwrap_or(if is_1d {
            Algorithm::Ffd1D
        } else {
            Algorithm::Guillotine2D
        })
    }

    async fn run_1d(
        &self,
        job: &crate::model::CuttingJob,
        stock: &[crate::model::StockItem],
        params: &ScenarioParameters,
        algorithm: Algorithm,
        timeout: Duration,
    ) -> Result<(Vec<(Uuid, f64, f64, LayoutData)>, usize, (f64, f64)), EngineError> {
        let pieces = convert::job_to_pieces_1d(job);
        let stock_1d = convert::stock_to_1d(stock);
        let options: Options1D = convert::options_1d(params, self.config.default_min_usable_waste_1d_mm);
        let strategy = strategies::lookup_1d(algorithm)?;

        let result = self
            .worker_pool
            .submit(timeout, move || strategy.execute(&pieces, &stock_1d, &options))
            .await?;

        let total_waste: f64 = result.bars.iter().map(|b| b.waste).sum();
        let total_stock_length: f64 = result.bars.iter().map(|b| b.stock_length).sum();

        let layouts = result
            .bars
            .iter()
            .map(|b| (b.stock_id, b.waste, b.waste_percentage, convert::bar_to_layout(b)))
            .collect();

        Ok((layouts, result.unplaced_pieces.len(), (total_waste, total_stock_length)))
    }

    async fn run_2d(
        &self,
        job: &crate::model::CuttingJob,
        stock: &[crate::model::StockItem],
        params: &ScenarioParameters,
        algorithm: Algorithm,
        timeout: Duration,
    ) -> Result<(Vec<(Uuid, f64, f64, LayoutData)>, usize, (f64, f64)), EngineError> {
        let pieces = convert::job_to_pieces_2d(job);
        let stock_2d = convert::stock_to_2d(stock);
        let options: Options2D = convert::options_2d(params);
        let strategy = strategies::lookup_2d(algorithm)?;

        let result = self
            .worker_pool
            .submit(timeout, move || strategy.execute(&pieces, &stock_2d, &options))
            .await?;

        let total_waste: f64 = result.sheets.iter().map(|s| s.waste).sum();
        let total_stock_area: f64 = result.sheets.iter().map(|s| s.stock_w * s.stock_h).sum();

        let layouts = result
            .sheets
            .iter()
            .map(|s| (s.stock_id, s.waste, s.waste_percentage, convert::sheet_to_layout(s)))
            .collect();

        Ok((layouts, result.unplaced_pieces.len(), (total_waste, total_stock_area)))
    }
}

/// Lifts raw engine layouts into the `CuttingPlanStock` rows the repository
/// persists, assigning dense 1-based sequences (§3 invariant).
pub fn layouts_to_plan_stocks(layouts: &[(Uuid, f64, f64, LayoutData)]) -> Vec<CuttingPlanStock> {
    layouts
        .iter()
        .enumerate()
        .map(|(idx, (stock_id, waste, waste_pct, layout))| CuttingPlanStock {
            id: Uuid::new_v4(),
            plan_id: Uuid::nil(),
            sequence: (idx as u32) + 1,
            stock_item_id: *stock_id,
            waste: *waste,
            waste_percentage: *waste_pct,
            layout_data: layout.clone(),
        })
        .collect()
}
