//! Service registry and typed client façades (§4.10).
//!
//! Per §9's own redesign guidance, the string-routed dispatch substrate is
//! kept as an internal detail, not the public contract: callers use typed
//! trait façades (`CuttingJobClient`, `StockClient`, `PlanClient`), each
//! backed by a direct in-process call rather than a network round trip.
//! Follows the usual `#[async_trait]` trait-object pattern for this kind of
//! seam — one capability per trait, one impl wired at startup, swappable for
//! an out-of-process RPC client later without touching call sites.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{CuttingJob, CuttingPlan, CuttingPlanStock, PlanStatus, StockItem, StockType};
use crate::repository::{PlanFilter, PlanRepository};

#[async_trait]
pub trait CuttingJobClient: Send + Sync {
    async fn get_job_with_items(&self, job_id: Uuid) -> Result<CuttingJob, EngineError>;
}

#[derive(Clone, Debug, Default)]
pub struct StockQuery {
    pub material_type_id: Uuid,
    pub thickness: f64,
    pub stock_type: StockType,
    pub selected_stock_ids: Option<Vec<Uuid>>,
}

#[async_trait]
pub trait StockClient: Send + Sync {
    async fn get_available_stock(&self, query: StockQuery) -> Result<Vec<StockItem>, EngineError>;
}

#[async_trait]
pub trait PlanClient: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<CuttingPlan, EngineError>;
    async fn get_stock_items(&self, id: Uuid) -> Result<Vec<CuttingPlanStock>, EngineError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: PlanStatus,
        approved_by_id: Option<Uuid>,
        machine_id: Option<Uuid>,
    ) -> Result<CuttingPlan, EngineError>;
    async fn get_approved(
        &self,
        scenario_id: Option<Uuid>,
    ) -> Result<Vec<CuttingPlan>, EngineError>;
}

/// Backs `PlanClient` with the real repository. The other two clients
/// (`CuttingJobClient`, `StockClient`) have no analogous core-owned table —
/// §1 treats Cutting Job and Stock as external collaborators — so their
/// production implementations live outside this crate; `InMemory*` stand-ins
/// below exist for tests and the binary's demo wiring.
pub struct RepositoryPlanClient<R: PlanRepository> {
    repo: std::sync::Arc<R>,
}

impl<R: PlanRepository> RepositoryPlanClient<R> {
    pub fn new(repo: std::sync::Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: PlanRepository> PlanClient for RepositoryPlanClient<R> {
    async fn get_by_id(&self, id: Uuid) -> Result<CuttingPlan, EngineError> {
        self.repo
            .find_by_id(id, None)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .ok_or(EngineError::PlanNotFound(id))
    }

    async fn get_stock_items(&self, id: Uuid) -> Result<Vec<CuttingPlanStock>, EngineError> {
        self.repo
            .get_stock_items(id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PlanStatus,
        approved_by_id: Option<Uuid>,
        machine_id: Option<Uuid>,
    ) -> Result<CuttingPlan, EngineError> {
        self.repo
            .update_status(id, status, approved_by_id, machine_id)
            .await
    }

    async fn get_approved(
        &self,
        scenario_id: Option<Uuid>,
    ) -> Result<Vec<CuttingPlan>, EngineError> {
        self.repo
            .find_all(PlanFilter {
                scenario_id,
                status: Some(PlanStatus::Approved),
                ..Default::default()
            })
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))
    }
}

/// In-memory stand-in for the Cutting Job service, which §1 scopes outside
/// this core. Lets the engine and its tests run without standing up the
/// full order-management module.
#[derive(Default)]
pub struct InMemoryCuttingJobClient {
    jobs: std::sync::Mutex<std::collections::HashMap<Uuid, CuttingJob>>,
}

impl InMemoryCuttingJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: CuttingJob) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }
}

#[async_trait]
impl CuttingJobClient for InMemoryCuttingJobClient {
    async fn get_job_with_items(&self, job_id: Uuid) -> Result<CuttingJob, EngineError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or(EngineError::JobNotFound(job_id))
    }
}

/// In-memory stand-in for the Stock query service (§1, external collaborator).
#[derive(Default)]
pub struct InMemoryStockClient {
    stock: std::sync::Mutex<Vec<StockItem>>,
}

impl InMemoryStockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, stock: Vec<StockItem>) {
        *self.stock.lock().unwrap() = stock;
    }
}

#[async_trait]
impl StockClient for InMemoryStockClient {
    async fn get_available_stock(&self, query: StockQuery) -> Result<Vec<StockItem>, EngineError> {
        let all = self.stock.lock().unwrap();
        Ok(all
            .iter()
            .filter(|s| s.material_type_id == query.material_type_id)
            .filter(|s| (s.thickness - query.thickness).abs() < f64::EPSILON)
            .filter(|s| s.stock_type == query.stock_type)
            .filter(|s| match &query.selected_stock_ids {
                Some(ids) if !ids.is_empty() => ids.contains(&s.id),
                _ => true,
            })
            .cloned()
            .collect())
    }
}
