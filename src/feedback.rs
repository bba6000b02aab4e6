//! Feedback handler (§4.14): forwards realized production outcomes to the
//! ML advisory client so its models can learn from them.
//!
//! Thin orchestration: validate, delegate, return, no interpretation of
//! results. This handler does not persist anything itself — all
//! persistence of training data is out of scope for this core (§4.14) — it
//! only computes the errors to log and forwards the outcome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::ml_client::MlAdvisoryClient;
use crate::service_clients::PlanClient;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionCompleted {
    pub plan_id: Uuid,
    pub actual_waste: f64,
    pub actual_time_seconds: f64,
}

pub struct FeedbackHandler {
    plan_client: std::sync::Arc<dyn PlanClient>,
    ml_client: std::sync::Arc<MlAdvisoryClient>,
}

impl FeedbackHandler {
    pub fn new(
        plan_client: std::sync::Arc<dyn PlanClient>,
        ml_client: std::sync::Arc<MlAdvisoryClient>,
    ) -> Self {
        Self {
            plan_client,
            ml_client,
        }
    }

    /// The plan's own `wastePercentage`/`estimatedTime` (computed by the
    /// engine when the plan was created) stand in for the "predicted"
    /// values referenced by §4.14: this core keeps no separate prediction
    /// record, so the plan id itself is forwarded as the ML service's
    /// `predictionId`.
    #[tracing::instrument(skip(self, event), fields(plan_id = %event.plan_id))]
    pub async fn handle(&self, event: ProductionCompleted) -> Result<(), EngineError> {
        let plan = self.plan_client.get_by_id(event.plan_id).await?;

        let predicted_waste = plan.waste_percentage;
        let predicted_time = plan.estimated_time.unwrap_or(0.0);

        let waste_abs_error = (event.actual_waste - predicted_waste).abs();
        let waste_rel_error = if predicted_waste.abs() > f64::EPSILON {
            waste_abs_error / predicted_waste.abs()
        } else {
            0.0
        };

        let time_abs_error = (event.actual_time_seconds - predicted_time).abs();
        let time_rel_error = if predicted_time.abs() > f64::EPSILON {
            time_abs_error / predicted_time.abs()
        } else {
            0.0
        };

        tracing::info!(
            predicted_waste,
            actual_waste = event.actual_waste,
            waste_abs_error,
            waste_rel_error,
            predicted_time,
            actual_time = event.actual_time_seconds,
            time_abs_error,
            time_rel_error,
            "production outcome recorded"
        );

        self.ml_client
            .record_outcome(event.plan_id, event.actual_waste, event.actual_time_seconds)
            .await;

        Ok(())
    }
}
