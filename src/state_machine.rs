//! Scenario and Plan lifecycle state machines (§4.9).
//!
//! Pure validation functions: given a current status and a requested target,
//! either approve silently or reject with `EngineError::InvalidStatusTransition`.
//! No module outside the repository layer is permitted to write a status
//! column without going through one of these.

use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{PlanStatus, ScenarioStatus};

fn status_name(s: ScenarioStatus) -> &'static str {
    match s {
        ScenarioStatus::Pending => "PENDING",
        ScenarioStatus::Running => "RUNNING",
        ScenarioStatus::Completed => "COMPLETED",
        ScenarioStatus::Failed => "FAILED",
    }
}

fn plan_status_name(s: PlanStatus) -> &'static str {
    match s {
        PlanStatus::Draft => "DRAFT",
        PlanStatus::Approved => "APPROVED",
        PlanStatus::InProduction => "IN_PRODUCTION",
        PlanStatus::Completed => "COMPLETED",
        PlanStatus::Cancelled => "CANCELLED",
    }
}

/// PENDING -> RUNNING -> COMPLETED | FAILED; FAILED -> PENDING (retry).
pub fn validate_scenario_transition(
    scenario_id: Uuid,
    from: ScenarioStatus,
    to: ScenarioStatus,
) -> Result<(), EngineError> {
    use ScenarioStatus::*;
    let allowed = matches!(
        (from, to),
        (Pending, Running) | (Running, Completed) | (Running, Failed) | (Failed, Pending)
    );
    if allowed {
        Ok(())
    } else {
        Err(EngineError::InvalidStatusTransition {
            entity: "OptimizationScenario",
            id: scenario_id,
            from: status_name(from).to_string(),
            to: status_name(to).to_string(),
        })
    }
}

/// DRAFT -> APPROVED | CANCELLED; APPROVED -> IN_PRODUCTION | CANCELLED;
/// IN_PRODUCTION -> COMPLETED | CANCELLED.
pub fn validate_plan_transition(
    plan_id: Uuid,
    from: PlanStatus,
    to: PlanStatus,
) -> Result<(), EngineError> {
    use PlanStatus::*;
    let allowed = matches!(
        (from, to),
        (Draft, Approved)
            | (Draft, Cancelled)
            | (Approved, InProduction)
            | (Approved, Cancelled)
            | (InProduction, Completed)
            | (InProduction, Cancelled)
    );
    if allowed {
        Ok(())
    } else {
        Err(EngineError::InvalidStatusTransition {
            entity: "CuttingPlan",
            id: plan_id,
            from: plan_status_name(from).to_string(),
            to: plan_status_name(to).to_string(),
        })
    }
}

/// Requires a scenario to currently be in one of `expected`, used by the
/// engine before it starts running an optimization.
pub fn require_scenario_status(
    scenario_id: Uuid,
    actual: ScenarioStatus,
    expected: &[ScenarioStatus],
) -> Result<(), EngineError> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(EngineError::InvalidStatus {
            entity: "OptimizationScenario",
            id: scenario_id,
            expected: expected.iter().map(|s| status_name(*s)).collect::<Vec<_>>().join("|"),
            actual: status_name(actual).to_string(),
        })
    }
}

/// Requires a plan to currently be in one of `expected`. Used ahead of
/// `validate_plan_transition` for operations — like approval — that the
/// spec treats as an `INVALID_STATUS` rejection ("approving a non-DRAFT
/// plan") rather than a generic illegal-transition error.
pub fn require_plan_status(
    plan_id: Uuid,
    actual: PlanStatus,
    expected: &[PlanStatus],
) -> Result<(), EngineError> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(EngineError::InvalidStatus {
            entity: "CuttingPlan",
            id: plan_id,
            expected: expected.iter().map(|s| plan_status_name(*s)).collect::<Vec<_>>().join("|"),
            actual: plan_status_name(actual).to_string(),
        })
    }
}
