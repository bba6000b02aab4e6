//! Async consumer's lifecycle events and the in-process pub-sub emitter
//! (§4.13).
//!
//! The `mpsc` channel handoff used for the consumer's message loop
//! generalizes naturally from a 1:1 channel to a 1:N fan-out here.
//! `tokio::sync::broadcast` is the natural `tokio`-ecosystem analogue for
//! that shape and ships in the `sync` feature already enabled — no new
//! dependency.

use uuid::Uuid;

#[derive(Clone, Debug)]
pub enum OptimizationEvent {
    Started {
        scenario_id: Uuid,
        correlation_id: String,
    },
    Progress {
        scenario_id: Uuid,
        percent: u8,
        message: String,
    },
    Completed {
        scenario_id: Uuid,
        plan_id: Uuid,
        plan_number: String,
        total_waste: f64,
        waste_percentage: f64,
        stock_used_count: u32,
    },
    Failed {
        scenario_id: Uuid,
        /// Machine code from `EngineError::code()` (§7: errors carry a
        /// machine code and a human message). A cancelled or timed-out run
        /// reports `"CANCELLED"` here per §5.
        code: &'static str,
        error: String,
    },
    PlanStatusUpdated {
        plan_id: Uuid,
        old_status: String,
        new_status: String,
        correlation_id: Option<String>,
    },
}

/// Best-effort fan-out within the process. A slow or absent subscriber never
/// blocks the consumer: `broadcast::Sender::send` only fails when there are
/// no receivers, which the emitter treats as a no-op, not an error (§4.13:
/// "failures to publish do not abort the engine").
#[derive(Clone)]
pub struct EventEmitter {
    tx: tokio::sync::broadcast::Sender<OptimizationEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OptimizationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: OptimizationEvent) {
        // Ignore "no receivers" errors; a websocket/telemetry subscriber may
        // simply not be attached yet.
        let _ = self.tx.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}
