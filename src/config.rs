#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Strategy defaults
    // =========================
    /// Default blade width (mm) applied when a scenario omits `kerf`.
    pub default_kerf_mm: f64,

    /// Default usable-waste threshold for 1D runs (mm), below which an
    /// offcut is counted as scrap rather than reusable.
    pub default_min_usable_waste_1d_mm: f64,

    /// Default usable-waste threshold for 2D runs (mm^2).
    pub default_min_usable_waste_2d_mm2: f64,

    // =========================
    // Worker pool configuration
    // =========================
    /// Number of bounded CPU workers executing packing tasks off the
    /// request path. Defaults to the logical core count.
    pub worker_pool_size: usize,

    /// Per-task timeout. A task exceeding this is reported as CANCELLED
    /// rather than left to run unbounded (§5: timeouts are translated to
    /// cancellation).
    pub worker_task_timeout_ms: u64,

    /// Capacity of the channel feeding the worker pool.
    ///
    /// Purpose:
    /// - bound memory under bursts of concurrent optimization requests
    /// - provide natural backpressure to callers
    pub worker_queue_capacity: usize,

    /// Timeout applied to each Cutting Job / Stock service-client call
    /// (§1: external collaborators this core does not own).
    pub service_client_timeout_ms: u64,

    // =========================
    // Circuit breaker defaults (ML advisory client)
    // =========================
    pub breaker_timeout_ms: u64,
    pub breaker_error_threshold_pct: f64,
    pub breaker_volume_threshold: u32,
    pub breaker_reset_timeout_ms: u64,

    /// Base URL of the ML advisory service.
    pub ml_service_url: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://cutting_engine_dev.db".to_string());

        let ml_service_url =
            std::env::var("ML_SERVICE_URL").unwrap_or_else(|_| "http://localhost:9100".to_string());

        let worker_pool_size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            database_url,

            default_kerf_mm: 3.0,
            default_min_usable_waste_1d_mm: 50.0,
            default_min_usable_waste_2d_mm2: 10_000.0,

            worker_pool_size,
            worker_task_timeout_ms: 30_000,
            worker_queue_capacity: 256,
            service_client_timeout_ms: 5_000,

            breaker_timeout_ms: 10_000,
            breaker_error_threshold_pct: 50.0,
            breaker_volume_threshold: 5,
            breaker_reset_timeout_ms: 10_000,

            ml_service_url,
        }
    }
}
