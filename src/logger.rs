use std::time::Duration;
use tracing::{Span, field};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.pretty())
            .init();
    }
}

pub fn root_span(name: &'static str, correlation_id: &str) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        correlation_id = %correlation_id,
        scenario_id = field::Empty,
        plan_id = field::Empty
    )
}

pub fn annotate_span(scenario_id: Option<&uuid::Uuid>, plan_id: Option<&uuid::Uuid>) {
    let span = Span::current();
    if let Some(sid) = scenario_id {
        span.record("scenario_id", field::display(sid));
    }
    if let Some(pid) = plan_id {
        span.record("plan_id", field::display(pid));
    }
}

/// Wraps a future, logging a `performance` warning if it exceeds `max`.
///
/// Used around service-client calls, worker-pool submissions, and ML
/// advisory calls so slow upstreams show up in logs without changing
/// control flow.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
