//! Logical schema (§6) for the entities the core persists: scenarios, plans,
//! and per-stock placement rows. Raw `CREATE TABLE IF NOT EXISTS` migrations
//! run at startup against `sqlx::AnyPool`, so the same statements work
//! against SQLite (tests, local dev) and Postgres (production).

use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS optimization_scenarios (
  id TEXT PRIMARY KEY,
  tenant_id TEXT,
  name TEXT NOT NULL,
  cutting_job_id TEXT NOT NULL,
  created_by_id TEXT NOT NULL,
  parameters TEXT NOT NULL,
  use_warehouse_stock BOOLEAN NOT NULL,
  use_standard_sizes BOOLEAN NOT NULL,
  selected_stock_ids TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS cutting_plans (
  id TEXT PRIMARY KEY,
  plan_number TEXT NOT NULL UNIQUE,
  scenario_id TEXT NOT NULL,
  total_waste DOUBLE PRECISION NOT NULL,
  waste_percentage DOUBLE PRECISION NOT NULL,
  stock_used_count INTEGER NOT NULL,
  estimated_time DOUBLE PRECISION,
  estimated_cost DOUBLE PRECISION,
  status TEXT NOT NULL,
  approved_by_id TEXT,
  approved_at TEXT,
  machine_id TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS cutting_plan_stocks (
  id TEXT PRIMARY KEY,
  cutting_plan_id TEXT NOT NULL,
  stock_item_id TEXT NOT NULL,
  sequence INTEGER NOT NULL,
  waste DOUBLE PRECISION NOT NULL,
  waste_percentage DOUBLE PRECISION NOT NULL,
  layout_data TEXT NOT NULL,
  UNIQUE(cutting_plan_id, sequence)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_scenarios_job ON optimization_scenarios(cutting_job_id);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_scenarios_tenant ON optimization_scenarios(tenant_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_plans_scenario ON cutting_plans(scenario_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_plan_stocks_plan ON cutting_plan_stocks(cutting_plan_id);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
