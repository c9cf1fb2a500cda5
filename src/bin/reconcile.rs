use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use clinic_core::clock::SystemClock;
use clinic_core::config::Config;
use clinic_core::{Reconciler, db};

/// One-shot reconciliation sweep. The web layer runs the same entry point at
/// process startup; this binary exists for cron and for operators.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let summary = Reconciler::new(pool, Arc::new(SystemClock)).run().await;

    tracing::info!(
        appointments_completed = summary.appointments_completed,
        appointments_missed = summary.appointments_missed,
        exams_cancelled = summary.exams_cancelled,
        operations_cancelled = summary.operations_cancelled,
        "sweep finished"
    );
    for err in &summary.errors {
        tracing::warn!("{err}");
    }
    Ok(())
}
