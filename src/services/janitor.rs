use {crate::infra::postgres::event_ledger, sqlx::PgPool, tokio::sync::watch};

/// Hourly sweep that drops settled ledger rows older than the retention
/// window. Rows inside the window stay so replays and audits can see them.
pub async fn run_janitor(pool: PgPool, retention_days: i32, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(retention_days, "event ledger janitor started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("event ledger janitor shutting down");
                return;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(3600)) => {}
        }

        match event_ledger::prune(&pool, retention_days).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "pruned settled ledger rows"),
            Err(e) => tracing::error!(error = %e, "janitor error"),
        }
    }
}
