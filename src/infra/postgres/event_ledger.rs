use {
    crate::domain::error::BillingError, crate::domain::event::EventEnvelope,
    crate::domain::id::EventId, sqlx::PgPool,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This invocation owns the event and must mark it terminal.
    Claimed,
    /// A terminal ledger row exists — the event was already handled.
    Duplicate,
    /// Another invocation holds a fresh processing claim.
    InFlight,
}

async fn do_claim(
    pool: &PgPool,
    envelope: &EventEnvelope,
    stale_after_secs: i64,
    reclaim_terminal: bool,
) -> Result<ClaimOutcome, BillingError> {
    // Reclaim conditions differ between live ingestion (only stuck claims)
    // and manual replay (anything not freshly in flight).
    let sql = if reclaim_terminal {
        r#"
        INSERT INTO webhook_events (event_id, event_type, livemode, provider_ts, status, started_at)
        VALUES ($1, $2, $3, $4, 'processing', now())
        ON CONFLICT (event_id) DO UPDATE SET
            status = 'processing', started_at = now(),
            outcome = NULL, error = NULL, finished_at = NULL
        WHERE webhook_events.status <> 'processing'
           OR webhook_events.started_at < now() - make_interval(secs => $5)
        RETURNING event_id
        "#
    } else {
        r#"
        INSERT INTO webhook_events (event_id, event_type, livemode, provider_ts, status, started_at)
        VALUES ($1, $2, $3, $4, 'processing', now())
        ON CONFLICT (event_id) DO UPDATE SET
            status = 'processing', started_at = now(),
            outcome = NULL, error = NULL, finished_at = NULL
        WHERE webhook_events.status = 'processing'
          AND webhook_events.started_at < now() - make_interval(secs => $5)
        RETURNING event_id
        "#
    };

    let claimed = sqlx::query_scalar::<_, String>(sql)
        .bind(envelope.id.as_str())
        .bind(envelope.kind.as_str())
        .bind(envelope.livemode)
        .bind(envelope.created)
        .bind(stale_after_secs as f64)
        .fetch_optional(pool)
        .await?;

    if claimed.is_some() {
        return Ok(ClaimOutcome::Claimed);
    }

    let status =
        sqlx::query_scalar::<_, String>("SELECT status FROM webhook_events WHERE event_id = $1")
            .bind(envelope.id.as_str())
            .fetch_optional(pool)
            .await?;

    match status.as_deref() {
        Some("processing") => Ok(ClaimOutcome::InFlight),
        _ => Ok(ClaimOutcome::Duplicate),
    }
}

/// Atomically claim an event id for processing. A terminal row wins
/// (duplicate delivery), a fresh in-flight claim wins (concurrent
/// delivery), a stuck claim is taken over.
pub async fn claim(
    pool: &PgPool,
    envelope: &EventEnvelope,
    stale_after_secs: i64,
) -> Result<ClaimOutcome, BillingError> {
    do_claim(pool, envelope, stale_after_secs, false).await
}

/// Claim for manual replay: prior terminal outcomes do not block.
pub async fn claim_for_replay(
    pool: &PgPool,
    envelope: &EventEnvelope,
    stale_after_secs: i64,
) -> Result<ClaimOutcome, BillingError> {
    do_claim(pool, envelope, stale_after_secs, true).await
}

pub async fn mark_processed(
    pool: &PgPool,
    event_id: &EventId,
    outcome: &str,
) -> Result<(), BillingError> {
    sqlx::query(
        r#"
        UPDATE webhook_events
        SET status = 'processed', outcome = $2, finished_at = now()
        WHERE event_id = $1
        "#,
    )
    .bind(event_id.as_str())
    .bind(outcome)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    event_id: &EventId,
    error: &str,
) -> Result<(), BillingError> {
    sqlx::query(
        r#"
        UPDATE webhook_events
        SET status = 'failed', error = $2, finished_at = now()
        WHERE event_id = $1
        "#,
    )
    .bind(event_id.as_str())
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bounded retention: drop terminal entries older than the window. The
/// window only needs to exceed the provider's redelivery horizon.
pub async fn prune(pool: &PgPool, retention_days: i32) -> Result<u64, BillingError> {
    let res = sqlx::query(
        r#"
        DELETE FROM webhook_events
        WHERE status <> 'processing'
          AND finished_at < now() - make_interval(days => $1)
        "#,
    )
    .bind(retention_days)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}
