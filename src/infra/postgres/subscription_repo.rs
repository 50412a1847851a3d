use {
    crate::domain::error::BillingError,
    crate::domain::provider::ProviderSubscription,
    crate::domain::subscription::{Subscription, SubscriptionStatus, UpdateSource},
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

fn ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Begin a mutation transaction serialized per subscription id.
/// Advisory lock works even when the row doesn't exist yet — no gap lock
/// issue, no insert race, no retry needed.
pub async fn begin_locked<'a>(
    pool: &'a PgPool,
    subscription_id: &str,
) -> Result<Transaction<'a, Postgres>, BillingError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(subscription_id)
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<Subscription>, BillingError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        SELECT id, user_id, customer_id, plan, tier, billing_interval, status,
               cancel_at_period_end, current_period_start, current_period_end,
               trial_end, canceled_at, grace_until, last_update_source,
               created_at, updated_at
        FROM subscriptions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
) -> Result<Option<Subscription>, BillingError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        SELECT id, user_id, customer_id, plan, tier, billing_interval, status,
               cancel_at_period_end, current_period_start, current_period_end,
               trial_end, canceled_at, grace_until, last_update_source,
               created_at, updated_at
        FROM subscriptions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Creation guard. Returns false when the row already existed, which makes
/// replayed creation events a no-op instead of an error.
pub async fn insert_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    fresh: &ProviderSubscription,
    user_id: Option<Uuid>,
    source: UpdateSource,
) -> Result<bool, BillingError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO subscriptions
            (id, user_id, customer_id, plan, tier, billing_interval, status,
             cancel_at_period_end, current_period_start, current_period_end,
             trial_end, canceled_at, last_update_source)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(fresh.id.as_str())
    .bind(user_id)
    .bind(fresh.customer_id.as_str())
    .bind(fresh.plan.as_str())
    .bind(&fresh.tier)
    .bind(fresh.interval.as_str())
    .bind(fresh.status.as_str())
    .bind(fresh.cancel_at_period_end)
    .bind(ts(fresh.current_period_start))
    .bind(ts(fresh.current_period_end))
    .bind(ts(fresh.trial_end))
    .bind(ts(fresh.canceled_at))
    .bind(source.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(inserted.is_some())
}

/// Adopt the provider's view wholesale. An existing user linkage is kept
/// (the provider doesn't know our user ids); everything else is overwritten.
pub async fn upsert_from_provider(
    tx: &mut Transaction<'_, Postgres>,
    fresh: &ProviderSubscription,
    user_id: Option<Uuid>,
    source: UpdateSource,
) -> Result<Subscription, BillingError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions
            (id, user_id, customer_id, plan, tier, billing_interval, status,
             cancel_at_period_end, current_period_start, current_period_end,
             trial_end, canceled_at, last_update_source)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO UPDATE SET
            user_id = COALESCE(subscriptions.user_id, EXCLUDED.user_id),
            customer_id = EXCLUDED.customer_id,
            plan = EXCLUDED.plan,
            tier = EXCLUDED.tier,
            billing_interval = EXCLUDED.billing_interval,
            status = EXCLUDED.status,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            trial_end = EXCLUDED.trial_end,
            canceled_at = EXCLUDED.canceled_at,
            last_update_source = EXCLUDED.last_update_source,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(fresh.id.as_str())
    .bind(user_id)
    .bind(fresh.customer_id.as_str())
    .bind(fresh.plan.as_str())
    .bind(&fresh.tier)
    .bind(fresh.interval.as_str())
    .bind(fresh.status.as_str())
    .bind(fresh.cancel_at_period_end)
    .bind(ts(fresh.current_period_start))
    .bind(ts(fresh.current_period_end))
    .bind(ts(fresh.trial_end))
    .bind(ts(fresh.canceled_at))
    .bind(source.as_str())
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

/// Terminal write for deletion events. Deletion is authoritative even when
/// the re-fetch raced something fresher, so this always lands on canceled.
pub async fn force_cancel(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    canceled_at: Option<DateTime<Utc>>,
    source: UpdateSource,
) -> Result<Option<Subscription>, BillingError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = 'canceled',
            canceled_at = COALESCE($2, canceled_at, now()),
            grace_until = NULL,
            last_update_source = $3,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(canceled_at)
    .bind(source.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

pub async fn force_status(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    status: SubscriptionStatus,
    source: UpdateSource,
) -> Result<Option<Subscription>, BillingError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = $2, last_update_source = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(source.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Atomic recovery after a successful payment: fires only while the row is
/// still past_due, so a racing cancellation or escalation wins.
pub async fn recover_if_past_due(pool: &PgPool, id: &str) -> Result<bool, BillingError> {
    let res = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'active', grace_until = NULL,
            last_update_source = 'webhook', updated_at = now()
        WHERE id = $1 AND status = 'past_due'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn apply_payment_failure(
    pool: &PgPool,
    id: &str,
    status: SubscriptionStatus,
    grace_until: Option<DateTime<Utc>>,
) -> Result<bool, BillingError> {
    let res = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = $2, grace_until = $3,
            last_update_source = 'webhook', updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(grace_until)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

/// Stage a family-member invitation ahead of (or after) subscription
/// creation. Idempotent per (subscription, user).
pub async fn stage_family_invite(
    pool: &PgPool,
    subscription_id: &str,
    user_id: Uuid,
) -> Result<bool, BillingError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO family_members (subscription_id, user_id, status)
        VALUES ($1, $2, 'invited')
        ON CONFLICT (subscription_id, user_id) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(subscription_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(inserted.is_some())
}

/// Cascade for subscription deletion. Runs inside the same transaction as
/// the terminal status write; returns the removed member ids.
pub async fn remove_active_family_members(
    tx: &mut Transaction<'_, Postgres>,
    subscription_id: &str,
    removed_by: &str,
    reason: &str,
) -> Result<Vec<Uuid>, BillingError> {
    let removed = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE family_members
        SET status = 'removed', removed_at = now(), removed_by = $2, removed_reason = $3
        WHERE subscription_id = $1 AND status = 'active'
        RETURNING user_id
        "#,
    )
    .bind(subscription_id)
    .bind(removed_by)
    .bind(reason)
    .fetch_all(&mut **tx)
    .await?;

    Ok(removed)
}
