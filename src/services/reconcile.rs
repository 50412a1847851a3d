use {
    crate::domain::error::BillingError,
    crate::domain::id::SubscriptionId,
    crate::domain::provider::BillingProvider,
    crate::domain::subscription::{Subscription, SubscriptionStatus, UpdateSource},
    crate::infra::postgres::{customer_repo, subscription_repo},
    sqlx::PgPool,
};

/// Re-fetch the authoritative subscription and adopt it locally. Every
/// mutation event goes through here before any decision is made, so
/// out-of-order and missed deliveries converge instead of corrupting the
/// row. Upserts: a subscription we have never seen gets created from the
/// provider's view.
#[tracing::instrument(name = "reconcile", skip_all, fields(subscription_id = %id))]
pub async fn sync_from_provider(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    id: &SubscriptionId,
) -> Result<Subscription, BillingError> {
    let fresh = provider.fetch_subscription(id).await?;

    if SubscriptionStatus::try_from(fresh.raw_status.as_str()).is_err() {
        tracing::warn!(status = %fresh.raw_status, "unrecognized provider status, mapped to incomplete");
    }

    // Keep an existing user linkage; resolve one for new rows from the
    // customer link first, then checkout metadata.
    let user_id = match customer_repo::find_user_by_customer(pool, fresh.customer_id.as_str()).await?
    {
        Some(uid) => Some(uid),
        None => fresh.metadata_user_id(),
    };

    let mut tx = subscription_repo::begin_locked(pool, id.as_str()).await?;
    let row =
        subscription_repo::upsert_from_provider(&mut tx, &fresh, user_id, UpdateSource::Reconcile)
            .await?;
    tx.commit().await?;

    tracing::info!(status = %row.status, "subscription reconciled");
    Ok(row)
}
