use {
    crate::domain::error::BillingError,
    crate::domain::event::{EventEnvelope, EventKind},
    crate::domain::id::SubscriptionId,
    crate::domain::provider::{BillingProvider, ProviderSubscription},
    crate::domain::subscription::{
        SubscriptionStatus, UpdateSource, plan_deleted_effects, plan_trial_effects,
        plan_update_effects,
    },
    crate::infra::postgres::{customer_repo, subscription_repo},
    crate::services::pipeline::Outcome,
    crate::services::{effects, reconcile},
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

pub async fn process(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    match envelope.kind {
        EventKind::SubscriptionCreated => created(pool, envelope).await,
        EventKind::SubscriptionUpdated => updated(pool, provider, envelope).await,
        EventKind::SubscriptionDeleted => deleted(pool, provider, envelope).await,
        EventKind::SubscriptionTrialWillEnd => trial_will_end(pool, envelope).await,
        EventKind::SubscriptionPaused => paused(pool, provider, envelope).await,
        EventKind::SubscriptionResumed => resumed(pool, provider, envelope).await,
        _ => Ok(Outcome::Ignored),
    }
}

/// Creation trusts the payload: there is no prior local state for an
/// out-of-order delivery to clobber, and the existence guard makes a
/// replayed creation a no-op.
async fn created(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;
    let fresh = ProviderSubscription::from_payload(&payload)?;

    if SubscriptionStatus::try_from(fresh.raw_status.as_str()).is_err() {
        tracing::warn!(
            subscription_id = %fresh.id,
            status = %fresh.raw_status,
            "unrecognized provider status, mapped to incomplete"
        );
    }

    let user_id = resolve_user(pool, &fresh).await?;
    let Some(user_id) = user_id else {
        tracing::warn!(
            subscription_id = %fresh.id,
            customer_id = %fresh.customer_id,
            "no internal user for new subscription"
        );
        return Ok(Outcome::Skipped {
            reason: "no internal user for customer".to_string(),
        });
    };

    let mut tx = subscription_repo::begin_locked(pool, fresh.id.as_str()).await?;
    let inserted =
        subscription_repo::insert_if_absent(&mut tx, &fresh, Some(user_id), UpdateSource::Webhook)
            .await?;
    tx.commit().await?;

    if !inserted {
        tracing::info!(subscription_id = %fresh.id, "subscription already exists");
        return Ok(Outcome::Skipped {
            reason: "subscription already exists".to_string(),
        });
    }

    tracing::info!(
        subscription_id = %fresh.id,
        user_id = %user_id,
        plan = fresh.plan.as_str(),
        status = fresh.status.as_str(),
        "subscription created"
    );
    Ok(Outcome::Processed {
        detail: "subscription created".to_string(),
    })
}

/// Update events only tell us *that* something changed. The provider is
/// re-fetched for *what* the state is now, and the payload diff only
/// drives notifications.
async fn updated(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;
    let id = SubscriptionId::new(payload.id.clone())?;

    let current = reconcile::sync_from_provider(pool, provider, &id).await?;

    let planned = plan_update_effects(envelope, &current);
    effects::execute(pool, planned).await;

    Ok(Outcome::Processed {
        detail: format!("subscription reconciled to {}", current.status),
    })
}

/// Deletion reconciles for the final field values, then forces the
/// terminal state locally and removes family members in the same
/// transaction.
async fn deleted(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;
    let id = SubscriptionId::new(payload.id.clone())?;

    reconcile::sync_from_provider(pool, provider, &id).await?;

    let canceled_at = payload
        .canceled_at
        .and_then(|s| DateTime::from_timestamp(s, 0));

    let mut tx = subscription_repo::begin_locked(pool, id.as_str()).await?;
    let row =
        subscription_repo::force_cancel(&mut tx, id.as_str(), canceled_at, UpdateSource::Webhook)
            .await?;
    let Some(row) = row else {
        tx.commit().await?;
        return Ok(Outcome::Skipped {
            reason: "unknown subscription".to_string(),
        });
    };
    let removed = subscription_repo::remove_active_family_members(
        &mut tx,
        id.as_str(),
        "system:webhook",
        "subscription_canceled",
    )
    .await?;
    tx.commit().await?;

    if !removed.is_empty() {
        tracing::info!(
            subscription_id = %id,
            count = removed.len(),
            "family members removed with subscription"
        );
    }
    tracing::info!(subscription_id = %id, "subscription canceled");

    effects::execute(pool, plan_deleted_effects(&row)).await;

    Ok(Outcome::Processed {
        detail: "subscription canceled".to_string(),
    })
}

/// Advisory only — no state change, just the heads-up notification.
async fn trial_will_end(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;

    let Some(current) = subscription_repo::get(pool, &payload.id).await? else {
        tracing::warn!(subscription_id = %payload.id, "trial notice for unknown subscription");
        return Ok(Outcome::Skipped {
            reason: "unknown subscription".to_string(),
        });
    };

    let planned = plan_trial_effects(&current, Utc::now().timestamp());
    if planned.is_empty() {
        return Ok(Outcome::Skipped {
            reason: "no user or trial end on record".to_string(),
        });
    }
    effects::execute(pool, planned).await;

    Ok(Outcome::Processed {
        detail: "trial ending notice sent".to_string(),
    })
}

async fn paused(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;
    let id = SubscriptionId::new(payload.id.clone())?;

    reconcile::sync_from_provider(pool, provider, &id).await?;

    // The pause event is authoritative for the status even if the re-fetch
    // raced a fresher value.
    let mut tx = subscription_repo::begin_locked(pool, id.as_str()).await?;
    subscription_repo::force_status(
        &mut tx,
        id.as_str(),
        SubscriptionStatus::Paused,
        UpdateSource::Webhook,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(subscription_id = %id, "subscription paused");
    Ok(Outcome::Processed {
        detail: "subscription paused".to_string(),
    })
}

async fn resumed(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let payload = envelope.subscription()?;
    let id = SubscriptionId::new(payload.id.clone())?;

    // The provider already reports the post-resume status; adopting it is
    // the whole job.
    let current = reconcile::sync_from_provider(pool, provider, &id).await?;

    tracing::info!(subscription_id = %id, status = %current.status, "subscription resumed");
    Ok(Outcome::Processed {
        detail: format!("subscription resumed to {}", current.status),
    })
}

pub async fn process_checkout(
    pool: &PgPool,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    match envelope.kind {
        EventKind::CheckoutCompleted => checkout_completed(pool, envelope).await,
        EventKind::CheckoutExpired => {
            let session = envelope.checkout_session()?;
            tracing::info!(session_id = %session.id, "checkout session expired");
            Ok(Outcome::Processed {
                detail: "checkout expiry logged".to_string(),
            })
        }
        _ => Ok(Outcome::Ignored),
    }
}

/// Checkout completion is an acknowledgment, not a state transition — the
/// subscription events carry those. What it does own is staging any
/// family invitations named in the session metadata.
async fn checkout_completed(
    pool: &PgPool,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let session = envelope.checkout_session()?;

    if session.mode.as_deref() != Some("subscription") {
        tracing::info!(
            session_id = %session.id,
            amount_total = ?session.amount_total,
            "one-time checkout completed"
        );
        return Ok(Outcome::Processed {
            detail: "one-time checkout logged".to_string(),
        });
    }

    let Some(subscription_id) = session.subscription.as_deref() else {
        tracing::warn!(session_id = %session.id, "subscription checkout without subscription id");
        return Ok(Outcome::Skipped {
            reason: "session carries no subscription id".to_string(),
        });
    };

    let mut staged = 0usize;
    if let Some(invites) = session.metadata.get("family_invites") {
        for raw in invites.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match Uuid::parse_str(raw) {
                Ok(member) => {
                    if subscription_repo::stage_family_invite(pool, subscription_id, member).await?
                    {
                        staged += 1;
                    }
                }
                Err(_) => {
                    tracing::warn!(session_id = %session.id, value = raw, "family invite is not a user id");
                }
            }
        }
    }

    tracing::info!(
        session_id = %session.id,
        subscription_id = subscription_id,
        staged_invites = staged,
        "subscription checkout completed"
    );
    Ok(Outcome::Processed {
        detail: "checkout acknowledged".to_string(),
    })
}

/// Stored customer linkage wins; checkout metadata is the fallback for
/// customers created moments ago whose `customer.*` event hasn't landed.
async fn resolve_user(
    pool: &PgPool,
    fresh: &ProviderSubscription,
) -> Result<Option<Uuid>, BillingError> {
    if let Some(user_id) =
        customer_repo::find_user_by_customer(pool, fresh.customer_id.as_str()).await?
    {
        return Ok(Some(user_id));
    }
    Ok(fresh.metadata_user_id())
}
