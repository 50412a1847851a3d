use {
    crate::domain::error::BillingError,
    crate::domain::event::{EventEnvelope, EventKind, InvoicePayload},
    crate::domain::id::SubscriptionId,
    crate::domain::notification::{NewNotification, NotificationKind, Priority},
    crate::domain::payment::{self, NewPaymentRecord},
    crate::domain::subscription::{SideEffect, SubscriptionStatus},
    crate::infra::postgres::{payment_repo, subscription_repo},
    crate::services::effects,
    crate::services::pipeline::Outcome,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

pub async fn process(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    match envelope.kind {
        EventKind::InvoicePaymentSucceeded => succeeded(pool, envelope).await,
        EventKind::InvoicePaymentFailed => failed(pool, envelope).await,
        EventKind::InvoicePaymentActionRequired => action_required(pool, envelope).await,
        EventKind::InvoiceUpcoming => upcoming(pool, envelope).await,
        EventKind::InvoiceFinalized => finalized(pool, envelope).await,
        _ => Ok(Outcome::Ignored),
    }
}

async fn succeeded(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let invoice = envelope.invoice()?;
    let paid_at = DateTime::from_timestamp(envelope.created, 0).unwrap_or_else(Utc::now);

    let record = NewPaymentRecord::succeeded(&invoice, paid_at);
    payment_repo::insert_payment_record(pool, &record).await?;

    let Some(subscription_id) = subscription_id_of(&invoice)? else {
        tracing::info!(invoice_id = ?invoice.id, "one-time payment recorded");
        return Ok(Outcome::Processed {
            detail: "one-time payment recorded".to_string(),
        });
    };

    // Recovery is a conditional update: it only fires while the row is
    // still past_due, so nothing regresses if a cancellation raced us.
    let recovered = subscription_repo::recover_if_past_due(pool, subscription_id.as_str()).await?;
    if recovered {
        tracing::info!(subscription_id = %subscription_id, "subscription recovered to active");
    }

    if let Some(user_id) = owner_of(pool, subscription_id.as_str()).await? {
        let amount = format_amount(record.amount, &record.currency);
        effects::execute(
            pool,
            vec![SideEffect::Notify(
                NewNotification::new(
                    user_id,
                    NotificationKind::PaymentSucceeded,
                    "Payment received",
                    format!("Your payment of {amount} was received. Thank you!"),
                )
                .with_data(serde_json::json!({
                    "subscription_id": subscription_id.as_str(),
                    "invoice_id": invoice.id,
                    "amount": record.amount,
                    "currency": record.currency,
                })),
            )],
        )
        .await;
    }

    Ok(Outcome::Processed {
        detail: if recovered {
            "payment recorded, subscription recovered".to_string()
        } else {
            "payment recorded".to_string()
        },
    })
}

/// Failure escalation: early attempts park the subscription in past_due
/// with a grace marker; the final attempt parks it terminal in unpaid.
/// Retry scheduling and dunning mail belong to the recovery service — the
/// status write and the notification row are the hand-off.
async fn failed(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let invoice = envelope.invoice()?;
    let attempts = invoice.attempt_count.unwrap_or(0);

    let record = NewPaymentRecord::failed(&invoice, None);
    payment_repo::insert_payment_record(pool, &record).await?;

    let Some(subscription_id) = subscription_id_of(&invoice)? else {
        tracing::info!(invoice_id = ?invoice.id, "one-time payment failure recorded");
        return Ok(Outcome::Processed {
            detail: "one-time payment failure recorded".to_string(),
        });
    };

    let next_status = payment::escalate_after_failure(attempts);
    let grace_until = if next_status == SubscriptionStatus::PastDue {
        invoice
            .next_payment_attempt
            .and_then(|s| DateTime::from_timestamp(s, 0))
    } else {
        None
    };

    let updated = subscription_repo::apply_payment_failure(
        pool,
        subscription_id.as_str(),
        next_status,
        grace_until,
    )
    .await?;
    if !updated {
        tracing::warn!(
            subscription_id = %subscription_id,
            "payment failure for unknown subscription"
        );
        return Ok(Outcome::Skipped {
            reason: "unknown subscription".to_string(),
        });
    }

    tracing::info!(
        subscription_id = %subscription_id,
        attempts,
        status = next_status.as_str(),
        "payment failure escalated"
    );

    if let Some(user_id) = owner_of(pool, subscription_id.as_str()).await? {
        let terminal = next_status == SubscriptionStatus::Unpaid;
        let (message, priority) = if terminal {
            (
                "We could not collect your payment after several attempts. Your subscription is on hold until the payment method is updated.".to_string(),
                Priority::High,
            )
        } else {
            let when = grace_until
                .map(|d| format!(" on {}", d.format("%B %e, %Y")))
                .unwrap_or_default();
            (
                format!("We could not collect your payment. We will retry automatically{when}."),
                Priority::Normal,
            )
        };
        effects::execute(
            pool,
            vec![SideEffect::Notify(
                NewNotification::new(
                    user_id,
                    NotificationKind::PaymentFailed,
                    "Payment failed",
                    message,
                )
                .with_data(serde_json::json!({
                    "subscription_id": subscription_id.as_str(),
                    "invoice_id": invoice.id,
                    "attempt_count": attempts,
                    "final": terminal,
                }))
                .with_priority(priority),
            )],
        )
        .await;
    }

    Ok(Outcome::Processed {
        detail: format!("payment failure recorded, status {next_status}"),
    })
}

/// The charge needs cardholder action (3DS and friends). No state change;
/// the user gets pointed at the provider's hosted page.
async fn action_required(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let invoice = envelope.invoice()?;

    let Some(subscription_id) = subscription_id_of(&invoice)? else {
        return Ok(Outcome::Skipped {
            reason: "payment action notice without subscription".to_string(),
        });
    };
    let Some(user_id) = owner_of(pool, subscription_id.as_str()).await? else {
        return Ok(Outcome::Skipped {
            reason: "no user on record".to_string(),
        });
    };

    effects::execute(
        pool,
        vec![SideEffect::Notify(
            NewNotification::new(
                user_id,
                NotificationKind::PaymentActionRequired,
                "Action needed to complete your payment",
                "Your bank asked for additional confirmation. Follow the link to finish the payment.",
            )
            .with_data(serde_json::json!({
                "subscription_id": subscription_id.as_str(),
                "invoice_id": invoice.id,
                "hosted_invoice_url": invoice.hosted_invoice_url,
            }))
            .with_priority(Priority::High),
        )],
    )
    .await;

    Ok(Outcome::Processed {
        detail: "payment action notice sent".to_string(),
    })
}

async fn upcoming(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let invoice = envelope.invoice()?;

    let Some(subscription_id) = subscription_id_of(&invoice)? else {
        return Ok(Outcome::Skipped {
            reason: "upcoming notice without subscription".to_string(),
        });
    };
    let Some(next_attempt) = invoice.next_payment_attempt else {
        return Ok(Outcome::Skipped {
            reason: "no charge date announced".to_string(),
        });
    };
    let Some(user_id) = owner_of(pool, subscription_id.as_str()).await? else {
        return Ok(Outcome::Skipped {
            reason: "no user on record".to_string(),
        });
    };

    let days = payment::days_until_charge(next_attempt, Utc::now().timestamp_millis());
    let amount = format_amount(
        invoice.amount_due,
        invoice.currency.as_deref().unwrap_or("usd"),
    );

    effects::execute(
        pool,
        vec![SideEffect::Notify(
            NewNotification::new(
                user_id,
                NotificationKind::UpcomingCharge,
                "Upcoming charge",
                format!("Your subscription renews in {days} day(s) for {amount}."),
            )
            .with_data(serde_json::json!({
                "subscription_id": subscription_id.as_str(),
                "days_until_charge": days,
                "amount_due": invoice.amount_due,
                "currency": invoice.currency,
            }))
            .with_priority(Priority::Low),
        )],
    )
    .await;

    Ok(Outcome::Processed {
        detail: "upcoming charge notice sent".to_string(),
    })
}

/// Amounts are immutable once the provider finalizes the invoice, so this
/// snapshot is safe to serve as a receipt.
async fn finalized(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let invoice = envelope.invoice()?;

    let Some(invoice_id) = invoice.id.as_deref() else {
        tracing::warn!("finalized invoice without id");
        return Ok(Outcome::Skipped {
            reason: "invoice without id".to_string(),
        });
    };

    let finalized_at = DateTime::from_timestamp(envelope.created, 0).unwrap_or_else(Utc::now);
    payment_repo::upsert_invoice_snapshot(pool, invoice_id, &invoice, finalized_at).await?;

    tracing::info!(invoice_id, "invoice snapshot stored");
    Ok(Outcome::Processed {
        detail: "invoice snapshot stored".to_string(),
    })
}

fn subscription_id_of(invoice: &InvoicePayload) -> Result<Option<SubscriptionId>, BillingError> {
    invoice
        .subscription
        .as_deref()
        .map(SubscriptionId::new)
        .transpose()
}

async fn owner_of(pool: &PgPool, subscription_id: &str) -> Result<Option<Uuid>, BillingError> {
    Ok(subscription_repo::get(pool, subscription_id)
        .await?
        .and_then(|sub| sub.user_id))
}

fn format_amount(cents: i64, currency: &str) -> String {
    format!(
        "{}.{:02} {}",
        cents / 100,
        (cents % 100).abs(),
        currency.to_uppercase()
    )
}
