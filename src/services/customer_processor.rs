use {
    crate::domain::error::BillingError,
    crate::domain::event::{EventEnvelope, EventKind, PaymentMethodPayload},
    crate::domain::id::CustomerId,
    crate::domain::notification::{NewNotification, NotificationKind},
    crate::domain::subscription::SideEffect,
    crate::infra::postgres::customer_repo,
    crate::services::effects,
    crate::services::pipeline::Outcome,
    sqlx::PgPool,
    uuid::Uuid,
};

pub async fn process(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    match envelope.kind {
        EventKind::CustomerCreated | EventKind::CustomerUpdated => link(pool, envelope).await,
        EventKind::CustomerDeleted => unlink(pool, envelope).await,
        _ => Ok(Outcome::Ignored),
    }
}

/// Attach the provider customer to the app user named in its metadata.
/// Events for customers created outside the app carry no mapping and are
/// acknowledged without a write.
async fn link(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let customer = envelope.customer()?;
    let customer_id = CustomerId::new(&customer.id)?;

    let Some(user_id) = customer
        .metadata
        .get("userId")
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        return Ok(Outcome::Skipped {
            reason: "no user mapping in customer metadata".to_string(),
        });
    };

    let stored_email = customer_repo::find_user_email(pool, user_id).await?;
    if let (Some(payload), Some(stored)) = (customer.email.as_deref(), stored_email.as_deref()) {
        if !payload.eq_ignore_ascii_case(stored) {
            tracing::warn!(
                %user_id,
                customer_id = %customer_id,
                "customer email does not match the user on record"
            );
        }
    }

    let default_payment_method = customer
        .invoice_settings
        .as_ref()
        .and_then(|s| s.default_payment_method.as_deref());

    let linked =
        customer_repo::link_customer(pool, user_id, customer_id.as_str(), default_payment_method)
            .await?;
    if !linked {
        tracing::warn!(%user_id, "customer metadata names a user that does not exist");
        return Ok(Outcome::Skipped {
            reason: "unknown user".to_string(),
        });
    }

    tracing::info!(%user_id, customer_id = %customer_id, "customer linked");
    Ok(Outcome::Processed {
        detail: "customer linked".to_string(),
    })
}

async fn unlink(pool: &PgPool, envelope: &EventEnvelope) -> Result<Outcome, BillingError> {
    let customer = envelope.customer()?;
    let customer_id = CustomerId::new(&customer.id)?;

    let cleared = customer_repo::unlink_customer(pool, customer_id.as_str()).await?;
    if cleared == 0 {
        return Ok(Outcome::Skipped {
            reason: "customer not linked to any user".to_string(),
        });
    }

    tracing::info!(customer_id = %customer_id, cleared, "customer unlinked");
    Ok(Outcome::Processed {
        detail: format!("customer unlinked from {cleared} user(s)"),
    })
}

pub async fn process_payment_method(
    pool: &PgPool,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    let method = envelope.payment_method()?;
    match envelope.kind {
        EventKind::PaymentMethodAttached => {
            customer_repo::upsert_payment_method(pool, &method).await?;
            notify_attached(pool, &method).await?;
            Ok(Outcome::Processed {
                detail: "payment method stored".to_string(),
            })
        }
        EventKind::PaymentMethodUpdated => {
            customer_repo::upsert_payment_method(pool, &method).await?;
            Ok(Outcome::Processed {
                detail: "payment method updated".to_string(),
            })
        }
        EventKind::PaymentMethodDetached => {
            // Detached events carry no customer reference, so the delete
            // keys on the method id alone.
            let deleted = customer_repo::delete_payment_method(pool, &method.id).await?;
            if deleted {
                Ok(Outcome::Processed {
                    detail: "payment method removed".to_string(),
                })
            } else {
                Ok(Outcome::Skipped {
                    reason: "payment method not on record".to_string(),
                })
            }
        }
        _ => Ok(Outcome::Ignored),
    }
}

async fn notify_attached(
    pool: &PgPool,
    method: &PaymentMethodPayload,
) -> Result<(), BillingError> {
    let Some(customer) = method.customer.as_deref() else {
        return Ok(());
    };
    let Some(user_id) = customer_repo::find_user_by_customer(pool, customer).await? else {
        return Ok(());
    };

    let card = method.card.as_ref();
    let label = match (
        card.and_then(|c| c.brand.as_deref()),
        card.and_then(|c| c.last4.as_deref()),
    ) {
        (Some(brand), Some(last4)) => format!("{brand} card ending in {last4}"),
        (None, Some(last4)) => format!("card ending in {last4}"),
        _ => "payment method".to_string(),
    };

    effects::execute(
        pool,
        vec![SideEffect::Notify(
            NewNotification::new(
                user_id,
                NotificationKind::PaymentMethodAttached,
                "Payment method added",
                format!("Your {label} was added to your account."),
            )
            .with_data(serde_json::json!({
                "payment_method_id": method.id,
                "brand": card.and_then(|c| c.brand.clone()),
                "last4": card.and_then(|c| c.last4.clone()),
            })),
        )],
    )
    .await;

    Ok(())
}
