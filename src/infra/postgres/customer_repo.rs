use {
    crate::domain::error::BillingError, crate::domain::event::PaymentMethodPayload, sqlx::PgPool,
    uuid::Uuid,
};

pub async fn find_user_by_customer(
    pool: &PgPool,
    customer_id: &str,
) -> Result<Option<Uuid>, BillingError> {
    let user_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;
    Ok(user_id)
}

pub async fn find_user_email(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<String>, BillingError> {
    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(email)
}

/// Attach the provider customer linkage to a user row. The default payment
/// method only moves forward — an event without one leaves the stored
/// value alone.
pub async fn link_customer(
    pool: &PgPool,
    user_id: Uuid,
    customer_id: &str,
    default_payment_method: Option<&str>,
) -> Result<bool, BillingError> {
    let res = sqlx::query(
        r#"
        UPDATE users
        SET customer_id = $2,
            default_payment_method = COALESCE($3, default_payment_method),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(customer_id)
    .bind(default_payment_method)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

/// Provider-side customer deletion: clear the linkage wherever it points.
pub async fn unlink_customer(pool: &PgPool, customer_id: &str) -> Result<u64, BillingError> {
    let res = sqlx::query(
        r#"
        UPDATE users
        SET customer_id = NULL, default_payment_method = NULL, updated_at = now()
        WHERE customer_id = $1
        "#,
    )
    .bind(customer_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

/// Display data only — number and cryptographic material never leave the
/// provider. Serves both attach and update events.
pub async fn upsert_payment_method(
    pool: &PgPool,
    method: &PaymentMethodPayload,
) -> Result<(), BillingError> {
    let card = method.card.as_ref();
    sqlx::query(
        r#"
        INSERT INTO payment_methods (id, customer_id, brand, last4, exp_month, exp_year)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET
            customer_id = EXCLUDED.customer_id,
            brand = EXCLUDED.brand,
            last4 = EXCLUDED.last4,
            exp_month = EXCLUDED.exp_month,
            exp_year = EXCLUDED.exp_year,
            updated_at = now()
        "#,
    )
    .bind(&method.id)
    .bind(method.customer.as_deref().unwrap_or(""))
    .bind(card.and_then(|c| c.brand.as_deref()))
    .bind(card.and_then(|c| c.last4.as_deref()))
    .bind(card.and_then(|c| c.exp_month.map(|m| m as i32)))
    .bind(card.and_then(|c| c.exp_year.map(|y| y as i32)))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_payment_method(pool: &PgPool, id: &str) -> Result<bool, BillingError> {
    let res = sqlx::query("DELETE FROM payment_methods WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}
