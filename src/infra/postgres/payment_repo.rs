use {
    crate::domain::error::BillingError,
    crate::domain::event::InvoicePayload,
    crate::domain::payment::NewPaymentRecord,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

fn ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Append one attempt to the payment history. Never updates: the event
/// ledger suppresses duplicate deliveries, and distinct attempts for one
/// invoice are distinct rows by design.
pub async fn insert_payment_record(
    pool: &PgPool,
    record: &NewPaymentRecord,
) -> Result<Uuid, BillingError> {
    sqlx::query(
        r#"
        INSERT INTO payment_records
            (id, invoice_id, subscription_id, customer_id, amount, currency,
             status, failure_reason, attempt_count, paid_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(record.id)
    .bind(record.invoice_id.as_deref())
    .bind(record.subscription_id.as_deref())
    .bind(record.customer_id.as_deref())
    .bind(record.amount)
    .bind(&record.currency)
    .bind(record.status.as_str())
    .bind(record.failure_reason.as_deref())
    .bind(record.attempt_count)
    .bind(record.paid_at)
    .execute(pool)
    .await?;

    Ok(record.id)
}

/// Receipt read-model, refreshed on invoice.finalized. Amounts are
/// immutable once finalized on the provider side, so a repeat upsert is
/// harmless.
pub async fn upsert_invoice_snapshot(
    pool: &PgPool,
    invoice_id: &str,
    invoice: &InvoicePayload,
    finalized_at: DateTime<Utc>,
) -> Result<(), BillingError> {
    sqlx::query(
        r#"
        INSERT INTO invoice_snapshots
            (invoice_id, subscription_id, customer_id, status, amount_due,
             amount_paid, currency, hosted_invoice_url, invoice_pdf,
             period_start, period_end, finalized_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (invoice_id) DO UPDATE SET
            subscription_id = EXCLUDED.subscription_id,
            customer_id = EXCLUDED.customer_id,
            status = EXCLUDED.status,
            amount_due = EXCLUDED.amount_due,
            amount_paid = EXCLUDED.amount_paid,
            currency = EXCLUDED.currency,
            hosted_invoice_url = EXCLUDED.hosted_invoice_url,
            invoice_pdf = EXCLUDED.invoice_pdf,
            period_start = EXCLUDED.period_start,
            period_end = EXCLUDED.period_end,
            updated_at = now()
        "#,
    )
    .bind(invoice_id)
    .bind(invoice.subscription.as_deref())
    .bind(invoice.customer.as_deref())
    .bind(invoice.status.as_deref())
    .bind(invoice.amount_due)
    .bind(invoice.amount_paid)
    .bind(invoice.currency.as_deref().unwrap_or("usd"))
    .bind(invoice.hosted_invoice_url.as_deref())
    .bind(invoice.invoice_pdf.as_deref())
    .bind(ts(invoice.period_start))
    .bind(ts(invoice.period_end))
    .bind(finalized_at)
    .execute(pool)
    .await?;

    Ok(())
}
