use {crate::domain::error::BillingError, crate::domain::notification::NewNotification, sqlx::PgPool};

pub async fn insert_notification(
    pool: &PgPool,
    notification: &NewNotification,
) -> Result<(), BillingError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, kind, title, message, data, priority)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(notification.id)
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.data)
    .bind(notification.priority.as_str())
    .execute(pool)
    .await?;

    Ok(())
}
