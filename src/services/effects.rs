use {
    crate::domain::subscription::SideEffect, crate::infra::postgres::notification_repo,
    sqlx::PgPool,
};

/// Execute planned side effects after the state write has committed.
/// Best-effort: a failed notification is logged and dropped, never bubbled
/// into the event result.
pub async fn execute(pool: &PgPool, effects: Vec<SideEffect>) {
    for effect in effects {
        match effect {
            SideEffect::Notify(notification) => {
                if let Err(err) = notification_repo::insert_notification(pool, &notification).await
                {
                    tracing::warn!(
                        kind = notification.kind.as_str(),
                        user_id = %notification.user_id,
                        error = %err,
                        "notification insert failed"
                    );
                }
            }
        }
    }
}
