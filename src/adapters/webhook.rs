use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::BillingError, event::EventEnvelope, id::EventId},
        services::pipeline::{self, Outcome},
    },
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    chrono::Utc,
};

/// Webhook ingress. Anything that passes signature and shape checks is
/// acknowledged with 200 whatever happens inside the processors; only a
/// live concurrent claim answers 503 so the provider redelivers later.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn ingress_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let sig = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(BillingError::SignatureMissing)?;

    state
        .verifier
        .verify(body.as_bytes(), sig, Utc::now().timestamp())
        .map_err(|e| {
            tracing::warn!(error = %e, "rejected webhook delivery");
            e
        })?;

    let envelope = EventEnvelope::parse(body.as_bytes())?;

    // Add event context to the span so all subsequent logs are correlated.
    tracing::Span::current()
        .record("event_id", tracing::field::display(&envelope.id))
        .record("event_type", tracing::field::display(envelope.kind.as_str()));

    let lag_secs = Utc::now().timestamp() - envelope.created;
    if lag_secs > state.max_event_age_secs {
        tracing::warn!(lag_secs, "delivery is older than the expected redelivery horizon");
    }

    let outcome = pipeline::process_event(
        &state.pool,
        &*state.provider,
        &envelope,
        state.ledger_stale_secs,
    )
    .await?;

    tracing::info!(outcome = %outcome.label(), "event settled");
    Ok(respond(&outcome, false))
}

/// Operator-triggered replay by provider event id. The event body is
/// re-fetched from the provider, never taken from the caller.
#[tracing::instrument(name = "replay", skip_all, fields(event_id = tracing::field::Empty))]
pub async fn replay_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let event_id = EventId::new(raw_id)?;
    tracing::Span::current().record("event_id", tracing::field::display(&event_id));

    let outcome = pipeline::replay_event(
        &state.pool,
        &*state.provider,
        &event_id,
        state.ledger_stale_secs,
    )
    .await?;

    tracing::info!(outcome = %outcome.label(), "replay settled");
    Ok(respond(&outcome, true))
}

fn respond(outcome: &Outcome, include_detail: bool) -> Response {
    let status = match outcome {
        Outcome::Processed { .. } => "processed",
        Outcome::Ignored => "ignored",
        Outcome::Duplicate => "duplicate",
        Outcome::Skipped { .. } => "skipped",
        Outcome::Failed { .. } => "failed",
        Outcome::InFlight => "in_flight",
    };

    let body = if include_detail {
        serde_json::json!({"status": status, "outcome": outcome.label()})
    } else {
        serde_json::json!({"status": status})
    };

    match outcome {
        Outcome::InFlight => (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response(),
        _ => Json(body).into_response(),
    }
}
