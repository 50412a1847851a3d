use {
    crate::domain::error::BillingError,
    crate::domain::event::EventEnvelope,
    crate::domain::id::EventId,
    crate::domain::provider::BillingProvider,
    crate::infra::postgres::event_ledger::{self, ClaimOutcome},
    crate::services::router,
    sqlx::PgPool,
};

/// Terminal pipeline result for one delivered event. Everything except
/// `InFlight` is acknowledged to the provider; `Failed` relies on manual
/// replay rather than redelivery.
#[derive(Debug)]
pub enum Outcome {
    /// Routed and applied (state writes and/or side effects done).
    Processed { detail: String },
    /// Recognized but deliberately not acted on (catalog sync, unknown type).
    Ignored,
    /// The ledger holds a terminal row for this event id already.
    Duplicate,
    /// Routed, but nothing applied (no linkage, one-time purchase, ...).
    Skipped { reason: String },
    /// Processor error, captured and recorded on the ledger.
    Failed { error: String },
    /// Another invocation holds a fresh claim on this event id.
    InFlight,
}

impl Outcome {
    pub fn label(&self) -> String {
        match self {
            Self::Processed { detail } => detail.clone(),
            Self::Ignored => "ignored".to_string(),
            Self::Duplicate => "duplicate".to_string(),
            Self::Skipped { reason } => format!("skipped: {reason}"),
            Self::Failed { error } => format!("failed: {error}"),
            Self::InFlight => "in_flight".to_string(),
        }
    }
}

/// Run one verified, parsed event through the ledger and the router.
/// Exactly one claimant processes a given event id; the rest observe
/// `Duplicate` or `InFlight`.
pub async fn process_event(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
    stale_after_secs: i64,
) -> Result<Outcome, BillingError> {
    match event_ledger::claim(pool, envelope, stale_after_secs).await? {
        ClaimOutcome::Duplicate => {
            tracing::info!(event_id = %envelope.id, "duplicate delivery suppressed");
            return Ok(Outcome::Duplicate);
        }
        ClaimOutcome::InFlight => {
            tracing::info!(event_id = %envelope.id, "event already in flight elsewhere");
            return Ok(Outcome::InFlight);
        }
        ClaimOutcome::Claimed => {}
    }

    route_and_record(pool, provider, envelope).await
}

/// Manual recovery: re-fetch the event from the provider by id and run it
/// through the pipeline again, prior terminal outcome notwithstanding.
pub async fn replay_event(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    event_id: &EventId,
    stale_after_secs: i64,
) -> Result<Outcome, BillingError> {
    let envelope = provider.fetch_event(event_id).await?;

    match event_ledger::claim_for_replay(pool, &envelope, stale_after_secs).await? {
        ClaimOutcome::InFlight => Ok(Outcome::InFlight),
        ClaimOutcome::Duplicate => Ok(Outcome::Duplicate),
        ClaimOutcome::Claimed => {
            tracing::info!(event_id = %envelope.id, event_type = envelope.kind.as_str(), "replaying event");
            route_and_record(pool, provider, &envelope).await
        }
    }
}

/// Dispatch to the processors and settle the ledger row. Processor errors
/// become a structured `Failed` outcome here — they never propagate to the
/// HTTP layer, which would turn one poison event into a redelivery storm.
async fn route_and_record(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    match router::route(pool, provider, envelope).await {
        Ok(outcome) => {
            event_ledger::mark_processed(pool, &envelope.id, &outcome.label()).await?;
            Ok(outcome)
        }
        Err(err) => {
            tracing::error!(
                event_id = %envelope.id,
                event_type = envelope.kind.as_str(),
                error = %err,
                "processor failed, event acknowledged for manual replay"
            );
            event_ledger::mark_failed(pool, &envelope.id, &err.to_string()).await?;
            Ok(Outcome::Failed {
                error: err.to_string(),
            })
        }
    }
}
