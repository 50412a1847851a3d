pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

use crate::{adapters::signature::SignatureVerifier, domain::provider::BillingProvider};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub verifier: Arc<SignatureVerifier>,
    pub provider: Arc<dyn BillingProvider>,
    pub max_event_age_secs: i64,
    pub ledger_stale_secs: i64,
}
