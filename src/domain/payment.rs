use {
    super::event::InvoicePayload,
    super::subscription::SubscriptionStatus,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Failed attempts allowed before the provider gives up on an invoice and
/// the subscription is parked terminal.
pub const MAX_PAYMENT_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status a subscription lands on after a failed payment attempt. The
/// final retry parks it on `unpaid`; earlier attempts keep it recoverable
/// in `past_due`.
pub fn escalate_after_failure(attempt_count: i64) -> SubscriptionStatus {
    if attempt_count >= MAX_PAYMENT_ATTEMPTS {
        SubscriptionStatus::Unpaid
    } else {
        SubscriptionStatus::PastDue
    }
}

/// Whole days until the provider's next charge, rounding partial days up.
/// Past timestamps clamp to zero rather than going negative.
pub fn days_until_charge(next_attempt_unix: i64, now_ms: i64) -> i64 {
    let diff_ms = next_attempt_unix * 1000 - now_ms;
    if diff_ms <= 0 {
        0
    } else {
        (diff_ms + 86_399_999) / 86_400_000
    }
}

/// For INSERT into the append-only payment history. One row per attempt;
/// duplicate deliveries are suppressed upstream by the event ledger.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub invoice_id: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub attempt_count: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl NewPaymentRecord {
    pub fn succeeded(invoice: &InvoicePayload, paid_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            invoice_id: invoice.id.clone(),
            subscription_id: invoice.subscription.clone(),
            customer_id: invoice.customer.clone(),
            amount: invoice.amount_paid,
            currency: invoice.currency.clone().unwrap_or_else(|| "usd".to_string()),
            status: PaymentStatus::Succeeded,
            failure_reason: None,
            attempt_count: invoice.attempt_count,
            paid_at: Some(paid_at),
        }
    }

    pub fn failed(invoice: &InvoicePayload, reason: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            invoice_id: invoice.id.clone(),
            subscription_id: invoice.subscription.clone(),
            customer_id: invoice.customer.clone(),
            amount: invoice.amount_due,
            currency: invoice.currency.clone().unwrap_or_else(|| "usd".to_string()),
            status: PaymentStatus::Failed,
            failure_reason: reason,
            attempt_count: invoice.attempt_count,
            paid_at: None,
        }
    }
}
