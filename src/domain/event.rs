use std::collections::HashMap;

use serde::Deserialize;

use super::{error::BillingError, id::EventId};

/// Provider event taxonomy. Wire strings follow the Stripe dotted
/// convention; anything outside the handled set parses to `Unknown` so the
/// ingress can acknowledge without acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    SubscriptionTrialWillEnd,
    SubscriptionPaused,
    SubscriptionResumed,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    InvoicePaymentActionRequired,
    InvoiceUpcoming,
    InvoiceFinalized,
    CustomerCreated,
    CustomerUpdated,
    CustomerDeleted,
    PaymentMethodAttached,
    PaymentMethodDetached,
    PaymentMethodUpdated,
    CheckoutCompleted,
    CheckoutExpired,
    ProductCreated,
    ProductUpdated,
    PriceCreated,
    PriceUpdated,
    Unknown(String),
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "customer.subscription.trial_will_end" => Self::SubscriptionTrialWillEnd,
            "customer.subscription.paused" => Self::SubscriptionPaused,
            "customer.subscription.resumed" => Self::SubscriptionResumed,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "invoice.payment_action_required" => Self::InvoicePaymentActionRequired,
            "invoice.upcoming" => Self::InvoiceUpcoming,
            "invoice.finalized" => Self::InvoiceFinalized,
            "customer.created" => Self::CustomerCreated,
            "customer.updated" => Self::CustomerUpdated,
            "customer.deleted" => Self::CustomerDeleted,
            "payment_method.attached" => Self::PaymentMethodAttached,
            "payment_method.detached" => Self::PaymentMethodDetached,
            "payment_method.updated" => Self::PaymentMethodUpdated,
            "checkout.session.completed" => Self::CheckoutCompleted,
            "checkout.session.expired" => Self::CheckoutExpired,
            "product.created" => Self::ProductCreated,
            "product.updated" => Self::ProductUpdated,
            "price.created" => Self::PriceCreated,
            "price.updated" => Self::PriceUpdated,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::SubscriptionTrialWillEnd => "customer.subscription.trial_will_end",
            Self::SubscriptionPaused => "customer.subscription.paused",
            Self::SubscriptionResumed => "customer.subscription.resumed",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::InvoicePaymentActionRequired => "invoice.payment_action_required",
            Self::InvoiceUpcoming => "invoice.upcoming",
            Self::InvoiceFinalized => "invoice.finalized",
            Self::CustomerCreated => "customer.created",
            Self::CustomerUpdated => "customer.updated",
            Self::CustomerDeleted => "customer.deleted",
            Self::PaymentMethodAttached => "payment_method.attached",
            Self::PaymentMethodDetached => "payment_method.detached",
            Self::PaymentMethodUpdated => "payment_method.updated",
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::CheckoutExpired => "checkout.session.expired",
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::PriceCreated => "price.created",
            Self::PriceUpdated => "price.updated",
            Self::Unknown(s) => s,
        }
    }

    /// Routing family. The router matches on this exhaustively; adding a
    /// kind without a category arm is a compile error.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::SubscriptionCreated
            | Self::SubscriptionUpdated
            | Self::SubscriptionDeleted
            | Self::SubscriptionTrialWillEnd
            | Self::SubscriptionPaused
            | Self::SubscriptionResumed => EventCategory::Subscription,
            Self::InvoicePaymentSucceeded
            | Self::InvoicePaymentFailed
            | Self::InvoicePaymentActionRequired
            | Self::InvoiceUpcoming
            | Self::InvoiceFinalized => EventCategory::Payment,
            Self::CustomerCreated | Self::CustomerUpdated | Self::CustomerDeleted => {
                EventCategory::Customer
            }
            Self::PaymentMethodAttached
            | Self::PaymentMethodDetached
            | Self::PaymentMethodUpdated => EventCategory::PaymentMethod,
            Self::CheckoutCompleted | Self::CheckoutExpired => EventCategory::Checkout,
            Self::ProductCreated | Self::ProductUpdated | Self::PriceCreated
            | Self::PriceUpdated => EventCategory::Catalog,
            Self::Unknown(_) => EventCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Subscription,
    Payment,
    Customer,
    PaymentMethod,
    Checkout,
    Catalog,
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    #[serde(default)]
    livemode: bool,
    data: WireEventData,
}

#[derive(Debug, Deserialize)]
struct WireEventData {
    object: serde_json::Value,
    #[serde(default)]
    previous_attributes: Option<serde_json::Value>,
}

/// Parsed webhook envelope. The payload stays an untyped `Value` until a
/// processor asks for its typed view, so unknown event shapes never fail
/// at the ingress.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: EventId,
    pub kind: EventKind,
    pub created: i64,
    pub livemode: bool,
    pub object: serde_json::Value,
    pub previous_attributes: Option<serde_json::Value>,
}

impl EventEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self, BillingError> {
        let wire: WireEvent = serde_json::from_slice(raw)
            .map_err(|e| BillingError::MalformedBody(e.to_string()))?;
        Ok(Self {
            id: EventId::new(wire.id)?,
            kind: EventKind::from(wire.event_type.as_str()),
            created: wire.created,
            livemode: wire.livemode,
            object: wire.data.object,
            previous_attributes: wire.data.previous_attributes,
        })
    }

    pub fn subscription(&self) -> Result<SubscriptionPayload, BillingError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedBody(format!("subscription payload: {e}")))
    }

    pub fn invoice(&self) -> Result<InvoicePayload, BillingError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedBody(format!("invoice payload: {e}")))
    }

    pub fn customer(&self) -> Result<CustomerPayload, BillingError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedBody(format!("customer payload: {e}")))
    }

    pub fn checkout_session(&self) -> Result<CheckoutSessionPayload, BillingError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedBody(format!("checkout payload: {e}")))
    }

    pub fn payment_method(&self) -> Result<PaymentMethodPayload, BillingError> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedBody(format!("payment_method payload: {e}")))
    }

    /// True when the provider reported the attribute as changed by this
    /// event.
    pub fn previous_has(&self, key: &str) -> bool {
        self.previous_attributes
            .as_ref()
            .is_some_and(|prev| prev.get(key).is_some())
    }

    pub fn previous_bool(&self, key: &str) -> Option<bool> {
        self.previous_attributes
            .as_ref()
            .and_then(|prev| prev.get(key))
            .and_then(serde_json::Value::as_bool)
    }

    pub fn previous_str(&self, key: &str) -> Option<&str> {
        self.previous_attributes
            .as_ref()
            .and_then(|prev| prev.get(key))
            .and_then(serde_json::Value::as_str)
    }
}

/// Subscription object as delivered in webhook payloads. Timestamps are
/// raw provider epochs; conversion happens at the store boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPayload {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub canceled_at: Option<i64>,
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Option<PricePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricePayload {
    pub id: String,
    pub nickname: Option<String>,
    pub recurring: Option<RecurringPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringPayload {
    pub interval: String,
}

/// Invoice object. `id` is absent on `invoice.upcoming` previews.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePayload {
    pub id: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: Option<String>,
    pub attempt_count: Option<i64>,
    pub next_payment_attempt: Option<i64>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    pub billing_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerPayload {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub invoice_settings: Option<InvoiceSettingsPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSettingsPayload {
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionPayload {
    pub id: String,
    pub mode: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub amount_total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodPayload {
    pub id: String,
    pub customer: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub card: Option<CardPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardPayload {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i64>,
    pub exp_year: Option<i64>,
}
