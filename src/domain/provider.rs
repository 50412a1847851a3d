use {
    super::error::BillingError,
    super::event::{EventEnvelope, SubscriptionPayload},
    super::id::{CustomerId, EventId, SubscriptionId},
    super::subscription::{self, BillingInterval, Plan, SubscriptionStatus},
    std::collections::HashMap,
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

/// Authoritative subscription state as read back from the provider. Also
/// constructed from the payload on creation events, where no prior local
/// state exists to protect.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    pub raw_status: String,
    pub plan: Plan,
    pub tier: String,
    pub interval: BillingInterval,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub canceled_at: Option<i64>,
    pub trial_end: Option<i64>,
    pub metadata: HashMap<String, String>,
}

impl ProviderSubscription {
    pub fn from_payload(payload: &SubscriptionPayload) -> Result<Self, BillingError> {
        Ok(Self {
            id: SubscriptionId::new(payload.id.clone())?,
            customer_id: CustomerId::new(payload.customer.clone())?,
            status: SubscriptionStatus::from_provider(&payload.status),
            raw_status: payload.status.clone(),
            plan: Plan::from_metadata(&payload.metadata),
            tier: subscription::detect_tier(payload),
            interval: subscription::detect_interval(payload),
            cancel_at_period_end: payload.cancel_at_period_end,
            current_period_start: payload.current_period_start,
            current_period_end: payload.current_period_end,
            canceled_at: payload.canceled_at,
            trial_end: payload.trial_end,
            metadata: payload.metadata.clone(),
        })
    }

    /// Owning user as stamped into the metadata at checkout.
    pub fn metadata_user_id(&self) -> Option<Uuid> {
        self.metadata
            .get("userId")
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Port for authoritative provider reads. Only reads: subscription
/// mutation never crosses this boundary, and state decisions on mutation
/// events go through a re-fetch instead of trusting payload order.
pub trait BillingProvider: Send + Sync {
    fn fetch_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderSubscription, BillingError>> + Send + '_>>;

    fn fetch_event(
        &self,
        id: &EventId,
    ) -> Pin<Box<dyn Future<Output = Result<EventEnvelope, BillingError>> + Send + '_>>;
}
