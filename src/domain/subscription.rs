use {
    super::error::BillingError,
    super::event::{EventEnvelope, SubscriptionPayload},
    super::notification::{NewNotification, NotificationKind},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Internal subscription lifecycle states, mirroring the provider's
/// vocabulary one-to-one so the mapping stays stable under repeated
/// application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
        }
    }

    /// Total mapping over arbitrary provider strings. Unrecognized values
    /// land on `incomplete` so an unmapped status never grants access;
    /// call sites that care log the miss via the strict `TryFrom` first.
    pub fn from_provider(s: &str) -> Self {
        Self::try_from(s).unwrap_or(Self::Incomplete)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SubscriptionStatus {
    type Error = BillingError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "unpaid" => Ok(Self::Unpaid),
            "canceled" => Ok(Self::Canceled),
            "incomplete" => Ok(Self::Incomplete),
            "incomplete_expired" => Ok(Self::IncompleteExpired),
            "paused" => Ok(Self::Paused),
            other => Err(BillingError::Validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Individual,
    Family,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Family => "family",
        }
    }

    /// Plan selection rides in the subscription metadata set at checkout;
    /// anything other than an explicit "family" is an individual plan.
    pub fn from_metadata(metadata: &std::collections::HashMap<String, String>) -> Self {
        match metadata.get("plan").map(String::as_str) {
            Some("family") => Self::Family,
            _ => Self::Individual,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn from_provider(s: &str) -> Self {
        match s {
            "year" | "yearly" | "annual" => Self::Year,
            _ => Self::Month,
        }
    }
}

/// Which path last wrote the row. `reconcile` marks values adopted from an
/// authoritative provider re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Webhook,
    Reconcile,
    Manual,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Reconcile => "reconcile",
            Self::Manual => "manual",
        }
    }
}

/// Full subscription row (for reads). Status/plan columns stay strings at
/// this level; the CHECK constraints bound their values and
/// `SubscriptionStatus::from_provider` is total over them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: Option<Uuid>,
    pub customer_id: String,
    pub plan: String,
    pub tier: String,
    pub billing_interval: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub last_update_source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Work a transition decision wants done after the state write commits.
/// Planned by pure functions below, executed by the services layer;
/// execution failures are logged and never fail the event.
#[derive(Debug)]
pub enum SideEffect {
    Notify(NewNotification),
}

/// Days left on a trial, floored at one so "ends today" never reads as
/// zero days.
pub fn trial_days_remaining(trial_end: i64, now: i64) -> i64 {
    ((trial_end - now) / 86_400).max(1)
}

/// Decide which notifications an `updated` event earns, based on the
/// provider's previous-attributes diff and the reconciled row. Pure.
pub fn plan_update_effects(envelope: &EventEnvelope, current: &Subscription) -> Vec<SideEffect> {
    let mut effects = Vec::new();
    let Some(user_id) = current.user_id else {
        return effects;
    };

    if envelope.previous_has("cancel_at_period_end") {
        let was = envelope.previous_bool("cancel_at_period_end");
        if current.cancel_at_period_end && was == Some(false) {
            let ends = current
                .current_period_end
                .map(|d| d.format("%B %e, %Y").to_string())
                .unwrap_or_else(|| "the end of the current period".to_string());
            effects.push(SideEffect::Notify(
                NewNotification::new(
                    user_id,
                    NotificationKind::SubscriptionCancellationScheduled,
                    "Subscription cancellation scheduled",
                    format!("Your subscription will remain active until {ends}."),
                )
                .with_data(serde_json::json!({
                    "subscription_id": current.id,
                    "effective_at": current.current_period_end,
                })),
            ));
        } else if !current.cancel_at_period_end && was == Some(true) {
            effects.push(SideEffect::Notify(
                NewNotification::new(
                    user_id,
                    NotificationKind::SubscriptionCancellationReversed,
                    "Subscription cancellation reversed",
                    "Your subscription will continue to renew as usual.",
                )
                .with_data(serde_json::json!({ "subscription_id": current.id })),
            ));
        }
    }

    if envelope.previous_has("status") {
        let from = envelope.previous_str("status").unwrap_or("unknown");
        if from != current.status {
            effects.push(SideEffect::Notify(
                NewNotification::new(
                    user_id,
                    NotificationKind::SubscriptionStatusChanged,
                    "Subscription status changed",
                    format!("Your subscription is now {}.", current.status),
                )
                .with_data(serde_json::json!({
                    "subscription_id": current.id,
                    "from": from,
                    "to": current.status,
                })),
            ));
        }
    }

    if envelope.previous_has("items") {
        effects.push(SideEffect::Notify(
            NewNotification::new(
                user_id,
                NotificationKind::SubscriptionPlanChanged,
                "Plan changed",
                format!("Your subscription is now on the {} {} plan.", current.tier, current.plan),
            )
            .with_data(serde_json::json!({
                "subscription_id": current.id,
                "plan": current.plan,
                "tier": current.tier,
            })),
        ));
    }

    effects
}

pub fn plan_deleted_effects(current: &Subscription) -> Vec<SideEffect> {
    let Some(user_id) = current.user_id else {
        return Vec::new();
    };
    vec![SideEffect::Notify(
        NewNotification::new(
            user_id,
            NotificationKind::SubscriptionCanceled,
            "Subscription canceled",
            "Your subscription has ended.",
        )
        .with_data(serde_json::json!({
            "subscription_id": current.id,
            "canceled_at": current.canceled_at,
        })),
    )]
}

pub fn plan_trial_effects(current: &Subscription, now: i64) -> Vec<SideEffect> {
    let (Some(user_id), Some(trial_end)) = (current.user_id, current.trial_end) else {
        return Vec::new();
    };
    let days = trial_days_remaining(trial_end.timestamp(), now);
    vec![SideEffect::Notify(
        NewNotification::new(
            user_id,
            NotificationKind::TrialEnding,
            "Your trial is ending soon",
            format!("Your trial ends in {days} day(s). Add a payment method to keep access."),
        )
        .with_data(serde_json::json!({
            "subscription_id": current.id,
            "days_remaining": days,
            "trial_end": trial_end,
        })),
    )]
}

/// Tier label: explicit metadata wins, then the price nickname, then a
/// neutral default.
pub fn detect_tier(payload: &SubscriptionPayload) -> String {
    payload
        .metadata
        .get("tier")
        .cloned()
        .or_else(|| {
            payload
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .and_then(|price| price.nickname.clone())
        })
        .unwrap_or_else(|| "standard".to_string())
}

pub fn detect_interval(payload: &SubscriptionPayload) -> BillingInterval {
    payload
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .and_then(|price| price.recurring.as_ref())
        .map(|rec| BillingInterval::from_provider(&rec.interval))
        .unwrap_or(BillingInterval::Month)
}
