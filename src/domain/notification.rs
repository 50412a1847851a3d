use {serde::Serialize, uuid::Uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TrialEnding,
    PaymentSucceeded,
    PaymentFailed,
    PaymentActionRequired,
    UpcomingCharge,
    SubscriptionStatusChanged,
    SubscriptionCancellationScheduled,
    SubscriptionCancellationReversed,
    SubscriptionPlanChanged,
    SubscriptionCanceled,
    PaymentMethodAttached,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrialEnding => "trial_ending",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentActionRequired => "payment_action_required",
            Self::UpcomingCharge => "upcoming_charge",
            Self::SubscriptionStatusChanged => "subscription_status_changed",
            Self::SubscriptionCancellationScheduled => "subscription_cancellation_scheduled",
            Self::SubscriptionCancellationReversed => "subscription_cancellation_reversed",
            Self::SubscriptionPlanChanged => "subscription_plan_changed",
            Self::SubscriptionCanceled => "subscription_canceled",
            Self::PaymentMethodAttached => "payment_method_attached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// For INSERT into the notification outbox. Delivery (email, push) is the
/// notification service's concern; this row is the hand-off.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub priority: Priority,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            data: serde_json::json!({}),
            priority: Priority::Normal,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
