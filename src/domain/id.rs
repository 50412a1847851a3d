use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::BillingError;

/// Provider event identifier (`evt_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, BillingError> {
        let id = id.into();
        if !id.starts_with("evt_") {
            return Err(BillingError::Validation(format!(
                "EventId must start with evt_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Provider subscription identifier (`sub_xxx`). Doubles as the local
/// primary key; the owning user is an attribute, not the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Result<Self, BillingError> {
        let id = id.into();
        if !id.starts_with("sub_") {
            return Err(BillingError::Validation(format!(
                "SubscriptionId must start with sub_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Provider customer identifier (`cus_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Result<Self, BillingError> {
        let id = id.into();
        if !id.starts_with("cus_") {
            return Err(BillingError::Validation(format!(
                "CustomerId must start with cus_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
