pub mod customer_processor;
pub mod effects;
pub mod janitor;
pub mod payment_processor;
pub mod pipeline;
pub mod reconcile;
pub mod router;
pub mod subscription_processor;
