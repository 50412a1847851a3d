pub mod customer_repo;
pub mod event_ledger;
pub mod notification_repo;
pub mod payment_repo;
pub mod subscription_repo;
