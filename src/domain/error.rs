use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("webhook signature header missing")]
    SignatureMissing,

    #[error("webhook signature: {0}")]
    SignatureInvalid(String),

    #[error("malformed event body: {0}")]
    MalformedBody(String),

    #[error("provider: {0}")]
    Provider(String),
}
