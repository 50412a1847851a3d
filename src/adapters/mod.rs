pub mod api_errors;
pub mod signature;
pub mod stripe;
pub mod webhook;
