pub mod checkout;
pub mod identity;
pub mod payment_record;
pub mod status_resolver;
pub mod subscription_sync;
pub mod webhook;
