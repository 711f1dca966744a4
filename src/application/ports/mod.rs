pub mod billing_provider;
pub mod cache;
pub mod customer_directory;
pub mod plan_catalog;
