pub mod customer;
pub mod identity_mapping;
pub mod payment;
pub mod plan;
pub mod subscription;
