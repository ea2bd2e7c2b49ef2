#![forbid(unsafe_code)]

pub mod artifact;
pub mod common;
pub mod payment;
pub mod secret_ids;
pub mod tone;

pub use common::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};
