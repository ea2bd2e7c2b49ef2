#![forbid(unsafe_code)]

pub mod catalog;
pub mod download_token;
pub mod payment_gateway;
pub mod secret_vault;
pub mod synth;
pub mod tone_tool;
