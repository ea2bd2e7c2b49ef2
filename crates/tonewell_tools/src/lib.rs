#![forbid(unsafe_code)]

pub mod render;
pub mod vault_cli;
