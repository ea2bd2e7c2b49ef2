#![forbid(unsafe_code)]

pub mod artifact_store;
pub mod asset_dir;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not a file in the scratch directory")]
    OutsideScratch(std::path::PathBuf),
    #[error("no async runtime available for expiry timers")]
    NoRuntime,
}
