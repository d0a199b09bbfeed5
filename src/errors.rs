// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("invalid watch filter: {0}")]
    InvalidFilter(String),

    #[error("glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
