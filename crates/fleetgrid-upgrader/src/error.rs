//! Upgrader error types.

use thiserror::Error;

/// Errors that can occur while scheduling upgrades or changing upgrade knobs.
#[derive(Debug, Error)]
pub enum UpgraderError {
    #[error("upgrades per minute must be a finite number >= 0, got {0}")]
    InvalidRate(f64),

    #[error("state store error: {0}")]
    State(#[from] fleetgrid_state::StateError),

    #[error("fleet collaborator error: {0}")]
    Fleet(String),
}

pub type UpgraderResult<T> = Result<T, UpgraderError>;
