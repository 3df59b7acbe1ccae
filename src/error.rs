//! Standardized error handling for the consolidation engine
//!
//! This module defines the error hierarchy used throughout the crate. The
//! taxonomy follows the way a consolidation pass can fail:
//!
//! - configuration errors are startup-time contract violations and fail fast
//! - a missing augmentation input aborts one pass and is retried next tick
//! - composer errors abort one pass without automatic retry
//! - "not enough funds" at composition time means the fee accounting was
//!   violated upstream and is surfaced loudly instead of being retried
//!
//! None of these propagate through the scheduler: a failed tick must never
//! prevent future ticks from firing.

use thiserror::Error;

use crate::ledger::{ComposeError, LedgerError};

/// The main error type for the consolidation engine
#[derive(Debug, Error)]
pub enum ConsolidateError {
    /// Invalid configuration detected before any scheduling occurred
    #[error("configuration error: {0}")]
    Config(String),

    /// The external ledger failed to answer a query
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The external composer reported a generic failure
    #[error("composition failed: {0}")]
    Compose(String),

    /// The composer reported insufficient funds even though the fee budget
    /// was covered during augmentation. The engine's accounting no longer
    /// matches the ledger's; retrying blindly could loop forever.
    #[error("not enough funds to compose consolidation unit: {0}")]
    FundsInvariant(String),

    /// No qualifying large output exists to cover the fee shortfall
    #[error("no large input found")]
    NoLargeInput,

    /// Malformed wallet state outside this crate's responsibility
    /// (e.g. a wallet with zero addresses)
    #[error("wallet state error: {0}")]
    WalletState(String),
}

impl ConsolidateError {
    /// Whether this failure indicates corrupted assumptions rather than a
    /// condition that the next scheduled tick can reasonably resolve.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsolidateError::FundsInvariant(_)
                | ConsolidateError::WalletState(_)
                | ConsolidateError::Config(_)
        )
    }

    /// Error category for logging and metrics.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConsolidateError::Config(_) => ErrorCategory::Config,
            ConsolidateError::Ledger(_) => ErrorCategory::Ledger,
            ConsolidateError::Compose(_) => ErrorCategory::Compose,
            ConsolidateError::FundsInvariant(_) => ErrorCategory::FundsInvariant,
            ConsolidateError::NoLargeInput => ErrorCategory::Augmentation,
            ConsolidateError::WalletState(_) => ErrorCategory::WalletState,
        }
    }
}

impl From<ComposeError> for ConsolidateError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::NotEnoughFunds(msg) => ConsolidateError::FundsInvariant(msg),
            ComposeError::Other(msg) => ConsolidateError::Compose(msg),
        }
    }
}

/// Error category for logging and metrics purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Ledger,
    Compose,
    FundsInvariant,
    Augmentation,
    WalletState,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "Config",
            ErrorCategory::Ledger => "Ledger",
            ErrorCategory::Compose => "Compose",
            ErrorCategory::FundsInvariant => "FundsInvariant",
            ErrorCategory::Augmentation => "Augmentation",
            ErrorCategory::WalletState => "WalletState",
        }
    }
}

/// Create a new configuration error with context
pub fn config_error<S: Into<String>>(context: S) -> ConsolidateError {
    ConsolidateError::Config(context.into())
}

/// Create a new wallet-state error with context
pub fn wallet_state_error<S: Into<String>>(context: S) -> ConsolidateError {
    ConsolidateError::WalletState(context.into())
}

/// Type alias for a Result with ConsolidateError
pub type ConsolidateResult<T> = Result<T, ConsolidateError>;
