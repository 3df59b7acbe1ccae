//! DagVault Consolidation Library
//!
//! This crate keeps a DAG-ledger wallet's unspent-output set compact. It
//! periodically merges the smallest outputs of the busiest addresses into a
//! single change output, and optionally splits a dominant large output back
//! into spendable chunks, all through narrow traits over an external ledger
//! service.
//!
//! # Modules
//!
//! - `types`: Core domain types and data structures
//! - `error`: Error taxonomy shared across the engine
//! - `ledger`: External collaborator traits (ledger, composer, broadcaster)
//! - `selection`: Output selection over the least-funded addresses
//! - `augment`: Fee-budget checking and single-round augmentation
//! - `assemble`: Consolidation unit assembly and broadcast
//! - `engine`: One-pass engine, wallet locks, and the drain loop
//! - `scheduler`: Periodic background scheduling
//! - `split`: Large-output splitting
//! - `events`: Event bus for observing engine activity
//! - `config`: Configuration management
//! - `logging`: Logging infrastructure
//! - `memory_ledger`: In-memory ledger for tests and examples
//!
//! # Concurrency
//!
//! All per-scope work is serialized through [`engine::WalletLocks`]; the
//! scheduler runs each scope on a plain background thread and the engine
//! holds the scope's lock for the duration of one pass.

/// Core domain types for the consolidation engine
pub mod types;

/// Error taxonomy shared across the engine
pub mod error;

/// External collaborator traits
pub mod ledger;

/// Output selection over the least-funded addresses
pub mod selection;

/// Fee-budget checking and single-round augmentation
pub mod augment;

/// Consolidation unit assembly and broadcast
pub mod assemble;

/// One-pass engine, wallet locks, and the drain loop
pub mod engine;

/// Periodic background scheduling
pub mod scheduler;

/// Large-output splitting
pub mod split;

/// Event bus for observing engine activity
pub mod events;

/// Configuration management
pub mod config;

/// Logging infrastructure
pub mod logging;

/// In-memory ledger for tests and examples
pub mod memory_ledger;

/// Re-export core domain types for convenience
pub use types::{
    is_valid_address, is_valid_unit, AddressFunding, CommissionRecipient, ComposeRequest,
    ConsolidationRequest, InputSpec, OutputSpec, SignedUnit, UnspentOutput, WalletScope,
    ADDRESS_LENGTH, UNIT_LENGTH,
};

/// Re-export the error taxonomy
pub use error::{ConsolidateError, ConsolidateResult, ErrorCategory};

/// Re-export the external collaborator traits
pub use ledger::{
    Broadcaster, ComposeError, Composer, Ledger, LedgerError, ProtocolConstants, Signer,
};

/// Re-export the engine surface
pub use engine::{
    ConsolidationEngine, DrainSummary, PassOutcome, WalletLocks, DEFAULT_MAX_PASSES_PER_TICK,
};

/// Re-export scheduling entry points
pub use scheduler::{schedule_consolidation, SchedulerHandle};

/// Re-export the splitting surface
pub use split::{schedule_splitting, should_split, OutputSplitter, DEFAULT_CHUNK_COUNT};

/// Re-export event types
pub use events::{ConsolidationEvent, ConsolidationEventBus};

/// Re-export configuration types
pub use config::{Config, ConsolidationConfig, SplitConfig};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::Once;

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Library initialization
///
/// Sets up logging with the default configuration. Safe to call multiple
/// times - it will only initialize once to prevent issues in tests and
/// concurrent environments.
pub fn init() -> Result<(), String> {
    let mut result = Ok(());
    INIT.call_once(|| {
        let config = logging::LogConfig::default();
        result = logging::init(&config).map_err(|e| format!("Failed to initialize logging: {}", e));
    });
    result
}

// No test modules declared here - integration tests are in the tests/ directory
