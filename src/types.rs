//! Core domain types for the consolidation engine
//!
//! This module defines the value types shared by the selection, augmentation
//! and assembly stages, plus the wire-facing structures handed to the
//! external composer.
//!
//! # Key Types
//!
//! - [`UnspentOutput`]: one spendable fragment of value on an address
//! - [`WalletScope`]: either a single concrete address or a whole wallet
//! - [`ConsolidationRequest`]: the immutable unit of work driving the engine
//! - [`ComposeRequest`] / [`SignedUnit`]: the composer's input and output
//!
//! # Identifier conventions
//!
//! Addresses are 32-character uppercase base32 strings; unit hashes are
//! 44-character base64 strings. Both are carried as plain `String`s and
//! validated with [`is_valid_address`] / [`is_valid_unit`] at the points
//! where external input enters the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConsolidateError;

/// Length of a ledger address (base32, uppercase).
pub const ADDRESS_LENGTH: usize = 32;

/// Length of a unit hash (base64 of a 256-bit hash).
pub const UNIT_LENGTH: usize = 44;

/// Base32 alphabet used for addresses (RFC 4648, no padding).
const ADDRESS_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Check whether a string is syntactically a valid ledger address.
///
/// # Examples
///
/// ```
/// use dagvault_consolidate::types::is_valid_address;
///
/// assert!(is_valid_address("A2WWHN7755YZVMXCBLMFWRSLKSZJN3FU"));
/// assert!(!is_valid_address("not-an-address"));
/// assert!(!is_valid_address("a2wwhn7755yzvmxcblmfwrslkszjn3fu")); // lowercase
/// ```
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LENGTH && address.chars().all(|c| ADDRESS_ALPHABET.contains(c))
}

/// Check whether a string is syntactically a valid unit hash.
pub fn is_valid_unit(unit: &str) -> bool {
    if unit.len() != UNIT_LENGTH {
        return false;
    }
    match base64::decode(unit) {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

/// Unspent transaction output representation
///
/// A fragment of value on the ledger not yet consumed by any transaction,
/// uniquely identified by its source unit plus message/output index.
///
/// Outputs are created by the external ledger when a unit confirms and are
/// read-only from this crate's perspective; spending happens in the ledger,
/// not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Address owning this output
    pub address: String,

    /// Hash of the unit that created this output
    pub unit: String,

    /// Index of the payment message within the unit
    pub message_index: u32,

    /// Index of the output within the payment message
    pub output_index: u32,

    /// Amount in the smallest denomination unit
    pub amount: u64,

    /// Asset identifier (None for the base asset)
    pub asset: Option<String>,
}

impl UnspentOutput {
    /// Create a new base-asset output.
    pub fn new(
        address: impl Into<String>,
        unit: impl Into<String>,
        message_index: u32,
        output_index: u32,
        amount: u64,
    ) -> Self {
        Self {
            address: address.into(),
            unit: unit.into(),
            message_index,
            output_index,
            amount,
            asset: None,
        }
    }

    /// Set the asset for this output.
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Whether this output carries the base asset.
    pub fn is_base_asset(&self) -> bool {
        self.asset.is_none()
    }

    /// Unique identifier for this output within the ledger.
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.unit, self.message_index, self.output_index)
    }
}

/// Reference to one spendable output, as the composer consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub unit: String,
    pub message_index: u32,
    pub output_index: u32,
}

impl From<&UnspentOutput> for InputSpec {
    fn from(output: &UnspentOutput) -> Self {
        Self {
            unit: output.unit.clone(),
            message_index: output.message_index,
            output_index: output.output_index,
        }
    }
}

/// One output of a composed unit.
///
/// A zero amount marks the change output; the composer fills in the actual
/// value (inputs minus fees) during byte-level construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub address: String,
    pub amount: u64,
}

/// Recipient of the earned headers commission of a composed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecipient {
    pub address: String,
    /// Share of the commission, in percent (all shares must sum to 100)
    pub share_percent: u8,
}

/// Wallet or address scope of a consolidation request
///
/// The engine either drains one concrete address or all addresses belonging
/// to a wallet. The scope doubles as the key of the per-wallet lock, so two
/// requests for the same scope are always serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletScope {
    /// A single concrete address
    Address(String),
    /// All addresses of the wallet with this identifier
    Wallet(String),
}

impl WalletScope {
    /// Interpret an identifier as a scope.
    ///
    /// Anything that parses as a valid address is treated as a concrete
    /// address; everything else is assumed to be a wallet identifier. This
    /// mirrors how the wallet configuration supplies the value.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        if is_valid_address(&id) {
            WalletScope::Address(id)
        } else {
            WalletScope::Wallet(id)
        }
    }

    /// The raw identifier behind this scope.
    pub fn id(&self) -> &str {
        match self {
            WalletScope::Address(a) => a,
            WalletScope::Wallet(w) => w,
        }
    }
}

impl fmt::Display for WalletScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletScope::Address(a) => write!(f, "address {}", a),
            WalletScope::Wallet(w) => write!(f, "wallet {}", w),
        }
    }
}

/// Ranking row produced when ordering a wallet's addresses by funding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFunding {
    pub address: String,
    /// Total confirmed, unspent balance on this address
    pub total: u64,
}

/// The unit of work passed into the engine
///
/// Constructed once at process start from configuration, immutable
/// thereafter, and reused by every scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationRequest {
    scope: WalletScope,
    target_max: u32,
}

impl ConsolidationRequest {
    /// Create a request, failing fast on a zero target.
    ///
    /// A zero or absent target disables consolidation entirely; reaching
    /// this constructor with one is a startup-time contract violation.
    pub fn new(scope: WalletScope, target_max: u32) -> Result<Self, ConsolidateError> {
        if target_max == 0 {
            return Err(ConsolidateError::Config(
                "max unspent outputs must be a positive integer".to_string(),
            ));
        }
        Ok(Self { scope, target_max })
    }

    pub fn scope(&self) -> &WalletScope {
        &self.scope
    }

    /// Target maximum number of unspent outputs for this scope.
    pub fn target_max(&self) -> u32 {
        self.target_max
    }
}

/// Everything the external composer needs to build one signed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRequest {
    /// Distinct addresses contributing inputs (each becomes an author)
    pub paying_addresses: Vec<String>,
    /// Inputs to consume, in selection order
    pub inputs: Vec<InputSpec>,
    /// Total amount carried by the inputs
    pub input_amount: u64,
    /// Outputs; exactly one zero-amount change output for consolidation
    pub outputs: Vec<OutputSpec>,
    /// Recipients of the earned headers commission
    pub commission_recipients: Vec<CommissionRecipient>,
    /// Asset being moved (None for the base asset)
    pub asset: Option<String>,
}

/// Signature of one author over a composed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSignature {
    pub address: String,
    pub signature: String,
}

/// A fully composed, signed unit ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUnit {
    /// Unit hash (44-character base64)
    pub unit: String,
    /// Authors, one per paying address
    pub authors: Vec<String>,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub commission_recipients: Vec<CommissionRecipient>,
    pub signatures: Vec<UnitSignature>,
}
