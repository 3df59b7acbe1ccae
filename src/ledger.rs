//! External ledger collaborator traits
//!
//! The engine never touches storage, serialization, signing or networking
//! itself; everything hard is delegated to an external ledger service. This
//! module captures the narrow contract the engine consumes from it:
//!
//! - [`Ledger`]: read-only queries over the wallet's unspent outputs
//! - [`Composer`]: byte-level unit construction, fee computation and signing
//! - [`Broadcaster`]: fire-and-forget network announcement
//! - [`Signer`]: opaque signing capability passed through to the composer
//!
//! All methods are synchronous from the caller's perspective; the ledger's
//! own query and network timeouts apply underneath.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AddressFunding, ComposeRequest, OutputSpec, SignedUnit, UnspentOutput, WalletScope};

/// Byte-size and capacity constants of the external wire format
///
/// The per-unit byte costs model the serialized size contribution of one
/// transfer-input structure and one author/signature structure. They belong
/// to the external protocol and can drift with it, so they are supplied by
/// the ledger rather than hard-coded at call sites; the defaults match the
/// current wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Ceiling on inputs per transfer message
    pub max_inputs_per_message: usize,
    /// Serialized size of one author: sig marker, pubkey, signature,
    /// address, plus field-name overhead
    pub author_size: u64,
    /// Serialized size of one transfer input: unit hash, message index,
    /// output index, plus field-name overhead
    pub transfer_input_size: u64,
    /// Base reserve covering miscellaneous per-unit overhead
    pub base_fee_reserve: u64,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            max_inputs_per_message: 128,
            author_size: 204,
            transfer_input_size: 89,
            base_fee_reserve: 1000,
        }
    }
}

/// Errors surfaced by the ledger's query layer
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A query could not be executed or returned malformed rows
    #[error("ledger query failed: {0}")]
    Query(String),

    /// The ledger service is unreachable or shutting down
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the composer
///
/// The composer invokes exactly one outcome per attempt; `NotEnoughFunds`
/// is kept distinct because the engine treats it as an invariant violation
/// rather than a transient failure.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("not enough funds: {0}")]
    NotEnoughFunds(String),

    #[error("{0}")]
    Other(String),
}

/// Read-only queries over the wallet's confirmed, unspent outputs
///
/// Every selection method applies the same eligibility filters: the output
/// must be confirmed (stable), carry a good sequence, be unspent, and its
/// address must not have a pending definition change in flight. Outputs on
/// an address whose authorization rules are mid-change are excluded until
/// the change stabilizes.
pub trait Ledger: Send + Sync {
    /// Whether the node is still synchronizing with the network. While
    /// catching up, output data is stale and consolidation must not act.
    fn is_catching_up(&self) -> bool;

    /// Wire-format constants of the protocol this ledger speaks.
    fn protocol_constants(&self) -> ProtocolConstants;

    /// Addresses of the wallet with a nonzero eligible balance for the
    /// asset, ordered ascending by total balance, capped at `limit`.
    fn funded_addresses(
        &self,
        wallet: &str,
        asset: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AddressFunding>, LedgerError>;

    /// Number of confirmed, unspent outputs in the scope for the asset.
    ///
    /// Unlike the selection queries, the count does not apply the
    /// pending-definition-change exclusion: an address mid-change still
    /// counts as fragmented, and the subsequent fetch coming back empty is
    /// what turns such a pass into a no-op.
    fn count_spendable_outputs(
        &self,
        scope: &WalletScope,
        asset: Option<&str>,
    ) -> Result<usize, LedgerError>;

    /// Up to `limit` eligible outputs on the given addresses, ordered
    /// ascending by amount.
    fn smallest_outputs(
        &self,
        addresses: &[String],
        asset: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UnspentOutput>, LedgerError>;

    /// One eligible output in the scope with an amount strictly greater
    /// than `min_amount`, whose source unit is not in `exclude_units`.
    /// No ordering preference beyond "first qualifying".
    fn find_larger_output(
        &self,
        scope: &WalletScope,
        asset: Option<&str>,
        min_amount: u64,
        exclude_units: &HashSet<String>,
    ) -> Result<Option<UnspentOutput>, LedgerError>;

    /// The wallet's first address: prefer a change-type address, then the
    /// lowest derivation index. `None` if the wallet has no addresses.
    fn first_wallet_address(&self, wallet: &str) -> Result<Option<String>, LedgerError>;

    /// The single largest eligible output on the address, if any.
    fn largest_output(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> Result<Option<UnspentOutput>, LedgerError>;

    /// Total eligible unspent amount on the address.
    fn total_unspent(&self, address: &str, asset: Option<&str>) -> Result<u64, LedgerError>;
}

/// Byte-level unit construction, fee computation and signing
pub trait Composer: Send + Sync {
    /// Compose and sign one unit from an explicit input list.
    ///
    /// The change output (the zero-amount entry in `request.outputs`)
    /// receives the input amount minus fees, computed by the composer.
    fn compose(
        &self,
        request: &ComposeRequest,
        signer: &dyn Signer,
    ) -> Result<SignedUnit, ComposeError>;

    /// Compose and sign a payment from one address, letting the composer
    /// pick the inputs itself. Used by the output-splitting path.
    fn compose_payment(
        &self,
        paying_address: &str,
        outputs: &[OutputSpec],
        signer: &dyn Signer,
    ) -> Result<SignedUnit, ComposeError>;
}

/// Fire-and-forget network announcement of a signed unit
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, unit: &SignedUnit);
}

/// Opaque signing capability
///
/// The engine passes this through to the composer unmodified; it never
/// inspects or stores key material.
pub trait Signer: Send + Sync {
    /// Sign the given payload hash on behalf of the given address.
    fn sign(&self, address: &str, payload_hash: &[u8]) -> Result<Vec<u8>, LedgerError>;
}
