//! Unit assembly and broadcast
//!
//! Turns a finalized input set into one composed, signed, broadcast unit.
//! The actual byte-level construction, fee computation and signing live in
//! the external composer; this module only resolves the destination, shapes
//! the request and interprets the outcome.

use std::sync::Arc;

use crate::error::{wallet_state_error, ConsolidateError, ConsolidateResult};
use crate::ledger::{Broadcaster, ComposeError, Composer, Ledger, Signer};
use crate::selection::SelectionBudget;
use crate::types::{CommissionRecipient, ComposeRequest, OutputSpec, SignedUnit, WalletScope};

/// Resolve where the consolidated balance lands.
///
/// A concrete-address scope consolidates onto itself. A wallet scope uses
/// the wallet's first address (change-type preferred, then lowest index);
/// a wallet with zero addresses is malformed state and fails loudly.
pub fn resolve_destination(ledger: &dyn Ledger, scope: &WalletScope) -> ConsolidateResult<String> {
    match scope {
        WalletScope::Address(address) => Ok(address.clone()),
        WalletScope::Wallet(wallet) => ledger
            .first_wallet_address(wallet)?
            .ok_or_else(|| wallet_state_error(format!("wallet {} has no addresses", wallet))),
    }
}

/// Build the compose request for a finalized budget.
///
/// Exactly one zero-amount output is directed at the destination (the
/// composer fills in the actual change value), and the destination is also
/// the sole commission recipient at 100% share, so block-production rewards
/// compound into the consolidated balance rather than scattering.
pub fn build_request(
    budget: &SelectionBudget,
    destination: &str,
    asset: Option<&str>,
) -> ComposeRequest {
    ComposeRequest {
        paying_addresses: budget.paying_addresses(),
        inputs: budget.to_input_specs(),
        input_amount: budget.input_amount(),
        outputs: vec![OutputSpec {
            address: destination.to_string(),
            amount: 0,
        }],
        commission_recipients: vec![CommissionRecipient {
            address: destination.to_string(),
            share_percent: 100,
        }],
        asset: asset.map(String::from),
    }
}

/// Compose, sign and broadcast one unit.
///
/// A generic compose failure becomes [`ConsolidateError::Compose`] (pass
/// aborted, retried next tick). "Not enough funds" becomes
/// [`ConsolidateError::FundsInvariant`]: augmentation already accounted for
/// fees, so reaching it here means the engine's assumptions are corrupted.
pub fn compose_and_broadcast(
    composer: &Arc<dyn Composer>,
    broadcaster: &Arc<dyn Broadcaster>,
    signer: &Arc<dyn Signer>,
    request: &ComposeRequest,
) -> ConsolidateResult<SignedUnit> {
    let unit = composer
        .compose(request, signer.as_ref())
        .map_err(|err| match err {
            ComposeError::NotEnoughFunds(msg) => ConsolidateError::FundsInvariant(msg),
            ComposeError::Other(msg) => ConsolidateError::Compose(msg),
        })?;
    broadcaster.broadcast(&unit);
    Ok(unit)
}
