//! Fee-budget accounting and input augmentation
//!
//! A consolidation unit must pay its own byte-proportional fee out of the
//! inputs it spends. Small outputs often cannot: the fee target scales with
//! the number of inputs and authors. When the selected set falls short, one
//! additional larger output is pulled in from a disjoint pool.
//!
//! Exactly one augmentation round is performed. If no single output covers
//! the shortfall, the pass aborts cleanly rather than broadcasting an
//! underfunded unit; the next scheduled tick re-attempts against whatever
//! the ledger looks like then.

use crate::error::{ConsolidateError, ConsolidateResult};
use crate::ledger::{Ledger, ProtocolConstants};
use crate::selection::SelectionBudget;
use crate::types::WalletScope;

/// Minimum input amount needed to cover the unit's own fees: base reserve
/// plus the serialized cost of each transfer input and each author.
pub fn fee_target(constants: &ProtocolConstants, input_count: usize, author_count: usize) -> u64 {
    constants.base_fee_reserve
        + constants.transfer_input_size * input_count as u64
        + constants.author_size * author_count as u64
}

/// How the fee budget was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeCoverage {
    /// The selected inputs already exceed the fee target.
    AlreadyCovered,
    /// One larger output was appended to cover the shortfall.
    Augmented,
}

/// Ensure the budget can pay for the unit it will become.
///
/// If the running total does not exceed the fee target, the target is first
/// raised by one more input-cost and one more author-cost, since the
/// augmenting output itself adds an input and possibly a new author. A single
/// qualifying output is fetched: eligible, amount strictly greater than the
/// shortfall, source unit not already in the candidate set.
///
/// Returns [`ConsolidateError::NoLargeInput`] when no such output exists.
pub fn cover_fees(
    ledger: &dyn Ledger,
    scope: &WalletScope,
    asset: Option<&str>,
    budget: &mut SelectionBudget,
) -> ConsolidateResult<FeeCoverage> {
    let constants = ledger.protocol_constants();
    let target = fee_target(&constants, budget.len(), budget.address_count());
    if budget.input_amount() > target {
        return Ok(FeeCoverage::AlreadyCovered);
    }

    let raised_target = target + constants.transfer_input_size + constants.author_size;
    let shortfall = raised_target - budget.input_amount();

    let large = ledger.find_larger_output(scope, asset, shortfall, budget.used_units())?;
    match large {
        Some(output) => {
            log::debug!(
                "augmenting {} with {} ({} units) to cover fees",
                scope,
                output.id(),
                output.amount
            );
            budget.push(output);
            Ok(FeeCoverage::Augmented)
        }
        None => Err(ConsolidateError::NoLargeInput),
    }
}
