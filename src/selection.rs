//! Output selection for one consolidation pass
//!
//! Produces the ordered, size-bounded list of unspent outputs that one
//! consolidation unit will spend. The policy is smallest-amount-first over
//! the least-funded addresses: the outputs least useful individually are the
//! ones most worth merging.
//!
//! Selection is a pure sequence of ledger reads; it never raises on an empty
//! wallet. "Nothing left to consolidate" is a normal result, not an error.

use std::collections::{BTreeSet, HashSet};

use crate::error::ConsolidateResult;
use crate::ledger::Ledger;
use crate::types::{InputSpec, UnspentOutput, WalletScope};

/// Ceiling on candidate addresses considered per pass. Bounds the ranking
/// query cost for wallets with many addresses.
pub const MAX_CANDIDATE_ADDRESSES: usize = 15;

/// How many outputs one pass should pull into a single unit.
///
/// The `+ 1` guarantees the pass shrinks the output count by at least one
/// even at the boundary (spending N outputs produces one change output);
/// the cap keeps the unit within the protocol's inputs-per-message limit.
///
/// Callers must ensure `count > target_max`.
pub fn count_to_spend(count: usize, target_max: u32, max_inputs_per_message: usize) -> usize {
    debug_assert!(count > target_max as usize);
    (count - target_max as usize + 1).min(max_inputs_per_message - 1)
}

/// Accumulator for the candidate input set of one pass
///
/// Scoped to a single consolidation attempt and discarded afterwards. The
/// used-unit set exists so that fee augmentation never re-selects an output
/// from a unit already present in the candidate list.
#[derive(Debug, Default, Clone)]
pub struct SelectionBudget {
    inputs: Vec<UnspentOutput>,
    input_amount: u64,
    used_addresses: BTreeSet<String>,
    used_units: HashSet<String>,
}

impl SelectionBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one output to the candidate set, updating the running total
    /// and the used-address/used-unit bookkeeping.
    pub fn push(&mut self, output: UnspentOutput) {
        self.input_amount += output.amount;
        self.used_addresses.insert(output.address.clone());
        self.used_units.insert(output.unit.clone());
        self.inputs.push(output);
    }

    /// Selected outputs in selection order.
    pub fn inputs(&self) -> &[UnspentOutput] {
        &self.inputs
    }

    /// Running total of the selected amounts.
    pub fn input_amount(&self) -> u64 {
        self.input_amount
    }

    /// Number of distinct paying addresses selected so far.
    pub fn address_count(&self) -> usize {
        self.used_addresses.len()
    }

    /// Distinct paying addresses, sorted.
    pub fn paying_addresses(&self) -> Vec<String> {
        self.used_addresses.iter().cloned().collect()
    }

    /// Units already contributing an input to the candidate set.
    pub fn used_units(&self) -> &HashSet<String> {
        &self.used_units
    }

    /// Inputs as the composer consumes them.
    pub fn to_input_specs(&self) -> Vec<InputSpec> {
        self.inputs.iter().map(InputSpec::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }
}

/// Outcome of the selection stage
#[derive(Debug)]
pub enum Selection {
    /// Output count is at or below the target; the pass exits silently.
    NothingToDo {
        /// Eligible output count observed
        count: usize,
    },
    /// A non-empty candidate set ready for fee accounting.
    Ready(SelectionBudget),
}

/// Candidate addresses for the scope: a concrete address is the sole
/// candidate; a wallet is ranked ascending by eligible balance and capped.
pub fn candidate_addresses(
    ledger: &dyn Ledger,
    scope: &WalletScope,
    asset: Option<&str>,
) -> ConsolidateResult<Vec<String>> {
    match scope {
        WalletScope::Address(address) => Ok(vec![address.clone()]),
        WalletScope::Wallet(wallet) => {
            let rows = ledger.funded_addresses(wallet, asset, MAX_CANDIDATE_ADDRESSES)?;
            Ok(rows.into_iter().map(|row| row.address).collect())
        }
    }
}

/// Run the selection stage of one pass.
///
/// Counts the eligible outputs first and short-circuits when the scope is
/// already at or below `target_max`, so a quiescent wallet costs exactly one
/// query per tick.
pub fn select_outputs(
    ledger: &dyn Ledger,
    scope: &WalletScope,
    asset: Option<&str>,
    target_max: u32,
) -> ConsolidateResult<Selection> {
    let count = ledger.count_spendable_outputs(scope, asset)?;
    log::debug!("{}: {} unspent outputs", scope, count);
    if count <= target_max as usize {
        return Ok(Selection::NothingToDo { count });
    }

    let constants = ledger.protocol_constants();
    let limit = count_to_spend(count, target_max, constants.max_inputs_per_message);

    let addresses = candidate_addresses(ledger, scope, asset)?;
    let rows = ledger.smallest_outputs(&addresses, asset, limit)?;
    if rows.is_empty() {
        // Outputs exist in the scope but none are currently eligible
        // (e.g. every funded address has a pending definition change).
        return Ok(Selection::NothingToDo { count });
    }

    let mut budget = SelectionBudget::new();
    for row in rows {
        budget.push(row);
    }
    Ok(Selection::Ready(budget))
}
