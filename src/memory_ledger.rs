//! In-memory ledger for tests and examples
//!
//! [`MemoryLedger`] implements every external collaborator trait over a
//! single mutex-guarded state table, so one instance can be handed to the
//! engine as ledger, composer and broadcaster at once. Behavior mirrors the
//! real service where the engine can observe it:
//!
//! - eligibility filters (confirmed, unspent, no pending definition change)
//! - ascending-amount ordering of selection queries
//! - a linear fee model applied during composition
//! - change outputs that stay unconfirmed until [`MemoryLedger::confirm_all`]
//!
//! The fee model is `UNIT_OVERHEAD + transfer_input_size * inputs +
//! author_size * authors`, with the overhead deliberately below the base
//! fee reserve so a budget that passed augmentation always composes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use base64::encode as base64_encode;
use sha2::{Digest, Sha256};

use crate::ledger::{
    Broadcaster, ComposeError, Composer, Ledger, LedgerError, ProtocolConstants, Signer,
};
use crate::types::{
    AddressFunding, ComposeRequest, InputSpec, OutputSpec, SignedUnit, UnitSignature,
    UnspentOutput, WalletScope,
};

/// Fixed per-unit overhead of the mock composer's fee model.
///
/// Kept below `base_fee_reserve` so budgets the engine considers covered
/// never fail composition with `NotEnoughFunds`.
pub const UNIT_OVERHEAD: u64 = 300;

#[derive(Debug, Clone)]
struct StoredOutput {
    output: UnspentOutput,
    confirmed: bool,
    spent: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Wallet id -> addresses, in derivation order
    wallets: HashMap<String, Vec<String>>,
    /// Addresses with an authorization change in flight
    pending_definition: HashSet<String>,
    outputs: Vec<StoredOutput>,
    catching_up: bool,
    broadcast: Vec<SignedUnit>,
}

/// An in-memory ledger, composer and broadcaster rolled into one
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    constants: ProtocolConstants,
    unit_counter: AtomicU64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_constants(ProtocolConstants::default())
    }

    /// Build a ledger speaking a protocol with non-default constants.
    ///
    /// Tests use a small `max_inputs_per_message` to exercise multi-pass
    /// draining without creating hundreds of outputs.
    pub fn with_constants(constants: ProtocolConstants) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            constants,
            unit_counter: AtomicU64::new(0),
        }
    }

    /// Register a wallet and its addresses, in derivation order.
    pub fn add_wallet(&self, wallet: &str, addresses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .wallets
            .entry(wallet.to_string())
            .or_default()
            .extend(addresses.iter().map(|a| a.to_string()));
    }

    /// Insert a confirmed, spendable output and return its source unit hash.
    pub fn add_output(&self, address: &str, amount: u64) -> String {
        self.add_output_for_asset(address, amount, None)
    }

    /// Insert a confirmed, spendable output carrying the given asset.
    pub fn add_output_for_asset(&self, address: &str, amount: u64, asset: Option<&str>) -> String {
        let unit = self.next_unit_hash(address, amount);
        let mut output = UnspentOutput::new(address, unit.clone(), 0, 0, amount);
        if let Some(asset) = asset {
            output = output.with_asset(asset);
        }
        let mut state = self.state.lock().unwrap();
        state.outputs.push(StoredOutput {
            output,
            confirmed: true,
            spent: false,
        });
        unit
    }

    /// Insert a further confirmed output under an existing unit, at the
    /// next free output index. Real units routinely carry several outputs;
    /// this is how tests model two spendable fragments sharing one source
    /// unit.
    pub fn add_output_to_unit(&self, unit: &str, address: &str, amount: u64) -> u32 {
        let mut state = self.state.lock().unwrap();
        let next_index = state
            .outputs
            .iter()
            .filter(|s| s.output.unit == unit)
            .map(|s| s.output.output_index + 1)
            .max()
            .unwrap_or(0);
        state.outputs.push(StoredOutput {
            output: UnspentOutput::new(address, unit, 0, next_index, amount),
            confirmed: true,
            spent: false,
        });
        next_index
    }

    /// Flag an address as having a definition change in flight.
    pub fn set_pending_definition(&self, address: &str, pending: bool) {
        let mut state = self.state.lock().unwrap();
        if pending {
            state.pending_definition.insert(address.to_string());
        } else {
            state.pending_definition.remove(address);
        }
    }

    pub fn set_catching_up(&self, catching_up: bool) {
        self.state.lock().unwrap().catching_up = catching_up;
    }

    /// Promote every unconfirmed output (change from composed units) to
    /// confirmed, as the network would after stabilization.
    pub fn confirm_all(&self) {
        let mut state = self.state.lock().unwrap();
        for stored in &mut state.outputs {
            stored.confirmed = true;
        }
    }

    /// Units broadcast so far, in order.
    pub fn broadcast_units(&self) -> Vec<SignedUnit> {
        self.state.lock().unwrap().broadcast.clone()
    }

    /// Confirmed, unspent output count in the scope, ignoring query errors.
    pub fn spendable_count(&self, scope: &WalletScope) -> usize {
        self.count_spendable_outputs(scope, None).unwrap_or(0)
    }

    /// Total amount across all outputs, spent or not. Conserved by
    /// composition up to fees, which leave the table entirely.
    pub fn total_ever(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state
            .outputs
            .iter()
            .filter(|s| !s.spent)
            .map(|s| s.output.amount)
            .sum()
    }

    fn next_unit_hash(&self, salt: &str, amount: u64) -> String {
        let counter = self.unit_counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(amount.to_le_bytes());
        hasher.update(counter.to_le_bytes());
        base64_encode(hasher.finalize())
    }

    fn scope_addresses(state: &LedgerState, scope: &WalletScope) -> Vec<String> {
        match scope {
            WalletScope::Address(address) => vec![address.clone()],
            WalletScope::Wallet(wallet) => {
                state.wallets.get(wallet).cloned().unwrap_or_default()
            }
        }
    }

    fn is_eligible(state: &LedgerState, stored: &StoredOutput, asset: Option<&str>) -> bool {
        stored.confirmed
            && !stored.spent
            && stored.output.asset.as_deref() == asset
            && !state.pending_definition.contains(&stored.output.address)
    }

    fn fee_for(&self, input_count: usize, author_count: usize) -> u64 {
        UNIT_OVERHEAD
            + self.constants.transfer_input_size * input_count as u64
            + self.constants.author_size * author_count as u64
    }

    fn sign_unit(
        unit: &str,
        authors: &[String],
        signer: &dyn Signer,
    ) -> Result<Vec<UnitSignature>, ComposeError> {
        authors
            .iter()
            .map(|address| {
                let signature = signer
                    .sign(address, unit.as_bytes())
                    .map_err(|e| ComposeError::Other(e.to_string()))?;
                Ok(UnitSignature {
                    address: address.clone(),
                    signature: base64_encode(signature),
                })
            })
            .collect()
    }

    /// Mark the referenced outputs spent, failing on unknown or ineligible
    /// references the way the real composer would.
    fn consume_inputs(
        state: &mut LedgerState,
        inputs: &[InputSpec],
        asset: Option<&str>,
    ) -> Result<u64, ComposeError> {
        let mut total = 0u64;
        for input in inputs {
            let position = state.outputs.iter().position(|s| {
                s.output.unit == input.unit
                    && s.output.message_index == input.message_index
                    && s.output.output_index == input.output_index
            });
            let index = position
                .ok_or_else(|| ComposeError::Other(format!("unknown input {}", input.unit)))?;
            let eligible = Self::is_eligible(state, &state.outputs[index], asset);
            if !eligible {
                return Err(ComposeError::Other(format!(
                    "input {} is not spendable",
                    input.unit
                )));
            }
            total += state.outputs[index].output.amount;
            state.outputs[index].spent = true;
        }
        Ok(total)
    }

    fn record_output(
        state: &mut LedgerState,
        unit: &str,
        output_index: u32,
        spec: &OutputSpec,
        asset: Option<&str>,
    ) {
        let mut output =
            UnspentOutput::new(spec.address.clone(), unit, 0, output_index, spec.amount);
        if let Some(asset) = asset {
            output = output.with_asset(asset);
        }
        state.outputs.push(StoredOutput {
            output,
            confirmed: false,
            spent: false,
        });
    }
}

impl Ledger for MemoryLedger {
    fn is_catching_up(&self) -> bool {
        self.state.lock().unwrap().catching_up
    }

    fn protocol_constants(&self) -> ProtocolConstants {
        self.constants
    }

    fn funded_addresses(
        &self,
        wallet: &str,
        asset: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AddressFunding>, LedgerError> {
        let state = self.state.lock().unwrap();
        let addresses = state.wallets.get(wallet).cloned().unwrap_or_default();
        let mut rows: Vec<AddressFunding> = addresses
            .into_iter()
            .map(|address| {
                let total = state
                    .outputs
                    .iter()
                    .filter(|s| s.output.address == address && Self::is_eligible(&state, s, asset))
                    .map(|s| s.output.amount)
                    .sum();
                AddressFunding { address, total }
            })
            .filter(|row| row.total > 0)
            .collect();
        rows.sort_by(|a, b| a.total.cmp(&b.total).then_with(|| a.address.cmp(&b.address)));
        rows.truncate(limit);
        Ok(rows)
    }

    fn count_spendable_outputs(
        &self,
        scope: &WalletScope,
        asset: Option<&str>,
    ) -> Result<usize, LedgerError> {
        let state = self.state.lock().unwrap();
        let addresses = Self::scope_addresses(&state, scope);
        // No pending-definition exclusion here; see the trait contract
        Ok(state
            .outputs
            .iter()
            .filter(|s| {
                addresses.contains(&s.output.address)
                    && s.confirmed
                    && !s.spent
                    && s.output.asset.as_deref() == asset
            })
            .count())
    }

    fn smallest_outputs(
        &self,
        addresses: &[String],
        asset: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UnspentOutput>, LedgerError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<UnspentOutput> = state
            .outputs
            .iter()
            .filter(|s| {
                addresses.contains(&s.output.address) && Self::is_eligible(&state, s, asset)
            })
            .map(|s| s.output.clone())
            .collect();
        rows.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.id().cmp(&b.id())));
        rows.truncate(limit);
        Ok(rows)
    }

    fn find_larger_output(
        &self,
        scope: &WalletScope,
        asset: Option<&str>,
        min_amount: u64,
        exclude_units: &HashSet<String>,
    ) -> Result<Option<UnspentOutput>, LedgerError> {
        let state = self.state.lock().unwrap();
        let addresses = Self::scope_addresses(&state, scope);
        Ok(state
            .outputs
            .iter()
            .filter(|s| {
                addresses.contains(&s.output.address)
                    && Self::is_eligible(&state, s, asset)
                    && s.output.amount > min_amount
                    && !exclude_units.contains(&s.output.unit)
            })
            .map(|s| s.output.clone())
            .next())
    }

    fn first_wallet_address(&self, wallet: &str) -> Result<Option<String>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .wallets
            .get(wallet)
            .and_then(|addresses| addresses.first().cloned()))
    }

    fn largest_output(
        &self,
        address: &str,
        asset: Option<&str>,
    ) -> Result<Option<UnspentOutput>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outputs
            .iter()
            .filter(|s| s.output.address == address && Self::is_eligible(&state, s, asset))
            .max_by_key(|s| s.output.amount)
            .map(|s| s.output.clone()))
    }

    fn total_unspent(&self, address: &str, asset: Option<&str>) -> Result<u64, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outputs
            .iter()
            .filter(|s| s.output.address == address && Self::is_eligible(&state, s, asset))
            .map(|s| s.output.amount)
            .sum())
    }
}

impl Composer for MemoryLedger {
    fn compose(
        &self,
        request: &ComposeRequest,
        signer: &dyn Signer,
    ) -> Result<SignedUnit, ComposeError> {
        let fee = self.fee_for(request.inputs.len(), request.paying_addresses.len());
        let unit = self.next_unit_hash(&request.paying_addresses.join(","), request.input_amount);

        let mut state = self.state.lock().unwrap();
        let input_total =
            Self::consume_inputs(&mut state, &request.inputs, request.asset.as_deref())?;
        if input_total <= fee {
            // Inputs already consumed; real composers roll back, the mock
            // surfaces the invariant violation and the test ends there.
            return Err(ComposeError::NotEnoughFunds(format!(
                "inputs carry {} but fees require {}",
                input_total, fee
            )));
        }

        let mut outputs = Vec::with_capacity(request.outputs.len());
        let mut change_seen = false;
        for spec in &request.outputs {
            if spec.amount == 0 {
                if change_seen {
                    return Err(ComposeError::Other(
                        "more than one change output".to_string(),
                    ));
                }
                change_seen = true;
                outputs.push(OutputSpec {
                    address: spec.address.clone(),
                    amount: input_total - fee,
                });
            } else {
                outputs.push(spec.clone());
            }
        }
        if !change_seen {
            return Err(ComposeError::Other("no change output".to_string()));
        }

        for (index, spec) in outputs.iter().enumerate() {
            Self::record_output(&mut state, &unit, index as u32, spec, request.asset.as_deref());
        }
        drop(state);

        let signatures = Self::sign_unit(&unit, &request.paying_addresses, signer)?;
        Ok(SignedUnit {
            unit,
            authors: request.paying_addresses.clone(),
            inputs: request.inputs.clone(),
            outputs,
            commission_recipients: request.commission_recipients.clone(),
            signatures,
        })
    }

    fn compose_payment(
        &self,
        paying_address: &str,
        outputs: &[OutputSpec],
        signer: &dyn Signer,
    ) -> Result<SignedUnit, ComposeError> {
        let payment_total: u64 = outputs.iter().map(|o| o.amount).sum();
        let unit = self.next_unit_hash(paying_address, payment_total);
        let authors = vec![paying_address.to_string()];

        let mut state = self.state.lock().unwrap();

        // Largest-first input selection until the payment plus fees is
        // covered; the fee grows as inputs are added.
        let mut candidates: Vec<usize> = state
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.output.address == paying_address && Self::is_eligible(&state, s, None))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|a, b| {
            state.outputs[*b]
                .output
                .amount
                .cmp(&state.outputs[*a].output.amount)
        });

        let mut inputs = Vec::new();
        let mut input_total = 0u64;
        let mut picked = Vec::new();
        for index in candidates {
            picked.push(index);
            input_total += state.outputs[index].output.amount;
            inputs.push(InputSpec::from(&state.outputs[index].output));
            if input_total > payment_total + self.fee_for(inputs.len(), 1) {
                break;
            }
        }
        let fee = self.fee_for(inputs.len(), 1);
        if input_total <= payment_total + fee {
            return Err(ComposeError::NotEnoughFunds(format!(
                "address {} holds {} but the payment plus fees requires more",
                paying_address,
                input_total
            )));
        }
        for index in picked {
            state.outputs[index].spent = true;
        }

        let mut composed = Vec::with_capacity(outputs.len());
        for spec in outputs {
            if spec.amount == 0 {
                composed.push(OutputSpec {
                    address: spec.address.clone(),
                    amount: input_total - payment_total - fee,
                });
            } else {
                composed.push(spec.clone());
            }
        }
        for (index, spec) in composed.iter().enumerate() {
            Self::record_output(&mut state, &unit, index as u32, spec, None);
        }
        drop(state);

        let signatures = Self::sign_unit(&unit, &authors, signer)?;
        Ok(SignedUnit {
            unit,
            authors,
            inputs,
            outputs: composed,
            commission_recipients: Vec::new(),
            signatures,
        })
    }
}

impl Broadcaster for MemoryLedger {
    fn broadcast(&self, unit: &SignedUnit) {
        self.state.lock().unwrap().broadcast.push(unit.clone());
    }
}

/// Deterministic signer for tests: signature = sha256(address || payload).
pub struct TestSigner;

impl Signer for TestSigner {
    fn sign(&self, address: &str, payload_hash: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(payload_hash);
        Ok(hasher.finalize().to_vec())
    }
}
