//! Consolidation engine: pass execution and drain loop
//!
//! One *pass* runs the full pipeline once under the scope's lock:
//! select → cover fees → assemble → broadcast. A *drain* repeats passes
//! until the scope is at or below its target output count, bounded by a
//! per-tick pass limit. The lock is released and reacquired between passes:
//! by the time the next pass selects, the ledger has already recorded the
//! previous unit's inputs as spent, so a fresh selection naturally excludes
//! them.
//!
//! Failure policy: a failed pass never escapes the drain loop in a way that
//! would kill the scheduler. Recoverable conditions (no large input, compose
//! error) abort the current pass and surface as an [`PassOutcome::Aborted`];
//! invariant violations (`FundsInvariant`, `WalletState`) propagate as
//! errors so callers can log them loudly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::assemble::{build_request, compose_and_broadcast, resolve_destination};
use crate::augment::cover_fees;
use crate::error::{ConsolidateError, ConsolidateResult};
use crate::events::{ConsolidationEvent, ConsolidationEventBus};
use crate::ledger::{Broadcaster, Composer, Ledger, Signer};
use crate::selection::{select_outputs, Selection};
use crate::types::{ConsolidationRequest, WalletScope};

/// Default bound on passes per scheduled tick. Generous enough to drain a
/// badly fragmented wallet in one tick while still bounding the loop.
pub const DEFAULT_MAX_PASSES_PER_TICK: usize = 100;

/// Typed per-scope lock registry
///
/// One lock per wallet scope serializes every consolidation pass for that
/// scope against concurrent passes and against any other operation sharing
/// the same lock (e.g. a manual send locking the same funds). Locks are
/// created on first use and never removed; the registry is bounded by the
/// number of distinct scopes the process handles.
pub struct WalletLocks {
    inner: Mutex<HashMap<WalletScope, Arc<Mutex<()>>>>,
}

static GLOBAL_LOCKS: Lazy<Arc<WalletLocks>> = Lazy::new(|| Arc::new(WalletLocks::new()));

impl WalletLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry. Engines share it by default so that two
    /// engine instances over the same ledger still serialize per scope.
    pub fn global() -> Arc<WalletLocks> {
        GLOBAL_LOCKS.clone()
    }

    /// Get or create the lock handle for a scope.
    pub fn handle(&self, scope: &WalletScope) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for WalletLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one consolidation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The node is still synchronizing; nothing was queried beyond the
    /// check and the lock was never acquired.
    SkippedCatchingUp,
    /// Output count already at or below target; no unit composed.
    NothingToDo {
        /// Eligible output count observed
        count: usize,
    },
    /// One unit was composed and broadcast.
    Broadcast {
        unit: String,
        input_count: usize,
        input_amount: u64,
    },
    /// The pass aborted before broadcast; the reason was logged and the
    /// next scheduled tick will re-attempt.
    Aborted { reason: String },
}

/// Summary of one drain (one scheduled tick)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// Units broadcast during this drain
    pub broadcasts: usize,
    /// Outcome of the final pass (the one that stopped the loop)
    pub final_outcome: PassOutcome,
}

/// The consolidation engine
///
/// Owns the collaborator handles and executes passes/drains for
/// [`ConsolidationRequest`]s. The engine itself is stateless between
/// passes; all accumulation lives in a pass-scoped `SelectionBudget`.
pub struct ConsolidationEngine {
    ledger: Arc<dyn Ledger>,
    composer: Arc<dyn Composer>,
    broadcaster: Arc<dyn Broadcaster>,
    signer: Arc<dyn Signer>,
    locks: Arc<WalletLocks>,
    events: Option<Arc<ConsolidationEventBus>>,
    asset: Option<String>,
    max_passes_per_tick: usize,
}

impl ConsolidationEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        composer: Arc<dyn Composer>,
        broadcaster: Arc<dyn Broadcaster>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            ledger,
            composer,
            broadcaster,
            signer,
            locks: WalletLocks::global(),
            events: None,
            asset: None,
            max_passes_per_tick: DEFAULT_MAX_PASSES_PER_TICK,
        }
    }

    /// Attach a domain-specific event bus.
    pub fn with_event_bus(mut self, events: Arc<ConsolidationEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Consolidate a non-base asset instead of the base asset.
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Override the per-tick pass bound.
    pub fn with_max_passes_per_tick(mut self, max_passes: usize) -> Self {
        self.max_passes_per_tick = max_passes;
        self
    }

    /// Use a private lock registry instead of the process-wide one.
    pub fn with_locks(mut self, locks: Arc<WalletLocks>) -> Self {
        self.locks = locks;
        self
    }

    fn publish(&self, event: ConsolidationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Run a single consolidation pass.
    ///
    /// The catching-up check runs before lock acquisition; a synchronizing
    /// node performs no queries and takes no lock. Everything from selection
    /// through broadcast executes under the scope's lock.
    pub fn run_pass(&self, request: &ConsolidationRequest) -> ConsolidateResult<PassOutcome> {
        if self.ledger.is_catching_up() {
            log::info!("{}: node is catching up, skipping consolidation", request.scope());
            self.publish(ConsolidationEvent::PassSkipped {
                reason: "catching_up".to_string(),
            });
            return Ok(PassOutcome::SkippedCatchingUp);
        }

        let lock = self.locks.handle(request.scope());
        let _guard = lock.lock().unwrap();
        self.run_pass_locked(request)
    }

    fn run_pass_locked(&self, request: &ConsolidationRequest) -> ConsolidateResult<PassOutcome> {
        let scope = request.scope();
        let asset = self.asset.as_deref();

        let mut budget =
            match select_outputs(self.ledger.as_ref(), scope, asset, request.target_max())? {
                Selection::NothingToDo { count } => {
                    self.publish(ConsolidationEvent::PassSkipped {
                        reason: "below_target".to_string(),
                    });
                    return Ok(PassOutcome::NothingToDo { count });
                }
                Selection::Ready(budget) => budget,
            };

        match cover_fees(self.ledger.as_ref(), scope, asset, &mut budget) {
            Ok(_) => {}
            Err(ConsolidateError::NoLargeInput) => {
                let reason = ConsolidateError::NoLargeInput.to_string();
                log::warn!("{}: consolidation failed: {}", scope, reason);
                self.publish(ConsolidationEvent::PassFailed {
                    reason: reason.clone(),
                });
                return Ok(PassOutcome::Aborted { reason });
            }
            Err(err) => return Err(err),
        }

        let destination = resolve_destination(self.ledger.as_ref(), scope)?;
        let compose_request = build_request(&budget, &destination, asset);

        let unit = match compose_and_broadcast(
            &self.composer,
            &self.broadcaster,
            &self.signer,
            &compose_request,
        ) {
            Ok(unit) => unit,
            Err(ConsolidateError::Compose(msg)) => {
                log::warn!("{}: failed to compose consolidation unit: {}", scope, msg);
                self.publish(ConsolidationEvent::PassFailed {
                    reason: msg.clone(),
                });
                return Ok(PassOutcome::Aborted { reason: msg });
            }
            // FundsInvariant and everything else propagates: these mean the
            // fee accounting upstream no longer holds.
            Err(err) => return Err(err),
        };

        log::info!(
            "{}: broadcast consolidation unit {} spending {} outputs ({} units of value)",
            scope,
            unit.unit,
            budget.len(),
            budget.input_amount()
        );
        self.publish(ConsolidationEvent::UnitBroadcast {
            unit: unit.unit.clone(),
            input_count: budget.len(),
            input_amount: budget.input_amount(),
            destination,
        });

        Ok(PassOutcome::Broadcast {
            unit: unit.unit,
            input_count: budget.len(),
            input_amount: budget.input_amount(),
        })
    }

    /// Drain the scope: run passes until below target or the per-tick bound.
    ///
    /// Each successful broadcast immediately triggers the next pass for the
    /// same request rather than waiting for the next timer tick, so one tick
    /// performs many units back-to-back. Any non-broadcast outcome stops the
    /// loop.
    pub fn drain(&self, request: &ConsolidationRequest) -> ConsolidateResult<DrainSummary> {
        let mut broadcasts = 0usize;
        for _ in 0..self.max_passes_per_tick {
            let outcome = self.run_pass(request)?;
            match outcome {
                PassOutcome::Broadcast { .. } => {
                    broadcasts += 1;
                }
                _ => {
                    self.publish(ConsolidationEvent::DrainCompleted { broadcasts });
                    return Ok(DrainSummary {
                        broadcasts,
                        final_outcome: outcome,
                    });
                }
            }
        }
        log::warn!(
            "{}: drain stopped after {} passes (per-tick bound)",
            request.scope(),
            self.max_passes_per_tick
        );
        self.publish(ConsolidationEvent::DrainCompleted { broadcasts });
        Ok(DrainSummary {
            broadcasts,
            final_outcome: PassOutcome::Aborted {
                reason: "per-tick pass bound reached".to_string(),
            },
        })
    }
}
