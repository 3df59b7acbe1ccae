//! Output splitting: the inverse of consolidation
//!
//! A wallet that serves many small payments wants its balance spread over
//! several mid-sized outputs, not parked in one huge output that every
//! payment has to spend and re-change. When the largest output on an
//! address grows disproportionate to the address total, it is split into
//! equal chunks paid back to the same address.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::ConsolidateResult;
use crate::events::{ConsolidationEvent, ConsolidationEventBus};
use crate::ledger::{Broadcaster, ComposeError, Composer, Ledger, Signer};
use crate::scheduler::SchedulerHandle;
use crate::types::{OutputSpec, SignedUnit};

/// Default number of chunks the largest output is split into.
pub const DEFAULT_CHUNK_COUNT: u32 = 10;

/// Slack added to the address total before comparing against the largest
/// output, so near-empty addresses are not split over rounding noise.
const TOTAL_MARGIN: u64 = 10_000;

/// Whether the largest output is disproportionate enough to split:
/// greater than the (margin-padded) total divided by half the chunk count.
/// Splitting into fewer than 2 chunks is meaningless, so such counts never
/// trigger a split.
pub fn should_split(largest: u64, total: u64, chunk_count: u32) -> bool {
    if chunk_count < 2 {
        return false;
    }
    largest > (total + TOTAL_MARGIN) / (chunk_count as u64 / 2)
}

/// Splits oversized outputs on a single address
pub struct OutputSplitter {
    ledger: Arc<dyn Ledger>,
    composer: Arc<dyn Composer>,
    broadcaster: Arc<dyn Broadcaster>,
    signer: Arc<dyn Signer>,
    events: Option<Arc<ConsolidationEventBus>>,
    chunk_count: u32,
}

impl OutputSplitter {
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
            events: None,
            chunk_count: DEFAULT_CHUNK_COUNT,
        }
    }

    /// Attach a domain-specific event bus.
    pub fn with_event_bus(mut self, events: Arc<ConsolidationEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the chunk count (must be an even number ≥ 2).
    pub fn with_chunk_count(mut self, chunk_count: u32) -> Self {
        debug_assert!(chunk_count >= 2);
        self.chunk_count = chunk_count;
        self
    }

    /// Split the largest base-asset output on the address, unconditionally.
    ///
    /// The payment goes from the address to itself: `chunk_count - 1`
    /// outputs of one chunk each, plus one zero-amount output that absorbs
    /// the remainder minus fees. Compose failures are logged and dropped;
    /// the next periodic check retries.
    pub fn split_largest_output(&self, address: &str) -> ConsolidateResult<Option<SignedUnit>> {
        let largest = match self.ledger.largest_output(address, None)? {
            Some(output) => output,
            None => return Ok(None),
        };
        log::info!(
            "will split the largest output on {} ({} units)",
            address,
            largest.amount
        );

        let chunk_amount =
            ((largest.amount as f64) / (self.chunk_count as f64)).round() as u64;
        let mut outputs = vec![OutputSpec {
            address: address.to_string(),
            amount: 0,
        }];
        for _ in 1..self.chunk_count {
            outputs.push(OutputSpec {
                address: address.to_string(),
                amount: chunk_amount,
            });
        }

        match self
            .composer
            .compose_payment(address, &outputs, self.signer.as_ref())
        {
            Ok(unit) => {
                self.broadcaster.broadcast(&unit);
                if let Some(bus) = &self.events {
                    bus.publish(ConsolidationEvent::OutputSplit {
                        address: address.to_string(),
                        unit: unit.unit.clone(),
                        chunk_amount,
                        chunk_count: self.chunk_count,
                    });
                }
                Ok(Some(unit))
            }
            Err(ComposeError::NotEnoughFunds(msg)) | Err(ComposeError::Other(msg)) => {
                log::warn!("failed to split output on {}: {}", address, msg);
                Ok(None)
            }
        }
    }

    /// Split only if the largest output exceeds the disproportion threshold.
    pub fn check_and_split(&self, address: &str) -> ConsolidateResult<Option<SignedUnit>> {
        let largest = match self.ledger.largest_output(address, None)? {
            Some(output) => output.amount,
            None => return Ok(None),
        };
        let total = self.ledger.total_unspent(address, None)?;
        if !should_split(largest, total, self.chunk_count) {
            return Ok(None);
        }
        self.split_largest_output(address)
    }
}

/// Periodically check and split the largest output on an address.
///
/// Runs one check immediately, then on the given period. A zero period
/// disables scheduling.
pub fn schedule_splitting(
    splitter: Arc<OutputSplitter>,
    address: String,
    period: Duration,
) -> Option<SchedulerHandle> {
    if period.is_zero() {
        return None;
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    let join = thread::spawn(move || {
        run_check(&splitter, &address);
        loop {
            match stop_rx.recv_timeout(period) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            run_check(&splitter, &address);
        }
    });

    Some(SchedulerHandle::new(stop_tx, join))
}

fn run_check(splitter: &OutputSplitter, address: &str) {
    if let Err(err) = splitter.check_and_split(address) {
        log::error!("split check on {} failed: {}", address, err);
    }
}
