//! Recurring drain scheduling
//!
//! The scheduler is perpetual: it fires once after a short startup delay
//! (outputs may have accumulated while the process was down) and then on a
//! fixed wall-clock interval. Each firing runs a full drain; a failed drain
//! is logged and never prevents future ticks.
//!
//! Scheduling only arms when both the target maximum and the interval are
//! nonzero; otherwise [`schedule_consolidation`] returns `None` and neither
//! the startup firing nor the recurring timer is registered.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::ConsolidationEngine;
use crate::types::ConsolidationRequest;

/// Handle to a running scheduler thread
///
/// Dropping the handle stops the scheduler. The worker thread wakes from
/// its interval sleep as soon as the stop signal arrives.
pub struct SchedulerHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub(crate) fn new(stop_tx: Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            stop_tx,
            join: Some(join),
        }
    }

    /// Stop the scheduler and wait for the worker thread to exit.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Arm the recurring consolidation schedule for one request.
///
/// Returns `None` when `interval` is zero (and callers must already have
/// refused a zero target when building the request), matching the contract
/// that both configuration values are required for activation.
pub fn schedule_consolidation(
    engine: Arc<ConsolidationEngine>,
    request: ConsolidationRequest,
    interval: Duration,
    startup_delay: Duration,
) -> Option<SchedulerHandle> {
    if interval.is_zero() {
        return None;
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    let join = thread::spawn(move || {
        // One-shot startup firing after the delay, then the regular cadence.
        match stop_rx.recv_timeout(startup_delay) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        run_tick(&engine, &request);

        loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            run_tick(&engine, &request);
        }
    });

    Some(SchedulerHandle::new(stop_tx, join))
}

fn run_tick(engine: &ConsolidationEngine, request: &ConsolidationRequest) {
    match engine.drain(request) {
        Ok(summary) => {
            if summary.broadcasts > 0 {
                log::info!(
                    "{}: drain tick broadcast {} unit(s)",
                    request.scope(),
                    summary.broadcasts
                );
            }
        }
        Err(err) => {
            // The tick dies, the schedule does not.
            log::error!("{}: drain tick failed: {}", request.scope(), err);
        }
    }
}
