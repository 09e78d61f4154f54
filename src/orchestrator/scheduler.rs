//! [`Scheduler`] — the 60-second tick that drives [`ScheduledTrigger`]
//! dispatch (spec §4.6, §2's standalone `Scheduler` component).
//!
//! Grounded in the teacher's `watchdog.rs::Watchdog::start` — a cloned,
//! `Arc`-backed handle spawning a `tokio::time::interval` loop, with the
//! same atomic running-flag shutdown idiom.

use crate::orchestrator::core::CheckOrchestrator;
use crate::orchestrator::triggers::TriggerManager;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the background task that evaluates every [`ScheduledTrigger`] in a
/// [`TriggerManager`] once per tick and dispatches the ones that are due.
#[derive(Clone)]
pub struct Scheduler {
    orchestrator: Arc<CheckOrchestrator>,
    triggers: Arc<TriggerManager>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<CheckOrchestrator>, triggers: Arc<TriggerManager>) -> Self {
        Self {
            orchestrator,
            triggers,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the 60-second tick loop. Calling this twice without an
    /// intervening [`Scheduler::stop`] is a no-op on the second call.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let scheduler = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            info!("scheduler started, tick interval = 60s");
            while scheduler.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                scheduler.orchestrator.dispatch_due_triggers(&scheduler.triggers, Utc::now()).await;
            }
        }))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
