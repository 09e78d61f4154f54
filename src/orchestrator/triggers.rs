//! Trigger types consumed by [`crate::orchestrator::CheckOrchestrator`]
//! (spec §4.6). Grounded in `original_source/libs/sql-orchestrator/src/orchestrator.py`,
//! which imports `OnDemandTrigger`/`ScheduledTrigger`/`DeploymentTrigger` from
//! a sibling `triggers.py` not present in the retrieved source pack; their
//! shape here follows `orchestrator.py`'s call sites (`should_trigger`,
//! `get_checks_to_run`, `mark_run`, `get_next_run`) rather than that file's
//! code directly.

use crate::error::TriggerError;
use crate::ids::ConnectionId;
use crate::model::check::CheckCategory;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Evaluated only on an explicit API call (`run_checks` with an empty
/// selection falling back to this trigger's ids); carries no scheduling
/// state of its own.
#[derive(Debug, Clone)]
pub struct OnDemandTrigger {
    pub id: String,
    pub check_ids: Vec<String>,
}

impl OnDemandTrigger {
    pub fn new(check_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            check_ids,
        }
    }
}

/// Parse a standard five-field cron expression (`minute hour day-of-month
/// month day-of-week`, spec §6.6) by delegating to the `cron` crate, which
/// expects a leading seconds field — prepend a literal `0` rather than
/// asking callers to write six fields.
fn parse_five_field_cron(expression: &str) -> Result<Schedule, TriggerError> {
    let field_count = expression.split_whitespace().count();
    if field_count != 5 {
        return Err(TriggerError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: format!("expected 5 fields (minute hour day-of-month month day-of-week), found {field_count}"),
        });
    }
    Schedule::from_str(&format!("0 {expression}")).map_err(|e| TriggerError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Carries a cron expression, the next fire time, and the check ids/
/// categories to run. The scheduler tick (spec §4.6) asks `fire_if_due`
/// whether `now >= next_run`; on a hit, `next_run` is advanced to the first
/// slot strictly after `now` — if several ticks were missed the trigger
/// fires exactly once and jumps straight to the next future slot rather than
/// queuing up a catch-up storm.
pub struct ScheduledTrigger {
    pub id: String,
    pub connection_id: ConnectionId,
    pub expression: String,
    pub check_ids: Vec<String>,
    pub categories: Option<Vec<CheckCategory>>,
    schedule: Schedule,
    next_run: Mutex<DateTime<Utc>>,
    /// Guards against a dispatch starting while the previous one for this
    /// trigger is still running (spec §5, "at most one concurrent run per
    /// trigger"). Set by the orchestrator around the actual check run, not
    /// by `fire_if_due` itself.
    running: AtomicBool,
}

impl ScheduledTrigger {
    pub fn new(
        connection_id: ConnectionId,
        expression: &str,
        check_ids: Vec<String>,
        categories: Option<Vec<CheckCategory>>,
        now: DateTime<Utc>,
    ) -> Result<Self, TriggerError> {
        let schedule = parse_five_field_cron(expression)?;
        let next_run = schedule.after(&now).next().ok_or_else(|| TriggerError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: "schedule never produces a future fire time".to_string(),
        })?;
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            connection_id,
            expression: expression.to_string(),
            check_ids,
            categories,
            schedule,
            next_run: Mutex::new(next_run),
            running: AtomicBool::new(false),
        })
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        *self.next_run.lock().expect("next_run mutex poisoned")
    }

    /// Returns `true` if `now` is at or past `next_run`, advancing `next_run`
    /// to the next future slot as a side effect either way it resolves.
    pub fn fire_if_due(&self, now: DateTime<Utc>) -> bool {
        let mut next_run = self.next_run.lock().expect("next_run mutex poisoned");
        if now < *next_run {
            return false;
        }
        if let Some(upcoming) = self.schedule.after(&now).next() {
            *next_run = upcoming;
        }
        true
    }

    pub fn try_begin_run(&self) -> bool {
        self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    pub fn finish_run(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPhase {
    Before,
    After,
}

impl DeploymentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentPhase::Before => "before",
            DeploymentPhase::After => "after",
        }
    }
}

/// Carries `check_ids` (`None` lets the orchestrator fall back to running
/// every enabled check), and which deployment phases it applies to.
#[derive(Debug, Clone)]
pub struct DeploymentTrigger {
    pub id: String,
    pub check_ids: Option<Vec<String>>,
    pub run_before: bool,
    pub run_after: bool,
}

impl DeploymentTrigger {
    pub fn new(check_ids: Option<Vec<String>>, run_before: bool, run_after: bool) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            check_ids,
            run_before,
            run_after,
        }
    }

    pub fn matches(&self, phase: DeploymentPhase) -> bool {
        match phase {
            DeploymentPhase::Before => self.run_before,
            DeploymentPhase::After => self.run_after,
        }
    }
}

/// Holds every registered trigger, grouped by kind for the lookups
/// `CheckOrchestrator` needs (`get_scheduled_triggers`,
/// `get_triggers_by_type(Deployment)`).
pub struct TriggerManager {
    on_demand: Mutex<Vec<std::sync::Arc<OnDemandTrigger>>>,
    scheduled: Mutex<Vec<std::sync::Arc<ScheduledTrigger>>>,
    deployment: Mutex<Vec<std::sync::Arc<DeploymentTrigger>>>,
}

impl TriggerManager {
    pub fn new() -> Self {
        Self {
            on_demand: Mutex::new(Vec::new()),
            scheduled: Mutex::new(Vec::new()),
            deployment: Mutex::new(Vec::new()),
        }
    }

    pub fn add_on_demand(&self, trigger: std::sync::Arc<OnDemandTrigger>) {
        self.on_demand.lock().expect("on_demand mutex poisoned").push(trigger);
    }

    pub fn add_scheduled(&self, trigger: std::sync::Arc<ScheduledTrigger>) {
        self.scheduled.lock().expect("scheduled mutex poisoned").push(trigger);
    }

    pub fn add_deployment(&self, trigger: std::sync::Arc<DeploymentTrigger>) {
        self.deployment.lock().expect("deployment mutex poisoned").push(trigger);
    }

    pub fn scheduled_triggers(&self) -> Vec<std::sync::Arc<ScheduledTrigger>> {
        self.scheduled.lock().expect("scheduled mutex poisoned").clone()
    }

    pub fn deployment_triggers(&self) -> Vec<std::sync::Arc<DeploymentTrigger>> {
        self.deployment.lock().expect("deployment mutex poisoned").clone()
    }

    pub fn on_demand_triggers(&self) -> Vec<std::sync::Arc<OnDemandTrigger>> {
        self.on_demand.lock().expect("on_demand mutex poisoned").clone()
    }
}

impl Default for TriggerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn rejects_expressions_with_wrong_field_count() {
        let err = ScheduledTrigger::new(ConnectionId::from("c1"), "* * *", vec![], None, at(0));
        assert!(err.is_err());
    }

    #[test]
    fn fires_on_five_minute_boundaries_and_skips_missed_ticks() {
        let trigger = ScheduledTrigger::new(ConnectionId::from("c1"), "*/5 * * * *", vec!["PERF001".into()], None, at(0)).unwrap();

        // Between minute 0 and minute 5, nothing is due yet.
        assert!(!trigger.fire_if_due(at(2)));
        // A tick landing past two missed 5-minute boundaries still fires once.
        assert!(trigger.fire_if_due(at(11)));
        // Immediately re-checking the same instant does not re-fire.
        assert!(!trigger.fire_if_due(at(11)));
        assert!(trigger.next_run() > at(11));
    }

    #[test]
    fn overlap_guard_rejects_concurrent_begin() {
        let trigger = ScheduledTrigger::new(ConnectionId::from("c1"), "*/5 * * * *", vec![], None, at(0)).unwrap();
        assert!(trigger.try_begin_run());
        assert!(!trigger.try_begin_run());
        trigger.finish_run();
        assert!(trigger.try_begin_run());
    }

    #[test]
    fn deployment_trigger_matches_configured_phases() {
        let trigger = DeploymentTrigger::new(Some(vec!["SEC001".into()]), true, false);
        assert!(trigger.matches(DeploymentPhase::Before));
        assert!(!trigger.matches(DeploymentPhase::After));
    }
}
