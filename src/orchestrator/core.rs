//! [`CheckOrchestrator`] — run one or more checks against one connection as
//! a single [`CheckExecution`] (spec §4.6).

use crate::checks::{Check, CheckRegistry};
use crate::config::OrchestratorConfig;
use crate::error::TransportError;
use crate::external::ConnectionProvider;
use crate::ids::{ConnectionId, ExecutionId, TenantId};
use crate::model::check::{CheckCategory, CheckExecution, CheckResult, CheckStatus, DatabaseHealth, TriggerType};
use crate::model::schema::DatabaseSchema;
use crate::orchestrator::health::HealthCache;
use crate::orchestrator::triggers::{DeploymentPhase, DeploymentTrigger, TriggerManager};
use crate::orchestrator::webhook;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Captures a "before" schema snapshot ahead of a deployment's `before`
/// phase checks (spec §4.6 step 3, §4.6 `DeploymentTrigger`). A thin seam
/// over [`crate::schema::SchemaExtractor`] so the orchestrator does not need
/// to know which engine a connection speaks.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn capture(&self, connection_id: &ConnectionId) -> Result<DatabaseSchema, TransportError>;
}

/// Which checks to run, resolved against a [`CheckRegistry`] (spec §4.6 step 2):
/// explicit ids, union a category filter, union a framework filter, minus
/// `excluded_checks` from [`OrchestratorConfig`].
#[derive(Debug, Clone, Default)]
pub struct CheckSelection {
    pub check_ids: Vec<String>,
    pub category: Option<CheckCategory>,
    pub framework: Option<String>,
}

impl CheckSelection {
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            check_ids: ids,
            ..Default::default()
        }
    }

    pub fn by_category(category: CheckCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    fn resolve(&self, registry: &CheckRegistry, excluded: &HashSet<String>) -> Vec<Arc<dyn Check>> {
        let mut seen = HashSet::new();
        let mut checks = Vec::new();

        for id in &self.check_ids {
            if excluded.contains(id) || !seen.insert(id.clone()) {
                continue;
            }
            if let Some(check) = registry.get(id) {
                checks.push(check);
            }
        }
        if let Some(category) = self.category {
            for def in registry.list(Some(category), None, None) {
                if excluded.contains(&def.id) || !seen.insert(def.id.clone()) {
                    continue;
                }
                if let Some(check) = registry.get(&def.id) {
                    checks.push(check);
                }
            }
        }
        if let Some(framework) = &self.framework {
            for check in registry.for_framework(framework) {
                let id = &check.definition().id;
                if excluded.contains(id) || !seen.insert(id.clone()) {
                    continue;
                }
                checks.push(check);
            }
        }
        checks
    }
}

pub struct CheckOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<CheckRegistry>,
    connections: Arc<dyn ConnectionProvider>,
    snapshotter: Option<Arc<dyn SnapshotProvider>>,
    health: HealthCache,
    executions: DashMap<String, CheckExecution>,
    webhook_client: reqwest::Client,
}

impl CheckOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<CheckRegistry>,
        connections: Arc<dyn ConnectionProvider>,
        snapshotter: Option<Arc<dyn SnapshotProvider>>,
    ) -> Self {
        Self {
            config,
            registry,
            connections,
            snapshotter,
            health: HealthCache::new(),
            executions: DashMap::new(),
            webhook_client: reqwest::Client::new(),
        }
    }

    pub async fn health_for(&self, connection_id: &ConnectionId) -> Option<DatabaseHealth> {
        self.health.get(connection_id).await
    }

    pub fn execution(&self, id: &ExecutionId) -> Option<CheckExecution> {
        self.executions.get(id.as_str()).map(|e| e.clone())
    }

    /// Run `selection` against `connection_id` as one [`CheckExecution`]
    /// (spec §4.6). The only error this returns is a capture failure for the
    /// optional before-snapshot; a failure acquiring a session for any
    /// individual check is captured as that check's own `error` result
    /// rather than aborting the whole execution.
    pub async fn run_checks(
        &self,
        connection_id: ConnectionId,
        selection: CheckSelection,
        trigger_type: TriggerType,
        trigger_source: Option<String>,
    ) -> Result<CheckExecution, TransportError> {
        let mut execution = CheckExecution::new(
            TenantId::from(self.config.tenant_id.clone()),
            connection_id.clone(),
            trigger_type,
            trigger_source,
        );
        self.executions.insert(execution.id.as_str().to_string(), execution.clone());

        if trigger_type == TriggerType::Deployment {
            if let Some(snapshotter) = &self.snapshotter {
                execution.before_snapshot = Some(snapshotter.capture(&connection_id).await?);
            }
        }

        let checks = selection.resolve(&self.registry, &self.config.excluded_checks);
        info!(connection_id = %connection_id, checks = checks.len(), "starting check execution");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let timeout = Duration::from_secs(self.config.check_timeout_seconds.max(1));

        let mut handles = Vec::with_capacity(checks.len());
        for check in checks {
            let semaphore = semaphore.clone();
            let connections = self.connections.clone();
            let connection_id = connection_id.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                run_one_check(check, connections, connection_id, timeout).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!(error = %join_error, "check task panicked; recording as error result");
                    results.push(CheckResult::error("unknown", "unknown", format!("check task panicked: {join_error}")));
                }
            }
        }

        execution.results = results;
        execution.finish();
        self.health.update(&connection_id, &execution.results).await;
        self.executions.insert(execution.id.as_str().to_string(), execution.clone());

        self.maybe_alert(&execution).await;

        Ok(execution)
    }

    /// §4.6 step 8: enqueue a fire-and-forget webhook if configured and the
    /// alert condition is met. Never blocks `run_checks`'s return.
    async fn maybe_alert(&self, execution: &CheckExecution) {
        let Some(url) = self.config.alert_webhook_url.clone() else {
            return;
        };
        let critical = execution.critical_count() as u32;
        let failed = execution.failed_count() as u32;
        let should_alert = (self.config.alert_on_critical && critical > 0) || (self.config.alert_on_failure && failed > 0);
        if !should_alert {
            return;
        }

        let client = self.webhook_client.clone();
        let execution_id = execution.id.clone();
        let connection_id = execution.connection_id.clone();
        let tenant_id = execution.tenant_id.clone();
        let status = execution.status;
        tokio::spawn(async move {
            webhook::notify(&client, &url, &execution_id, &connection_id, &tenant_id, status, critical, failed).await;
        });
    }

    /// Union the check ids of every registered deployment trigger matching
    /// `phase`, and dispatch as one execution tagged
    /// `trigger_source = "{deployment_id}:{phase}"` (spec §4.6
    /// `DeploymentTrigger`).
    pub async fn run_deployment_checks(
        &self,
        connection_id: ConnectionId,
        deployment_id: &str,
        phase: DeploymentPhase,
        triggers: &[Arc<DeploymentTrigger>],
    ) -> Result<CheckExecution, TransportError> {
        let mut ids = HashSet::new();
        for trigger in triggers.iter().filter(|t| t.matches(phase)) {
            match &trigger.check_ids {
                Some(explicit) => ids.extend(explicit.iter().cloned()),
                None => ids.extend(self.registry.all_definitions().into_iter().map(|d| d.id.clone())),
            }
        }

        self.run_checks(
            connection_id,
            CheckSelection::by_ids(ids.into_iter().collect()),
            TriggerType::Deployment,
            Some(format!("{deployment_id}:{}", phase.as_str())),
        )
        .await
    }

    /// Evaluate every scheduled trigger in `manager` against `now` and
    /// dispatch the ones that are due, skipping any whose previous run has
    /// not finished (spec §4.6 `ScheduledTrigger`, §5 "at most one
    /// concurrent run per trigger"). Intended to be called once per
    /// scheduler tick (every 60s in production; driven explicitly in tests).
    pub async fn dispatch_due_triggers(&self, manager: &TriggerManager, now: chrono::DateTime<chrono::Utc>) {
        for trigger in manager.scheduled_triggers() {
            if !trigger.fire_if_due(now) {
                continue;
            }
            if !trigger.try_begin_run() {
                warn!(trigger_id = %trigger.id, "scheduled trigger is still running from a previous tick; skipping this fire");
                continue;
            }
            let selection = if let Some(categories) = &trigger.categories {
                // Only the first declared category is honored when a
                // trigger names several; `CheckSelection` carries one.
                CheckSelection {
                    check_ids: trigger.check_ids.clone(),
                    category: categories.first().copied(),
                    framework: None,
                }
            } else {
                CheckSelection::by_ids(trigger.check_ids.clone())
            };
            if let Err(e) = self
                .run_checks(trigger.connection_id.clone(), selection, TriggerType::Scheduled, Some(trigger.id.clone()))
                .await
            {
                warn!(trigger_id = %trigger.id, error = %e, "scheduled check dispatch failed to acquire a session");
            }
            trigger.finish_run();
        }
    }
}

/// Run one check with a timeout, adapting both a connection failure and a
/// timeout into a synthetic `error` [`CheckResult`] so neither can propagate
/// out of the bounded-concurrency pool (spec §4.6 step 5, §5 cancellation).
async fn run_one_check(
    check: Arc<dyn Check>,
    connections: Arc<dyn ConnectionProvider>,
    connection_id: ConnectionId,
    timeout: Duration,
) -> CheckResult {
    let definition = check.definition().clone();
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, async {
        let mut session = connections
            .acquire(&connection_id)
            .await
            .map_err(|e| format!("failed to acquire session: {e}"))?;
        Ok::<CheckResult, String>(check.execute(&mut *session).await)
    })
    .await;

    let mut result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(message)) => CheckResult::error(&definition.id, &definition.name, message),
        Err(_) => CheckResult::error(
            &definition.id,
            &definition.name,
            format!("timeout after {}s", timeout.as_secs()),
        ),
    };
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{Cursor, DatabaseSession};
    use crate::model::diff::Severity;
    use crate::model::check::CheckDefinition;
    use std::collections::{HashMap, HashSet as StdHashSet};
    use tokio::time::sleep;

    struct FakeSession;
    #[async_trait]
    impl DatabaseSession for FakeSession {
        async fn execute(&mut self, _sql: &str, _params: &[serde_json::Value]) -> Result<Cursor, TransportError> {
            Ok(Cursor::default())
        }
        async fn commit(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn rollback(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct FakeProvider;
    #[async_trait]
    impl ConnectionProvider for FakeProvider {
        async fn acquire(&self, _connection_id: &ConnectionId) -> Result<Box<dyn DatabaseSession>, TransportError> {
            Ok(Box::new(FakeSession))
        }
    }

    fn definition(id: &str) -> CheckDefinition {
        CheckDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            category: CheckCategory::Performance,
            default_severity: Severity::Medium,
            frameworks: StdHashSet::new(),
            tags: StdHashSet::new(),
            parameters: HashMap::new(),
            enabled: true,
        }
    }

    struct FastCheck(CheckDefinition);
    #[async_trait]
    impl Check for FastCheck {
        fn definition(&self) -> &CheckDefinition {
            &self.0
        }
        async fn execute(&self, _session: &mut dyn DatabaseSession) -> CheckResult {
            CheckResult {
                check_id: self.0.id.clone(),
                check_name: self.0.name.clone(),
                category: self.0.category,
                severity: Severity::Low,
                status: CheckStatus::Passed,
                message: "ok".into(),
                details: serde_json::Value::Null,
                remediation: None,
                affected_objects: vec![],
                duration_ms: 0,
            }
        }
    }

    struct SlowCheck(CheckDefinition, Duration);
    #[async_trait]
    impl Check for SlowCheck {
        fn definition(&self) -> &CheckDefinition {
            &self.0
        }
        async fn execute(&self, _session: &mut dyn DatabaseSession) -> CheckResult {
            sleep(self.1).await;
            CheckResult {
                check_id: self.0.id.clone(),
                check_name: self.0.name.clone(),
                category: self.0.category,
                severity: Severity::Low,
                status: CheckStatus::Passed,
                message: "should never be observed".into(),
                details: serde_json::Value::Null,
                remediation: None,
                affected_objects: vec![],
                duration_ms: 0,
            }
        }
    }

    /// Scenario S4: one check passes quickly, another blocks past the
    /// timeout; the execution still completes around `check_timeout_seconds`
    /// with the blocked check's result marked `error`.
    #[tokio::test(start_paused = true)]
    async fn s4_timeout_produces_error_result_without_blocking_execution() {
        let mut registry = CheckRegistry::empty();
        registry.register(Arc::new(FastCheck(definition("A"))));
        registry.register(Arc::new(SlowCheck(definition("B"), Duration::from_secs(4))));

        let mut config = OrchestratorConfig::new("tenant-1");
        config.max_concurrent_checks = 2;
        config.check_timeout_seconds = 1;

        let orchestrator = CheckOrchestrator::new(config, Arc::new(registry), Arc::new(FakeProvider), None);

        let handle = tokio::spawn(async move {
            orchestrator
                .run_checks(
                    ConnectionId::from("conn-1"),
                    CheckSelection::by_ids(vec!["A".into(), "B".into()]),
                    TriggerType::OnDemand,
                    None,
                )
                .await
                .unwrap()
        });

        tokio::time::advance(Duration::from_secs(2)).await;
        let execution = handle.await.unwrap();

        assert_eq!(execution.results.len(), 2);
        let a = execution.results.iter().find(|r| r.check_id == "A").unwrap();
        let b = execution.results.iter().find(|r| r.check_id == "B").unwrap();
        assert_eq!(a.status, CheckStatus::Passed);
        assert_eq!(b.status, CheckStatus::Error);
        assert!(b.message.starts_with("timeout after"));
        assert_eq!(execution.status, CheckStatus::Error);
    }

    #[tokio::test]
    async fn results_are_sorted_by_check_id_regardless_of_completion_order() {
        let mut registry = CheckRegistry::empty();
        registry.register(Arc::new(FastCheck(definition("ZCHECK"))));
        registry.register(Arc::new(FastCheck(definition("ACHECK"))));

        let config = OrchestratorConfig::new("tenant-1");
        let orchestrator = CheckOrchestrator::new(config, Arc::new(registry), Arc::new(FakeProvider), None);

        let execution = orchestrator
            .run_checks(
                ConnectionId::from("conn-1"),
                CheckSelection::by_ids(vec!["ZCHECK".into(), "ACHECK".into()]),
                TriggerType::OnDemand,
                None,
            )
            .await
            .unwrap();

        assert_eq!(execution.results[0].check_id, "ACHECK");
        assert_eq!(execution.results[1].check_id, "ZCHECK");
    }

    #[tokio::test]
    async fn health_cache_is_updated_after_a_run() {
        let mut registry = CheckRegistry::empty();
        registry.register(Arc::new(FastCheck(definition("A"))));
        let config = OrchestratorConfig::new("tenant-1");
        let orchestrator = CheckOrchestrator::new(config, Arc::new(registry), Arc::new(FakeProvider), None);
        let connection = ConnectionId::from("conn-1");

        orchestrator
            .run_checks(connection.clone(), CheckSelection::by_ids(vec!["A".into()]), TriggerType::OnDemand, None)
            .await
            .unwrap();

        let health = orchestrator.health_for(&connection).await.unwrap();
        assert_eq!(health.checks_passed, 1);
    }
}
