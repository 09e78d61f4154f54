//! Fire-and-forget webhook notification (spec §6.7). No retries; failure is
//! logged, never surfaced to the caller of `run_checks`.

use crate::ids::{ConnectionId, ExecutionId, TenantId};
use crate::model::check::CheckStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    execution_id: String,
    connection_id: String,
    tenant_id: String,
    status: String,
    critical_count: u32,
    failed_count: u32,
    timestamp: DateTime<Utc>,
}

/// POST the execution summary to `url`. Spawned as a detached task by the
/// orchestrator so a slow or unreachable webhook never delays `run_checks`
/// returning (spec §4.6 step 8, §6.7: "no backpressure").
pub async fn notify(
    client: &reqwest::Client,
    url: &str,
    execution_id: &ExecutionId,
    connection_id: &ConnectionId,
    tenant_id: &TenantId,
    status: CheckStatus,
    critical_count: u32,
    failed_count: u32,
) {
    let payload = WebhookPayload {
        execution_id: execution_id.as_str().to_string(),
        connection_id: connection_id.as_str().to_string(),
        tenant_id: tenant_id.as_str().to_string(),
        status: format!("{:?}", status).to_lowercase(),
        critical_count,
        failed_count,
        timestamp: Utc::now(),
    };

    if let Err(e) = client.post(url).json(&payload).send().await {
        warn!(url, error = %e, "webhook notification failed; not retried");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_status_in_snake_case() {
        let payload = WebhookPayload {
            execution_id: "e1".into(),
            connection_id: "c1".into(),
            tenant_id: "t1".into(),
            status: format!("{:?}", CheckStatus::Failed).to_lowercase(),
            critical_count: 0,
            failed_count: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failed_count"], 2);
    }
}
