//! Wires the default scheduled-job actions (spec §4.7 default job set) to
//! the command dispatch registry: `scan-network` against whatever probe
//! adapters were injected, `cleanup-queue` against the durable queue's GC
//! and reaper, `check-updates` against the self-update handler when one is
//! configured.

use std::sync::Arc;

use fleetlink_core::{HandlerRegistry, ProbeSet, ProbeTarget, QueuePort, SelfUpdateHandler};
use fleetlink_domain::CommandOutcome;
use serde_json::Value;

/// Build the registry the agent dispatches scheduled (and control-link)
/// commands through. `probes` and `updater` may be entirely unwired; every
/// action still resolves, reporting "not available" instead of failing the
/// dispatch.
#[must_use]
pub fn build_registry(
    queue: Arc<dyn QueuePort>,
    probes: ProbeSet,
    updater: Option<Arc<dyn SelfUpdateHandler>>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let probes = Arc::new(probes);
    let scan_probes = Arc::clone(&probes);
    registry.register("scan-network", Arc::new(move |params: Value| {
        let probes = Arc::clone(&scan_probes);
        async move { scan_network(&probes, params).await }
    }));

    let cleanup_queue = Arc::clone(&queue);
    registry.register("cleanup-queue", Arc::new(move |_params: Value| {
        let queue = Arc::clone(&cleanup_queue);
        async move { cleanup_queue_action(queue.as_ref()).await }
    }));

    let scheduled_updater = updater.clone();
    registry.register("check-updates", Arc::new(move |params: Value| {
        let updater = scheduled_updater.clone();
        async move { check_updates(updater.as_deref(), params).await }
    }));

    // The server can also push a self-update command directly over the
    // control link, outside the weekly scheduled check.
    registry.register("self_update", Arc::new(move |params: Value| {
        let updater = updater.clone();
        async move { check_updates(updater.as_deref(), params).await }
    }));

    registry
}

async fn scan_network(probes: &ProbeSet, params: Value) -> CommandOutcome {
    let Some(address) = params.get("address").and_then(Value::as_str) else {
        return CommandOutcome::error("scan-network requires an \"address\" parameter");
    };
    let credentials = params.get("credentials").cloned().unwrap_or(Value::Null);
    let target = ProbeTarget { address: address.to_string(), credentials };

    let adapter = params
        .get("adapter")
        .and_then(Value::as_str)
        .and_then(|name| match name {
            "ssh" => probes.ssh.as_ref(),
            "snmp" => probes.snmp.as_ref(),
            "port_scanner" => probes.port_scanner.as_ref(),
            "dns_resolver" => probes.dns_resolver.as_ref(),
            _ => probes.wmi.as_ref(),
        })
        .or(probes.wmi.as_ref());

    match adapter {
        Some(adapter) => CommandOutcome::success(adapter.probe(target).await),
        None => CommandOutcome::success(
            serde_json::json!({"success": false, "error": "no probe adapter configured"}),
        ),
    }
}

async fn cleanup_queue_action(queue: &dyn QueuePort) -> CommandOutcome {
    if let Err(e) = queue.gc_expired().await {
        return CommandOutcome::error(format!("gc_expired failed: {e}"));
    }
    match queue.reap_old(fleetlink_domain::constants::DEFAULT_CLEANUP_DAYS).await {
        Ok(reaped) => CommandOutcome::success(serde_json::json!({"reaped": reaped})),
        Err(e) => CommandOutcome::error(format!("reap_old failed: {e}")),
    }
}

async fn check_updates(updater: Option<&dyn SelfUpdateHandler>, params: Value) -> CommandOutcome {
    let Some(updater) = updater else {
        return CommandOutcome::success(serde_json::json!({"available": false}));
    };
    let (Some(download_url), Some(checksum)) = (
        params.get("download_url").and_then(Value::as_str),
        params.get("checksum").and_then(Value::as_str),
    ) else {
        return CommandOutcome::success(serde_json::json!({"available": false}));
    };

    let applied = updater.apply(download_url, checksum).await;
    CommandOutcome::success(serde_json::json!({"applied": applied}))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use fleetlink_core::{QueueError, QueueResult};
    use fleetlink_domain::{Envelope, NewEnvelope, QueueStats, ResultStatus};

    use super::*;

    #[derive(Default)]
    struct NoopQueue;

    #[async_trait]
    impl QueuePort for NoopQueue {
        async fn enqueue(&self, _e: NewEnvelope) -> QueueResult<i64> {
            Ok(1)
        }
        async fn dequeue(&self, _b: usize) -> QueueResult<Vec<Envelope>> {
            Ok(Vec::new())
        }
        async fn mark_sent(&self, _id: i64) -> QueueResult<()> {
            Ok(())
        }
        async fn mark_failed(&self, _id: i64, _e: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn mark_expired(&self, _id: i64) -> QueueResult<()> {
            Ok(())
        }
        async fn get_all_pending(&self) -> QueueResult<Vec<Envelope>> {
            Ok(Vec::new())
        }
        async fn gc_expired(&self) -> QueueResult<()> {
            Ok(())
        }
        async fn reap_old(&self, _days: i64) -> QueueResult<usize> {
            Ok(3)
        }
        async fn stats(&self) -> QueueResult<QueueStats> {
            Ok(QueueStats::default())
        }
    }

    #[tokio::test]
    async fn scan_network_without_an_address_is_a_typed_error() {
        let registry = build_registry(Arc::new(NoopQueue), ProbeSet::empty(), None);
        let outcome = registry.dispatch("scan-network", serde_json::json!({})).await.unwrap();
        assert_eq!(outcome.status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn scan_network_with_no_adapters_reports_unavailable_not_an_error() {
        let registry = build_registry(Arc::new(NoopQueue), ProbeSet::empty(), None);
        let outcome = registry
            .dispatch("scan-network", serde_json::json!({"address": "10.0.0.1"}))
            .await
            .unwrap();
        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.data.unwrap()["success"], false);
    }

    #[tokio::test]
    async fn cleanup_queue_reports_reaped_count() {
        let registry = build_registry(Arc::new(NoopQueue), ProbeSet::empty(), None);
        let outcome = registry.dispatch("cleanup-queue", Value::Null).await.unwrap();
        assert_eq!(outcome.data.unwrap()["reaped"], 3);
    }

    #[tokio::test]
    async fn check_updates_without_an_updater_reports_unavailable() {
        let registry = build_registry(Arc::new(NoopQueue), ProbeSet::empty(), None);
        let outcome = registry.dispatch("check-updates", Value::Null).await.unwrap();
        assert_eq!(outcome.data.unwrap()["available"], false);
    }

    #[tokio::test]
    async fn self_update_is_reachable_as_a_direct_control_link_command() {
        let registry = build_registry(Arc::new(NoopQueue), ProbeSet::empty(), None);
        assert!(registry.is_registered("self_update"));
        let outcome = registry.dispatch("self_update", Value::Null).await.unwrap();
        assert_eq!(outcome.data.unwrap()["available"], false);
    }
}
