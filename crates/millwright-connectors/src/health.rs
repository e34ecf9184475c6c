//! The configured connector set and the fan-out health probe.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cmms::Cmms;
use crate::gist::GistPublisher;
use crate::knowledge::KnowledgeStore;
use crate::maintenance::MaintenanceLlm;
use crate::renderer::DiagramRenderer;
use crate::shell::RemoteShell;
use crate::telemetry::TelemetrySource;

/// Every connector the application may have configured. `None` means the
/// service is not configured; skills degrade per their own semantics.
#[derive(Clone, Default)]
pub struct Connectors {
    pub knowledge: Option<Arc<dyn KnowledgeStore>>,
    pub telemetry: Option<Arc<dyn TelemetrySource>>,
    pub cmms: Option<Arc<dyn Cmms>>,
    pub shell: Option<Arc<dyn RemoteShell>>,
    pub maintenance: Option<Arc<dyn MaintenanceLlm>>,
    pub gist: Option<Arc<dyn GistPublisher>>,
    pub renderer: Option<Arc<dyn DiagramRenderer>>,
}

macro_rules! for_each_connector {
    ($self:ident, $c:ident => $body:expr) => {
        if let Some($c) = &$self.knowledge {
            $body
        }
        if let Some($c) = &$self.telemetry {
            $body
        }
        if let Some($c) = &$self.cmms {
            $body
        }
        if let Some($c) = &$self.shell {
            $body
        }
        if let Some($c) = &$self.maintenance {
            $body
        }
        if let Some($c) = &$self.gist {
            $body
        }
        if let Some($c) = &$self.renderer {
            $body
        }
    };
}

impl Connectors {
    /// Names of the configured connectors, in health-report order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for_each_connector!(self, c => out.push(c.name()));
        out
    }

    /// Connect everything at startup; a failing connector is logged and the
    /// rest still come up.
    pub async fn connect_all(&self) {
        for_each_connector!(self, c => {
            match c.connect().await {
                Ok(()) => info!(connector = c.name(), "connected"),
                Err(e) => warn!(connector = c.name(), err = %e, "failed to connect"),
            }
        });
    }

    pub async fn disconnect_all(&self) {
        for_each_connector!(self, c => {
            if let Err(e) = c.disconnect().await {
                warn!(connector = c.name(), err = %e, "failed to disconnect");
            }
        });
    }

    /// Probe every configured connector and aggregate into
    /// `healthy`/`degraded`. `disabled` and `connected` also count as
    /// healthy.
    pub async fn aggregate_health(&self) -> Value {
        let mut results = serde_json::Map::new();
        let mut all_healthy = true;

        for_each_connector!(self, c => {
            let health = c.health_check().await;
            if !status_is_healthy(&health) {
                all_healthy = false;
            }
            results.insert(c.name().to_string(), health);
        });

        json!({
            "status": if all_healthy { "healthy" } else { "degraded" },
            "connectors": results,
        })
    }
}

fn status_is_healthy(health: &Value) -> bool {
    match health.get("status").and_then(Value::as_str) {
        Some(status) => matches!(status, "healthy" | "connected" | "disabled"),
        // per-host maps (the shell connector) have no top-level status;
        // treat the map as healthy when every host in it is
        None => health
            .as_object()
            .map(|hosts| hosts.values().all(status_is_healthy))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorError, ServiceConnector};
    use crate::telemetry::{TagMap, TelemetrySource};
    use async_trait::async_trait;

    struct StubTelemetry {
        healthy: bool,
    }

    #[async_trait]
    impl ServiceConnector for StubTelemetry {
        fn name(&self) -> &'static str {
            "telemetry"
        }
        async fn health_check(&self) -> Value {
            if self.healthy {
                json!({"status": "healthy"})
            } else {
                json!({"status": "unhealthy", "error": "connection refused"})
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for StubTelemetry {
        async fn get_latest_tags(
            &self,
            _node_id: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<TagMap>, ConnectorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn all_healthy_aggregates_healthy() {
        let connectors = Connectors {
            telemetry: Some(Arc::new(StubTelemetry { healthy: true })),
            ..Default::default()
        };
        let health = connectors.aggregate_health().await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["connectors"]["telemetry"]["status"], "healthy");
    }

    #[tokio::test]
    async fn one_unhealthy_connector_degrades() {
        let connectors = Connectors {
            telemetry: Some(Arc::new(StubTelemetry { healthy: false })),
            ..Default::default()
        };
        let health = connectors.aggregate_health().await;
        assert_eq!(health["status"], "degraded");
    }

    #[test]
    fn per_host_maps_aggregate_by_host() {
        let all_ok = json!({"plc": {"status": "healthy"}, "travel": {"status": "healthy"}});
        assert!(status_is_healthy(&all_ok));
        let one_down = json!({"plc": {"status": "healthy"}, "travel": {"status": "unhealthy"}});
        assert!(!status_is_healthy(&one_down));
    }
}
