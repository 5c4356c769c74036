//! Deterministic cluster collectors for demos and tests.
//!
//! Each profile reproduces a classic failure signature so a full diagnostic
//! session can run without a cluster.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{Collector, ToolArgs};
use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockProfile {
    /// Healthy-looking pod with noisy logs.
    #[default]
    Default,
    /// Container exits with an error and restarts.
    Crashloop,
    /// Image cannot be pulled from a private registry.
    Imagepullbackoff,
}

impl FromStr for MockProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(MockProfile::Default),
            "crashloop" | "crashloopbackoff" => Ok(MockProfile::Crashloop),
            "imagepullbackoff" | "imagepull" => Ok(MockProfile::Imagepullbackoff),
            other => Err(format!("unknown mock profile '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockClusterCollector {
    profile: MockProfile,
}

impl MockClusterCollector {
    pub fn new(profile: MockProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> MockProfile {
        self.profile
    }

    fn pull_failing(&self) -> bool {
        self.profile == MockProfile::Imagepullbackoff
    }

    fn pod_diagnostics(&self, name: &str, namespace: &str) -> Value {
        match self.profile {
            MockProfile::Imagepullbackoff => json!({
                "phase": "ImagePullBackOff",
                "restarts": 0,
                "last_exit_reason": "ErrImagePull",
                "last_exit_code": null,
                "current_logs": format!("Failed to pull image for {} in {} (private registry/auth required)", name, namespace),
                "previous_logs": ""
            }),
            MockProfile::Crashloop | MockProfile::Default => {
                let crashing = self.profile == MockProfile::Crashloop;
                json!({
                    "phase": if crashing { "CrashLoopBackOff" } else { "Running" },
                    "restarts": if crashing { 3 } else { 0 },
                    "last_exit_reason": if crashing { Some("Error") } else { None },
                    "last_exit_code": if crashing { Some(1) } else { None },
                    "current_logs": format!("CRITICAL: {} in {} experiencing repeated failures; readiness probe failing", name, namespace),
                    "previous_logs": "java.lang.NullPointerException at com.app.Main.init..."
                })
            }
        }
    }

    fn pod_events(&self, name: &str, limit: usize) -> Value {
        let events = if self.pull_failing() {
            vec![
                json!({"type": "Warning", "reason": "ErrImagePull", "message": format!("Failed to pull image for {}", name), "count": 3}),
                json!({"type": "Warning", "reason": "ImagePullBackOff", "message": format!("Back-off pulling image for {}", name), "count": 2}),
            ]
        } else {
            vec![
                json!({"type": "Warning", "reason": "BackOff", "message": format!("Back-off restarting container for {}", name), "count": 5}),
                json!({"type": "Normal", "reason": "Pulled", "message": format!("Successfully pulled image for {}", name), "count": 1}),
            ]
        };
        Value::Array(tail(events, limit))
    }

    fn image_pull_events(&self, name: &str) -> Value {
        let (pull, backoff) = if self.pull_failing() { (5, 3) } else { (3, 2) };
        json!([
            {"type": "Warning", "reason": "ErrImagePull", "message": format!("Failed to pull image for {}", name), "count": pull},
            {"type": "Warning", "reason": "ImagePullBackOff", "message": format!("Back-off pulling image for {}", name), "count": backoff},
        ])
    }

    fn service_account(&self, name: &str) -> Value {
        if self.pull_failing() {
            json!({"name": name, "secrets": [], "imagePullSecrets": []})
        } else {
            json!({"name": name, "secrets": ["default-token-abc123"], "imagePullSecrets": ["regcred"]})
        }
    }

    fn workload(&self, kind: &str, name: &str, namespace: &str) -> Value {
        let image = if self.pull_failing() {
            "private.registry.local/protected/app:latest"
        } else {
            "mock.registry.local/mock:latest"
        };
        json!({
            "apiVersion": "apps/v1",
            "kind": kind,
            "metadata": {"name": name, "namespace": namespace},
            "spec": {
                "replicas": 2,
                "selector": {"matchLabels": {"app": name}},
                "template": {
                    "metadata": {"labels": {"app": name}},
                    "spec": {
                        "containers": [{
                            "name": name,
                            "image": image,
                            "resources": {
                                "requests": {"cpu": "100m", "memory": "128Mi"},
                                "limits": {"cpu": "200m", "memory": "256Mi"}
                            },
                            "env": [{"name": "JAVA_OPTS", "value": "-Xmx128m"}]
                        }]
                    }
                }
            }
        })
    }

    fn top_metrics(&self, name: &str, namespace: &str) -> Value {
        let (cpu, memory) = if self.pull_failing() {
            ("0m", "0Mi")
        } else {
            ("50m", "180Mi")
        };
        json!({
            "metadata": {"name": name, "namespace": namespace},
            "timestamp": "2026-01-18T00:00:00Z",
            "containers": [{"name": name, "usage": {"cpu": cpu, "memory": memory}}]
        })
    }
}

fn tail(mut items: Vec<Value>, limit: usize) -> Vec<Value> {
    let skip = items.len().saturating_sub(limit);
    items.drain(..skip);
    items
}

#[async_trait]
impl Collector for MockClusterCollector {
    async fn call(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        debug!(collector = name, profile = ?self.profile, "mock collector call");
        let limit = || args.unsigned("limit").map(|l| l as usize);
        let report = match name {
            "get_pod_diagnostics" => self.pod_diagnostics(&args.string("name")?, &args.string("namespace")?),
            "get_pod_events" => self.pod_events(&args.string("name")?, limit()?),
            "get_image_pull_events" => self.image_pull_events(&args.string("name")?),
            "get_service_account_details" => self.service_account(&args.string("name")?),
            "get_secret_exists" => {
                args.string("name")?;
                json!({"exists": !self.pull_failing()})
            }
            "get_workload_yaml" => self.workload(
                &args.string("kind")?,
                &args.string("name")?,
                &args.string("namespace")?,
            ),
            "get_pod_top_metrics" => self.top_metrics(&args.string("name")?, &args.string("namespace")?),
            "get_pod_scheduling_events" => {
                let name = args.string("name")?;
                Value::Array(tail(
                    vec![json!({
                        "reason": "FailedScheduling",
                        "message": format!("0/3 nodes are available: 3 Insufficient memory for {}.", name),
                        "count": 4
                    })],
                    limit()?,
                ))
            }
            "get_nodes_overview" => json!([
                {"name": "node-1", "allocatable": {"cpu": "4", "memory": "8Gi"}, "taints": []},
                {"name": "node-2", "allocatable": {"cpu": "8", "memory": "16Gi"},
                 "taints": [{"key": "dedicated", "value": "db", "effect": "NoSchedule"}]}
            ]),
            "get_pvc_details" => json!({
                "name": args.string("name")?,
                "status": "Bound",
                "volumeName": "pv-123",
                "storageClass": "standard",
                "accessModes": ["ReadWriteOnce"],
                "resources": {"requests": {"storage": "10Gi"}}
            }),
            "get_namespace_resource_quota" => {
                let namespace = args.string("namespace")?;
                json!([{
                    "metadata": {"name": "compute-quota", "namespace": namespace},
                    "spec": {"hard": {"pods": "20", "limits.cpu": "10", "limits.memory": "20Gi"}},
                    "status": {"used": {"pods": "5", "limits.cpu": "3", "limits.memory": "6Gi"}}
                }])
            }
            "get_namespace_limit_ranges" => {
                let namespace = args.string("namespace")?;
                json!([{
                    "metadata": {"name": "default-limits", "namespace": namespace},
                    "spec": {"limits": [{
                        "type": "Container",
                        "default": {"cpu": "500m", "memory": "512Mi"},
                        "defaultRequest": {"cpu": "250m", "memory": "256Mi"}
                    }]}
                }])
            }
            other => return Err(ToolError::Command(format!("no mock collector named '{}'", other))),
        };
        serde_json::to_string_pretty(&report).map_err(|e| ToolError::Command(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{cluster_catalogue, ToolRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    fn pod_args() -> ToolArgs {
        ToolArgs::new().with("name", "web-0").with("namespace", "default")
    }

    #[tokio::test]
    async fn test_crashloop_profile_reports_restarts() {
        let mock = MockClusterCollector::new(MockProfile::Crashloop);
        let text = mock.call("get_pod_diagnostics", &pod_args()).await.unwrap();
        let report: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(report["phase"], "CrashLoopBackOff");
        assert_eq!(report["restarts"], 3);
        assert_eq!(report["last_exit_code"], 1);
    }

    #[tokio::test]
    async fn test_imagepull_profile_hides_pull_secret() {
        let mock = MockClusterCollector::new(MockProfile::Imagepullbackoff);
        let text = mock.call("get_secret_exists", &pod_args()).await.unwrap();
        assert!(text.contains("false"));
        let text = mock
            .call("get_service_account_details", &pod_args())
            .await
            .unwrap();
        let sa: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sa["imagePullSecrets"], json!([]));
    }

    #[tokio::test]
    async fn test_event_limit_keeps_most_recent() {
        let mock = MockClusterCollector::default();
        let text = mock
            .call("get_pod_events", &pod_args().with("limit", 1))
            .await
            .unwrap();
        let events: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(events.as_array().unwrap().len(), 1);
        assert_eq!(events[0]["reason"], "Pulled");
    }

    #[tokio::test]
    async fn test_every_catalogue_entry_answers() {
        let registry = ToolRegistry::with_catalogue(
            Arc::new(MockClusterCollector::new(MockProfile::Crashloop)),
            Duration::from_secs(1),
        );
        let fallback = ToolArgs::new()
            .with("name", "web-0")
            .with("namespace", "default")
            .with("kind", "Deployment");
        for spec in cluster_catalogue() {
            let text = registry.dispatch(spec.name, None, &fallback).await.unwrap();
            assert!(!text.starts_with("Tool Error"), "{} failed: {}", spec.name, text);
        }
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("CrashLoop".parse::<MockProfile>().unwrap(), MockProfile::Crashloop);
        assert_eq!("".parse::<MockProfile>().unwrap(), MockProfile::Default);
        assert!("oom".parse::<MockProfile>().is_err());
    }
}
