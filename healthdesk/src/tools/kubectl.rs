//! Collectors backed by the `kubectl` binary.
//!
//! Every call is a read-only `get`/`logs` invocation; the raw JSON is reduced
//! to the fields the diagnostic engine needs before being returned.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use super::{Collector, ToolArgs};
use crate::error::ToolError;

const LOG_TAIL_LINES: u32 = 50;

#[derive(Debug, Clone)]
pub struct KubectlCollector {
    binary: PathBuf,
    context: Option<String>,
}

impl KubectlCollector {
    pub fn new(binary: impl Into<PathBuf>, context: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            context,
        }
    }

    /// Argument vector for a `kubectl` invocation, with the context flag applied.
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if let Some(context) = &self.context {
            argv.push(format!("--context={}", context));
        }
        argv
    }

    async fn run(&self, args: &[&str]) -> Result<String, ToolError> {
        let argv = self.command_line(args);
        debug!(binary = %self.binary.display(), argv = ?argv, "running kubectl");
        let output = Command::new(&self.binary)
            .args(&argv)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::Command(format!("failed to run {}: {}", self.binary.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Command(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_json(&self, args: &[&str]) -> Result<Value, ToolError> {
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| ToolError::Command(format!("unparseable kubectl output: {}", e)))
    }

    async fn pod_diagnostics(&self, name: &str, namespace: &str) -> Result<Value, ToolError> {
        let pod = self.get_json(&["get", "pod", name, "-n", namespace, "-o", "json"]).await?;
        let tail = format!("--tail={}", LOG_TAIL_LINES);
        let current_logs = self
            .run(&["logs", name, "-n", namespace, "--all-containers", &tail])
            .await
            .unwrap_or_else(|e| format!("<logs unavailable: {}>", e));
        let previous_logs = self
            .run(&["logs", name, "-n", namespace, "--all-containers", "--previous", &tail])
            .await
            .unwrap_or_default();
        Ok(summarize_pod(&pod, current_logs, previous_logs))
    }

    async fn pod_events(&self, name: &str, namespace: &str) -> Result<Vec<Value>, ToolError> {
        let selector = format!("involvedObject.name={},involvedObject.kind=Pod", name);
        let events = self
            .get_json(&["get", "events", "-n", namespace, "--field-selector", &selector, "-o", "json"])
            .await?;
        Ok(summarize_events(&events))
    }
}

/// Reject values that kubectl would read as flags.
fn checked(args: &ToolArgs, name: &str) -> Result<String, ToolError> {
    let value = args.string(name)?;
    if value.starts_with('-') || value.contains(char::is_whitespace) {
        return Err(ToolError::InvalidArgument {
            name: name.to_string(),
            expected: "resource name",
        });
    }
    Ok(value)
}

fn items(list: &Value) -> impl Iterator<Item = &Value> {
    list["items"].as_array().into_iter().flatten()
}

fn summarize_pod(pod: &Value, current_logs: String, previous_logs: String) -> Value {
    let statuses = pod["status"]["containerStatuses"].as_array().cloned().unwrap_or_default();
    let restarts: u64 = statuses.iter().filter_map(|s| s["restartCount"].as_u64()).sum();
    let waiting_reason = statuses
        .iter()
        .find_map(|s| s["state"]["waiting"]["reason"].as_str());
    let terminated = statuses
        .iter()
        .map(|s| &s["lastState"]["terminated"])
        .find(|t| t.is_object());
    json!({
        "phase": waiting_reason.or_else(|| pod["status"]["phase"].as_str()),
        "restarts": restarts,
        "last_exit_reason": terminated.and_then(|t| t["reason"].as_str()),
        "last_exit_code": terminated.and_then(|t| t["exitCode"].as_i64()),
        "current_logs": current_logs,
        "previous_logs": previous_logs,
    })
}

fn summarize_events(events: &Value) -> Vec<Value> {
    items(events)
        .map(|e| {
            json!({
                "type": e["type"],
                "reason": e["reason"],
                "message": e["message"],
                "count": e["count"],
            })
        })
        .collect()
}

fn last(mut events: Vec<Value>, limit: u64) -> Value {
    let skip = events.len().saturating_sub(limit as usize);
    events.drain(..skip);
    Value::Array(events)
}

fn reason_matches(event: &Value, needles: &[&str]) -> bool {
    let reason = event["reason"].as_str().unwrap_or_default();
    let message = event["message"].as_str().unwrap_or_default().to_lowercase();
    needles.iter().any(|n| reason.contains(n)) || (needles.contains(&"Pull") && message.contains("image"))
}

fn names(list: &Value) -> Vec<Value> {
    list.as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| entry["name"].as_str().map(|n| json!(n)))
        .collect()
}

#[async_trait]
impl Collector for KubectlCollector {
    async fn call(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        let report = match name {
            "get_pod_diagnostics" => {
                self.pod_diagnostics(&checked(args, "name")?, &checked(args, "namespace")?)
                    .await?
            }
            "get_pod_events" => {
                let events = self
                    .pod_events(&checked(args, "name")?, &checked(args, "namespace")?)
                    .await?;
                last(events, args.unsigned("limit")?)
            }
            "get_image_pull_events" => {
                let events = self
                    .pod_events(&checked(args, "name")?, &checked(args, "namespace")?)
                    .await?;
                Value::Array(
                    events
                        .into_iter()
                        .filter(|e| reason_matches(e, &["Pull", "BackOff"]))
                        .collect(),
                )
            }
            "get_pod_scheduling_events" => {
                let events = self
                    .pod_events(&checked(args, "name")?, &checked(args, "namespace")?)
                    .await?;
                let scheduling = events
                    .into_iter()
                    .filter(|e| reason_matches(e, &["Schedul", "Preempt"]))
                    .collect();
                last(scheduling, args.unsigned("limit")?)
            }
            "get_service_account_details" => {
                let sa = self
                    .get_json(&[
                        "get",
                        "serviceaccount",
                        &checked(args, "name")?,
                        "-n",
                        &checked(args, "namespace")?,
                        "-o",
                        "json",
                    ])
                    .await?;
                json!({
                    "name": sa["metadata"]["name"],
                    "secrets": names(&sa["secrets"]),
                    "imagePullSecrets": names(&sa["imagePullSecrets"]),
                })
            }
            "get_secret_exists" => {
                let found = self
                    .run(&[
                        "get",
                        "secret",
                        &checked(args, "name")?,
                        "-n",
                        &checked(args, "namespace")?,
                        "--ignore-not-found",
                        "-o",
                        "name",
                    ])
                    .await?;
                json!({"exists": !found.trim().is_empty()})
            }
            "get_workload_yaml" => {
                self.get_json(&[
                    "get",
                    &checked(args, "kind")?,
                    &checked(args, "name")?,
                    "-n",
                    &checked(args, "namespace")?,
                    "-o",
                    "json",
                ])
                .await?
            }
            "get_pod_top_metrics" => {
                let path = format!(
                    "/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods/{}",
                    checked(args, "namespace")?,
                    checked(args, "name")?
                );
                self.get_json(&["get", "--raw", &path]).await?
            }
            "get_nodes_overview" => {
                let nodes = self.get_json(&["get", "nodes", "-o", "json"]).await?;
                Value::Array(
                    items(&nodes)
                        .map(|n| {
                            json!({
                                "name": n["metadata"]["name"],
                                "allocatable": {
                                    "cpu": n["status"]["allocatable"]["cpu"],
                                    "memory": n["status"]["allocatable"]["memory"],
                                },
                                "taints": n["spec"]["taints"].as_array().cloned().unwrap_or_default(),
                            })
                        })
                        .collect(),
                )
            }
            "get_pvc_details" => {
                let pvc = self
                    .get_json(&[
                        "get",
                        "pvc",
                        &checked(args, "name")?,
                        "-n",
                        &checked(args, "namespace")?,
                        "-o",
                        "json",
                    ])
                    .await?;
                json!({
                    "name": pvc["metadata"]["name"],
                    "status": pvc["status"]["phase"],
                    "volumeName": pvc["spec"]["volumeName"],
                    "storageClass": pvc["spec"]["storageClassName"],
                    "accessModes": pvc["spec"]["accessModes"],
                    "resources": pvc["spec"]["resources"],
                })
            }
            "get_namespace_resource_quota" => {
                let quotas = self
                    .get_json(&["get", "resourcequota", "-n", &checked(args, "namespace")?, "-o", "json"])
                    .await?;
                Value::Array(
                    items(&quotas)
                        .map(|q| {
                            json!({
                                "metadata": {"name": q["metadata"]["name"], "namespace": q["metadata"]["namespace"]},
                                "spec": {"hard": q["spec"]["hard"]},
                                "status": {"used": q["status"]["used"]},
                            })
                        })
                        .collect(),
                )
            }
            "get_namespace_limit_ranges" => {
                let ranges = self
                    .get_json(&["get", "limitrange", "-n", &checked(args, "namespace")?, "-o", "json"])
                    .await?;
                Value::Array(
                    items(&ranges)
                        .map(|r| json!({"metadata": {"name": r["metadata"]["name"]}, "spec": r["spec"]}))
                        .collect(),
                )
            }
            other => return Err(ToolError::Command(format!("no kubectl collector named '{}'", other))),
        };
        serde_json::to_string_pretty(&report).map_err(|e| ToolError::Command(e.to_string()))
    }
}
