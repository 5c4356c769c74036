//! Tool dispatch: routes a decision's action to a diagnostic collector.
//!
//! Engines produce arguments as an object, a positional list, or a bare
//! string. [`ToolRegistry::dispatch`] normalizes all three against the
//! collector's declared parameters before calling it, and renders collector
//! failures as observation text so the reasoning loop can react to them.

pub mod kubectl;
pub mod mock;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decision::ActionInput;
use crate::error::ToolError;

pub use kubectl::KubectlCollector;
pub use mock::{MockClusterCollector, MockProfile};

/// Prefix of observations produced from collector failures.
pub const TOOL_ERROR_PREFIX: &str = "Tool Error:";

/// A declared collector parameter. Parameters without a default are required.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str) -> Self {
        Self { name, default: None }
    }

    pub fn with_default(name: &'static str, default: Value) -> Self {
        Self {
            name,
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl CollectorSpec {
    /// Signature line used in the tool catalogue, e.g. `get_pod_events(name, namespace, limit=20)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match &p.default {
                Some(default) => format!("{}={}", p.name, default),
                None => p.name.to_string(),
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Named arguments after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(BTreeMap<String, Value>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.get(name).map_or(false, |v| !v.is_null())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn string(&self, name: &str) -> Result<String, ToolError> {
        match self.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(Value::String(_)) | None => Err(ToolError::MissingArgument(name.to_string())),
            Some(_) => Err(ToolError::InvalidArgument {
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    pub fn unsigned(&self, name: &str) -> Result<u64, ToolError> {
        let invalid = || ToolError::InvalidArgument {
            name: name.to_string(),
            expected: "non-negative integer",
        };
        match self.get(name) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
            Some(_) => Err(invalid()),
            None => Err(ToolError::MissingArgument(name.to_string())),
        }
    }

    fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }
}

/// A diagnostic data source. Each call is a single read-only query.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn call(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError>;
}

struct RegisteredTool {
    spec: CollectorSpec,
    collector: Arc<dyn Collector>,
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, RegisteredTool>,
    order: Vec<&'static str>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            call_timeout,
        }
    }

    /// Registry exposing the full cluster catalogue through one collector.
    pub fn with_catalogue(collector: Arc<dyn Collector>, call_timeout: Duration) -> Self {
        let mut registry = Self::new(call_timeout);
        for spec in cluster_catalogue() {
            registry.register(spec, collector.clone());
        }
        registry
    }

    pub fn register(&mut self, spec: CollectorSpec, collector: Arc<dyn Collector>) {
        if !self.tools.contains_key(spec.name) {
            self.order.push(spec.name);
        }
        self.tools
            .insert(spec.name, RegisteredTool { spec, collector });
    }

    pub fn contains(&self, action: &str) -> bool {
        self.tools.contains_key(action)
    }

    pub fn specs(&self) -> impl Iterator<Item = &CollectorSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| &t.spec))
    }

    /// One line per collector, for the diagnostic instructions.
    pub fn catalogue(&self) -> String {
        self.specs()
            .map(|spec| format!("- {}: {}", spec.signature(), spec.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run `action` and return its observation text, or `None` when no
    /// collector of that name is registered. Values in `fallback` fill
    /// parameters the engine left out.
    pub async fn dispatch(
        &self,
        action: &str,
        input: Option<ActionInput>,
        fallback: &ToolArgs,
    ) -> Option<String> {
        let tool = self.tools.get(action)?;
        let result = match normalize_args(&tool.spec, input, fallback) {
            Ok(args) => {
                debug!(action, args = ?args, "calling collector");
                match tokio::time::timeout(self.call_timeout, tool.collector.call(action, &args))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout(self.call_timeout.as_secs())),
                }
            }
            Err(err) => Err(err),
        };
        Some(match result {
            Ok(text) => text,
            Err(err) => {
                warn!(action, error = %err, "collector call failed");
                format!("{} {}", TOOL_ERROR_PREFIX, err)
            }
        })
    }
}

/// Map any accepted argument shape onto the collector's named parameters.
pub fn normalize_args(
    spec: &CollectorSpec,
    input: Option<ActionInput>,
    fallback: &ToolArgs,
) -> Result<ToolArgs, ToolError> {
    let mut args = ToolArgs::new();
    match input.map(ActionInput::normalized) {
        None => {}
        Some(ActionInput::Object(map)) => {
            for (key, value) in map {
                args.insert(&key, value);
            }
        }
        Some(ActionInput::List(items)) => {
            if items.len() > spec.params.len() {
                return Err(ToolError::ArgumentShape(format!(
                    "{} takes at most {} positional arguments, got {}",
                    spec.name,
                    spec.params.len(),
                    items.len()
                )));
            }
            for (param, value) in spec.params.iter().zip(items) {
                args.insert(param.name, value);
            }
        }
        Some(ActionInput::Text(text)) => match spec.params.first() {
            Some(first) => args.insert(first.name, Value::String(text)),
            None if text.trim().is_empty() => {}
            None => {
                return Err(ToolError::ArgumentShape(format!(
                    "{} takes no arguments",
                    spec.name
                )))
            }
        },
    }

    for param in &spec.params {
        if args.contains(param.name) {
            continue;
        }
        if let Some(value) = fallback.get(param.name) {
            args.insert(param.name, value.clone());
        } else if let Some(default) = &param.default {
            args.insert(param.name, default.clone());
        } else {
            return Err(ToolError::MissingArgument(param.name.to_string()));
        }
    }
    Ok(args)
}

/// Read-only cluster diagnostics offered to the diagnostic engine.
pub fn cluster_catalogue() -> Vec<CollectorSpec> {
    use serde_json::json;
    let name_ns = || vec![ParamSpec::required("name"), ParamSpec::required("namespace")];
    vec![
        CollectorSpec {
            name: "get_pod_diagnostics",
            description: "Pod phase, restart count, last exit code/reason, and current/previous logs.",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_pod_events",
            description: "Recent events for a pod (type, reason, message, count).",
            params: vec![
                ParamSpec::required("name"),
                ParamSpec::required("namespace"),
                ParamSpec::with_default("limit", json!(20)),
            ],
        },
        CollectorSpec {
            name: "get_image_pull_events",
            description: "Pod events related to image pulls (ErrImagePull, ImagePullBackOff).",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_service_account_details",
            description: "A ServiceAccount with its secrets and imagePullSecrets.",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_secret_exists",
            description: "Whether a Secret exists in the namespace.",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_workload_yaml",
            description: "Full spec of a workload (Deployment, StatefulSet, DaemonSet).",
            params: vec![
                ParamSpec::required("kind"),
                ParamSpec::required("name"),
                ParamSpec::required("namespace"),
            ],
        },
        CollectorSpec {
            name: "get_pod_top_metrics",
            description: "Live CPU/memory usage per container of a pod.",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_pod_scheduling_events",
            description: "Scheduling events for a pod (e.g. FailedScheduling).",
            params: vec![
                ParamSpec::required("name"),
                ParamSpec::required("namespace"),
                ParamSpec::with_default("limit", json!(20)),
            ],
        },
        CollectorSpec {
            name: "get_nodes_overview",
            description: "Nodes with allocatable CPU/memory and taints.",
            params: vec![],
        },
        CollectorSpec {
            name: "get_pvc_details",
            description: "Status, bound volume and storage class of a PersistentVolumeClaim.",
            params: name_ns(),
        },
        CollectorSpec {
            name: "get_namespace_resource_quota",
            description: "ResourceQuota objects of a namespace (hard limits and usage).",
            params: vec![ParamSpec::required("namespace")],
        },
        CollectorSpec {
            name: "get_namespace_limit_ranges",
            description: "LimitRange objects of a namespace (default requests/limits).",
            params: vec![ParamSpec::required("namespace")],
        },
    ]
}
