//! Issue model and stable issue identity.
//!
//! An issue arrives on the wire as an [`IssueReport`] (the health aggregator's
//! camelCase record). [`Issue::new`] validates it and derives the
//! [`IssueKey`] once; the key is never recomputed afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Prefix carried by every issue key.
pub const ISSUE_KEY_PREFIX: &str = "issue_";
/// Hex characters of the digest kept in the key.
pub const ISSUE_KEY_HEX_LEN: usize = 16;
const ABSENT: &str = "-";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IssueError {
    #[error("missing mandatory field '{0}'")]
    MissingField(&'static str),
}

/// Coarse resource kind used in the identity tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ResourceKind {
    Pod,
    Node,
    #[serde(rename = "Deployment")]
    Workload,
    Other,
}

impl ResourceKind {
    /// Canonical label hashed into the identity key.
    pub fn canonical(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Node => "node",
            ResourceKind::Workload => "workload",
            ResourceKind::Other => "other",
        }
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "pod" => ResourceKind::Pod,
            "node" => ResourceKind::Node,
            "deployment" | "workload" | "statefulset" | "daemonset" | "replicaset" => {
                ResourceKind::Workload
            }
            "" => return Err("resource kind must not be empty".to_string()),
            _ => ResourceKind::Other,
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Node => "Node",
            ResourceKind::Workload => "Deployment",
            ResourceKind::Other => "Other",
        };
        f.write_str(label)
    }
}

/// Unvalidated issue as reported by the health aggregator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub resource_type: Option<ResourceKind>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resource_name: String,
    /// Sub-component, e.g. the container inside a pod.
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub unhealthy_since: String,
    #[serde(default)]
    pub unhealthy_timespan: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the identity key from the five canonical fields.
///
/// Fields are trimmed and lower-cased, absent optionals become `-`, and the
/// tuple is pipe-joined before hashing.
pub fn identity(
    category: &str,
    kind: ResourceKind,
    namespace: Option<&str>,
    name: &str,
    subcomponent: Option<&str>,
) -> IssueKey {
    let canonical = [
        category.trim().to_lowercase(),
        kind.canonical().to_string(),
        or_absent(namespace),
        name.trim().to_lowercase(),
        or_absent(subcomponent),
    ]
    .join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    IssueKey(format!("{}{}", ISSUE_KEY_PREFIX, &digest[..ISSUE_KEY_HEX_LEN]))
}

fn or_absent(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_lowercase(),
        _ => ABSENT.to_string(),
    }
}

/// A validated issue with its identity key.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    key: IssueKey,
    kind: ResourceKind,
    #[serde(flatten)]
    report: IssueReport,
}

impl Issue {
    pub fn new(report: IssueReport) -> Result<Self, IssueError> {
        if report.issue_type.trim().is_empty() {
            return Err(IssueError::MissingField("issueType"));
        }
        if report.resource_name.trim().is_empty() {
            return Err(IssueError::MissingField("resourceName"));
        }
        let kind = report
            .resource_type
            .ok_or(IssueError::MissingField("resourceType"))?;

        let key = identity(
            &report.issue_type,
            kind,
            report.namespace.as_deref(),
            &report.resource_name,
            report.container.as_deref(),
        );
        Ok(Self { key, kind, report })
    }

    pub fn key(&self) -> &IssueKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn report(&self) -> &IssueReport {
        &self.report
    }

    pub fn namespace(&self) -> Option<&str> {
        self.report
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
    }

    /// Human-readable summary used to open the diagnostic conversation and
    /// the solution stage.
    pub fn describe(&self) -> String {
        let r = &self.report;
        let mut text = format!(
            "{} on {} '{}'",
            r.issue_type.trim(),
            self.kind,
            r.resource_name.trim()
        );
        if let Some(ns) = self.namespace() {
            text.push_str(&format!(" in namespace '{}'", ns));
        }
        if let Some(container) = r.container.as_deref().filter(|c| !c.trim().is_empty()) {
            text.push_str(&format!(" (container '{}')", container.trim()));
        }
        if !r.severity.trim().is_empty() {
            text.push_str(&format!(". Severity: {}", r.severity.trim()));
        }
        if !r.unhealthy_since.trim().is_empty() {
            text.push_str(&format!(
                ". Unhealthy for {} ({}s)",
                r.unhealthy_since.trim(),
                r.unhealthy_timespan
            ));
        }
        if !r.message.trim().is_empty() {
            text.push_str(&format!(". Message: {}", r.message.trim()));
        }
        text
    }
}
