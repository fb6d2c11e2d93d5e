use crate::executor::FailurePolicy;
use crate::gate::Transition;
use crate::steps::StepOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Run report – the stable output contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub transition: Transition,
    /// Marker value the run started from (`""` when missing).
    pub installed: String,
    pub current: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    pub marker_written: bool,
    pub timing_ms: TimingInfo,
}

impl RunReport {
    /// Names of the steps that ran, in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    StoreError,
    ResourceUnavailable,
    PermissionDenied,
    IoError,
    StepFailed,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimingInfo {
    pub total: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub steps: HashMap<String, u64>,
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub threshold: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

// ---------------------------------------------------------------------------
// Plan (dry run)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub installed: String,
    pub current: String,
    pub transition: Transition,
    /// True when an install is redirected to a full upgrade because legacy
    /// options predate the version marker.
    pub versionless_redirect: bool,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub name: String,
    pub threshold: String,
    pub direction: crate::steps::Direction,
}

// ---------------------------------------------------------------------------
// Scenario (YAML)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Marker to start from. When absent the marker found in `store` is used.
    #[serde(default)]
    pub installed: Option<String>,
    pub current: String,
    /// Initial options, by name.
    #[serde(default)]
    pub store: BTreeMap<String, Value>,
    /// Sequential counters that already exist.
    #[serde(default)]
    pub counters: Vec<String>,
    #[serde(default)]
    pub host: ScenarioHost,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default)]
    pub expect: ScenarioExpect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioHost {
    pub dependencies_supported: bool,
    pub plugin_path: String,
    pub abspath: Option<String>,
    pub currency: Option<String>,
    pub pretty_links: bool,
    pub regions: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for ScenarioHost {
    fn default() -> Self {
        Self {
            dependencies_supported: true,
            plugin_path: String::new(),
            abspath: None,
            currency: None,
            pretty_links: false,
            regions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioExpect {
    pub status: Option<Status>,
    pub transition: Option<Transition>,
    /// Names of the steps that ran, in order.
    pub steps: Option<Vec<String>>,
    pub marker: Option<String>,
    /// Options that must hold exactly these values afterwards.
    pub options: BTreeMap<String, Value>,
    /// Options that must not exist afterwards.
    pub absent: Vec<String>,
    pub critical_logs: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: Option<String>,
    pub overall_status: Status,
    pub report: RunReport,
    #[serde(default)]
    pub mismatches: Vec<Mismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub what: String,
    pub expected: Value,
    pub actual: Value,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate a new run ID (UUIDv4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ResourceUnavailable.to_string(), "RESOURCE_UNAVAILABLE");
        assert_eq!(ErrorCode::StepFailed.to_string(), "STEP_FAILED");
    }

    #[test]
    fn test_step_record_flattens_outcome() {
        let record = StepRecord {
            name: "reshape-settings".into(),
            threshold: "2.0-dev".into(),
            outcome: StepOutcome::skipped("already migrated"),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "already migrated");
    }
}
