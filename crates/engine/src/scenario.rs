//! Scenario runner – execute scripted migrations from YAML files against an
//! in-memory store and check the outcome.

use crate::context::MigrationContext;
use crate::diagnostics::{RecordingLogger, Severity};
use crate::engine::Engine;
use crate::marker::VERSION_MARKER_KEY;
use crate::platform::{MemoryNumberStore, MemoryResources, MemorySettingsStore, StaticHooks};
use crate::traits::SettingsStore;
use crate::types::*;
use crate::version::{InstalledVersion, Version, VersionError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid current version {value:?}: {source}")]
    Version {
        value: String,
        #[source]
        source: VersionError,
    },
    #[error("scenario store failed: {0}")]
    Store(#[from] crate::traits::StoreError),
}

/// Load a scenario from a YAML string.
pub fn load_scenario(yaml: &str) -> Result<Scenario, ScenarioError> {
    Ok(serde_yaml::from_str(yaml)?)
}

fn hooks_for(host: &ScenarioHost) -> StaticHooks {
    let mut hooks = StaticHooks::new();
    hooks.dependencies_supported = host.dependencies_supported;
    hooks.plugin_path = host.plugin_path.clone();
    hooks.abspath = host.abspath.clone();
    hooks.currency = host.currency.clone();
    hooks.pretty_links = host.pretty_links;
    hooks.regions = host.regions.clone();
    hooks
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or_default()
}

/// Execute a scenario and compare the store with its expectations.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioResult, ScenarioError> {
    let current = Version::parse(&scenario.current).map_err(|source| ScenarioError::Version {
        value: scenario.current.clone(),
        source,
    })?;

    let settings = Arc::new(MemorySettingsStore::with_options(scenario.store.clone()));
    let counters: Vec<&str> = scenario.counters.iter().map(String::as_str).collect();
    let logger = Arc::new(RecordingLogger::new());
    let ctx = MigrationContext::new(
        settings.clone(),
        Arc::new(MemoryNumberStore::with_counters(&counters)),
        logger.clone(),
        Arc::new(MemoryResources::ready()),
        Arc::new(hooks_for(&scenario.host)),
    );

    let engine = Engine::standard().with_policy(scenario.policy);
    let report = match &scenario.installed {
        Some(raw) => engine.run_from(&ctx, &InstalledVersion::from_marker(Some(raw.as_str())), &current),
        None => engine.run(&ctx, &current),
    };

    let expect = &scenario.expect;
    let mut mismatches = Vec::new();
    let mut check = |what: String, expected: Value, actual: Value| {
        if expected != actual {
            tracing::warn!(what = %what, expected = %expected, actual = %actual, "scenario expectation mismatch");
            mismatches.push(Mismatch {
                what,
                expected,
                actual,
            });
        }
    };

    if let Some(status) = expect.status {
        check("status".into(), to_value(&status), to_value(&report.status));
    }
    if let Some(transition) = expect.transition {
        check("transition".into(), to_value(&transition), to_value(&report.transition));
    }
    if let Some(steps) = &expect.steps {
        check("steps".into(), to_value(steps), to_value(&report.step_names()));
    }
    if let Some(marker) = &expect.marker {
        let actual = settings.get(VERSION_MARKER_KEY)?.unwrap_or(Value::Null);
        check("marker".into(), Value::String(marker.clone()), actual);
    }
    for (name, expected) in &expect.options {
        let actual = settings.get(name)?.unwrap_or(Value::Null);
        check(format!("option {}", name), expected.clone(), actual);
    }
    for name in &expect.absent {
        let actual = settings.get(name)?.unwrap_or(Value::Null);
        check(format!("option {} absent", name), Value::Null, actual);
    }
    if let Some(count) = expect.critical_logs {
        check(
            "critical logs".into(),
            Value::from(count),
            Value::from(logger.count(Severity::Critical)),
        );
    }

    Ok(ScenarioResult {
        name: scenario.name.clone(),
        overall_status: if mismatches.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        },
        report,
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailurePolicy;
    use crate::gate::Transition;

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: upgrade from 3.5
installed: "3.5.0"
current: "4.2.0"
policy: continue_on_failure
store:
  wpo_wcpdf_settings_debug:
    guest_access: 1
counters: [invoice_number]
host:
  currency: INR
expect:
  status: pass
  transition: upgrade
  absent: [wpo_wcpdf_settings_general]
"#;
        let s = load_scenario(yaml).expect("should parse");
        assert_eq!(s.name, Some("upgrade from 3.5".into()));
        assert_eq!(s.policy, FailurePolicy::ContinueOnFailure);
        assert!(s.host.dependencies_supported);
        assert_eq!(s.host.currency.as_deref(), Some("INR"));
        assert_eq!(s.counters, vec!["invoice_number".to_string()]);
        assert_eq!(s.expect.transition, Some(Transition::Upgrade));
    }

    #[test]
    fn test_run_scenario_upgrade() {
        let yaml = r#"
installed: "3.5.0"
current: "4.2.0"
store:
  wpo_wcpdf_settings_debug:
    guest_access: 1
    legacy_mode: 1
expect:
  status: pass
  marker: "4.2.0"
  options:
    wpo_wcpdf_settings_debug:
      document_link_access_type: full
      reload_attachment_translations: "1"
  critical_logs: 0
"#;
        let result = run_scenario(&load_scenario(yaml).unwrap()).unwrap();
        assert_eq!(result.mismatches, vec![]);
        assert_eq!(result.overall_status, Status::Pass);
        assert!(result.report.step_names().contains(&"drop-legacy-mode"));
    }

    #[test]
    fn test_run_scenario_reports_mismatch() {
        let yaml = r#"
current: "4.2.0"
store:
  wpo_wcpdf_version: "4.2.0"
expect:
  transition: upgrade
  options:
    wpo_wcpdf_settings_general: {paper_size: a4}
"#;
        let result = run_scenario(&load_scenario(yaml).unwrap()).unwrap();
        assert_eq!(result.overall_status, Status::Fail);
        let what: Vec<&str> = result.mismatches.iter().map(|m| m.what.as_str()).collect();
        assert_eq!(what, vec!["transition", "option wpo_wcpdf_settings_general"]);
    }

    #[test]
    fn test_invalid_current_version() {
        let scenario = load_scenario("current: \"  \"\n").unwrap();
        assert!(matches!(
            run_scenario(&scenario),
            Err(ScenarioError::Version { .. })
        ));
    }
}
