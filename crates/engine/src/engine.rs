//! Engine entry point: classify, run the due steps, commit the marker.

use crate::catalog::standard_registry;
use crate::context::MigrationContext;
use crate::diagnostics::Severity;
use crate::executor::{Execution, FailurePolicy, StepExecutor};
use crate::gate::{classify, Transition};
use crate::keys::legacy;
use crate::marker::VersionMarkerStore;
use crate::steps::StepRegistry;
use crate::traits::{StoreError, StoreResult};
use crate::types::{new_run_id, ErrorCode, ErrorInfo, RunReport, Status, TimingInfo};
use crate::values::is_filled;
use crate::version::{InstalledVersion, Version};
use serde_json::json;
use std::time::Instant;

/// What a run will actually do once legacy data has been looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub transition: Transition,
    /// Version steps are selected against. Differs from the marker only for
    /// installations that predate it.
    pub installed: InstalledVersion,
    pub versionless_redirect: bool,
}

pub struct Engine {
    registry: StepRegistry,
    policy: FailurePolicy,
}

impl Default for Engine {
    fn default() -> Self {
        Self::standard()
    }
}

impl Engine {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
            policy: FailurePolicy::default(),
        }
    }

    /// Engine over the full step catalog.
    pub fn standard() -> Self {
        Self::new(standard_registry())
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Classify the run. An install over a store that still holds non-empty
    /// pre-marker general settings becomes an upgrade from `Versionless`.
    pub fn resolve(
        &self,
        ctx: &MigrationContext,
        installed: &InstalledVersion,
        current: &Version,
    ) -> StoreResult<Resolution> {
        let transition = classify(installed, current);
        if transition == Transition::Install && is_filled(ctx.settings().get(legacy::GENERAL)?.as_ref()) {
            return Ok(Resolution {
                transition: Transition::Upgrade,
                installed: InstalledVersion::Versionless,
                versionless_redirect: true,
            });
        }
        Ok(Resolution {
            transition,
            installed: installed.clone(),
            versionless_redirect: false,
        })
    }

    /// Read the marker from the settings store and run from there.
    pub fn run(&self, ctx: &MigrationContext, current: &Version) -> RunReport {
        match VersionMarkerStore::new(ctx.settings()).read() {
            Ok(installed) => self.run_from(ctx, &installed, current),
            Err(e) => {
                ctx.logger().log(
                    "Could not read the installed version marker",
                    Severity::Critical,
                    Some(&e),
                );
                RunReport {
                    run_id: new_run_id(),
                    transition: Transition::NoOp,
                    installed: String::new(),
                    current: current.to_string(),
                    status: Status::Error,
                    error: Some(store_error_info(&e)),
                    steps: Vec::new(),
                    marker_written: false,
                    timing_ms: TimingInfo::default(),
                }
            }
        }
    }

    /// Run every step due between `installed` and `current`, then move the
    /// marker to `current`.
    ///
    /// The marker is written whatever the outcome of the steps, so steps
    /// skipped by a failed run are not attempted again by the next one.
    /// Errors never escape: they are logged and reported.
    pub fn run_from(&self, ctx: &MigrationContext, installed: &InstalledVersion, current: &Version) -> RunReport {
        let started = Instant::now();
        let run_id = new_run_id();

        let resolution = self.resolve(ctx, installed, current).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not look for legacy settings, assuming none");
            Resolution {
                transition: classify(installed, current),
                installed: installed.clone(),
                versionless_redirect: false,
            }
        });
        let transition = resolution.transition;

        let mut report = RunReport {
            run_id,
            transition,
            installed: installed.to_string(),
            current: current.to_string(),
            status: Status::Pass,
            error: None,
            steps: Vec::new(),
            marker_written: false,
            timing_ms: TimingInfo::default(),
        };

        if transition == Transition::NoOp {
            report.status = Status::Skip;
            return report;
        }

        tracing::info!(
            run_id = %report.run_id,
            %transition,
            installed = %installed,
            current = %current,
            versionless = resolution.versionless_redirect,
            "running settings migration"
        );

        let result = if blocked_by_dependencies(ctx, transition) {
            ctx.logger().log(
                "Host dependencies are not supported, settings left untouched",
                Severity::Info,
                None,
            );
            Ok(Execution::default())
        } else {
            StepExecutor::new(&self.registry)
                .with_policy(self.policy)
                .run(ctx, transition, &resolution.installed, current)
        };

        let execution = match result {
            Ok(done) => done,
            Err(err) => {
                let failures: Vec<_> = err
                    .failures
                    .iter()
                    .map(|f| {
                        json!({
                            "step": f.step,
                            "code": f.error.error_code().to_string(),
                            "message": f.error.to_string(),
                        })
                    })
                    .collect();
                report.status = Status::Error;
                report.error = Some(
                    ErrorInfo::new(ErrorCode::StepFailed, err.to_string())
                        .with_details(json!({ "failures": failures })),
                );
                err.completed
            }
        };
        report.steps = execution.records;
        report.timing_ms.steps = execution.timing;

        match VersionMarkerStore::new(ctx.settings()).write(current) {
            Ok(()) => report.marker_written = true,
            Err(e) => {
                ctx.logger().log(
                    &format!("Could not update the installed version marker to {}", current),
                    Severity::Critical,
                    Some(&e),
                );
                if report.error.is_none() {
                    report.status = Status::Error;
                    report.error = Some(store_error_info(&e));
                }
            }
        }

        report.timing_ms.total = started.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %report.run_id,
            status = ?report.status,
            steps = report.steps.len(),
            "settings migration finished"
        );
        report
    }
}

/// Install and upgrade leave the store alone when the host cannot run the
/// software at all.
pub(crate) fn blocked_by_dependencies(ctx: &MigrationContext, transition: Transition) -> bool {
    matches!(transition, Transition::Install | Transition::Upgrade) && !ctx.hooks().dependencies_supported()
}

fn store_error_info(e: &StoreError) -> ErrorInfo {
    let code = match e {
        StoreError::ResourceUnavailable(_) => ErrorCode::ResourceUnavailable,
        StoreError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        StoreError::Io(_) => ErrorCode::IoError,
        _ => ErrorCode::StoreError,
    };
    ErrorInfo::new(code, e.to_string())
}
