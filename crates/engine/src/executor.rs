//! Step executor – apply due steps in order behind a single failure
//! boundary.

use crate::context::MigrationContext;
use crate::diagnostics::{run_failure_message, Severity};
use crate::gate::Transition;
use crate::steps::{StepError, StepRegistry, Threshold};
use crate::types::StepRecord;
use crate::version::{InstalledVersion, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// What happens to the remaining steps once one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing step; later steps are not attempted.
    #[default]
    HaltOnFirstFailure,
    /// Attempt every due step and report all failures together.
    ContinueOnFailure,
}

#[derive(Debug)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: StepError,
}

/// Steps that completed, with per-step timings in milliseconds.
#[derive(Debug, Default)]
pub struct Execution {
    pub records: Vec<StepRecord>,
    pub timing: HashMap<String, u64>,
}

/// A run that hit at least one failing step.
#[derive(Debug)]
pub struct ExecutionError {
    pub transition: Transition,
    pub failures: Vec<StepFailure>,
    /// Steps that finished before (or, when continuing, between) failures.
    pub completed: Execution,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "{} failed", self.transition),
            [only] => write!(f, "step `{}` failed: {}", only.step, only.error),
            [first, rest @ ..] => write!(
                f,
                "step `{}` failed: {} (and {} more failing steps)",
                first.step,
                first.error,
                rest.len()
            ),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

pub struct StepExecutor<'a> {
    registry: &'a StepRegistry,
    policy: FailurePolicy,
}

impl<'a> StepExecutor<'a> {
    pub fn new(registry: &'a StepRegistry) -> Self {
        Self {
            registry,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply every step due for `(transition, installed, current)`.
    ///
    /// A failure is reported to the context's logger as critical, naming
    /// the direction and both versions, and returned to the caller. Nothing
    /// already written is rolled back.
    pub fn run(
        &self,
        ctx: &MigrationContext,
        transition: Transition,
        installed: &InstalledVersion,
        current: &Version,
    ) -> Result<Execution, ExecutionError> {
        let mut done = Execution::default();
        let mut failures = Vec::new();

        for step in self.registry.select(transition, installed, current) {
            // epilogues only follow a clean run
            if !failures.is_empty() && step.threshold == Threshold::Epilogue {
                tracing::debug!(step = step.name, "skipping epilogue after failure");
                continue;
            }
            let started = Instant::now();
            tracing::debug!(step = step.name, threshold = %step.threshold, "applying step");
            match (step.action)(ctx) {
                Ok(outcome) => {
                    done.timing
                        .insert(step.name.to_string(), started.elapsed().as_millis() as u64);
                    done.records.push(StepRecord {
                        name: step.name.to_string(),
                        threshold: step.threshold.to_string(),
                        outcome,
                    });
                }
                Err(error) => {
                    tracing::warn!(step = step.name, error = %error, "step failed");
                    failures.push(StepFailure {
                        step: step.name,
                        error,
                    });
                    if self.policy == FailurePolicy::HaltOnFirstFailure {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            return Ok(done);
        }

        let err = ExecutionError {
            transition,
            failures,
            completed: done,
        };
        ctx.logger().log(
            &run_failure_message(transition, installed, current, &err.to_string()),
            Severity::Critical,
            Some(&err as &dyn std::error::Error),
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingLogger;
    use crate::steps::{MigrationStep, StepOutcome, StepResult};
    use crate::traits::SettingsStore;
    use serde_json::json;
    use std::sync::Arc;

    fn touch(ctx: &MigrationContext, name: &str) -> StepResult<StepOutcome> {
        ctx.settings().set(name, json!(true))?;
        Ok(StepOutcome::Applied)
    }

    fn step_a(ctx: &MigrationContext) -> StepResult<StepOutcome> {
        touch(ctx, "a")
    }

    fn step_b(_: &MigrationContext) -> StepResult<StepOutcome> {
        Err(StepError::Other("b exploded".into()))
    }

    fn step_c(ctx: &MigrationContext) -> StepResult<StepOutcome> {
        touch(ctx, "c")
    }

    fn registry() -> StepRegistry {
        let mut reg = StepRegistry::new();
        reg.register(MigrationStep::upgrade("c", "3.0.0", step_c))
            .register(MigrationStep::upgrade("a", "1.0.0", step_a))
            .register(MigrationStep::upgrade("b", "2.0.0", step_b));
        reg
    }

    fn ctx_with_logger() -> (MigrationContext, Arc<RecordingLogger>) {
        let logger = Arc::new(RecordingLogger::new());
        (MigrationContext::in_memory().with_logger(logger.clone()), logger)
    }

    fn installed() -> InstalledVersion {
        InstalledVersion::Release(Version::from("0.9.0"))
    }

    #[test]
    fn test_halts_on_first_failure() {
        let (ctx, logger) = ctx_with_logger();
        let reg = registry();
        let err = StepExecutor::new(&reg)
            .run(&ctx, Transition::Upgrade, &installed(), &Version::from("3.0.0"))
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].step, "b");
        assert_eq!(err.completed.records.len(), 1);
        assert_eq!(ctx.settings().get("a").unwrap(), Some(json!(true)));
        assert_eq!(ctx.settings().get("c").unwrap(), None);

        let entries = logger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Critical);
        assert!(entries[0]
            .message
            .contains("updating from version 0.9.0 to 3.0.0"));
        assert!(entries[0].message.contains("b exploded"));
    }

    #[test]
    fn test_continue_policy_attempts_every_step() {
        let (ctx, logger) = ctx_with_logger();
        let reg = registry();
        let err = StepExecutor::new(&reg)
            .with_policy(FailurePolicy::ContinueOnFailure)
            .run(&ctx, Transition::Upgrade, &installed(), &Version::from("3.0.0"))
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.completed.records.len(), 2);
        assert_eq!(ctx.settings().get("c").unwrap(), Some(json!(true)));
        assert_eq!(logger.count(Severity::Critical), 1);
    }

    #[test]
    fn test_success_records_every_step() {
        let (ctx, logger) = ctx_with_logger();
        let reg = registry();
        let done = StepExecutor::new(&reg)
            .run(
                &ctx,
                Transition::Upgrade,
                &InstalledVersion::Release(Version::from("2.0.0")),
                &Version::from("3.0.0"),
            )
            .unwrap();
        assert_eq!(done.records.len(), 1);
        assert_eq!(done.records[0].name, "c");
        assert!(done.timing.contains_key("c"));
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_epilogue_skipped_after_failure() {
        let (ctx, _) = ctx_with_logger();
        let mut reg = registry();
        reg.register(MigrationStep::new(
            "finish",
            Threshold::Epilogue,
            crate::steps::Direction::UpgradeOnly,
            |ctx| touch(ctx, "finish"),
        ));
        let err = StepExecutor::new(&reg)
            .with_policy(FailurePolicy::ContinueOnFailure)
            .run(&ctx, Transition::Upgrade, &installed(), &Version::from("3.0.0"))
            .unwrap_err();

        assert_eq!(err.completed.records.len(), 2);
        assert_eq!(ctx.settings().get("finish").unwrap(), None);
    }
}
