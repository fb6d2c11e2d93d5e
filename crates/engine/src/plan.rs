//! Plan – report what a run would do without touching the store.

use crate::context::MigrationContext;
use crate::engine::{blocked_by_dependencies, Engine};
use crate::gate::Transition;
use crate::marker::VersionMarkerStore;
use crate::steps::{MigrationStep, StepRegistry};
use crate::traits::StoreResult;
use crate::types::{PlanReport, PlannedStep};
use crate::version::{InstalledVersion, Version};

impl From<&MigrationStep> for PlannedStep {
    fn from(step: &MigrationStep) -> Self {
        PlannedStep {
            name: step.name.to_string(),
            threshold: step.threshold.to_string(),
            direction: step.direction,
        }
    }
}

/// Every registered step in execution order.
pub fn describe(registry: &StepRegistry) -> Vec<PlannedStep> {
    registry.list().into_iter().map(PlannedStep::from).collect()
}

/// Plan a run from the marker currently in the store.
pub fn plan(engine: &Engine, ctx: &MigrationContext, current: &Version) -> StoreResult<PlanReport> {
    let installed = VersionMarkerStore::new(ctx.settings()).read()?;
    plan_from(engine, ctx, &installed, current)
}

pub fn plan_from(
    engine: &Engine,
    ctx: &MigrationContext,
    installed: &InstalledVersion,
    current: &Version,
) -> StoreResult<PlanReport> {
    let resolution = engine.resolve(ctx, installed, current)?;
    let steps = if resolution.transition == Transition::NoOp
        || blocked_by_dependencies(ctx, resolution.transition)
    {
        Vec::new()
    } else {
        engine
            .registry()
            .select(resolution.transition, &resolution.installed, current)
            .into_iter()
            .map(PlannedStep::from)
            .collect()
    };
    Ok(PlanReport {
        installed: installed.to_string(),
        current: current.to_string(),
        transition: resolution.transition,
        versionless_redirect: resolution.versionless_redirect,
        steps,
    })
}
