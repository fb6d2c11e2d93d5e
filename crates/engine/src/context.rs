//! Migration context – holds the collaborators every step works against.

use crate::diagnostics::TracingLogger;
use crate::platform::{MemoryNumberStore, MemoryResources, MemorySettingsStore, StaticHooks};
use crate::traits::*;
use std::sync::Arc;

/// Central context passed to all migration steps.
///
/// Holds shared trait objects so callers (host bootstrap / CLI / tests) can
/// swap implementations and keep their own handle on the concrete store.
#[derive(Clone)]
pub struct MigrationContext {
    settings: Arc<dyn SettingsStore>,
    numbers: Arc<dyn NumberStore>,
    logger: Arc<dyn Logger>,
    resources: Arc<dyn ResourceOps>,
    hooks: Arc<dyn HostHooks>,
}

impl MigrationContext {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        numbers: Arc<dyn NumberStore>,
        logger: Arc<dyn Logger>,
        resources: Arc<dyn ResourceOps>,
        hooks: Arc<dyn HostHooks>,
    ) -> Self {
        Self {
            settings,
            numbers,
            logger,
            resources,
            hooks,
        }
    }

    /// Context over fresh in-memory stores with ready working folders.
    pub fn in_memory() -> Self {
        Self {
            settings: Arc::new(MemorySettingsStore::new()),
            numbers: Arc::new(MemoryNumberStore::new()),
            logger: Arc::new(TracingLogger),
            resources: Arc::new(MemoryResources::ready()),
            hooks: Arc::new(StaticHooks::new()),
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn numbers(&self) -> &dyn NumberStore {
        self.numbers.as_ref()
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn resources(&self) -> &dyn ResourceOps {
        self.resources.as_ref()
    }

    pub fn hooks(&self) -> &dyn HostHooks {
        self.hooks.as_ref()
    }
}
