//! Engine crate – versioned migrations for a settings key/value store.
//!
//! The crate compares the version recorded in the store with the running
//! version, selects the migration steps that apply, runs them in order and
//! advances the version marker. Storage, filesystem resources and host
//! callbacks sit behind traits so the same engine serves the host bootstrap
//! and the headless `settingsctl` CLI.

pub mod catalog;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod executor;
pub mod gate;
pub mod keys;
pub mod marker;
pub mod plan;
pub mod platform;
pub mod remap;
pub mod scenario;
pub mod steps;
pub mod traits;
pub mod types;
pub mod values;
pub mod version;

// Re-exports for convenience
pub use context::MigrationContext;
pub use engine::Engine;
pub use executor::FailurePolicy;
pub use gate::Transition;
pub use types::{ErrorCode, ErrorInfo, RunReport, Status};
pub use version::{InstalledVersion, Version};
