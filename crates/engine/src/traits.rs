use crate::diagnostics::Severity;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Result type for collaborator operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Settings store
// ---------------------------------------------------------------------------

/// Persistent key/value store holding the settings option groups.
///
/// Each call is atomic for its key; nothing spans several keys.
pub trait SettingsStore: Send + Sync {
    fn get(&self, name: &str) -> StoreResult<Option<Value>>;
    fn set(&self, name: &str, value: Value) -> StoreResult<()>;
    fn delete(&self, name: &str) -> StoreResult<()>;

    /// Store `value` only if `name` is absent. Returns whether it was added.
    fn add(&self, name: &str, value: Value) -> StoreResult<bool> {
        if self.get(name)?.is_some() {
            return Ok(false);
        }
        self.set(name, value)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Sequential number store
// ---------------------------------------------------------------------------

/// Dedicated sequential counters (e.g. the next invoice number), owned by a
/// subsystem outside the engine.
pub trait NumberStore: Send + Sync {
    fn exists(&self, counter: &str) -> StoreResult<bool>;
    fn set_next(&self, counter: &str, next: i64) -> StoreResult<()>;
    fn date_default(&self, counter: &str) -> StoreResult<Option<String>>;
    fn set_date_default(&self, counter: &str, default: &str) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub trait Logger: Send + Sync {
    fn log(&self, message: &str, severity: Severity, cause: Option<&dyn std::error::Error>);
}

// ---------------------------------------------------------------------------
// Working directories and bundled fonts
// ---------------------------------------------------------------------------

pub trait ResourceOps: Send + Sync {
    /// Base of the working directory tree, if the host has one.
    fn tmp_base(&self) -> Option<PathBuf>;
    fn fonts_path(&self) -> Option<PathBuf>;
    /// Both the base and the fonts directory exist and are writable.
    fn is_ready(&self) -> bool;
    fn init_tmp(&self) -> StoreResult<()>;
    /// Forget that fonts were copied so the next reinstall copies them again.
    fn clear_fonts_flag(&self) -> StoreResult<()>;
    fn reinstall_fonts(&self, force: bool) -> StoreResult<()>;
    /// Remove a file; a missing file is not an error.
    fn remove_file(&self, path: &Path) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Host hooks
// ---------------------------------------------------------------------------

/// Everything the engine asks of the host application beyond storage.
/// Defaults describe a host with nothing extra to offer.
pub trait HostHooks: Send + Sync {
    fn dependencies_supported(&self) -> bool {
        true
    }

    /// Install location of the software, used for default template paths.
    fn plugin_path(&self) -> String {
        String::new()
    }

    /// Host root path stripped from legacy absolute template paths.
    fn abspath(&self) -> Option<String> {
        None
    }

    fn shop_currency(&self) -> Option<String> {
        None
    }

    fn pretty_links_enabled(&self) -> bool {
        false
    }

    /// State code → state name for a country, if the host knows it.
    fn states(&self, _country: &str) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Slugs of every document type that may own a sequential counter.
    fn document_slugs(&self) -> Vec<String> {
        vec!["invoice".to_string(), "packing-slip".to_string()]
    }

    fn migrate_template_paths(&self) -> StoreResult<()> {
        Ok(())
    }

    fn schedule_yearly_reset_numbers(&self) -> StoreResult<()> {
        Ok(())
    }

    fn notify_new_install(&self) -> StoreResult<()> {
        Ok(())
    }

    fn request_rewrite_flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
