//! Concrete implementations of the collaborator traits.
//!
//! - [`MemorySettingsStore`] / [`MemoryNumberStore`]: in-process maps
//! - [`JsonFileStore`]: options and counters persisted in one JSON document
//! - [`FsResources`]: working directories and fonts on the local filesystem
//! - [`MemoryResources`]: resource bookkeeping without touching disk
//! - [`StaticHooks`]: host hooks backed by plain values

use crate::traits::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

// ===========================================================================
// In-memory settings
// ===========================================================================

#[derive(Default)]
pub struct MemorySettingsStore {
    options: RwLock<BTreeMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options<I, K>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            options: RwLock::new(options.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `set`/`delete` calls since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, name: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn set(&self, name: &str, value: Value) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
        Ok(())
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

// ===========================================================================
// Counters
// ===========================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub next: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_default: Option<String>,
}

#[derive(Default)]
pub struct MemoryNumberStore {
    counters: RwLock<BTreeMap<String, CounterRecord>>,
}

impl MemoryNumberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create counters, as if their tables already existed.
    pub fn with_counters(names: &[&str]) -> Self {
        let counters = names
            .iter()
            .map(|n| (n.to_string(), CounterRecord { next: 1, date_default: None }))
            .collect();
        Self {
            counters: RwLock::new(counters),
        }
    }

    pub fn get(&self, counter: &str) -> Option<CounterRecord> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(counter)
            .cloned()
    }
}

impl NumberStore for MemoryNumberStore {
    fn exists(&self, counter: &str) -> StoreResult<bool> {
        Ok(self.get(counter).is_some())
    }

    fn set_next(&self, counter: &str, next: i64) -> StoreResult<()> {
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(counter.to_string())
            .or_default()
            .next = next;
        Ok(())
    }

    fn date_default(&self, counter: &str) -> StoreResult<Option<String>> {
        Ok(self.get(counter).and_then(|c| c.date_default))
    }

    fn set_date_default(&self, counter: &str, default: &str) -> StoreResult<()> {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        match counters.get_mut(counter) {
            Some(record) => {
                record.date_default = Some(default.to_string());
                Ok(())
            }
            None => Err(StoreError::Other(format!("no such counter: {}", counter))),
        }
    }
}

// ===========================================================================
// JSON file store – wraps std::fs
// ===========================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileState {
    #[serde(default)]
    options: BTreeMap<String, Value>,
    #[serde(default)]
    counters: BTreeMap<String, CounterRecord>,
}

/// Options and counters in a single JSON document, rewritten on every
/// change through a temporary file so each write replaces the document
/// whole.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => FileState::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileState::default(),
            Err(e) => return Err(io_error(&path, "read", e)),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn mutate<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut FileState) -> StoreResult<()>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)?;
        self.persist(&state)
    }

    fn persist(&self, state: &FileState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_error(parent, "create", e))?;
            }
        }
        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| io_error(&tmp, "write", e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, "replace", e))
    }
}

fn io_error(path: &Path, action: &str, e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            StoreError::PermissionDenied(format!("cannot {} {}: {}", action, path.display(), e))
        }
        _ => StoreError::Io(e),
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, name: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .options
            .get(name)
            .cloned())
    }

    fn set(&self, name: &str, value: Value) -> StoreResult<()> {
        self.mutate(|s| {
            s.options.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        self.mutate(|s| {
            s.options.remove(name);
            Ok(())
        })
    }
}

impl NumberStore for JsonFileStore {
    fn exists(&self, counter: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .counters
            .contains_key(counter))
    }

    fn set_next(&self, counter: &str, next: i64) -> StoreResult<()> {
        self.mutate(|s| {
            s.counters.entry(counter.to_string()).or_default().next = next;
            Ok(())
        })
    }

    fn date_default(&self, counter: &str) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .counters
            .get(counter)
            .and_then(|c| c.date_default.clone()))
    }

    fn set_date_default(&self, counter: &str, default: &str) -> StoreResult<()> {
        self.mutate(|s| match s.counters.get_mut(counter) {
            Some(record) => {
                record.date_default = Some(default.to_string());
                Ok(())
            }
            None => Err(StoreError::Other(format!("no such counter: {}", counter))),
        })
    }
}

// ===========================================================================
// Filesystem resources – wraps std::fs
// ===========================================================================

const TMP_SUBDIRS: &[&str] = &["attachments", "fonts", "dompdf"];
const FONTS_FLAG: &str = ".fonts-installed";

pub struct FsResources {
    tmp_base: Option<PathBuf>,
    fonts_source: Option<PathBuf>,
}

impl FsResources {
    pub fn new(tmp_base: Option<PathBuf>, fonts_source: Option<PathBuf>) -> Self {
        Self {
            tmp_base,
            fonts_source,
        }
    }

    fn require_fonts_path(&self) -> StoreResult<PathBuf> {
        self.fonts_path()
            .ok_or_else(|| StoreError::ResourceUnavailable("no temporary folder configured".into()))
    }
}

fn is_writable_dir(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}

impl ResourceOps for FsResources {
    fn tmp_base(&self) -> Option<PathBuf> {
        self.tmp_base.clone()
    }

    fn fonts_path(&self) -> Option<PathBuf> {
        self.tmp_base.as_ref().map(|b| b.join("fonts"))
    }

    fn is_ready(&self) -> bool {
        match (&self.tmp_base, self.fonts_path()) {
            (Some(base), Some(fonts)) => is_writable_dir(base) && is_writable_dir(&fonts),
            _ => false,
        }
    }

    fn init_tmp(&self) -> StoreResult<()> {
        let base = self
            .tmp_base
            .as_ref()
            .ok_or_else(|| StoreError::ResourceUnavailable("no temporary folder configured".into()))?;
        for sub in TMP_SUBDIRS {
            let dir = base.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => StoreError::ResourceUnavailable(format!(
                    "cannot create {}: {}",
                    dir.display(),
                    e
                )),
                _ => StoreError::Io(e),
            })?;
        }
        tracing::debug!(base = %base.display(), "temporary folders initialized");
        Ok(())
    }

    fn clear_fonts_flag(&self) -> StoreResult<()> {
        let Some(fonts) = self.fonts_path() else {
            return Ok(());
        };
        self.remove_file(&fonts.join(FONTS_FLAG))
    }

    fn reinstall_fonts(&self, force: bool) -> StoreResult<()> {
        let fonts = self.require_fonts_path()?;
        let flag = fonts.join(FONTS_FLAG);
        if !force && flag.exists() {
            return Ok(());
        }
        let Some(source) = &self.fonts_source else {
            tracing::debug!("no bundled fonts configured, nothing to copy");
            return Ok(());
        };
        if !is_writable_dir(&fonts) {
            return Err(StoreError::ResourceUnavailable(format!(
                "fonts folder not writable: {}",
                fonts.display()
            )));
        }
        let mut copied = 0usize;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::copy(entry.path(), fonts.join(entry.file_name()))?;
                copied += 1;
            }
        }
        std::fs::write(&flag, b"")?;
        tracing::debug!(copied, force, "fonts reinstalled");
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> StoreResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, "remove", e)),
        }
    }
}

// ===========================================================================
// In-memory resources – records calls, never touches disk
// ===========================================================================

pub struct MemoryResources {
    available: bool,
    ready: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MemoryResources {
    /// Working folders exist and are writable.
    pub fn ready() -> Self {
        Self::build(true, true)
    }

    /// A base folder is configured but has not been created yet.
    pub fn uninitialized() -> Self {
        Self::build(true, false)
    }

    /// The host has no working folder at all.
    pub fn unavailable() -> Self {
        Self::build(false, false)
    }

    fn build(available: bool, ready: bool) -> Self {
        Self {
            available,
            ready: AtomicBool::new(ready),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl ResourceOps for MemoryResources {
    fn tmp_base(&self) -> Option<PathBuf> {
        self.available.then(|| PathBuf::from("/memory/tmp"))
    }

    fn fonts_path(&self) -> Option<PathBuf> {
        self.tmp_base().map(|b| b.join("fonts"))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn init_tmp(&self) -> StoreResult<()> {
        self.record("init_tmp".into());
        if !self.available {
            return Err(StoreError::ResourceUnavailable("no temporary folder configured".into()));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_fonts_flag(&self) -> StoreResult<()> {
        self.record("clear_fonts_flag".into());
        Ok(())
    }

    fn reinstall_fonts(&self, force: bool) -> StoreResult<()> {
        self.record(format!("reinstall_fonts(force={})", force));
        if !self.is_ready() {
            return Err(StoreError::ResourceUnavailable("fonts folder missing".into()));
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> StoreResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.record(format!("remove_file:{}", name));
        Ok(())
    }
}

// ===========================================================================
// Host hooks backed by plain values
// ===========================================================================

pub struct StaticHooks {
    pub dependencies_supported: bool,
    pub plugin_path: String,
    pub abspath: Option<String>,
    pub currency: Option<String>,
    pub pretty_links: bool,
    /// Country code → (state code → state name).
    pub regions: BTreeMap<String, BTreeMap<String, String>>,
    pub document_slugs: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl Default for StaticHooks {
    fn default() -> Self {
        Self {
            dependencies_supported: true,
            plugin_path: String::new(),
            abspath: None,
            currency: None,
            pretty_links: false,
            regions: BTreeMap::new(),
            document_slugs: vec!["invoice".to_string(), "packing-slip".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl StaticHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the side-effecting hooks invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.to_string());
    }
}

impl HostHooks for StaticHooks {
    fn dependencies_supported(&self) -> bool {
        self.dependencies_supported
    }

    fn plugin_path(&self) -> String {
        self.plugin_path.clone()
    }

    fn abspath(&self) -> Option<String> {
        self.abspath.clone()
    }

    fn shop_currency(&self) -> Option<String> {
        self.currency.clone()
    }

    fn pretty_links_enabled(&self) -> bool {
        self.pretty_links
    }

    fn states(&self, country: &str) -> Option<BTreeMap<String, String>> {
        self.regions
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(country))
            .map(|(_, states)| {
                states
                    .iter()
                    .map(|(code, name)| (code.to_uppercase(), name.clone()))
                    .collect()
            })
    }

    fn document_slugs(&self) -> Vec<String> {
        self.document_slugs.clone()
    }

    fn migrate_template_paths(&self) -> StoreResult<()> {
        self.record("migrate_template_paths");
        Ok(())
    }

    fn schedule_yearly_reset_numbers(&self) -> StoreResult<()> {
        self.record("schedule_yearly_reset_numbers");
        Ok(())
    }

    fn notify_new_install(&self) -> StoreResult<()> {
        self.record("notify_new_install");
        Ok(())
    }

    fn request_rewrite_flush(&self) -> StoreResult<()> {
        self.record("request_rewrite_flush");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("migration_engine_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_add_if_absent() {
        let store = MemorySettingsStore::with_options([("a", json!({"x": 1}))]);
        assert!(!store.add("a", json!({"x": 2})).unwrap());
        assert!(store.add("b", json!({"y": 1})).unwrap());
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_memory_counters() {
        let numbers = MemoryNumberStore::with_counters(&["invoice_number"]);
        assert!(numbers.exists("invoice_number").unwrap());
        assert!(!numbers.exists("packing-slip_number").unwrap());
        numbers.set_next("credit-note_number", 7).unwrap();
        assert_eq!(numbers.get("credit-note_number").unwrap().next, 7);
        assert!(numbers.set_date_default("missing", "x").is_err());
    }

    #[test]
    fn test_json_file_store_persists() {
        let path = temp_path("store").join("settings.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(store.get("opt").unwrap(), None);
            store.set("opt", json!({"k": "v"})).unwrap();
            store.set_next("invoice_number", 42).unwrap();
            store.set_date_default("invoice_number", "1000-01-01 00:00:00").unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("opt").unwrap(), Some(json!({"k": "v"})));
        assert!(reopened.exists("invoice_number").unwrap());
        assert_eq!(
            reopened.date_default("invoice_number").unwrap().as_deref(),
            Some("1000-01-01 00:00:00")
        );

        reopened.delete("opt").unwrap();
        assert_eq!(JsonFileStore::open(&path).unwrap().get("opt").unwrap(), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let path = temp_path("garbage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serialization(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_fs_resources_init_and_fonts() {
        let base = temp_path("tmp");
        let source = temp_path("fonts_src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("DejaVuSans.ttf"), b"font").unwrap();

        let res = FsResources::new(Some(base.clone()), Some(source.clone()));
        assert!(!res.is_ready());
        res.init_tmp().unwrap();
        assert!(res.is_ready());

        res.reinstall_fonts(false).unwrap();
        let fonts = res.fonts_path().unwrap();
        assert!(fonts.join("DejaVuSans.ttf").exists());
        assert!(fonts.join(FONTS_FLAG).exists());

        res.clear_fonts_flag().unwrap();
        assert!(!fonts.join(FONTS_FLAG).exists());

        // missing files are fine
        res.remove_file(&fonts.join("mustRead.html")).unwrap();

        let _ = std::fs::remove_dir_all(&base);
        let _ = std::fs::remove_dir_all(&source);
    }

    #[test]
    fn test_fs_resources_without_base() {
        let res = FsResources::new(None, None);
        assert!(!res.is_ready());
        assert!(matches!(res.init_tmp(), Err(StoreError::ResourceUnavailable(_))));
        assert!(matches!(
            res.reinstall_fonts(true),
            Err(StoreError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_static_hooks_states_case_insensitive() {
        let mut hooks = StaticHooks::new();
        hooks.regions.insert(
            "us".into(),
            BTreeMap::from([("ca".to_string(), "California".to_string())]),
        );
        let states = hooks.states("US").unwrap();
        assert_eq!(states.get("CA").map(String::as_str), Some("California"));
        assert!(hooks.states("NL").is_none());
    }
}
