//! The single persisted record of the last version migrations ran for.

use crate::traits::{SettingsStore, StoreResult};
use crate::version::{InstalledVersion, Version, VERSIONLESS};
use serde_json::Value;

pub const VERSION_MARKER_KEY: &str = "wpo_wcpdf_version";

pub struct VersionMarkerStore<'a> {
    store: &'a dyn SettingsStore,
    key: &'a str,
}

impl<'a> VersionMarkerStore<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self::with_key(store, VERSION_MARKER_KEY)
    }

    pub fn with_key(store: &'a dyn SettingsStore, key: &'a str) -> Self {
        Self { store, key }
    }

    pub fn read(&self) -> StoreResult<InstalledVersion> {
        let raw = match self.store.get(self.key)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                tracing::warn!(marker = %other, "version marker is not a scalar, treating as missing");
                None
            }
        };
        Ok(InstalledVersion::from_marker(raw.as_deref()))
    }

    pub fn write(&self, version: &Version) -> StoreResult<()> {
        self.store
            .set(self.key, Value::String(version.as_str().to_string()))
    }

    /// Put the marker back to an arbitrary state, e.g. so an operator can
    /// replay steps. `Missing` deletes the record.
    pub fn reset(&self, to: &InstalledVersion) -> StoreResult<()> {
        match to {
            InstalledVersion::Missing => self.store.delete(self.key),
            InstalledVersion::Versionless => {
                self.store.set(self.key, Value::String(VERSIONLESS.to_string()))
            }
            InstalledVersion::Release(v) => self.write(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemorySettingsStore;
    use serde_json::json;

    #[test]
    fn test_read_missing_and_write() {
        let store = MemorySettingsStore::new();
        let marker = VersionMarkerStore::new(&store);
        assert_eq!(marker.read().unwrap(), InstalledVersion::Missing);

        marker.write(&Version::from("4.2.0")).unwrap();
        assert_eq!(store.get(VERSION_MARKER_KEY).unwrap(), Some(json!("4.2.0")));
        assert_eq!(
            marker.read().unwrap(),
            InstalledVersion::Release(Version::from("4.2.0"))
        );
    }

    #[test]
    fn test_numeric_and_odd_markers() {
        let store = MemorySettingsStore::with_options([(VERSION_MARKER_KEY, json!(2))]);
        assert_eq!(
            VersionMarkerStore::new(&store).read().unwrap(),
            InstalledVersion::Release(Version::from("2"))
        );

        let store = MemorySettingsStore::with_options([(VERSION_MARKER_KEY, json!(["x"]))]);
        assert_eq!(
            VersionMarkerStore::new(&store).read().unwrap(),
            InstalledVersion::Missing
        );
    }

    #[test]
    fn test_reset() {
        let store = MemorySettingsStore::with_options([(VERSION_MARKER_KEY, json!("4.0.0"))]);
        let marker = VersionMarkerStore::new(&store);

        marker.reset(&InstalledVersion::Versionless).unwrap();
        assert_eq!(marker.read().unwrap(), InstalledVersion::Versionless);

        marker.reset(&InstalledVersion::Missing).unwrap();
        assert_eq!(store.get(VERSION_MARKER_KEY).unwrap(), None);
    }
}
