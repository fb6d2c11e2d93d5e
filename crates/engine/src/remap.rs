//! Settings remapper – split, merge and rename whole option groups.
//!
//! A [`RemapTable`] says, for every new grouped option, which legacy option
//! and key each of its fields comes from. Remapping is two pure steps
//! ([`build_candidates`], then [`merge_existing`] per group) followed by one
//! write per group whose stored value actually changes.

use crate::traits::{SettingsStore, StoreResult};
use crate::values::{into_map, is_empty, OptionMap};
use serde_json::Value;
use std::collections::BTreeMap;

/// Locale key under which legacy scalars are stored once localized.
pub const DEFAULT_LOCALE: &str = "default";

/// `key` of the new group is filled from `from_option[from_key]`.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub key: &'static str,
    pub from_option: &'static str,
    pub from_key: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupMapping {
    pub option: &'static str,
    pub fields: &'static [FieldMapping],
    /// Write `enabled = 1` into the group whatever the legacy data says.
    pub force_enabled: bool,
    /// `(key, replacement)`: `key` is not migrated again once the stored
    /// group has `replacement`, which a later step renamed it to.
    pub superseded: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy)]
pub struct RemapTable {
    pub groups: &'static [GroupMapping],
    /// New keys whose values become locale-keyed maps.
    pub localizable: &'static [&'static str],
}

/// Option name → option contents.
pub type OptionSet = BTreeMap<String, OptionMap>;

/// Wrap a plain value as `{ "default": value }`. Values that are already
/// maps are left alone so a second pass never double-wraps.
pub fn localize(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => {
            let mut map = OptionMap::new();
            map.insert(DEFAULT_LOCALE.to_string(), other);
            Value::Object(map)
        }
    }
}

/// Compute the new groups from legacy options. Empty legacy values are not
/// copied.
pub fn build_candidates(legacy: &OptionSet, table: &RemapTable) -> OptionSet {
    let mut out = OptionSet::new();
    for group in table.groups {
        let mut candidate = OptionMap::new();
        for field in group.fields {
            let Some(value) = legacy
                .get(field.from_option)
                .and_then(|opt| opt.get(field.from_key))
            else {
                continue;
            };
            if is_empty(value) {
                continue;
            }
            let value = if table.localizable.contains(&field.key) {
                localize(value.clone())
            } else {
                value.clone()
            };
            candidate.insert(field.key.to_string(), value);
        }
        if group.force_enabled {
            candidate.insert("enabled".to_string(), Value::from(1));
        }
        out.insert(group.option.to_string(), candidate);
    }
    out
}

/// Merge a candidate group with what is already stored under its name.
/// Stored keys win over freshly migrated ones.
pub fn merge_existing(candidate: OptionMap, existing: OptionMap) -> OptionMap {
    let mut merged = candidate;
    for (key, value) in existing {
        merged.insert(key, value);
    }
    merged
}

/// Run a full remap against `store`. Returns the names of the groups that
/// were written.
pub fn apply(
    store: &dyn SettingsStore,
    legacy: &OptionSet,
    table: &RemapTable,
) -> StoreResult<Vec<String>> {
    let mut candidates = build_candidates(legacy, table);
    let mut written = Vec::new();
    for group in table.groups {
        let Some(mut candidate) = candidates.remove(group.option) else {
            continue;
        };
        let stored = store.get(group.option)?;
        let existing = into_map(stored.clone());
        for (key, replacement) in group.superseded {
            if existing.contains_key(*replacement) {
                candidate.remove(*key);
            }
        }
        if stored.is_none() && candidate.is_empty() {
            continue;
        }
        let merged = Value::Object(merge_existing(candidate, existing));
        if stored.as_ref() == Some(&merged) {
            continue;
        }
        store.set(group.option, merged)?;
        written.push(group.option.to_string());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemorySettingsStore;
    use serde_json::json;

    const TABLE: RemapTable = RemapTable {
        groups: &[
            GroupMapping {
                option: "general",
                fields: &[
                    FieldMapping { key: "template_path", from_option: "legacy", from_key: "template_path" },
                    FieldMapping { key: "header_logo", from_option: "legacy", from_key: "header_logo" },
                    FieldMapping { key: "footer", from_option: "legacy", from_key: "footer" },
                ],
                force_enabled: false,
                superseded: &[("footer", "footer_text")],
            },
            GroupMapping {
                option: "invoice",
                fields: &[FieldMapping { key: "display_email", from_option: "legacy", from_key: "invoice_email" }],
                force_enabled: true,
                superseded: &[],
            },
        ],
        localizable: &["header_logo", "footer"],
    };

    fn legacy(value: serde_json::Value) -> OptionSet {
        let mut set = OptionSet::new();
        set.insert("legacy".into(), into_map(Some(value)));
        set
    }

    #[test]
    fn test_localizable_fields_are_wrapped() {
        let out = build_candidates(
            &legacy(json!({"template_path": "/a/b", "header_logo": "x"})),
            &TABLE,
        );
        assert_eq!(out["general"]["template_path"], json!("/a/b"));
        assert_eq!(out["general"]["header_logo"], json!({"default": "x"}));
    }

    #[test]
    fn test_empty_values_not_copied() {
        let out = build_candidates(&legacy(json!({"template_path": "", "footer": "0"})), &TABLE);
        assert!(out["general"].is_empty());
    }

    #[test]
    fn test_forced_enabled() {
        let out = build_candidates(&OptionSet::new(), &TABLE);
        assert_eq!(out["invoice"]["enabled"], json!(1));
        assert!(!out["general"].contains_key("enabled"));
    }

    #[test]
    fn test_localize_does_not_double_wrap() {
        let once = localize(json!("x"));
        assert_eq!(localize(once.clone()), once);
    }

    #[test]
    fn test_stored_values_win() {
        let candidate = into_map(Some(json!({"template_path": "/new", "paper_size": "a4"})));
        let existing = into_map(Some(json!({"template_path": "/kept"})));
        let merged = merge_existing(candidate, existing);
        assert_eq!(merged["template_path"], json!("/kept"));
        assert_eq!(merged["paper_size"], json!("a4"));
    }

    #[test]
    fn test_apply_writes_only_changes() {
        let store = MemorySettingsStore::with_options([("invoice", json!({"enabled": 0}))]);
        let set = legacy(json!({"template_path": "/a/b", "invoice_email": 1}));

        let written = apply(&store, &set, &TABLE).unwrap();
        assert_eq!(written, vec!["general".to_string(), "invoice".to_string()]);
        // stored `enabled = 0` survives the forced default
        assert_eq!(
            store.get("invoice").unwrap(),
            Some(json!({"enabled": 0, "display_email": 1}))
        );

        let writes = store.write_count();
        let written = apply(&store, &set, &TABLE).unwrap();
        assert!(written.is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_superseded_keys_are_not_migrated_again() {
        let store = MemorySettingsStore::with_options([("general", json!({"footer_text": {"default": "moved"}}))]);
        let written = apply(&store, &legacy(json!({"footer": "old"})), &TABLE).unwrap();
        assert_eq!(written, vec!["invoice".to_string()]);
        assert_eq!(
            store.get("general").unwrap(),
            Some(json!({"footer_text": {"default": "moved"}}))
        );
    }
}
