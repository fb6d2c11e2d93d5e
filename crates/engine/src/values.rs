//! Helpers for reading and rewriting option groups.

use crate::steps::StepResult;
use crate::traits::{SettingsStore, StoreResult};
use serde_json::{Map, Value};

/// One option group: a JSON object keyed by setting name.
pub type OptionMap = Map<String, Value>;

/// Loose emptiness: null, `false`, `0`, `""`, `"0"` and empty
/// arrays/objects all count as "not set".
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

pub fn is_filled(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !is_empty(v))
}

/// Scalar as text; non-scalars are blank.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

/// Integer value of a scalar, reading a leading integer out of strings
/// (`"0042abc"` is 42).
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// An option's value as a map. Absent or non-object values read as empty.
pub fn into_map(value: Option<Value>) -> OptionMap {
    match value {
        Some(Value::Object(map)) => map,
        _ => OptionMap::new(),
    }
}

pub fn load_option(store: &dyn SettingsStore, name: &str) -> StoreResult<OptionMap> {
    Ok(into_map(store.get(name)?))
}

/// Read option `name`, let `f` edit it, and write it back only if the edit
/// changed something. Returns whether a write happened.
pub fn modify_option<F>(store: &dyn SettingsStore, name: &str, f: F) -> StepResult<bool>
where
    F: FnOnce(&mut OptionMap) -> StepResult<()>,
{
    let before = load_option(store, name)?;
    let mut after = before.clone();
    f(&mut after)?;
    if after == before {
        return Ok(false);
    }
    store.set(name, Value::Object(after))?;
    tracing::debug!(option = name, "option updated");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemorySettingsStore;
    use serde_json::json;

    #[test]
    fn test_emptiness() {
        for v in [json!(null), json!(false), json!(0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(is_empty(&v), "{} should be empty", v);
        }
        for v in [json!(true), json!(1), json!("x"), json!("00"), json!([0]), json!({"a": null})] {
            assert!(!is_empty(&v), "{} should not be empty", v);
        }
        assert!(!is_filled(None));
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(&json!("0042abc")), Some(42));
        assert_eq!(to_int(&json!(" -7 ")), Some(-7));
        assert_eq!(to_int(&json!(12)), Some(12));
        assert_eq!(to_int(&json!(3.9)), Some(3));
        assert_eq!(to_int(&json!("abc")), None);
        assert_eq!(to_int(&json!(null)), None);
    }

    #[test]
    fn test_modify_option_skips_noop_writes() {
        let store = MemorySettingsStore::with_options([("debug", json!({"a": 1}))]);

        let written = modify_option(&store, "debug", |m| {
            m.insert("a".into(), json!(1));
            Ok(())
        })
        .unwrap();
        assert!(!written);
        assert_eq!(store.write_count(), 0);

        let written = modify_option(&store, "debug", |m| {
            m.remove("a");
            m.insert("b".into(), json!(2));
            Ok(())
        })
        .unwrap();
        assert!(written);
        assert_eq!(store.get("debug").unwrap(), Some(json!({"b": 2})));
    }

    #[test]
    fn test_modify_option_leaves_absent_option_absent() {
        let store = MemorySettingsStore::new();
        let written = modify_option(&store, "missing", |_| Ok(())).unwrap();
        assert!(!written);
        assert_eq!(store.get("missing").unwrap(), None);
    }
}
