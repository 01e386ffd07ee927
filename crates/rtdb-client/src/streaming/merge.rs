//! JSON tree edits applied by `put` and `patch` frames
//!
//! The store never holds `null` or empty objects: writing `null` deletes,
//! and a parent whose last child is deleted disappears with it. Every value
//! produced here is normalized the same way, so `None` means "absent".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the object carried by a `patch` frame combines with the cached value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchMerge {
    /// Each patched key replaces the value stored under it
    #[default]
    Shallow,
    /// Patched objects are merged into stored objects recursively
    Deep,
}

impl PatchMerge {
    /// Combine a patched key's new value with what is stored there now
    pub fn combine(self, existing: Option<&Value>, incoming: Value) -> Value {
        match self {
            PatchMerge::Shallow => incoming,
            PatchMerge::Deep => deep_merge(existing.cloned(), incoming),
        }
    }
}

fn deep_merge(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(patch)) => {
            for (key, value) in patch {
                let merged = deep_merge(base.remove(&key), value);
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

/// Split a frame path or patch key into its non-empty segments
pub fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip `null`s and empty objects; `None` when nothing remains
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}

/// Value found at `path` below `target`
pub fn get_at<'a>(target: Option<&'a Value>, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(target?, |node, key| node.as_object()?.get(key))
}

/// Replace the value at `path` below `target` with `value`.
///
/// Non-object values along the way are replaced by objects. Writing `null`
/// deletes the key and prunes parents left empty.
pub fn set_at(target: Option<Value>, path: &[String], value: Value) -> Option<Value> {
    let Some((key, rest)) = path.split_first() else {
        return normalize(value);
    };

    let mut map = match target {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(child) = set_at(map.remove(key), rest, value) {
        map.insert(key.clone(), child);
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        segments(p)
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("/"), Vec::<String>::new());
        assert_eq!(segments("/x/v"), vec!["x".to_string(), "v".to_string()]);
        assert_eq!(segments("a//b/"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(json!(null)), None);
        assert_eq!(normalize(json!({})), None);
        assert_eq!(normalize(json!({"a": null, "b": {"c": null}})), None);
        assert_eq!(
            normalize(json!({"a": 1, "b": null})),
            Some(json!({"a": 1}))
        );
        assert_eq!(normalize(json!([1, null])), Some(json!([1, null])));
    }

    #[test]
    fn test_set_at_root_replaces() {
        assert_eq!(set_at(Some(json!({"a": 1})), &[], json!(5)), Some(json!(5)));
        assert_eq!(set_at(Some(json!({"a": 1})), &[], json!(null)), None);
    }

    #[test]
    fn test_set_at_nested() {
        let value = set_at(Some(json!({"v": 1})), &path("/w/z"), json!(true));
        assert_eq!(value, Some(json!({"v": 1, "w": {"z": true}})));
    }

    #[test]
    fn test_set_at_null_prunes_empty_parents() {
        let value = set_at(Some(json!({"w": {"z": true}})), &path("/w/z"), json!(null));
        assert_eq!(value, None);

        let value = set_at(
            Some(json!({"v": 1, "w": {"z": true}})),
            &path("/w/z"),
            json!(null),
        );
        assert_eq!(value, Some(json!({"v": 1})));
    }

    #[test]
    fn test_set_at_replaces_primitive_parent() {
        let value = set_at(Some(json!(3)), &path("/a"), json!(1));
        assert_eq!(value, Some(json!({"a": 1})));
    }

    #[test]
    fn test_get_at() {
        let value = json!({"a": {"b": 2}});
        assert_eq!(get_at(Some(&value), &path("/a/b")), Some(&json!(2)));
        assert_eq!(get_at(Some(&value), &path("/a/c")), None);
        assert_eq!(get_at(Some(&value), &[]), Some(&value));
        assert_eq!(get_at(None, &path("/a")), None);
    }

    #[test]
    fn test_shallow_combine_replaces() {
        let existing = json!({"a": 1, "b": 2});
        assert_eq!(
            PatchMerge::Shallow.combine(Some(&existing), json!({"a": 3})),
            json!({"a": 3})
        );
    }

    #[test]
    fn test_deep_combine_merges_objects() {
        let existing = json!({"a": 1, "b": {"c": 2, "d": 3}});
        assert_eq!(
            PatchMerge::Deep.combine(Some(&existing), json!({"b": {"c": 9, "d": null}})),
            json!({"a": 1, "b": {"c": 9, "d": null}})
        );
        // nulls are removed once the merged value is stored
        assert_eq!(
            normalize(PatchMerge::Deep.combine(Some(&existing), json!({"b": {"d": null}}))),
            Some(json!({"a": 1, "b": {"c": 2}}))
        );
    }

    #[test]
    fn test_merge_serde_names() {
        assert_eq!(
            serde_json::from_str::<PatchMerge>("\"deep\"").unwrap(),
            PatchMerge::Deep
        );
        assert_eq!(serde_json::to_string(&PatchMerge::Shallow).unwrap(), "\"shallow\"");
    }
}
