//! Minimal differential computation
//!
//! Only elements whose state differs from the original captured in the
//! [`ElementTree`] are emitted, and for each of them only the changed
//! top-level fields, plus the identity fields `id`, `path` and `sliceName`.

use crate::fhir::ElementDefinition;
use crate::tree::ElementTree;
use serde_json::{Map, Value};
use tracing::warn;

const IDENTITY_KEYS: &[&str] = &["id", "path", "sliceName"];

fn to_object(element: &ElementDefinition) -> Map<String, Value> {
    match serde_json::to_value(element) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Changed fields of `current` relative to `original`, or None when nothing changed
fn diff_element(original: &ElementDefinition, current: &ElementDefinition) -> Option<ElementDefinition> {
    let before = to_object(original);
    let after = to_object(current);

    let mut changed = Map::new();
    for (key, value) in &after {
        if IDENTITY_KEYS.contains(&key.as_str()) {
            continue;
        }
        if before.get(key) != Some(value) {
            changed.insert(key.clone(), value.clone());
        }
    }
    let slice_changed = current.slice_name.is_some() && original.slice_name != current.slice_name;
    if changed.is_empty() && !slice_changed {
        return None;
    }

    let mut entry = Map::new();
    entry.insert("id".into(), Value::String(current.id.clone()));
    entry.insert("path".into(), Value::String(current.path.clone()));
    if let Some(slice_name) = &current.slice_name {
        entry.insert("sliceName".into(), Value::String(slice_name.clone()));
    }
    entry.extend(changed);

    match serde_json::from_value(Value::Object(entry)) {
        Ok(element) => Some(element),
        Err(err) => {
            warn!("Could not build differential entry for {}: {}", current.id, err);
            None
        }
    }
}

/// Differential elements in snapshot order
pub(crate) fn compute_differential(tree: &ElementTree) -> Vec<ElementDefinition> {
    tree.iter()
        .filter_map(|(idx, current)| {
            let original = tree.original(idx)?;
            diff_element(original, current)
        })
        .collect()
}
