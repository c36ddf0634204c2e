//! Label subset matching for worker selection.

use std::collections::BTreeMap;

/// Whether a worker's labels satisfy a requested label set.
///
/// - An empty filter matches any worker.
/// - A non-empty filter never matches a worker without labels.
/// - Otherwise every filter key must exist on the worker with an exactly
///   equal value. Keys and values are exact-case.
pub fn labels_match(
    exec_labels: &BTreeMap<String, String>,
    filter_labels: &BTreeMap<String, String>,
) -> bool {
    if filter_labels.is_empty() {
        return true;
    }
    if exec_labels.is_empty() {
        return false;
    }
    filter_labels
        .iter()
        .all(|(key, value)| exec_labels.get(key) == Some(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
