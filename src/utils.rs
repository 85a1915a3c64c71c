use std::collections::BTreeMap;

/// Check if every selector label is present on the pod with the same value.
///
/// An empty selector never matches: a LogConfig without labels must not
/// turn into a wildcard that captures every pod.
pub fn labels_subset(
    selector: &BTreeMap<String, String>,
    pod_labels: &BTreeMap<String, String>,
) -> bool {
    if selector.is_empty() {
        return false;
    }
    selector
        .iter()
        .all(|(key, value)| pod_labels.get(key) == Some(value))
}

/// Render labels as `k=v,k=v` for log output.
pub fn labels_to_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
