use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::{PAUSED_ANNOTATION, Valhalla};

/// Read a boolean annotation. Only the literals `"true"` and `"false"` are
/// recognised; any other value and a missing key both yield `None`.
pub fn parse_bool_annotation(
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Option<bool> {
    match annotations.get(key).map(String::as_str) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

/// Whether the instance asks the operator to stop reconciling it.
pub fn is_paused(instance: &Valhalla) -> bool {
    parse_bool_annotation(instance.annotations(), PAUSED_ANNOTATION)
        .unwrap_or(false)
}
