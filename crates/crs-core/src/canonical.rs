//! Canonical encoding for composite keys.
//!
//! Every place the substrate needs one key to name a tuple — a build
//! output, a harness weight entry, a coverage-map hash, a PoV key —
//! the tuple is encoded as a JSON array with stable field order and
//! canonical numeric form, so two independent producers (possibly in
//! different languages) that build the same tuple always produce the
//! same bytes. `serde_json::to_string` already gives us stable array
//! ordering for free (arrays are positional); the only discipline this
//! module enforces is routing every composite key through one function
//! so nobody hand-rolls a `format!("{a}:{b}")` that drifts out of sync.

use serde::Serialize;

/// Encode a tuple of canonical-key parts as a JSON array string.
///
/// Accepts anything `Serialize`s to a JSON array element; callers pass
/// a tuple or a `Vec` of homogeneous parts.
pub fn encode_key<T: Serialize>(parts: &T) -> String {
    serde_json::to_string(parts).expect("canonical key parts must serialize")
}

/// Canonical PoV key: `[task_id, internal_patch_id, pov_path, sanitizer, harness_name]`.
pub fn pov_key(
    task_id: &str,
    internal_patch_id: &str,
    pov_path: &str,
    sanitizer: &str,
    harness_name: &str,
) -> String {
    encode_key(&(task_id, internal_patch_id, pov_path, sanitizer, harness_name))
}

/// Canonical harness-weight key: `[package, harness, task]`.
pub fn harness_key(package: &str, harness: &str, task: &str) -> String {
    encode_key(&(package, harness, task))
}

/// Canonical coverage-entry key within a coverage-map hash: `[function_name, function_paths]`.
pub fn coverage_entry_key(function_name: &str, function_paths: &[String]) -> String {
    encode_key(&(function_name, function_paths))
}

/// Canonical coverage-map hash name: `["coverage_map", harness, package, task]`.
pub fn coverage_map_name(harness: &str, package: &str, task: &str) -> String {
    encode_key(&("coverage_map", harness, package, task))
}

/// Canonical build-output key: `[task, build_type, sanitizer, patch_id]`.
pub fn build_output_key(task: &str, build_type: &str, sanitizer: &str, patch_id: &str) -> String {
    encode_key(&(task, build_type, sanitizer, patch_id))
}

/// Canonical sanitizer-set key: `[task, build_type]`.
pub fn build_san_set_key(task: &str, build_type: &str) -> String {
    encode_key(&(task, build_type))
}
