//! Model identifier normalization and priority deduplication.
//!
//! Normalized ids exist only to decide whether two catalog entries refer to
//! the same underlying model; they are never displayed or dispatched on.

use crate::model::ModelInfo;

/// Org prefixes stripped before comparison.
const ORG_PREFIXES: &[&str] = &[
    "models/",
    "meta-llama/",
    "mistralai/",
    "google/",
    "qwen/",
    "openai/",
    "anthropic/",
    "black-forest-labs/",
    "stabilityai/",
    "nousresearch/",
];

/// Suffix tokens stripped after the id is reduced to alphanumerics.
const TRAILING_TOKENS: &[&str] = &[
    "instruct",
    "chat",
    "it",
    "latest",
    "preview",
    "experimental",
];

/// Canonicalizes a model id for deduplication equivalence.
///
/// Lowercase, strip known org prefixes, drop all non-alphanumerics, then
/// strip trailing variant tokens until none match.
#[must_use]
pub fn normalize(id: &str) -> String {
    let lowered = id.to_ascii_lowercase();
    let mut rest = lowered.as_str();
    loop {
        let Some(stripped) = ORG_PREFIXES.iter().find_map(|p| rest.strip_prefix(p)) else {
            break;
        };
        rest = stripped;
    }

    let mut canonical: String = rest.chars().filter(char::is_ascii_alphanumeric).collect();

    loop {
        let Some(new_len) = TRAILING_TOKENS
            .iter()
            .find_map(|t| canonical.strip_suffix(t).map(str::len))
        else {
            break;
        };
        canonical.truncate(new_len);
    }
    canonical
}

/// Deduplicates a catalog under the source priority order.
///
/// Models are grouped by [`normalize`]d id; within a group the entry with
/// the lowest `(priority, id)` pair survives. The alphabetical tie-break
/// keeps the result deterministic when two sources share a priority.
#[must_use]
pub fn deduplicate(mut models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    models.sort_by(|a, b| {
        a.source
            .priority()
            .cmp(&b.source.priority())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen = std::collections::HashSet::new();
    models.retain(|m| seen.insert(normalize(&m.id)));
    models
}
