//! Image filenames derived from a record and its lineage.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::metadata::index::MetadataIndex;
use crate::metadata::lineage::trace_ancestry;
use crate::metadata::normalize::effective_concept;
use crate::metadata::record::{short_id, JobRecord};

static RE_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\/*?"<>|:]"#).unwrap());
static RE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s._-]+").unwrap());

pub const MAX_FILENAME_LENGTH: usize = 200;
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const IMAGE_EXTENSION: &str = ".png";

/// Prefix used for images of recreated jobs.
pub const RECREATE_PREFIX: &str = "recreate_";

const EMPTY_COMPONENT: &str = "sanitized_empty";
const UNKNOWN_ACTION: &str = "unknown_action";

/// Removes filesystem-unsafe characters and collapses whitespace, dots,
/// underscores and hyphens into single underscores.
pub fn sanitize_component(value: &str) -> String {
    let cleaned = RE_UNSAFE.replace_all(value, "");
    let collapsed = RE_SEPARATORS.replace_all(&cleaned, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        EMPTY_COMPONENT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitizes each comma-separated tag and joins them with `_`.
fn sanitize_tags(tags: Option<&str>) -> Option<String> {
    let parts: Vec<String> = tags?
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(sanitize_component)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("_"))
    }
}

/// Caps `name` at [`MAX_FILENAME_LENGTH`] characters, keeping the image
/// extension intact when present.
pub fn truncate_filename(name: &str) -> String {
    if name.chars().count() <= MAX_FILENAME_LENGTH {
        return name.to_string();
    }

    match name.strip_suffix(IMAGE_EXTENSION) {
        Some(stem) => {
            let keep = MAX_FILENAME_LENGTH - IMAGE_EXTENSION.len();
            let stem: String = stem.chars().take(keep).collect();
            format!("{}{}", stem, IMAGE_EXTENSION)
        }
        None => name.chars().take(MAX_FILENAME_LENGTH).collect(),
    }
}

/// Builds the image filename for `record`.
///
/// Root jobs: `{prefix}{concept}-{id6}[-{variations}][-{styles}]-{ts}.png`.
/// Derived jobs: `{prefix}{root concept}-{original id6}-{action_code}-{ts}.png`,
/// with `orig_{id6}` standing in for the concept when the lineage does not
/// reach a root.
///
/// The result depends on the ancestors present in `index` at call time, so
/// it can differ between calls once ancestor data changes.
pub fn derive_filename(
    record: &JobRecord,
    index: &MetadataIndex,
    prefix: Option<&str>,
    timestamp: NaiveDateTime,
) -> String {
    let prefix = prefix
        .map(|p| RE_UNSAFE.replace_all(p, "").into_owned())
        .unwrap_or_default();
    let stamp = timestamp.format(TIMESTAMP_FORMAT).to_string();

    let stem = match record.parent_id() {
        None => {
            let mut parts = vec![
                sanitize_component(effective_concept(record.concept.as_deref())),
                sanitize_component(record.short_job_id()),
            ];
            parts.extend(sanitize_tags(record.variations.as_deref()));
            parts.extend(sanitize_tags(record.global_styles.as_deref()));
            parts.push(stamp);
            parts.join("-")
        }
        Some(original) => {
            let lineage = trace_ancestry(original, index);
            let concept = match lineage.root() {
                Some(root) => sanitize_component(effective_concept(root.concept.as_deref())),
                None => {
                    log::warn!(
                        "Cannot trace {} to a root for its filename; using a fallback token",
                        original
                    );
                    format!("orig_{}", sanitize_component(short_id(original)))
                }
            };
            let action = sanitize_component(record.action_code.as_deref().unwrap_or(UNKNOWN_ACTION));
            [
                concept,
                sanitize_component(short_id(original)),
                action,
                stamp,
            ]
            .join("-")
        }
    };

    truncate_filename(&format!("{}{}{}", prefix, stem, IMAGE_EXTENSION))
}
