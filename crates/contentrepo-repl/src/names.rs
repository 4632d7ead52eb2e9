//! Well-known repository item names and name helpers.
//!
//! Names are handled in their prefixed form (`prefix:local`).

/// Root of the document tree subject to publication workflow.
pub const CONTENT_ROOT: &str = "/content";

/// Workflow state property of a document variant.
pub const HIPPOSTD_STATE: &str = "hippostd:state";
/// State value of the live variant.
pub const STATE_PUBLISHED: &str = "published";
/// State value of the preview variant.
pub const STATE_UNPUBLISHED: &str = "unpublished";
/// State value of the editable variant.
pub const STATE_DRAFT: &str = "draft";

/// Mixin marking a document handle.
pub const HIPPO_HARDHANDLE: &str = "hippo:hardhandle";
/// Node type of a document handle.
pub const HIPPO_HANDLE: &str = "hippo:handle";
/// Node type of a workflow request stored under a handle.
pub const HIPPO_REQUEST: &str = "hippo:request";
/// Node type of a scheduled workflow job.
pub const HIPPOSCHED_JOB: &str = "hipposched:job";
/// Node type of a translation stored under a handle.
pub const HIPPO_TRANSLATION: &str = "hippo:translation";

const ILLEGAL_NAME_CHARS: &[char] = &['/', '[', ']', '*', '|', '=', ','];

/// Split a prefixed name into `(prefix, local_name)`. Unprefixed names have no prefix.
pub fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Returns true if `name` is a legal prefixed item name.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.trim() != name || name.contains(ILLEGAL_NAME_CHARS) {
        return false;
    }
    match split_name(name) {
        (Some(prefix), local) => !prefix.is_empty() && !local.is_empty() && !local.contains(':'),
        (None, local) => !local.is_empty(),
    }
}

/// Returns true if `path` equals `prefix` or lies below it as a path segment.
pub fn is_descendant_or_self(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
