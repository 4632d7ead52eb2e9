//! Shared fixtures for replication integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use contentrepo_repl::names::{
    HIPPOSCHED_JOB, HIPPOSTD_STATE, HIPPO_HANDLE, HIPPO_HARDHANDLE, HIPPO_REQUEST,
};
use contentrepo_repl::{
    FilterChain, FilterKind, FilterSpec, MemoryNodeStore, NodeSnapshot, NodeStateLookup,
    PropertyValue,
};

/// A small document tree:
///
/// ```text
/// /content/public                      "public"
/// /content/secret/x                    "secret"
/// /content2                            "content2"
/// /other                               "other"
/// /content/documents/news              "news"      handle: news-live, news-draft
/// /content/documents/news/news         "news-live" published
/// /content/documents/news/news         "news-draft" draft
/// /content/documents/memo              "memo"      handle: memo-draft, memo-req
/// /content/documents/memo/memo         "memo-draft" draft
/// /content/documents/memo/hippo:request "memo-req" request
/// /hippo:configuration/jobs/j1         "job"       scheduled job
/// /content/documents/old               "old"       state unpublished
/// ```
pub fn content_nodes() -> Vec<NodeSnapshot> {
    vec![
        NodeSnapshot::new("public", "/content/public", "nt:unstructured"),
        NodeSnapshot::new("secret", "/content/secret/x", "nt:unstructured"),
        NodeSnapshot::new("content2", "/content2", "nt:unstructured"),
        NodeSnapshot::new("other", "/other", "nt:unstructured"),
        NodeSnapshot::new("news", "/content/documents/news", HIPPO_HANDLE)
            .with_mixin(HIPPO_HARDHANDLE)
            .with_child("news-live")
            .with_child("news-draft"),
        NodeSnapshot::new("news-live", "/content/documents/news/news", "ex:article")
            .with_property(HIPPOSTD_STATE, PropertyValue::from("published")),
        NodeSnapshot::new("news-draft", "/content/documents/news/news", "ex:article")
            .with_property(HIPPOSTD_STATE, PropertyValue::from("draft")),
        NodeSnapshot::new("memo", "/content/documents/memo", HIPPO_HANDLE)
            .with_mixin(HIPPO_HARDHANDLE)
            .with_child("memo-draft")
            .with_child("memo-req"),
        NodeSnapshot::new("memo-draft", "/content/documents/memo/memo", "ex:article")
            .with_property(HIPPOSTD_STATE, PropertyValue::from("draft")),
        NodeSnapshot::new(
            "memo-req",
            "/content/documents/memo/hippo:request",
            HIPPO_REQUEST,
        ),
        NodeSnapshot::new("job", "/hippo:configuration/jobs/j1", HIPPOSCHED_JOB),
        NodeSnapshot::new("old", "/content/documents/old", "ex:article")
            .with_property(HIPPOSTD_STATE, PropertyValue::from("unpublished")),
    ]
}

pub fn content_store() -> Arc<dyn NodeStateLookup> {
    Arc::new(MemoryNodeStore::with_nodes(content_nodes()))
}

pub fn chain(spec: FilterSpec) -> FilterChain {
    FilterChain::from_specs(&[spec], content_store()).expect("filter init")
}

pub fn path_spec(replicate: &str, exclude: &str) -> FilterSpec {
    FilterSpec::new(FilterKind::Path)
        .with_param("replicate", replicate)
        .with_param("exclude", exclude)
}

/// Writes the fixture tree as `nodes.json` under `dir`.
pub fn write_nodes_file(dir: &Path) -> PathBuf {
    let path = dir.join("nodes.json");
    let json = serde_json::to_string_pretty(&content_nodes()).expect("serialize nodes");
    std::fs::write(&path, json).expect("write nodes");
    path
}
