//! Gateway module: everything fetched over HTTP
//!
//! - `client`: HTTP client construction, URL layout, fetch classification
//! - `tags`: GraphQL tag lookup for transactions
//! - `manifest`: path manifest model and validation

mod client;
mod manifest;
mod tags;

pub use client::{build_http_client, fetch_url, FetchResult, GatewayClient};
pub use manifest::{
    ManifestEntry, ManifestFallback, ManifestIndex, ManifestValidation, PathManifest,
    MANIFEST_CONTENT_TYPE, MANIFEST_MARKER, MANIFEST_VERSION,
};
pub use tags::{
    collect_tags, normalize_content_type_tag, Tag, TagLookup, TransactionTags, CONTENT_TYPE_TAG,
};
