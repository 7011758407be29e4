//! Turns fetched snapshot bytes into raw JSON payload text.
//!
//! Two packagings are recognized: a gzip-compressed tar whose relevant entries sit under a fixed
//! data directory, and a single gzip-compressed JSON document.

mod archive;
mod blob;

pub use archive::{ArchiveExtractor, Payloads};
pub use blob::decompress_blob;
