//! Command-line construction for the storage helper.
//!
//! The helper parses its flags positionally-sensitive, so [`build_args`]
//! always emits them in the same fixed order:
//!
//! ```text
//! --dbpath <path> -d <db> -c <coll> --limit <n> --skip <n> --sort <json> --query <json> [--load|--drop]
//! ```
//!
//! Flags for empty or zero fields are omitted.

use std::ffi::OsString;
use std::path::PathBuf;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::Result;

/// What the helper should do with the addressed collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Stream matching documents to stdout.
    #[default]
    Dump,
    /// Read documents from stdin into the collection.
    Insert,
    /// Drop the collection.
    Drop,
}

/// One helper invocation, built by the facade and consumed when the helper
/// is opened. It never carries live process state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Storage directory handed to `--dbpath`.
    pub db_path: PathBuf,
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Documents to skip.
    pub skip: u64,
    /// Maximum documents to return; 0 means unbounded.
    pub limit: u64,
    /// Serialized filter; empty means none.
    pub query: String,
    /// Sort keys, `-` prefixed for descending.
    pub sort: Vec<String>,
    /// Helper behavior.
    pub mode: Mode,
}

/// Ordered sort specification, `{"key": 1|-1, ...}`.
///
/// Serialized entry by entry so key order and duplicates survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec(Vec<(String, i32)>);

impl SortSpec {
    /// Parse sort keys; a leading `-` selects descending order.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        let fields = keys
            .iter()
            .map(|key| {
                let key = key.as_ref();
                match key.strip_prefix('-') {
                    Some(name) => (name.to_string(), -1),
                    None => (key.to_string(), 1),
                }
            })
            .collect();
        SortSpec(fields)
    }

    /// The `(key, direction)` pairs in order.
    pub fn fields(&self) -> &[(String, i32)] {
        &self.0
    }
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, direction) in &self.0 {
            map.serialize_entry(key, direction)?;
        }
        map.end()
    }
}

/// Translate a request into the helper's argument list.
pub fn build_args(request: &Request) -> Result<Vec<OsString>> {
    let mut args: Vec<OsString> = Vec::new();

    if !request.db_path.as_os_str().is_empty() {
        args.push("--dbpath".into());
        args.push(request.db_path.clone().into_os_string());
    }
    if !request.database.is_empty() {
        args.push("-d".into());
        args.push(request.database.clone().into());
    }
    if !request.collection.is_empty() {
        args.push("-c".into());
        args.push(request.collection.clone().into());
    }
    if request.limit > 0 {
        args.push("--limit".into());
        args.push(request.limit.to_string().into());
    }
    if request.skip > 0 {
        args.push("--skip".into());
        args.push(request.skip.to_string().into());
    }
    if !request.sort.is_empty() {
        let sort = serde_json::to_string(&SortSpec::from_keys(request.sort.as_slice()))?;
        args.push("--sort".into());
        args.push(sort.into());
    }
    if request.mode != Mode::Drop && !request.query.is_empty() {
        args.push("--query".into());
        args.push(request.query.clone().into());
    }

    match request.mode {
        Mode::Dump => {}
        Mode::Insert => args.push("--load".into()),
        Mode::Drop => args.push("--drop".into()),
    }

    Ok(args)
}
