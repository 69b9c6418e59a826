//! Caller-facing facade over the storage helper.
//!
//! Each operation launches one helper process, reads what it needs from the
//! document stream, and closes the stream and process before returning,
//! except [`Shim::find`] and [`Shim::find_docs`], which hand the open
//! source to the caller.
//!
//! ```ignore
//! use shimdb::Shim;
//!
//! let shim = Shim::new("/data/db")?;
//! for name in shim.collection_names("test")? {
//!     println!("{name}");
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::args::{Mode, Request};
use crate::decoded::DecodedSource;
use crate::error::{Result, ShimError};
use crate::framing::RawDocSource;
use crate::locator::locate_helper;
use crate::process::{open, HelperInput, HelperOutput, ShimDocSource, ShimProcess};
use crate::query::{AdminCommand, Query};

/// Database holding administrative commands.
pub const ADMIN_DB: &str = "admin";

/// Pseudo-collection commands are issued against.
pub const COMMAND_COLLECTION: &str = "$cmd";

/// Collection listing every namespace of a database.
pub const NAMESPACES_COLLECTION: &str = "system.namespaces";

/// A storage directory served through a helper binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shim {
    db_path: PathBuf,
    helper: PathBuf,
}

#[derive(Debug, Deserialize)]
struct NamespaceEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseList {
    #[serde(default)]
    databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Deserialize)]
struct DatabaseEntry {
    name: String,
    #[serde(default)]
    empty: bool,
}

impl Shim {
    /// Serve `db_path`, locating the helper via [`locate_helper`].
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_helper(db_path, locate_helper()?))
    }

    /// Serve `db_path` with an explicit helper binary.
    pub fn with_helper(db_path: impl Into<PathBuf>, helper: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            helper: helper.into(),
        }
    }

    /// The storage directory.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The helper binary.
    pub fn helper_path(&self) -> &Path {
        &self.helper
    }

    fn request(&self, mode: Mode, database: &str, collection: &str) -> Request {
        Request {
            db_path: self.db_path.clone(),
            database: database.to_string(),
            collection: collection.to_string(),
            mode,
            ..Request::default()
        }
    }

    /// Stream raw documents of `collection` matching `query`.
    pub fn find(
        &self,
        database: &str,
        collection: &str,
        skip: u64,
        limit: u64,
        query: Option<&Query>,
        sort: &[&str],
    ) -> Result<ShimDocSource> {
        let query = match query {
            Some(query) => query.payload()?,
            None => String::new(),
        };
        let request = Request {
            skip,
            limit,
            query,
            sort: sort.iter().map(|key| key.to_string()).collect(),
            ..self.request(Mode::Dump, database, collection)
        };

        let launched = open(&self.helper, &request)?;
        // Dump mode never feeds the helper; close its stdin right away.
        drop(launched.input);
        Ok(ShimDocSource::new(launched.output, launched.process))
    }

    /// Like [`find`](Shim::find), decoding each document.
    pub fn find_docs(
        &self,
        database: &str,
        collection: &str,
        skip: u64,
        limit: u64,
        query: Option<&Query>,
        sort: &[&str],
    ) -> Result<DecodedSource<ShimDocSource>> {
        let source = self.find(database, collection, skip, limit, query, sort)?;
        Ok(DecodedSource::new(source))
    }

    /// The first matching document, or `None` if nothing matched.
    pub fn find_one<T: DeserializeOwned>(
        &self,
        database: &str,
        collection: &str,
        skip: u64,
        query: Option<&Query>,
        sort: &[&str],
    ) -> Result<Option<T>> {
        let mut docs = self.find_docs(database, collection, skip, 1, query, sort)?;
        let found = docs.next();
        docs.close()?;
        Ok(found)
    }

    /// Collection names of `database`, sorted, without index namespaces.
    pub fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        let mut docs = self.find_docs(database, NAMESPACES_COLLECTION, 0, 0, None, &[])?;
        let raw: Vec<String> = docs
            .iter::<NamespaceEntry>()
            .map(|entry| entry.name)
            .collect();
        docs.close()?;

        Ok(filter_collection_names(database, raw))
    }

    /// Names of all non-empty databases, in the order the helper reports them.
    pub fn database_names(&self) -> Result<Vec<String>> {
        let list: DatabaseList = self.run("listDatabases", ADMIN_DB)?;
        Ok(list
            .databases
            .into_iter()
            .filter(|db| !db.empty)
            .map(|db| db.name)
            .collect())
    }

    /// Run an administrative command and decode its single result document.
    ///
    /// Commands always go to `$cmd` in [`ADMIN_DB`]; `database` is only
    /// recorded in the log.
    pub fn run<T: DeserializeOwned>(
        &self,
        command: impl Into<AdminCommand>,
        database: &str,
    ) -> Result<T> {
        let command = command.into();
        debug!(?command, database, "running admin command");
        let request = Request {
            limit: 1,
            query: command.payload()?,
            ..self.request(Mode::Dump, ADMIN_DB, COMMAND_COLLECTION)
        };

        let launched = open(&self.helper, &request)?;
        drop(launched.input);
        let mut docs = DecodedSource::new(ShimDocSource::new(launched.output, launched.process));

        match docs.next() {
            Some(result) => {
                docs.close()?;
                Ok(result)
            }
            None => {
                docs.close()?;
                Err(ShimError::NoResponse)
            }
        }
    }

    /// Start loading documents into `collection`.
    pub fn insert(&self, database: &str, collection: &str) -> Result<InsertSession> {
        let request = self.request(Mode::Insert, database, collection);
        let launched = open(&self.helper, &request)?;
        Ok(InsertSession {
            input: launched.input,
            output: launched.output,
            process: launched.process,
        })
    }

    /// Drop `collection`.
    pub fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        let request = self.request(Mode::Drop, database, collection);
        let launched = open(&self.helper, &request)?;
        drop(launched.input);
        let mut source = ShimDocSource::new(launched.output, launched.process);
        drain(&mut source);
        source.close()
    }
}

/// Keep collection namespaces (plus the oplog), strip the database prefix,
/// and sort.
fn filter_collection_names(database: &str, raw: Vec<String>) -> Vec<String> {
    let prefix = format!("{database}.");
    let mut names: Vec<String> = raw
        .into_iter()
        .filter(|name| !name.contains('$') || name.contains(".oplog.$"))
        .filter_map(|name| match name.strip_prefix(&prefix) {
            Some(short) => Some(short.to_string()),
            None => {
                debug!(namespace = %name, database, "skipping namespace outside database");
                None
            }
        })
        .collect();
    names.sort();
    names
}

/// Read and discard whatever the helper writes.
fn drain<S: RawDocSource>(source: &mut S) {
    let mut buf = Vec::new();
    while source.load_next_into(&mut buf).is_some() {}
}

/// A helper running in insert mode.
pub struct InsertSession {
    input: HelperInput,
    output: HelperOutput,
    process: ShimProcess,
}

impl InsertSession {
    /// Encode and send one document.
    pub fn write_doc<T: serde::Serialize>(&mut self, doc: &T) -> Result<()> {
        self.input.write_doc(doc)
    }

    /// Send one already-encoded record.
    pub fn write_raw(&mut self, record: &[u8]) -> Result<()> {
        self.input.write_raw(record)
    }

    /// Signal end of input and wait for the helper to finish loading.
    pub fn finish(self) -> Result<()> {
        let InsertSession {
            input,
            output,
            process,
        } = self;
        let flushed = input.close();
        let mut source = ShimDocSource::new(output, process);
        drain(&mut source);
        let closed = source.close();
        flushed.and(closed)
    }
}

/// Locate the helper and run one administrative command against `db_path`.
pub fn run_command<T: DeserializeOwned>(
    command: impl Into<AdminCommand>,
    db_path: impl Into<PathBuf>,
    database: &str,
) -> Result<T> {
    Shim::new(db_path)?.run(command, database)
}
