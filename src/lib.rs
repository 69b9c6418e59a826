//! shimdb library
//!
//! Reads and writes documents through an external storage-engine helper
//! process (`mongoshim`). Requests become helper command lines, the helper's
//! stdout becomes a stream of length-prefixed BSON documents, and the
//! process lifecycle stays hidden behind ordinary source/iterator types.
//!
//! - `args` - request model and helper command-line construction
//! - `locator` - finding the helper binary
//! - `process` - spawning, stream wiring and reaping the helper
//! - `framing` - length-prefixed document reader and writer
//! - `decoded` - typed decoding over a framed stream
//! - `shim` - the `Shim` facade: find, run, list, insert, drop
//!
//! # Example
//!
//! ```ignore
//! use shimdb::{Query, Shim};
//! use serde_json::json;
//!
//! let shim = Shim::new("/data/db")?;
//! let query = Query::from(json!({"age": {"$gt": 30}}));
//! let mut docs = shim.find_docs("test", "people", 0, 10, Some(&query), &["-age"])?;
//! for person in docs.iter::<bson::Document>() {
//!     println!("{person}");
//! }
//! docs.close()?;
//! ```

pub mod args;
pub mod decoded;
pub mod error;
pub mod framing;
pub mod locator;
pub mod process;
pub mod query;
pub mod shim;

pub use args::{build_args, Mode, Request, SortSpec};
pub use decoded::{DecodedSource, Docs};
pub use error::{Result, ShimError, SpawnStep};
pub use framing::{BsonSink, BsonSource, RawDocSource, MAX_RECORD_SIZE};
pub use locator::{locate_helper, locate_with, HELPER_ENV, HELPER_NAME};
pub use process::{open, spawn_helper, Launched, ShimDocSource, ShimProcess};
pub use query::{AdminCommand, Query};
pub use shim::{
    run_command, InsertSession, Shim, ADMIN_DB, COMMAND_COLLECTION, NAMESPACES_COLLECTION,
};
