//! shimdb - query a storage directory through the `mongoshim` helper.
//!
//! Prints result documents as relaxed extended JSON, one per line, so the
//! output can be piped into other tools. Logs go to stderr.
//!
//! ```text
//! shimdb [--dbpath DIR] databases
//! shimdb [--dbpath DIR] collections DB
//! shimdb [--dbpath DIR] find DB COLL [QUERY] [--skip N] [--limit N] [--sort k1,-k2]
//! shimdb [--dbpath DIR] run NAME
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bson::{Bson, Document};
use clap::{Parser, Subcommand};
use shimdb::{Query, Shim, ShimError, ADMIN_DB, HELPER_ENV};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// shimdb - read documents out of a storage directory via mongoshim
#[derive(Parser, Debug)]
#[command(name = "shimdb")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage directory handed to the helper
    #[arg(long = "dbpath", default_value = ".", global = true)]
    db_path: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Action {
    /// List non-empty databases
    Databases,

    /// List the collections of a database
    Collections {
        /// Database name
        database: String,
    },

    /// Print matching documents as extended JSON, one per line
    Find {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Query document as JSON
        query: Option<String>,
        /// Documents to skip
        #[arg(long, default_value_t = 0)]
        skip: u64,
        /// Maximum documents to return (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: u64,
        /// Sort keys, `-` prefix for descending (e.g. `-age,name`)
        #[arg(long, value_delimiter = ',')]
        sort: Vec<String>,
    },

    /// Run an administrative command by name
    Run {
        /// Command name, sent as `{"<name>": 1}`
        command: String,
    },
}

fn print_doc(out: &mut impl Write, doc: Document) -> Result<()> {
    let json = Bson::Document(doc).into_relaxed_extjson();
    writeln!(out, "{}", json).context("Failed to write output")
}

fn execute(cli: Cli) -> Result<()> {
    let shim = Shim::new(cli.db_path.clone())?;
    info!(db_path = %cli.db_path.display(), helper = %shim.helper_path().display(), "Using storage helper");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.action {
        Action::Databases => {
            for name in shim.database_names()? {
                writeln!(out, "{}", name)?;
            }
        }
        Action::Collections { database } => {
            for name in shim.collection_names(&database)? {
                writeln!(out, "{}", name)?;
            }
        }
        Action::Find {
            database,
            collection,
            query,
            skip,
            limit,
            sort,
        } => {
            let query = query.map(Query::from);
            let sort: Vec<&str> = sort
                .iter()
                .map(String::as_str)
                .filter(|key| !key.is_empty())
                .collect();
            let mut docs =
                shim.find_docs(&database, &collection, skip, limit, query.as_ref(), &sort)?;
            while let Some(doc) = docs.next::<Document>() {
                print_doc(&mut out, doc)?;
            }
            docs.close()?;
        }
        Action::Run { command } => {
            let result: Document = shim.run(command.as_str(), ADMIN_DB)?;
            print_doc(&mut out, result)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shimdb=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match execute(cli) {
        Err(e) if matches!(e.downcast_ref::<ShimError>(), Some(err) if err.is_not_found()) => {
            Err(e.context(format!(
                "Install mongoshim next to shimdb, or point {} at it",
                HELPER_ENV
            )))
        }
        result => result,
    }
}
