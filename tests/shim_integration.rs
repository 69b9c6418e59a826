//! Integration tests for the helper process boundary.
//!
//! Each test writes a small shell script standing in for `mongoshim`: it
//! records its arguments, replays a prepared byte stream on stdout and exits
//! with a chosen status.
//!
//! # Running
//!
//! ```bash
//! cargo test --test shim_integration
//! ```
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use bson::{doc, Document};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use shimdb::{Query, Shim, ShimError, MAX_RECORD_SIZE};
use tempfile::TempDir;

/// Scripts are written and executed one test at a time; a fork from a
/// parallel test while a script is still open for writing fails with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// A fake helper binary living in its own temp dir.
struct FakeHelper {
    dir: TempDir,
    path: PathBuf,
}

impl FakeHelper {
    /// Helper that prints `output` and exits with `code`.
    fn new(output: &[u8], code: i32) -> Self {
        Self::with_body(output, &format!("cat \"$DIR/out.bin\"\nexit {code}"))
    }

    /// Helper running `body` after recording its arguments.
    fn with_body(output: &[u8], body: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("out.bin"), output).expect("Failed to write output");

        let script = format!(
            "#!/bin/sh\nDIR=\"{}\"\nfor arg in \"$@\"; do printf '%s\\n' \"$arg\"; done > \"$DIR/args.txt\"\n{}\n",
            dir.path().display(),
            body
        );
        let path = dir.path().join("mongoshim");
        std::fs::write(&path, script).expect("Failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");

        Self { dir, path }
    }

    fn shim(&self) -> Shim {
        Shim::with_helper("/data/db", &self.path)
    }

    /// Arguments of the last invocation.
    fn args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("args.txt"))
            .expect("Helper did not record args")
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn file(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.dir.path().join(name)).expect("Missing helper file")
    }
}

fn stream(docs: &[Document]) -> Vec<u8> {
    docs.iter()
        .flat_map(|d| bson::to_vec(d).unwrap())
        .collect()
}

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, PartialEq, Deserialize)]
struct Person {
    name: String,
    age: i32,
}

#[test]
fn test_find_docs_streams_in_order() {
    let _guard = serial();
    let helper = FakeHelper::new(
        &stream(&[
            doc! { "name": "ada", "age": 36 },
            doc! { "name": "alan", "age": 41 },
        ]),
        0,
    );

    let query = Query::from(r#"{"x":1}"#);
    let mut docs = helper
        .shim()
        .find_docs("test", "people", 0, 2, Some(&query), &["-age"])
        .unwrap();
    let people: Vec<Person> = docs.iter().collect();
    docs.close().unwrap();

    assert_eq!(
        people,
        vec![
            Person {
                name: "ada".into(),
                age: 36
            },
            Person {
                name: "alan".into(),
                age: 41
            },
        ]
    );
    assert_eq!(
        helper.args(),
        strings(&[
            "--dbpath",
            "/data/db",
            "-d",
            "test",
            "-c",
            "people",
            "--limit",
            "2",
            "--sort",
            r#"{"age":-1}"#,
            "--query",
            r#"{"x":1}"#,
        ])
    );
}

#[test]
fn test_find_one_returns_document() {
    let _guard = serial();
    let helper = FakeHelper::new(&stream(&[doc! { "name": "ada", "age": 36 }]), 0);

    let person: Option<Person> = helper
        .shim()
        .find_one("test", "people", 3, None, &[])
        .unwrap();

    assert_eq!(
        person,
        Some(Person {
            name: "ada".into(),
            age: 36
        })
    );
    assert_eq!(
        helper.args(),
        strings(&[
            "--dbpath", "/data/db", "-d", "test", "-c", "people", "--limit", "1", "--skip", "3",
        ])
    );
}

#[test]
fn test_find_one_no_match_is_not_an_error() {
    let _guard = serial();
    let helper = FakeHelper::new(&[], 0);

    let person: Option<Person> = helper
        .shim()
        .find_one("test", "people", 0, None, &[])
        .unwrap();
    assert_eq!(person, None);
}

#[test]
fn test_find_one_surfaces_stream_error() {
    let _guard = serial();
    let mut output = stream(&[doc! { "name": "ada", "age": 36 }]);
    output.truncate(output.len() - 3);
    let helper = FakeHelper::new(&output, 0);

    let result: Result<Option<Person>, _> = helper.shim().find_one("test", "people", 0, None, &[]);
    assert!(matches!(result, Err(ShimError::Truncated { .. })));
}

#[test]
fn test_close_reports_helper_exit() {
    let _guard = serial();
    let helper = FakeHelper::new(&stream(&[doc! { "n": 1 }]), 3);

    let mut docs = helper
        .shim()
        .find_docs("test", "things", 0, 0, None, &[])
        .unwrap();
    assert!(docs.next::<Document>().is_some());
    assert!(docs.next::<Document>().is_none());
    assert!(docs.err().is_none());

    match docs.close() {
        Err(ShimError::Exit { status }) => assert_eq!(status.code(), Some(3)),
        other => panic!("Expected Exit error, got {other:?}"),
    }
}

#[test]
fn test_stream_error_wins_over_exit() {
    let _guard = serial();
    let mut output = stream(&[doc! { "n": 1 }]);
    output.truncate(2);
    let helper = FakeHelper::new(&output, 3);

    let mut docs = helper
        .shim()
        .find_docs("test", "things", 0, 0, None, &[])
        .unwrap();
    assert!(docs.next::<Document>().is_none());
    assert!(matches!(docs.close(), Err(ShimError::Truncated { .. })));
}

#[test]
fn test_oversized_record_is_fatal() {
    let _guard = serial();
    let mut output = ((MAX_RECORD_SIZE + 1) as i32).to_le_bytes().to_vec();
    output.extend(stream(&[doc! { "n": 1 }]));
    let helper = FakeHelper::new(&output, 0);

    let mut source = helper
        .shim()
        .find_docs("test", "things", 0, 0, None, &[])
        .unwrap();
    assert!(source.next::<Document>().is_none());
    assert!(matches!(
        source.err(),
        Some(ShimError::RecordTooLarge { .. })
    ));
    // The helper may die on a closed pipe; the framing error still wins.
    assert!(matches!(
        source.close(),
        Err(ShimError::RecordTooLarge { .. })
    ));
}

#[test]
fn test_collection_names_filters_and_sorts() {
    let _guard = serial();
    let helper = FakeHelper::new(
        &stream(&[
            doc! { "name": "mydb.zoo" },
            doc! { "name": "mydb.foo" },
            doc! { "name": "mydb.$cmd" },
            doc! { "name": "mydb.foo.$_id_" },
            doc! { "name": "mydb.oplog.$main" },
        ]),
        0,
    );

    let names = helper.shim().collection_names("mydb").unwrap();
    assert_eq!(names, strings(&["foo", "oplog.$main", "zoo"]));
    assert_eq!(
        helper.args(),
        strings(&["--dbpath", "/data/db", "-d", "mydb", "-c", "system.namespaces"])
    );
}

#[test]
fn test_database_names_skips_empty() {
    let _guard = serial();
    let helper = FakeHelper::new(
        &stream(&[doc! {
            "databases": [
                { "name": "local", "sizeOnDisk": 1.0, "empty": false },
                { "name": "scratch", "empty": true },
                { "name": "app" },
            ],
            "ok": 1.0,
        }]),
        0,
    );

    let names = helper.shim().database_names().unwrap();
    assert_eq!(names, strings(&["local", "app"]));
    assert_eq!(
        helper.args(),
        strings(&[
            "--dbpath",
            "/data/db",
            "-d",
            "admin",
            "-c",
            "$cmd",
            "--limit",
            "1",
            "--query",
            r#"{"listDatabases":1}"#,
        ])
    );
}

#[test]
fn test_run_without_response_is_protocol_error() {
    let _guard = serial();
    let helper = FakeHelper::new(&[], 0);

    let result: Result<Document, _> = helper.shim().run("ping", "admin");
    assert!(matches!(result, Err(ShimError::NoResponse)));
}

#[test]
fn test_run_without_response_prefers_exit_error() {
    let _guard = serial();
    let helper = FakeHelper::new(&[], 2);

    let result: Result<Document, _> = helper.shim().run("ping", "admin");
    assert!(matches!(result, Err(ShimError::Exit { .. })));
}

#[test]
fn test_run_decodes_result() {
    let _guard = serial();
    let helper = FakeHelper::new(&stream(&[doc! { "ok": 1.0 }]), 0);

    let result: Document = helper
        .shim()
        .run(serde_json::json!({"ping": 1}), "admin")
        .unwrap();
    assert_eq!(result.get_f64("ok").unwrap(), 1.0);
    assert!(helper.args().contains(&r#"{"ping":1}"#.to_string()));
}

#[test]
fn test_run_always_targets_admin() {
    let _guard = serial();
    let helper = FakeHelper::new(&stream(&[doc! { "ok": 1.0 }]), 0);

    let _: Document = helper.shim().run("ping", "test").unwrap();
    assert_eq!(
        helper.args(),
        strings(&[
            "--dbpath",
            "/data/db",
            "-d",
            "admin",
            "-c",
            "$cmd",
            "--limit",
            "1",
            "--query",
            r#"{"ping":1}"#,
        ])
    );
}

#[test]
fn test_helper_stderr_does_not_block() {
    let _guard = serial();
    // Far more than a pipe buffer holds.
    let helper = FakeHelper::with_body(
        &stream(&[doc! { "n": 7 }]),
        "head -c 131072 /dev/zero | tr '\\0' 'x' >&2\ncat \"$DIR/out.bin\"",
    );

    let mut docs = helper
        .shim()
        .find_docs("test", "things", 0, 0, None, &[])
        .unwrap();
    let doc = docs.next::<Document>().unwrap();
    assert_eq!(doc.get_i32("n").unwrap(), 7);
    docs.close().unwrap();
}

#[test]
fn test_insert_feeds_helper_stdin() {
    let _guard = serial();
    let helper = FakeHelper::with_body(&[], "cat > \"$DIR/in.bin\"");

    let mut session = helper.shim().insert("test", "people").unwrap();
    session.write_doc(&doc! { "name": "ada", "age": 36 }).unwrap();
    session.write_doc(&doc! { "name": "alan", "age": 41 }).unwrap();
    session.finish().unwrap();

    assert_eq!(
        helper.file("in.bin"),
        stream(&[
            doc! { "name": "ada", "age": 36 },
            doc! { "name": "alan", "age": 41 },
        ])
    );
    assert_eq!(
        helper.args(),
        strings(&["--dbpath", "/data/db", "-d", "test", "-c", "people", "--load"])
    );
}

#[test]
fn test_drop_collection_reports_failure() {
    let _guard = serial();
    let helper = FakeHelper::new(&[], 0);
    helper.shim().drop_collection("test", "people").unwrap();
    assert_eq!(
        helper.args(),
        strings(&["--dbpath", "/data/db", "-d", "test", "-c", "people", "--drop"])
    );

    let failing = FakeHelper::new(&[], 1);
    assert!(matches!(
        failing.shim().drop_collection("test", "people"),
        Err(ShimError::Exit { .. })
    ));
}
