//! Integration tests for archive, history, and positional list
//! semantics.

use rowdb_core::{CoreError, Value};
use rowdb_testkit::prelude::*;

fn saved_document(db: &TestDatabase, title: &str) -> rowdb_core::Row {
    let row = db.table("Document").unwrap().create().unwrap();
    row.set("title", title).unwrap();
    row.set("body", "first version").unwrap();
    row.save().unwrap();
    row
}

#[test]
fn delete_moves_archiving_entities_to_the_archive() {
    let db = TestDatabase::sample();
    let row = saved_document(&db, "report");
    let pk = row.primary_key().unwrap();

    assert!(row.delete().unwrap());

    let documents = db.table("Document").unwrap();
    assert!(documents
        .primary_key()
        .get(pk.clone())
        .resolve()
        .unwrap()
        .is_none());

    let archived = documents
        .clone()
        .archive()
        .primary_key()
        .get(pk.clone())
        .resolve()
        .unwrap()
        .unwrap();
    assert!(archived.is_archived());
    assert_eq!(archived.get("title").unwrap(), Value::from("report"));

    // Archived rows are read-only.
    assert!(archived.set("title", "renamed").is_err());
    assert!(archived.save().is_err());

    // Archive indexes work like live ones.
    let by_title = documents.clone().archive().key("title").unwrap();
    assert_eq!(by_title.find("report").resolve().unwrap().len(), 1);
}

#[test]
fn unarchive_restores_the_row() {
    let db = TestDatabase::sample();
    let row = saved_document(&db, "report");
    let pk = row.primary_key().unwrap();
    row.archive().unwrap();

    let documents = db.table("Document").unwrap();
    let archived = documents
        .clone()
        .archive()
        .primary_key()
        .get(pk.clone())
        .resolve()
        .unwrap()
        .unwrap();
    archived.unarchive().unwrap();

    let live = documents
        .primary_key()
        .get(pk.clone())
        .resolve()
        .unwrap()
        .unwrap();
    assert!(!live.is_archived());
    assert!(documents
        .clone()
        .archive()
        .primary_key()
        .get(pk)
        .resolve()
        .unwrap()
        .is_none());

    // Entities without an archive cannot archive at all.
    let company = db.table("Company").unwrap().create().unwrap();
    company.set("companyName", "Acme").unwrap();
    company.save().unwrap();
    assert!(company.archive().is_err());
}

#[test]
fn deleting_an_archived_row_destroys_it() {
    let db = TestDatabase::sample();
    let row = saved_document(&db, "report");
    let pk = row.primary_key().unwrap();
    row.delete().unwrap();

    let documents = db.table("Document").unwrap();
    let archived = documents
        .clone()
        .archive()
        .primary_key()
        .get(pk.clone())
        .resolve()
        .unwrap()
        .unwrap();
    assert!(archived.delete().unwrap());
    assert!(documents
        .clone()
        .archive()
        .primary_key()
        .get(pk)
        .resolve()
        .unwrap()
        .is_none());
}

#[test]
fn every_save_appends_a_history_snapshot() {
    let db = TestDatabase::sample();
    let row = saved_document(&db, "report");
    let pk = row.primary_key().unwrap();

    row.set("body", "second version").unwrap();
    row.save().unwrap();

    // Snapshots are found through the source row's key; each save
    // contributed one, holding the data as it was submitted.
    let documents = db.table("Document").unwrap();
    let snapshots = documents
        .clone()
        .history()
        .key("ID")
        .unwrap()
        .find(pk.clone())
        .resolve()
        .unwrap();
    assert_eq!(snapshots.len(), 2);
    for snapshot in &snapshots {
        assert!(snapshot.is_history());
        assert_eq!(snapshot.history_source_key().unwrap(), pk);
        assert!(snapshot.history_timestamp().unwrap() > 0);
        // Snapshots are immutable.
        assert!(snapshot.set("body", "rewrite").is_err());
        assert!(snapshot.delete().is_err());
        assert!(snapshot.save().is_err());
    }

    // Non-history rows have no snapshot metadata.
    assert!(row.history_timestamp().is_err());

    // History survives deletion of the live row.
    row.delete().unwrap();
    let snapshots = documents
        .history()
        .key("ID")
        .unwrap()
        .find(pk)
        .resolve()
        .unwrap();
    assert_eq!(snapshots.len(), 2);
}

#[test]
fn history_is_also_keyed_by_indexed_columns() {
    let db = TestDatabase::sample();
    saved_document(&db, "report");
    saved_document(&db, "memo");

    let by_title = db
        .table("Document")
        .unwrap()
        .history()
        .key("title")
        .unwrap();
    assert_eq!(by_title.find("report").resolve().unwrap().len(), 1);
    assert_eq!(by_title.find("memo").resolve().unwrap().len(), 1);
}

#[test]
fn list_tables_assign_positions_as_keys() {
    let db = TestDatabase::sample();
    let logs = db.table("AccessLog").unwrap();

    for (user, path) in [("ann", "/a"), ("bob", "/b"), ("ann", "/c")] {
        let row = logs.create().unwrap();
        // Fresh list rows have no key until saved.
        assert!(row.primary_key().is_err());
        row.set("user", user).unwrap();
        row.set("path", path).unwrap();
        row.save().unwrap();
    }

    let all = logs.all().resolve().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].primary_key().unwrap(), Value::Integer(0));
    assert_eq!(all[2].primary_key().unwrap(), Value::Integer(2));

    // Positional fetches and ranges.
    let second = logs.primary_key().get(1i64).resolve().unwrap().unwrap();
    assert_eq!(second.get("user").unwrap(), Value::from("bob"));
    let tail = logs.primary_key().get_range(-2, -1).resolve().unwrap();
    assert_eq!(tail.len(), 2);

    // Secondary indexes apply to list rows too.
    let anns = logs.key("user").unwrap().find("ann").resolve().unwrap();
    assert_eq!(anns.len(), 2);
}

#[test]
fn list_rows_are_append_only() {
    let db = TestDatabase::sample();
    let logs = db.table("AccessLog").unwrap();
    let row = logs.create().unwrap();
    row.set("user", "ann").unwrap();
    row.save().unwrap();

    // Saving again would re-submit the assigned key.
    row.set("path", "/late").unwrap();
    assert!(matches!(
        row.save().unwrap_err(),
        CoreError::Config { .. }
    ));
    assert!(row.delete().is_err());
    assert!(logs.reindex().is_err());

    // Keyed tables reject positional ranges.
    assert!(db
        .table("Company")
        .unwrap()
        .primary_key()
        .get_range(0, -1)
        .resolve()
        .is_err());
}
