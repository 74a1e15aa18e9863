mod common;

use std::io::Write;

use vost::*;

#[test]
fn snapshot_writer_commits_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut w = snap.writer("streamed.bin").unwrap();
    w.write_all(b"chunk one ").unwrap();
    w.write_all(b"chunk two").unwrap();
    let next = w.close().unwrap();

    assert_eq!(next.read_text("streamed.bin").unwrap(), "chunk one chunk two");
    // One commit for the whole stream.
    assert_eq!(
        next.parent().unwrap().unwrap().commit_hash(),
        snap.commit_hash()
    );
}

#[test]
fn snapshot_writer_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut w = snap.writer("f").unwrap();
    w.write_all(b"data").unwrap();
    let first = w.close().unwrap();
    let second = w.close().unwrap();
    assert_eq!(first.commit_hash(), second.commit_hash());
    assert!(w.is_closed());
}

#[test]
fn snapshot_writer_rejects_writes_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut w = snap.writer("f").unwrap();
    w.close().unwrap();
    assert!(w.write_all(b"late").is_err());
}

#[test]
fn snapshot_writer_requires_writable() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.tags().set("pin", &snap).unwrap();
    let tag = store.tags().get("pin").unwrap();
    assert!(matches!(
        tag.writer("f").unwrap_err(),
        Error::PermissionDenied(_)
    ));
}

#[test]
fn snapshot_writer_commits_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    {
        let mut w = snap.writer("dropped.txt").unwrap();
        w.write_all(b"persisted").unwrap();
    }

    let fetched = store.branches().get("main").unwrap();
    assert_eq!(fetched.read_text("dropped.txt").unwrap(), "persisted");
}

#[test]
fn batch_writer_stages_into_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut batch = snap.batch(Default::default());
    {
        let mut w = batch.writer("streamed.txt").unwrap();
        w.write_all(b"via batch").unwrap();
        w.close().unwrap();
    }
    batch.write("plain.txt", b"direct").unwrap();
    let next = batch.commit().unwrap();

    assert_eq!(next.read_text("streamed.txt").unwrap(), "via batch");
    assert_eq!(next.read_text("plain.txt").unwrap(), "direct");
}

#[test]
fn batch_writer_stages_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut batch = snap.batch(Default::default());
    {
        let mut w = batch.writer("auto.txt").unwrap();
        w.write_all(b"flushed by drop").unwrap();
    }
    let next = batch.commit().unwrap();
    assert_eq!(next.read_text("auto.txt").unwrap(), "flushed by drop");
}

#[test]
fn empty_stream_writes_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut w = snap.writer("empty.bin").unwrap();
    let next = w.close().unwrap();
    assert_eq!(next.size("empty.bin").unwrap(), 0);
}
