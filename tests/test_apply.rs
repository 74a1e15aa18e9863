mod common;

use vost::*;

#[test]
fn apply_writes_and_removes_in_one_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap
        .apply(
            &[
                ("new/one.txt", WriteEntry::from_text("one")),
                ("dir/a.txt", WriteEntry::from_text("rewritten")),
            ],
            &["hello.txt"],
            ApplyOptions::default(),
        )
        .unwrap();

    assert_eq!(next.read_text("new/one.txt").unwrap(), "one");
    assert_eq!(next.read_text("dir/a.txt").unwrap(), "rewritten");
    assert!(!next.exists("hello.txt").unwrap());

    // One commit for the whole set.
    assert_eq!(
        next.parent().unwrap().unwrap().commit_hash(),
        snap.commit_hash()
    );
}

#[test]
fn apply_supports_all_entry_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let next = snap
        .apply(
            &[
                ("plain.txt", WriteEntry::from_bytes(b"bytes".to_vec())),
                ("tool", WriteEntry::executable(b"#!/bin/sh\n".to_vec())),
                ("link", WriteEntry::symlink("plain.txt")),
            ],
            &[],
            ApplyOptions::default(),
        )
        .unwrap();

    assert_eq!(next.file_type("plain.txt").unwrap(), FileType::Blob);
    assert_eq!(next.file_type("tool").unwrap(), FileType::Executable);
    assert_eq!(next.readlink("link").unwrap(), "plain.txt");
}

#[test]
fn apply_auto_message_counts_operations() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap
        .apply(
            &[("a1.txt", WriteEntry::from_text("x"))],
            &["hello.txt"],
            ApplyOptions::default(),
        )
        .unwrap();
    assert_eq!(next.message().unwrap(), "apply: 1 write(s), 1 remove(s)");

    let next = next
        .apply(
            &[("a2.txt", WriteEntry::from_text("y"))],
            &[],
            ApplyOptions {
                operation: Some("import".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(next.message().unwrap(), "import: 1 write(s), 0 remove(s)");
}

#[test]
fn apply_rejects_invalid_paths_before_committing() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());

    let err = snap
        .apply(
            &[("ok.txt", WriteEntry::from_text("x"))],
            &["../escape"],
            ApplyOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));

    // Branch tip untouched on failure.
    assert_eq!(
        store.branches().get("main").unwrap().commit_hash(),
        snap.commit_hash()
    );
    assert!(!store.branches().get("main").unwrap().exists("ok.txt").unwrap());
}

#[test]
fn apply_rejects_unknown_modes() {
    let entry = WriteEntry::Data {
        bytes: b"x".to_vec(),
        mode: 0o100600,
    };
    assert!(entry.validate().is_err());
}

#[test]
fn apply_on_readonly_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.tags().set("locked", &snap).unwrap();
    let tag = store.tags().get("locked").unwrap();

    let err = tag
        .apply(
            &[("z.txt", WriteEntry::from_text("z"))],
            &[],
            ApplyOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn apply_replacing_file_with_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write_text("node", "was a file", WriteOptions::default())
        .unwrap();

    let next = snap
        .apply(
            &[("node/child.txt", WriteEntry::from_text("now a dir"))],
            &[],
            ApplyOptions::default(),
        )
        .unwrap();
    assert!(next.is_dir("node").unwrap());
    assert_eq!(next.read_text("node/child.txt").unwrap(), "now a dir");
}

#[test]
fn apply_removing_directory_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap.apply(&[], &["dir/sub"], ApplyOptions::default()).unwrap();
    assert!(!next.exists("dir/sub").unwrap());
    assert!(next.exists("dir/a.txt").unwrap());
}
